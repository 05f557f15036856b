//! Universal Realtime System Exclusive messages.
//!
//! Encoders for the MIDI Tuning Standard scale/octave tuning message
//! (1-byte format) and for the controller destination setting and key-based
//! instrument control families, plus a decoder for the same messages.
//!
//! Messages are payloads only: the leading `F0` and trailing `F7` framing bytes
//! are added by whatever transport carries them.
//!
//! Layouts (byte offsets):
//!
//! | family                     | 0   | 1   | 2  | 3 | 4..                                  |
//! |----------------------------|-----|-----|----|---|--------------------------------------|
//! | scale/octave tuning        | 7F  | 7F  | 08 | 08| ff gg hh, 12 tuning bytes            |
//! | channel pressure           | 7F  | 7F  | 09 | 01| channel, parameter, value             |
//! | polyphonic key pressure    | 7F  | 7F  | 09 | 02| channel, parameter, value             |
//! | control change             | 7F  | 7F  | 09 | 03| channel, controller, parameter, value |
//! | key-based instrument ctrl  | 7F  | 7F  | 0A | 01| channel, key, parameter, value        |

use super::{check_channel, check_data_byte, CHANNEL_COUNT};
use crate::error::{Error, Result};

/// Sub-ID marking a realtime universal message.
pub const REALTIME: u8 = 0x7f;
/// Device ID addressing every device.
pub const ALL_DEVICES: u8 = 0x7f;

/// MIDI Tuning Standard family (sub-ID #1).
pub const MIDI_TUNING_STANDARD: u8 = 0x08;
/// Scale/octave tuning, 1-byte format (sub-ID #2).
pub const SCALE_OCTAVE_TUNING_1_BYTE: u8 = 0x08;

/// Controller destination setting family (sub-ID #1).
pub const CONTROLLER_DESTINATION: u8 = 0x09;
pub const CHANNEL_PRESSURE: u8 = 0x01;
pub const POLYPHONIC_KEY_PRESSURE: u8 = 0x02;
pub const CONTROL_CHANGE: u8 = 0x03;

/// Key-based instrument control family (sub-ID #1).
pub const KEY_BASED_INSTRUMENT_CONTROL: u8 = 0x0a;
pub const KEY_BASED_CONTROLLER: u8 = 0x01;

pub const SCALE_OCTAVE_TUNING_LEN: usize = 19;
pub const PRESSURE_LEN: usize = 7;
pub const CONTROL_CHANGE_LEN: usize = 8;
pub const KEY_BASED_LEN: usize = 8;

/// Tuning byte meaning "no change" in the 1-byte format (0 cents).
pub const TUNING_CENTER: u8 = 64;

/// Pitch classes per octave.
pub const PITCH_CLASSES: usize = 12;

/// The set of channels a scale/octave tuning message applies to.
///
/// Encoded as three 7-bit bitmap bytes: channels 15-14, 13-7 and 6-0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask(u16);

impl ChannelMask {
    pub const ALL: ChannelMask = ChannelMask(0xffff);

    /// The bitmap sent by the tuning form: `[0b11, 0b0011_1111, 0b0011_1111]`.
    pub const TUNING_FORM: ChannelMask = ChannelMask::from_bytes([0b11, 0b0011_1111, 0b0011_1111]);

    pub const fn from_bits(bits: u16) -> Self {
        ChannelMask(bits)
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        let high = (bytes[0] & 0b11) as u16;
        let mid = (bytes[1] & 0x7f) as u16;
        let low = (bytes[2] & 0x7f) as u16;
        ChannelMask((high << 14) | (mid << 7) | low)
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [
            ((self.0 >> 14) & 0b11) as u8,
            ((self.0 >> 7) & 0x7f) as u8,
            (self.0 & 0x7f) as u8,
        ]
    }

    pub fn contains(self, channel: u8) -> bool {
        channel < CHANNEL_COUNT && self.0 & (1 << channel) != 0
    }

    pub fn channels(self) -> impl Iterator<Item = u8> {
        (0..CHANNEL_COUNT).filter(move |&ch| self.contains(ch))
    }
}

/// Which pressure table a controller destination message targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressureKind {
    Channel,
    PolyphonicKey,
}

impl PressureKind {
    fn sub_id(self) -> u8 {
        match self {
            PressureKind::Channel => CHANNEL_PRESSURE,
            PressureKind::PolyphonicKey => POLYPHONIC_KEY_PRESSURE,
        }
    }
}

/// Builds a scale/octave tuning message for the tuning form's channel set.
///
/// `offsets` must hold exactly one 7-bit value per pitch class, C first.
/// 64 leaves a pitch class untouched; each step is one cent.
///
/// # Examples
///
/// ```
/// use tunemix::midi::sysex::encode_scale_octave_tuning;
///
/// let msg = encode_scale_octave_tuning(&[64; 12]).unwrap();
/// assert_eq!(&msg[..7], &[127, 127, 8, 8, 3, 63, 63]);
/// assert_eq!(msg.len(), 19);
/// ```
pub fn encode_scale_octave_tuning(offsets: &[u8]) -> Result<[u8; SCALE_OCTAVE_TUNING_LEN]> {
    encode_scale_octave_tuning_for(ChannelMask::TUNING_FORM, offsets)
}

/// Builds a scale/octave tuning message addressed to `mask`.
pub fn encode_scale_octave_tuning_for(
    mask: ChannelMask,
    offsets: &[u8],
) -> Result<[u8; SCALE_OCTAVE_TUNING_LEN]> {
    if offsets.len() != PITCH_CLASSES {
        return Err(Error::InvalidTuningLength(offsets.len()));
    }

    let mut data = [0u8; SCALE_OCTAVE_TUNING_LEN];
    data[0] = REALTIME;
    data[1] = ALL_DEVICES;
    data[2] = MIDI_TUNING_STANDARD;
    data[3] = SCALE_OCTAVE_TUNING_1_BYTE;
    data[4..7].copy_from_slice(&mask.to_bytes());
    for (slot, &offset) in data[7..].iter_mut().zip(offsets) {
        *slot = check_data_byte("tuning offset", offset)?;
    }
    Ok(data)
}

/// Builds a channel pressure controller destination message.
pub fn encode_channel_pressure_effect(
    channel: u8,
    parameter: u8,
    value: u8,
) -> Result<[u8; PRESSURE_LEN]> {
    encode_pressure_effect(PressureKind::Channel, channel, parameter, value)
}

/// Builds a polyphonic key pressure controller destination message.
pub fn encode_polyphonic_key_pressure_effect(
    channel: u8,
    parameter: u8,
    value: u8,
) -> Result<[u8; PRESSURE_LEN]> {
    encode_pressure_effect(PressureKind::PolyphonicKey, channel, parameter, value)
}

pub fn encode_pressure_effect(
    kind: PressureKind,
    channel: u8,
    parameter: u8,
    value: u8,
) -> Result<[u8; PRESSURE_LEN]> {
    Ok([
        REALTIME,
        ALL_DEVICES,
        CONTROLLER_DESTINATION,
        kind.sub_id(),
        check_channel(channel)?,
        check_data_byte("parameter index", parameter)?,
        check_data_byte("value", value)?,
    ])
}

/// Builds a control change controller destination message.
///
/// `controller` is the controller number whose response is being shaped.
pub fn encode_control_change_effect(
    channel: u8,
    controller: u8,
    parameter: u8,
    value: u8,
) -> Result<[u8; CONTROL_CHANGE_LEN]> {
    Ok([
        REALTIME,
        ALL_DEVICES,
        CONTROLLER_DESTINATION,
        CONTROL_CHANGE,
        check_channel(channel)?,
        check_data_byte("controller type", controller)?,
        check_data_byte("parameter index", parameter)?,
        check_data_byte("value", value)?,
    ])
}

/// Builds a key-based instrument control message for a single key.
pub fn encode_key_based_instrument_control(
    channel: u8,
    key: u8,
    parameter: u8,
    value: u8,
) -> Result<[u8; KEY_BASED_LEN]> {
    Ok([
        REALTIME,
        ALL_DEVICES,
        KEY_BASED_INSTRUMENT_CONTROL,
        KEY_BASED_CONTROLLER,
        check_channel(channel)?,
        check_data_byte("key number", key)?,
        check_data_byte("parameter index", parameter)?,
        check_data_byte("value", value)?,
    ])
}

/// A decoded Universal Realtime message from one of the supported families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeMessage {
    ScaleOctaveTuning {
        channels: ChannelMask,
        offsets: [u8; PITCH_CLASSES],
    },
    Pressure {
        kind: PressureKind,
        channel: u8,
        parameter: u8,
        value: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        parameter: u8,
        value: u8,
    },
    KeyBased {
        channel: u8,
        key: u8,
        parameter: u8,
        value: u8,
    },
}

impl RealtimeMessage {
    /// Decodes a payload produced by one of the encoders in this module.
    ///
    /// Leading `F0` / trailing `F7` framing bytes are tolerated and ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(&[0xf0]).unwrap_or(bytes);
        let bytes = bytes.strip_suffix(&[0xf7]).unwrap_or(bytes);

        let malformed = |why: &str| Error::MalformedSysEx(format!("{} ({} bytes)", why, bytes.len()));

        if bytes.len() < 4 || bytes[0] != REALTIME {
            return Err(malformed("not a realtime universal message"));
        }
        if bytes.iter().any(|&b| b > 0x7f) {
            return Err(malformed("data byte with the high bit set"));
        }

        let expect_len = |len: usize| {
            if bytes.len() == len {
                Ok(())
            } else {
                Err(malformed(&format!("expected {} bytes", len)))
            }
        };

        match (bytes[2], bytes[3]) {
            (MIDI_TUNING_STANDARD, SCALE_OCTAVE_TUNING_1_BYTE) => {
                expect_len(SCALE_OCTAVE_TUNING_LEN)?;
                let mut offsets = [0u8; PITCH_CLASSES];
                offsets.copy_from_slice(&bytes[7..]);
                Ok(RealtimeMessage::ScaleOctaveTuning {
                    channels: ChannelMask::from_bytes([bytes[4], bytes[5], bytes[6]]),
                    offsets,
                })
            }
            (CONTROLLER_DESTINATION, sub @ (CHANNEL_PRESSURE | POLYPHONIC_KEY_PRESSURE)) => {
                expect_len(PRESSURE_LEN)?;
                let kind = if sub == CHANNEL_PRESSURE {
                    PressureKind::Channel
                } else {
                    PressureKind::PolyphonicKey
                };
                Ok(RealtimeMessage::Pressure {
                    kind,
                    channel: check_channel(bytes[4])?,
                    parameter: bytes[5],
                    value: bytes[6],
                })
            }
            (CONTROLLER_DESTINATION, CONTROL_CHANGE) => {
                expect_len(CONTROL_CHANGE_LEN)?;
                Ok(RealtimeMessage::ControlChange {
                    channel: check_channel(bytes[4])?,
                    controller: bytes[5],
                    parameter: bytes[6],
                    value: bytes[7],
                })
            }
            (KEY_BASED_INSTRUMENT_CONTROL, KEY_BASED_CONTROLLER) => {
                expect_len(KEY_BASED_LEN)?;
                Ok(RealtimeMessage::KeyBased {
                    channel: check_channel(bytes[4])?,
                    key: bytes[5],
                    parameter: bytes[6],
                    value: bytes[7],
                })
            }
            (family, sub) => Err(malformed(&format!(
                "unsupported family {:#04x}/{:#04x}",
                family, sub
            ))),
        }
    }
}
