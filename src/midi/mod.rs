//! MIDI vocabulary shared by the mixer, the synth backend and the player.
//!
//! This module holds the channel addressing used everywhere in the crate,
//! the 7-bit value scaling applied to mixer inputs, the Universal Realtime
//! SysEx encoders, and the MIDI file player.

pub mod player;
pub mod sysex;

use crate::error::{Error, Result};
use std::fmt;
use std::ops::RangeInclusive;

/// Number of MIDI channels addressed by a broadcast.
pub const CHANNEL_COUNT: u8 = 16;

/// General MIDI percussion channel (zero-based).
pub const DRUM_CHANNEL: u8 = 9;

/// SoundFont bank reserved for drum kits.
pub const DRUM_BANK: u16 = 128;

/// Bank select controllers. The melodic bank is taken from the LSB.
pub const BANK_SELECT_MSB: u8 = 0;
pub const BANK_SELECT_LSB: u8 = 32;

/// Largest value a MIDI data byte can carry.
pub const DATA_BYTE_MAX: u8 = 127;

/// Standard pitch-class names, used to label the scale/octave tuning inputs.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// The channel(s) a mixer row or effect is applied to.
///
/// The mixer's channel selector uses `-1` for "all channels"; see
/// [`ChannelTarget::from_selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelTarget {
    /// Every channel, visited in ascending order 0..=15.
    #[default]
    All,
    /// A single zero-based channel.
    Single(u8),
}

impl ChannelTarget {
    /// Converts the mixer selector value (`-1` or `0..=15`) to a target.
    pub fn from_selector(value: i8) -> Result<Self> {
        match value {
            v if v < 0 => Ok(ChannelTarget::All),
            v if (v as u8) < CHANNEL_COUNT => Ok(ChannelTarget::Single(v as u8)),
            v => Err(Error::InvalidChannel(v as u8)),
        }
    }

    /// Returns the mixer selector value for this target.
    pub fn selector(self) -> i8 {
        match self {
            ChannelTarget::All => -1,
            ChannelTarget::Single(ch) => ch as i8,
        }
    }

    /// Channels covered by this target, in dispatch order.
    pub fn channels(self) -> RangeInclusive<u8> {
        match self {
            ChannelTarget::All => 0..=CHANNEL_COUNT - 1,
            ChannelTarget::Single(ch) => ch..=ch,
        }
    }

    pub fn is_all(self) -> bool {
        matches!(self, ChannelTarget::All)
    }

    /// Steps through All, 0, 1, ... 15 and wraps around.
    pub fn cycle(self, delta: i8) -> Self {
        // Selector space is -1..=15, i.e. 17 positions.
        let positions = CHANNEL_COUNT as i16 + 1;
        let index = self.selector() as i16 + 1;
        let next = (index + delta as i16).rem_euclid(positions) - 1;
        match next {
            -1 => ChannelTarget::All,
            ch => ChannelTarget::Single(ch as u8),
        }
    }

    pub(crate) fn validate(self) -> Result<Self> {
        match self {
            ChannelTarget::Single(ch) if ch >= CHANNEL_COUNT => Err(Error::InvalidChannel(ch)),
            target => Ok(target),
        }
    }
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelTarget::All => write!(f, "All"),
            ChannelTarget::Single(ch) => write!(f, "{}", ch + 1),
        }
    }
}

/// Checks that a normalized mixer value is usable and clamps it into [0, 1].
pub fn normalize_value(value: f64) -> Result<f64> {
    if value.is_nan() {
        return Err(Error::InvalidValue(value));
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Scales a normalized value in [0, 1] to a 7-bit data byte with `ceil(v * 127)`.
///
/// Out-of-range inputs are clamped first, NaN maps to 0.
///
/// # Examples
///
/// ```
/// use tunemix::midi::scale_to_data_byte;
///
/// assert_eq!(scale_to_data_byte(1.0), 127);
/// assert_eq!(scale_to_data_byte(0.5), 64);
/// assert_eq!(scale_to_data_byte(0.0), 0);
/// ```
pub fn scale_to_data_byte(value: f64) -> u8 {
    let value = normalize_value(value).unwrap_or(0.0);
    (value * DATA_BYTE_MAX as f64).ceil() as u8
}

/// Returns an error naming `field` if `value` does not fit in 7 bits.
pub(crate) fn check_data_byte(field: &'static str, value: u8) -> Result<u8> {
    if value > DATA_BYTE_MAX {
        Err(Error::DataByteOutOfRange { field, value })
    } else {
        Ok(value)
    }
}

/// Returns an error if `channel` is not a zero-based MIDI channel.
pub(crate) fn check_channel(channel: u8) -> Result<u8> {
    if channel >= CHANNEL_COUNT {
        Err(Error::InvalidChannel(channel))
    } else {
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_round_trip_bounds() {
        assert_eq!(ChannelTarget::from_selector(-1).unwrap(), ChannelTarget::All);
        assert_eq!(
            ChannelTarget::from_selector(15).unwrap(),
            ChannelTarget::Single(15)
        );
        assert!(matches!(
            ChannelTarget::from_selector(16),
            Err(Error::InvalidChannel(16))
        ));
        assert_eq!(ChannelTarget::Single(3).selector(), 3);
        assert_eq!(ChannelTarget::All.selector(), -1);
    }

    #[test]
    fn test_channels_ascending() {
        let all: Vec<u8> = ChannelTarget::All.channels().collect();
        assert_eq!(all, (0..16).collect::<Vec<u8>>());
        let one: Vec<u8> = ChannelTarget::Single(4).channels().collect();
        assert_eq!(one, vec![4]);
    }

    #[test]
    fn test_cycle_wraps() {
        assert_eq!(ChannelTarget::All.cycle(1), ChannelTarget::Single(0));
        assert_eq!(ChannelTarget::Single(15).cycle(1), ChannelTarget::All);
        assert_eq!(ChannelTarget::All.cycle(-1), ChannelTarget::Single(15));
    }

    #[test]
    fn test_scale_to_data_byte() {
        assert_eq!(scale_to_data_byte(0.0), 0);
        assert_eq!(scale_to_data_byte(1.0), 127);
        // ceil, not round
        assert_eq!(scale_to_data_byte(0.001), 1);
        assert_eq!(scale_to_data_byte(2.0), 127);
        assert_eq!(scale_to_data_byte(-1.0), 0);
    }

    #[test]
    fn test_normalize_value_rejects_nan() {
        assert!(matches!(normalize_value(f64::NAN), Err(Error::InvalidValue(_))));
        assert_eq!(normalize_value(1.5).unwrap(), 1.0);
    }
}
