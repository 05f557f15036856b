//! The synthesizer interface the mixer layer talks to.
//!
//! Every component that changes sound receives a [`Synthesizer`] explicitly,
//! so the encoders, dispatchers and resolver can be exercised against a
//! recording fake without an audio device. [`crate::audio::AudioEngine`] is the
//! real implementation.

#[cfg(test)]
pub(crate) mod testing;

use crate::error::Result;
use crate::midi::{DRUM_BANK, DRUM_CHANNEL};
use std::future::Future;
use std::path::PathBuf;

/// Per-channel state the program-change path needs to pick a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    /// Whether the channel plays drum kits (bank 128).
    pub is_drum: bool,
    /// Last bank select MSB (CC 0).
    pub bank_msb: u8,
    /// Last bank select LSB (CC 32).
    pub bank_lsb: u8,
}

impl ChannelState {
    /// Default state of `channel` after a reset: channel 10 is the drum channel.
    pub fn initial(channel: u8) -> Self {
        Self {
            is_drum: channel == DRUM_CHANNEL,
            bank_msb: 0,
            bank_lsb: 0,
        }
    }

    /// The SoundFont bank a program change on this channel resolves to.
    pub fn target_bank(&self) -> u16 {
        if self.is_drum {
            DRUM_BANK
        } else {
            self.bank_lsb as u16
        }
    }
}

/// Table addressed by a controller destination pressure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressureTable {
    ChannelPressure,
    PolyphonicKeyPressure,
}

impl PressureTable {
    pub fn name(self) -> &'static str {
        match self {
            PressureTable::ChannelPressure => "channelPressureTable",
            PressureTable::PolyphonicKeyPressure => "polyphonicKeyPressureTable",
        }
    }
}

/// Channel voice events the mixer can drive directly with a 7-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEvent {
    ChannelPressure,
    /// Coarse pitch bend: the 7-bit value becomes the MSB, 64 is centre.
    PitchBend,
}

/// Where a SoundFont comes from.
#[derive(Debug, Clone)]
pub enum SoundFontSource {
    Path(PathBuf),
    /// Raw file contents plus a name for logging.
    Bytes { name: String, data: Vec<u8> },
}

impl SoundFontSource {
    pub fn name(&self) -> String {
        match self {
            SoundFontSource::Path(path) => path.display().to_string(),
            SoundFontSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// A software synthesizer that accepts parameter calls and realtime SysEx.
///
/// All methods take `&self`: implementations own their locking, since the
/// same engine is shared by the UI thread, the loader tasks and the audio
/// callback. `time` is a scheduling timestamp in seconds on the engine clock
/// (see [`Synthesizer::current_time`]); callers pass it through unchanged.
pub trait Synthesizer: Send + Sync {
    /// Seconds on the engine clock, used as the scheduling timestamp.
    fn current_time(&self) -> f64;

    fn set_control_change(&self, channel: u8, controller: u8, value: u8, time: f64);

    fn set_program_change(&self, channel: u8, program: u8, time: f64);

    fn set_channel_event(&self, channel: u8, event: ChannelEvent, value: u8, time: f64);

    /// Channel fine tuning in cents (-100..=100).
    fn set_fine_tuning(&self, channel: u8, cents: f64, time: f64);

    /// Channel coarse tuning in cents (whole semitones, -6400..=6300).
    fn set_coarse_tuning(&self, channel: u8, cents: f64, time: f64);

    fn set_master_fine_tuning(&self, cents: f64, time: f64);

    fn set_master_coarse_tuning(&self, cents: f64, time: f64);

    /// Pitch bend sensitivity in cents.
    fn set_pitch_bend_range(&self, channel: u8, cents: f64, time: f64);

    fn set_master_volume(&self, value: u8, time: f64);

    fn set_reverb_type(&self, value: u8);

    fn set_chorus_type(&self, value: u8, time: f64);

    fn handle_scale_octave_tuning_1byte_sysex(&self, data: &[u8], realtime: bool, time: f64);

    fn handle_pressure_sysex(&self, data: &[u8], table: PressureTable, time: f64);

    fn handle_control_change_sysex(&self, data: &[u8], time: f64);

    fn handle_key_based_instrument_control_sysex(&self, data: &[u8], time: f64);

    fn channel_state(&self, channel: u8) -> ChannelState;

    /// Whether a loaded SoundFont provides a preset for `program` in `bank`.
    fn has_preset(&self, program: u8, bank: u16) -> bool;

    /// Loads a SoundFont, making its presets available to program changes.
    fn load_soundfont(&self, source: SoundFontSource) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_bank() {
        assert_eq!(ChannelState::initial(9).target_bank(), 128);
        let state = ChannelState {
            is_drum: false,
            bank_msb: 0,
            bank_lsb: 8,
        };
        assert_eq!(state.target_bank(), 8);
        assert_eq!(ChannelState::initial(0).target_bank(), 0);
    }
}
