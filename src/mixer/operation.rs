//! Mixer operations and their value scaling.
//!
//! A mixer row names its operation with a short string:
//!
//! - `CC<n>` - a raw control change to controller `n`
//! - `Event<Name>` - a channel event such as `EventProgramChange`
//! - `FineTuning`, `CoarseTuning`, `PitchBendRange` - tuning with custom scaling
//! - `MasterVolume`, `ReverbType`, `ChorusType` - whole-instrument controls
//!
//! The string is parsed once into an [`Operation`]; dispatch then matches on
//! the variant, so an unknown name fails at parse time with
//! [`Error::UnsupportedOperation`] instead of at call time.

use crate::error::{Error, Result};
use crate::midi::{scale_to_data_byte, DATA_BYTE_MAX};
use crate::synth::ChannelEvent;
use std::fmt;
use std::str::FromStr;

/// Events reachable with the `Event` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixerEvent {
    /// Goes through the bank loader before switching.
    ProgramChange,
    Channel(ChannelEvent),
}

impl MixerEvent {
    fn name(self) -> &'static str {
        match self {
            MixerEvent::ProgramChange => "ProgramChange",
            MixerEvent::Channel(ChannelEvent::ChannelPressure) => "ChannelPressure",
            MixerEvent::Channel(ChannelEvent::PitchBend) => "PitchBend",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ProgramChange" => Some(MixerEvent::ProgramChange),
            "ChannelPressure" => Some(MixerEvent::Channel(ChannelEvent::ChannelPressure)),
            "PitchBend" => Some(MixerEvent::Channel(ChannelEvent::PitchBend)),
            _ => None,
        }
    }
}

/// Controls that apply to the whole instrument rather than a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalControl {
    MasterVolume,
    ReverbType,
    ChorusType,
}

impl GlobalControl {
    fn name(self) -> &'static str {
        match self {
            GlobalControl::MasterVolume => "MasterVolume",
            GlobalControl::ReverbType => "ReverbType",
            GlobalControl::ChorusType => "ChorusType",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ControlChange(u8),
    Event(MixerEvent),
    FineTuning,
    CoarseTuning,
    PitchBendRange,
    Global(GlobalControl),
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unsupported = || Error::UnsupportedOperation(s.to_string());

        if let Some(number) = s.strip_prefix("CC") {
            let controller: u8 = number.parse().map_err(|_| unsupported())?;
            if controller > DATA_BYTE_MAX {
                return Err(unsupported());
            }
            return Ok(Operation::ControlChange(controller));
        }
        if let Some(name) = s.strip_prefix("Event") {
            return MixerEvent::from_name(name)
                .map(Operation::Event)
                .ok_or_else(unsupported);
        }

        match s {
            "FineTuning" => Ok(Operation::FineTuning),
            "CoarseTuning" => Ok(Operation::CoarseTuning),
            "PitchBendRange" => Ok(Operation::PitchBendRange),
            "MasterVolume" => Ok(Operation::Global(GlobalControl::MasterVolume)),
            "ReverbType" => Ok(Operation::Global(GlobalControl::ReverbType)),
            "ChorusType" => Ok(Operation::Global(GlobalControl::ChorusType)),
            _ => Err(unsupported()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ControlChange(cc) => write!(f, "CC{}", cc),
            Operation::Event(event) => write!(f, "Event{}", event.name()),
            Operation::FineTuning => write!(f, "FineTuning"),
            Operation::CoarseTuning => write!(f, "CoarseTuning"),
            Operation::PitchBendRange => write!(f, "PitchBendRange"),
            Operation::Global(control) => write!(f, "{}", control.name()),
        }
    }
}

impl Operation {
    /// Human-readable label for the mixer table.
    pub fn label(&self) -> String {
        match self {
            Operation::ControlChange(cc) => match controller_name(*cc) {
                Some(name) => format!("CC{} {}", cc, name),
                None => format!("CC{}", cc),
            },
            Operation::Event(MixerEvent::ProgramChange) => "Program".to_string(),
            Operation::Event(MixerEvent::Channel(ChannelEvent::ChannelPressure)) => {
                "Ch. Pressure".to_string()
            }
            Operation::Event(MixerEvent::Channel(ChannelEvent::PitchBend)) => {
                "Pitch Bend".to_string()
            }
            Operation::FineTuning => "Fine Tune".to_string(),
            Operation::CoarseTuning => "Coarse Tune".to_string(),
            Operation::PitchBendRange => "Bend Range".to_string(),
            Operation::Global(GlobalControl::MasterVolume) => "Master Vol".to_string(),
            Operation::Global(GlobalControl::ReverbType) => "Reverb Type".to_string(),
            Operation::Global(GlobalControl::ChorusType) => "Chorus Type".to_string(),
        }
    }

    /// The value actually sent for a normalized input, for display.
    pub fn scaled_display(&self, value: f64) -> String {
        match self {
            Operation::FineTuning => format!("{:+.0}c", fine_tuning_cents(value)),
            Operation::CoarseTuning => format!("{:+.0}c", coarse_tuning_cents(value)),
            Operation::PitchBendRange => format!("{:.0}c", pitch_bend_range_cents(value)),
            _ => format!("{}", scale_to_data_byte(value)),
        }
    }
}

/// Operations offered by a fresh mixer table, in menu order.
pub fn default_catalog() -> Vec<Operation> {
    let names = [
        "CC1", "CC7", "CC10", "CC11", "CC64", "CC71", "CC72", "CC73", "CC74", "CC91", "CC93",
        "EventProgramChange",
        "EventChannelPressure",
        "EventPitchBend",
        "FineTuning",
        "CoarseTuning",
        "PitchBendRange",
        "MasterVolume",
        "ReverbType",
        "ChorusType",
    ];
    names.iter().filter_map(|name| name.parse().ok()).collect()
}

/// General MIDI names for the controllers in the default catalog.
pub fn controller_name(controller: u8) -> Option<&'static str> {
    Some(match controller {
        1 => "Modulation",
        7 => "Volume",
        10 => "Pan",
        11 => "Expression",
        64 => "Sustain",
        71 => "Resonance",
        72 => "Release",
        73 => "Attack",
        74 => "Cutoff",
        91 => "Reverb",
        93 => "Chorus",
        _ => return None,
    })
}

/// `(v - 0.5) * 200`: -100..=100 cents, centred on 0.5.
pub fn fine_tuning_cents(value: f64) -> f64 {
    (value - 0.5) * 200.0
}

/// `(v * 127 - 64) * 100`: -6400..=6300 cents.
pub fn coarse_tuning_cents(value: f64) -> f64 {
    (value * 127.0 - 64.0) * 100.0
}

/// `v * 12800`: 0..=12800 cents.
pub fn pitch_bend_range_cents(value: f64) -> f64 {
    value * 12800.0
}
