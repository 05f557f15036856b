//! The effects panel: reverb/chorus type, scale/octave tuning and the
//! controller destination and key-based effect broadcasts.

use super::broadcast::{
    broadcast_control_change_effect, broadcast_key_based_instrument_control,
    broadcast_pressure_effect,
};
use crate::error::{Error, Result};
use crate::midi::sysex::{encode_scale_octave_tuning, PressureKind, PITCH_CLASSES, TUNING_CENTER};
use crate::midi::{ChannelTarget, DATA_BYTE_MAX, NOTE_NAMES};
use crate::synth::Synthesizer;
use std::fmt;
use std::str::FromStr;

/// Controller destination parameters (pressure and control-change effects).
pub const DESTINATION_PARAMETERS: [&str; 6] = [
    "Pitch",
    "Filter Cutoff",
    "Amplitude",
    "LFO Pitch Depth",
    "LFO Filter Depth",
    "LFO Amp Depth",
];

const DESTINATION_DEFAULTS: [u8; 6] = [64, 64, 64, 0, 0, 0];

/// Controllers a key-based instrument control message can address.
pub const KEY_BASED_CONTROLLERS: [(u8, &str); 4] =
    [(7, "Volume"), (10, "Pan"), (91, "Reverb"), (93, "Chorus")];

const KEY_BASED_DEFAULTS: [u8; 4] = [64, 64, 40, 0];

/// One fieldset of the effects panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectField {
    ReverbType,
    ChorusType,
    ScaleOctaveTuning,
    ChannelPressureEffects,
    PolyphonicKeyPressureEffects,
    ControlChangeEffects,
    KeyBasedInstrumentControl,
}

impl EffectField {
    pub const ALL: [EffectField; 7] = [
        EffectField::ReverbType,
        EffectField::ChorusType,
        EffectField::ScaleOctaveTuning,
        EffectField::ChannelPressureEffects,
        EffectField::PolyphonicKeyPressureEffects,
        EffectField::ControlChangeEffects,
        EffectField::KeyBasedInstrumentControl,
    ];

    pub fn id(self) -> &'static str {
        match self {
            EffectField::ReverbType => "ReverbType",
            EffectField::ChorusType => "ChorusType",
            EffectField::ScaleOctaveTuning => "ScaleOctaveTuning",
            EffectField::ChannelPressureEffects => "ChannelPressureEffects",
            EffectField::PolyphonicKeyPressureEffects => "PolyphonicKeyPressureEffects",
            EffectField::ControlChangeEffects => "ControlChangeEffects",
            EffectField::KeyBasedInstrumentControl => "KeyBasedInstrumentControl",
        }
    }

    /// Short heading for the effects panel.
    pub fn title(self) -> &'static str {
        match self {
            EffectField::ReverbType => "Reverb",
            EffectField::ChorusType => "Chorus",
            EffectField::ScaleOctaveTuning => "Scale Tuning",
            EffectField::ChannelPressureEffects => "Ch. Pressure",
            EffectField::PolyphonicKeyPressureEffects => "Poly Pressure",
            EffectField::ControlChangeEffects => "CC Effects",
            EffectField::KeyBasedInstrumentControl => "Key-Based",
        }
    }

    /// Number of inputs in the fieldset.
    pub fn len(self) -> usize {
        match self {
            EffectField::ReverbType | EffectField::ChorusType => 1,
            EffectField::ScaleOctaveTuning => PITCH_CLASSES,
            EffectField::ChannelPressureEffects
            | EffectField::PolyphonicKeyPressureEffects
            | EffectField::ControlChangeEffects => DESTINATION_PARAMETERS.len(),
            EffectField::KeyBasedInstrumentControl => KEY_BASED_CONTROLLERS.len(),
        }
    }

    /// Label of input `index` within the fieldset.
    pub fn input_label(self, index: usize) -> &'static str {
        match self {
            EffectField::ReverbType | EffectField::ChorusType => "Type",
            EffectField::ScaleOctaveTuning => NOTE_NAMES.get(index).copied().unwrap_or("?"),
            EffectField::ChannelPressureEffects
            | EffectField::PolyphonicKeyPressureEffects
            | EffectField::ControlChangeEffects => {
                DESTINATION_PARAMETERS.get(index).copied().unwrap_or("?")
            }
            EffectField::KeyBasedInstrumentControl => KEY_BASED_CONTROLLERS
                .get(index)
                .map(|(_, name)| *name)
                .unwrap_or("?"),
        }
    }

    /// The parameter byte carried by input `index`: the destination index,
    /// or the controller number for key-based control.
    fn parameter(self, index: usize) -> u8 {
        match self {
            EffectField::KeyBasedInstrumentControl => KEY_BASED_CONTROLLERS[index].0,
            _ => index as u8,
        }
    }
}

impl FromStr for EffectField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EffectField::ALL
            .into_iter()
            .find(|field| field.id() == s)
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}

impl fmt::Display for EffectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A single edited input, ready to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectChange {
    pub field: EffectField,
    /// Destination parameter or key-based controller number.
    pub parameter: u8,
    pub value: u8,
}

/// Current values of every effects input. Edits are clamped to 0..=127.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectsForm {
    reverb_type: u8,
    chorus_type: u8,
    tuning: [u8; PITCH_CLASSES],
    channel_pressure: [u8; 6],
    polyphonic_pressure: [u8; 6],
    control_change: [u8; 6],
    key_based: [u8; 4],
}

impl Default for EffectsForm {
    fn default() -> Self {
        Self {
            reverb_type: 4,
            chorus_type: 2,
            tuning: [TUNING_CENTER; PITCH_CLASSES],
            channel_pressure: DESTINATION_DEFAULTS,
            polyphonic_pressure: DESTINATION_DEFAULTS,
            control_change: DESTINATION_DEFAULTS,
            key_based: KEY_BASED_DEFAULTS,
        }
    }
}

impl EffectsForm {
    /// Every (field, input) pair in panel order.
    pub fn slots() -> Vec<(EffectField, usize)> {
        EffectField::ALL
            .into_iter()
            .flat_map(|field| (0..field.len()).map(move |i| (field, i)))
            .collect()
    }

    pub fn tuning(&self) -> &[u8; PITCH_CLASSES] {
        &self.tuning
    }

    fn values(&self, field: EffectField) -> &[u8] {
        match field {
            EffectField::ReverbType => std::slice::from_ref(&self.reverb_type),
            EffectField::ChorusType => std::slice::from_ref(&self.chorus_type),
            EffectField::ScaleOctaveTuning => &self.tuning,
            EffectField::ChannelPressureEffects => &self.channel_pressure,
            EffectField::PolyphonicKeyPressureEffects => &self.polyphonic_pressure,
            EffectField::ControlChangeEffects => &self.control_change,
            EffectField::KeyBasedInstrumentControl => &self.key_based,
        }
    }

    fn values_mut(&mut self, field: EffectField) -> &mut [u8] {
        match field {
            EffectField::ReverbType => std::slice::from_mut(&mut self.reverb_type),
            EffectField::ChorusType => std::slice::from_mut(&mut self.chorus_type),
            EffectField::ScaleOctaveTuning => &mut self.tuning,
            EffectField::ChannelPressureEffects => &mut self.channel_pressure,
            EffectField::PolyphonicKeyPressureEffects => &mut self.polyphonic_pressure,
            EffectField::ControlChangeEffects => &mut self.control_change,
            EffectField::KeyBasedInstrumentControl => &mut self.key_based,
        }
    }

    pub fn value(&self, field: EffectField, index: usize) -> Option<u8> {
        self.values(field).get(index).copied()
    }

    /// Stores `value` (clamped to 0..=127) in input `index` of `field`.
    pub fn set(&mut self, field: EffectField, index: usize, value: i32) -> Result<EffectChange> {
        let slot = self
            .values_mut(field)
            .get_mut(index)
            .ok_or_else(|| Error::UnknownField(format!("{}[{}]", field, index)))?;
        *slot = value.clamp(0, DATA_BYTE_MAX as i32) as u8;
        Ok(EffectChange {
            field,
            parameter: field.parameter(index),
            value: *slot,
        })
    }

    /// Moves input `index` of `field` by `delta`.
    pub fn adjust(&mut self, field: EffectField, index: usize, delta: i32) -> Result<EffectChange> {
        let current = self
            .value(field, index)
            .ok_or_else(|| Error::UnknownField(format!("{}[{}]", field, index)))?;
        self.set(field, index, current as i32 + delta)
    }

    /// Sends one edited input to the synthesizer.
    ///
    /// Scale/octave tuning always sends all twelve current values; the
    /// controller effects go to every channel. Returns the number of calls
    /// made.
    pub fn apply<S: Synthesizer + ?Sized>(
        &self,
        synth: &S,
        change: EffectChange,
        time: f64,
    ) -> Result<usize> {
        let EffectChange {
            field,
            parameter,
            value,
        } = change;
        match field {
            EffectField::ReverbType => {
                synth.set_reverb_type(value);
                Ok(1)
            }
            EffectField::ChorusType => {
                synth.set_chorus_type(value, time);
                Ok(1)
            }
            EffectField::ScaleOctaveTuning => {
                let data = encode_scale_octave_tuning(&self.tuning)?;
                synth.handle_scale_octave_tuning_1byte_sysex(&data, true, time);
                Ok(1)
            }
            EffectField::ChannelPressureEffects => broadcast_pressure_effect(
                synth,
                ChannelTarget::All,
                PressureKind::Channel,
                parameter,
                value,
                time,
            ),
            EffectField::PolyphonicKeyPressureEffects => broadcast_pressure_effect(
                synth,
                ChannelTarget::All,
                PressureKind::PolyphonicKey,
                parameter,
                value,
                time,
            ),
            EffectField::ControlChangeEffects => {
                broadcast_control_change_effect(synth, ChannelTarget::All, parameter, value, time)
            }
            EffectField::KeyBasedInstrumentControl => broadcast_key_based_instrument_control(
                synth,
                ChannelTarget::All,
                parameter,
                value,
                time,
            ),
        }
    }

    /// Re-sends every input, e.g. after a SoundFont reload.
    ///
    /// Scale/octave tuning goes out once since one message carries all twelve
    /// values. Returns the total number of calls made.
    pub fn apply_all<S: Synthesizer + ?Sized>(&self, synth: &S, time: f64) -> Result<usize> {
        let mut sent = 0;
        for field in EffectField::ALL {
            let inputs = match field {
                EffectField::ScaleOctaveTuning => 1,
                other => other.len(),
            };
            for index in 0..inputs {
                let change = EffectChange {
                    field,
                    parameter: field.parameter(index),
                    value: self.values(field)[index],
                };
                sent += self.apply(synth, change, time)?;
            }
        }
        tracing::debug!(sent, "effects re-applied");
        Ok(sent)
    }
}
