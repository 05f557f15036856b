//! Several SoundFonts played as one instrument.
//!
//! Each loaded SoundFont gets its own rustysynth synthesizer. Controller and
//! tuning changes go to all of them; notes go to the one the channel is
//! routed to, which is chosen at program change time by looking up the
//! (program, bank) pair in the most recently loaded font that has it.

use crate::error::{Error, Result};
use crate::midi::sysex::{ChannelMask, PressureKind, RealtimeMessage, PITCH_CLASSES};
use crate::midi::{BANK_SELECT_LSB, BANK_SELECT_MSB, CHANNEL_COUNT, DATA_BYTE_MAX};
use crate::synth::{ChannelEvent, ChannelState, PressureTable};
use rustysynth::{SoundFont, SynthesizerSettings};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

const CHANNELS: usize = CHANNEL_COUNT as usize;

// MIDI status bytes and controllers used here.
const NOTE_OFF: i32 = 0x80;
const NOTE_ON: i32 = 0x90;
const CONTROL_CHANGE: i32 = 0xB0;
const PROGRAM_CHANGE: i32 = 0xC0;
const CHANNEL_PRESSURE: i32 = 0xD0;
const PITCH_BEND: i32 = 0xE0;
const DATA_ENTRY_MSB: i32 = 6;
const DATA_ENTRY_LSB: i32 = 38;
const RPN_LSB: i32 = 100;
const RPN_MSB: i32 = 101;

/// Pitch bend sensitivity after a reset (two semitones).
pub const DEFAULT_BEND_RANGE_CENTS: f64 = 200.0;

/// RPN 1 value for a fine tuning offset, as (MSB, LSB). 8192 is centre and
/// one step is 100/8192 cents.
pub fn fine_tuning_rpn(cents: f64) -> (u8, u8) {
    let value = (8192.0 + cents * 8192.0 / 100.0).round().clamp(0.0, 16383.0) as u16;
    ((value >> 7) as u8, (value & 0x7f) as u8)
}

/// RPN 2 value (semitones + 64) for a coarse tuning offset.
pub fn coarse_tuning_rpn(cents: f64) -> u8 {
    ((cents / 100.0).round() + 64.0).clamp(0.0, DATA_BYTE_MAX as f64) as u8
}

/// RPN 0 value for a bend range, as (semitones, cents).
pub fn pitch_bend_range_rpn(cents: f64) -> (u8, u8) {
    let cents = cents.max(0.0);
    let semitones = (cents / 100.0).floor().min(DATA_BYTE_MAX as f64);
    let rest = (cents - semitones * 100.0).round().clamp(0.0, 99.0);
    (semitones as u8, rest as u8)
}

/// Which loaded SoundFont provides which (program, bank) pairs.
#[derive(Debug, Default, Clone)]
pub struct PresetIndex {
    fonts: Vec<HashSet<(u8, u16)>>,
}

impl PresetIndex {
    /// Registers a font's presets and returns its index.
    pub fn push(&mut self, presets: HashSet<(u8, u16)>) -> usize {
        self.fonts.push(presets);
        self.fonts.len() - 1
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn contains(&self, program: u8, bank: u16) -> bool {
        self.fonts.iter().any(|font| font.contains(&(program, bank)))
    }

    /// The most recently loaded font providing the pair.
    pub fn find(&self, program: u8, bank: u16) -> Option<usize> {
        self.fonts
            .iter()
            .rposition(|font| font.contains(&(program, bank)))
    }
}

/// Last values received by the SysEx and effect entry points that the
/// synthesizer cannot render itself. Shown in the effects panel.
#[derive(Debug, Default, Clone)]
pub struct EffectState {
    pub reverb_type: Option<u8>,
    pub chorus_type: Option<u8>,
    pub scale_tuning: [Option<[u8; PITCH_CLASSES]>; CHANNELS],
    pub pressure: HashMap<(PressureTable, u8, u8), u8>,
    pub control_change: HashMap<(u8, u8, u8), u8>,
    pub key_based: HashMap<(u8, u8, u8), u8>,
}

impl EffectState {
    /// Records a decoded realtime message.
    pub fn record(&mut self, message: &RealtimeMessage) {
        match *message {
            RealtimeMessage::ScaleOctaveTuning { channels, offsets } => {
                for channel in channels.channels() {
                    self.scale_tuning[channel as usize] = Some(offsets);
                }
            }
            RealtimeMessage::Pressure {
                kind,
                channel,
                parameter,
                value,
            } => {
                let table = match kind {
                    PressureKind::Channel => PressureTable::ChannelPressure,
                    PressureKind::PolyphonicKey => PressureTable::PolyphonicKeyPressure,
                };
                self.pressure.insert((table, channel, parameter), value);
            }
            RealtimeMessage::ControlChange {
                channel,
                controller,
                parameter,
                value,
            } => {
                self.control_change
                    .insert((channel, controller, parameter), value);
            }
            RealtimeMessage::KeyBased {
                channel,
                key,
                parameter,
                value,
            } => {
                self.key_based.insert((channel, key, parameter), value);
            }
        }
    }

    /// Channels whose scale tuning has been set away from centre.
    pub fn tuned_channels(&self) -> ChannelMask {
        let bits = self
            .scale_tuning
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_some_and(|t| t.iter().any(|&v| v != 64)))
            .fold(0u16, |bits, (ch, _)| bits | 1 << ch);
        ChannelMask::from_bits(bits)
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelSettings {
    state: ChannelState,
    program: u8,
    fine_cents: f64,
    coarse_cents: f64,
    bend_range_cents: f64,
}

impl ChannelSettings {
    fn initial(channel: u8) -> Self {
        Self {
            state: ChannelState::initial(channel),
            program: 0,
            fine_cents: 0.0,
            coarse_cents: 0.0,
            bend_range_cents: DEFAULT_BEND_RANGE_CENTS,
        }
    }
}

struct LoadedFont {
    name: String,
    synth: rustysynth::Synthesizer,
}

/// Presets of a parsed SoundFont as (program, bank) pairs.
pub fn preset_pairs(soundfont: &SoundFont) -> HashSet<(u8, u16)> {
    soundfont
        .get_presets()
        .iter()
        .filter_map(|preset| {
            let program = u8::try_from(preset.get_patch_number()).ok()?;
            let bank = u16::try_from(preset.get_bank_number()).ok()?;
            (program <= DATA_BYTE_MAX).then_some((program, bank))
        })
        .collect()
}

/// A SoundFont parsed and wrapped in its own synthesizer, ready to be added
/// to a [`SynthBank`]. Building one is slow, so it happens off the audio lock.
pub struct PreparedFont {
    name: String,
    presets: HashSet<(u8, u16)>,
    synth: rustysynth::Synthesizer,
}

impl PreparedFont {
    /// Parses SoundFont bytes. `name` is used in errors and the UI.
    pub fn parse(name: impl Into<String>, data: &[u8]) -> Result<Self> {
        let name = name.into();
        let load_error = |reason: String| Error::SoundFontLoad {
            path: PathBuf::from(&name),
            reason,
        };

        let soundfont = Arc::new(
            SoundFont::new(&mut Cursor::new(data)).map_err(|e| load_error(format!("{:?}", e)))?,
        );
        let settings = SynthesizerSettings::new(SAMPLE_RATE as i32);
        let synth = rustysynth::Synthesizer::new(&soundfont, &settings)
            .map_err(|e| load_error(format!("{:?}", e)))?;

        Ok(Self {
            presets: preset_pairs(&soundfont),
            name,
            synth,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preset_count(&self) -> usize {
        self.presets.len()
    }
}

/// The synthesizers plus the channel state they are driven from.
pub struct SynthBank {
    fonts: Vec<LoadedFont>,
    index: PresetIndex,
    routes: [Option<usize>; CHANNELS],
    channels: [ChannelSettings; CHANNELS],
    master_fine_cents: f64,
    master_coarse_cents: f64,
    master_volume: u8,
    effects: EffectState,
    left_scratch: Vec<f32>,
    right_scratch: Vec<f32>,
}

impl Default for SynthBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthBank {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            index: PresetIndex::default(),
            routes: [None; CHANNELS],
            channels: std::array::from_fn(|ch| ChannelSettings::initial(ch as u8)),
            master_fine_cents: 0.0,
            master_coarse_cents: 0.0,
            master_volume: 100,
            effects: EffectState::default(),
            left_scratch: Vec::new(),
            right_scratch: Vec::new(),
        }
    }

    /// Adds a prepared font and brings it up to the current channel state.
    /// Returns the font's index.
    pub fn add_font(&mut self, font: PreparedFont) -> usize {
        let PreparedFont {
            name,
            presets,
            mut synth,
        } = font;

        synth.set_master_volume(self.master_volume as f32 / DATA_BYTE_MAX as f32);
        let master = (self.master_fine_cents, self.master_coarse_cents);
        for (ch, settings) in self.channels.iter().enumerate() {
            send_tuning(&mut synth, ch as i32, settings, master);
        }

        let index = self.index.push(presets);
        self.fonts.push(LoadedFont { name, synth });
        index
    }

    pub fn font_names(&self) -> Vec<&str> {
        self.fonts.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn has_preset(&self, program: u8, bank: u16) -> bool {
        self.index.contains(program, bank)
    }

    pub fn channel_state(&self, channel: u8) -> ChannelState {
        self.channels[channel as usize % CHANNELS].state
    }

    /// Last program selected on `channel`.
    pub fn program(&self, channel: u8) -> u8 {
        self.channels[channel as usize % CHANNELS].program
    }

    pub fn effects(&self) -> &EffectState {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectState {
        &mut self.effects
    }

    /// The font that plays notes on `channel`: the one picked at the last
    /// program change, or the newest font.
    fn route(&self, channel: u8) -> Option<usize> {
        self.routes[channel as usize % CHANNELS].or_else(|| self.fonts.len().checked_sub(1))
    }

    fn broadcast(&mut self, channel: u8, command: i32, data1: i32, data2: i32) {
        for font in &mut self.fonts {
            font.synth
                .process_midi_message(channel as i32, command, data1, data2);
        }
    }

    pub fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        if let Some(index) = self.route(channel) {
            self.fonts[index].synth.process_midi_message(
                channel as i32,
                NOTE_ON,
                key as i32,
                velocity as i32,
            );
        }
    }

    /// Note off goes everywhere, since the route may have changed while the
    /// note was sounding.
    pub fn note_off(&mut self, channel: u8, key: u8) {
        self.broadcast(channel, NOTE_OFF, key as i32, 0);
    }

    pub fn all_notes_off(&mut self, immediate: bool) {
        for font in &mut self.fonts {
            font.synth.note_off_all(immediate);
        }
    }

    /// Plain control change. Bank select is tracked here and written to the
    /// synthesizers at the next program change.
    pub fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let settings = &mut self.channels[channel as usize % CHANNELS];
        match controller {
            BANK_SELECT_MSB => settings.state.bank_msb = value,
            BANK_SELECT_LSB => settings.state.bank_lsb = value,
            _ => self.broadcast(channel, CONTROL_CHANGE, controller as i32, value as i32),
        }
    }

    /// Switches `channel` to `program` in its target bank, routing the
    /// channel to the newest font that has the preset.
    pub fn program_change(&mut self, channel: u8, program: u8) {
        let ch = channel as usize % CHANNELS;
        let state = self.channels[ch].state;
        let bank = state.target_bank();
        self.channels[ch].program = program;

        match self.index.find(program, bank) {
            Some(index) => self.routes[ch] = Some(index),
            None => tracing::debug!(channel, program, bank, "no font has this preset"),
        }

        // rustysynth picks the SoundFont bank from CC 0; drum channels add 128 themselves.
        let bank_byte = if state.is_drum { 0 } else { bank as i32 };
        self.broadcast(channel, CONTROL_CHANGE, BANK_SELECT_MSB as i32, bank_byte);
        self.broadcast(channel, PROGRAM_CHANGE, program as i32, 0);
    }

    pub fn channel_event(&mut self, channel: u8, event: ChannelEvent, value: u8) {
        match event {
            ChannelEvent::ChannelPressure => {
                self.broadcast(channel, CHANNEL_PRESSURE, value as i32, 0)
            }
            ChannelEvent::PitchBend => self.pitch_bend(channel, (value as u16) << 7),
        }
    }

    /// 14-bit pitch bend, 8192 is centre.
    pub fn pitch_bend(&mut self, channel: u8, value: u16) {
        let value = value.min(16383) as i32;
        self.broadcast(channel, PITCH_BEND, value & 0x7f, value >> 7);
    }

    pub fn channel_pressure(&mut self, channel: u8, value: u8) {
        self.broadcast(channel, CHANNEL_PRESSURE, value as i32, 0);
    }

    pub fn set_fine_tuning(&mut self, channel: u8, cents: f64) {
        self.channels[channel as usize % CHANNELS].fine_cents = cents;
        self.retune(channel..=channel);
    }

    pub fn set_coarse_tuning(&mut self, channel: u8, cents: f64) {
        self.channels[channel as usize % CHANNELS].coarse_cents = cents;
        self.retune(channel..=channel);
    }

    pub fn set_master_fine_tuning(&mut self, cents: f64) {
        self.master_fine_cents = cents;
        self.retune(0..=CHANNEL_COUNT - 1);
    }

    pub fn set_master_coarse_tuning(&mut self, cents: f64) {
        self.master_coarse_cents = cents;
        self.retune(0..=CHANNEL_COUNT - 1);
    }

    pub fn set_pitch_bend_range(&mut self, channel: u8, cents: f64) {
        self.channels[channel as usize % CHANNELS].bend_range_cents = cents;
        self.retune(channel..=channel);
    }

    pub fn set_master_volume(&mut self, value: u8) {
        self.master_volume = value.min(DATA_BYTE_MAX);
        let gain = self.master_volume as f32 / DATA_BYTE_MAX as f32;
        for font in &mut self.fonts {
            font.synth.set_master_volume(gain);
        }
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    fn retune(&mut self, channels: std::ops::RangeInclusive<u8>) {
        let master = (self.master_fine_cents, self.master_coarse_cents);
        for ch in channels {
            let settings = self.channels[ch as usize % CHANNELS];
            for font in &mut self.fonts {
                send_tuning(&mut font.synth, ch as i32, &settings, master);
            }
        }
    }

    /// Resets every synthesizer and the tracked channel state.
    pub fn reset(&mut self) {
        for font in &mut self.fonts {
            font.synth.reset();
        }
        self.channels = std::array::from_fn(|ch| ChannelSettings::initial(ch as u8));
        self.routes = [None; CHANNELS];
    }

    /// Renders one block, summing every font into `left` and `right`.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        left.fill(0.0);
        right.fill(0.0);
        self.left_scratch.resize(left.len(), 0.0);
        self.right_scratch.resize(right.len(), 0.0);
        for font in &mut self.fonts {
            font.synth
                .render(&mut self.left_scratch, &mut self.right_scratch);
            for (out, s) in left.iter_mut().zip(&self.left_scratch) {
                *out += s;
            }
            for (out, s) in right.iter_mut().zip(&self.right_scratch) {
                *out += s;
            }
        }
    }
}

/// Writes a channel's combined tuning and bend range as RPN 0/1/2, then
/// deselects the RPN.
fn send_tuning(
    synth: &mut rustysynth::Synthesizer,
    channel: i32,
    settings: &ChannelSettings,
    (master_fine, master_coarse): (f64, f64),
) {
    let (fine_msb, fine_lsb) = fine_tuning_rpn((settings.fine_cents + master_fine).clamp(-100.0, 100.0));
    let coarse = coarse_tuning_rpn(settings.coarse_cents + master_coarse);
    let (bend_semis, bend_cents) = pitch_bend_range_rpn(settings.bend_range_cents);

    let mut cc = |controller: i32, value: u8| {
        synth.process_midi_message(channel, CONTROL_CHANGE, controller, value as i32);
    };
    cc(RPN_MSB, 0);
    cc(RPN_LSB, 0);
    cc(DATA_ENTRY_MSB, bend_semis);
    cc(DATA_ENTRY_LSB, bend_cents);
    cc(RPN_LSB, 1);
    cc(DATA_ENTRY_MSB, fine_msb);
    cc(DATA_ENTRY_LSB, fine_lsb);
    cc(RPN_LSB, 2);
    cc(DATA_ENTRY_MSB, coarse);
    cc(RPN_MSB, 127);
    cc(RPN_LSB, 127);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fine_tuning_rpn() {
        assert_eq!(fine_tuning_rpn(0.0), (64, 0));
        assert_eq!(fine_tuning_rpn(-100.0), (0, 0));
        // +100 cents saturates at the 14-bit maximum.
        assert_eq!(fine_tuning_rpn(100.0), (127, 127));
        assert_eq!(fine_tuning_rpn(50.0), (96, 0));
    }

    #[test]
    fn test_coarse_tuning_rpn() {
        assert_eq!(coarse_tuning_rpn(0.0), 64);
        assert_eq!(coarse_tuning_rpn(-6400.0), 0);
        assert_eq!(coarse_tuning_rpn(6300.0), 127);
        assert_eq!(coarse_tuning_rpn(1200.0), 76);
    }

    #[test]
    fn test_pitch_bend_range_rpn() {
        assert_eq!(pitch_bend_range_rpn(200.0), (2, 0));
        assert_eq!(pitch_bend_range_rpn(250.0), (2, 50));
        assert_eq!(pitch_bend_range_rpn(12800.0), (127, 99));
        assert_eq!(pitch_bend_range_rpn(-5.0), (0, 0));
    }

    #[test]
    fn test_preset_index_prefers_newest_font() {
        let mut index = PresetIndex::default();
        index.push(HashSet::from([(0, 0), (1, 0)]));
        index.push(HashSet::from([(1, 0), (0, 128)]));

        assert_eq!(index.find(0, 0), Some(0));
        assert_eq!(index.find(1, 0), Some(1));
        assert_eq!(index.find(0, 128), Some(1));
        assert_eq!(index.find(2, 0), None);
        assert!(index.contains(0, 128));
        assert!(!index.contains(5, 3));
    }

    #[test]
    fn test_bank_select_is_tracked() {
        let mut bank = SynthBank::new();
        bank.control_change(2, BANK_SELECT_LSB, 8);
        bank.control_change(2, BANK_SELECT_MSB, 1);
        let state = bank.channel_state(2);
        assert_eq!((state.bank_msb, state.bank_lsb), (1, 8));
        assert_eq!(state.target_bank(), 8);
        assert!(bank.channel_state(9).is_drum);

        bank.reset();
        assert_eq!(bank.channel_state(2).bank_lsb, 0);
    }

    #[test]
    fn test_effect_state_records_messages() {
        let mut effects = EffectState::default();
        effects.record(&RealtimeMessage::ScaleOctaveTuning {
            channels: ChannelMask::from_bits(0b101),
            offsets: [70; PITCH_CLASSES],
        });
        effects.record(&RealtimeMessage::KeyBased {
            channel: 1,
            key: 60,
            parameter: 7,
            value: 100,
        });

        assert_eq!(effects.tuned_channels(), ChannelMask::from_bits(0b101));
        assert_eq!(effects.key_based.get(&(1, 60, 7)), Some(&100));
    }

    #[test]
    fn test_render_without_fonts_is_silent() {
        let mut bank = SynthBank::new();
        let mut left = vec![1.0; 16];
        let mut right = vec![1.0; 16];
        bank.note_on(0, 60, 100);
        bank.render(&mut left, &mut right);
        assert!(left.iter().chain(&right).all(|&s| s == 0.0));
    }
}
