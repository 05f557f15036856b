//! A recording [`Synthesizer`] for tests.

use super::{ChannelEvent, ChannelState, PressureTable, SoundFontSource, Synthesizer};
use crate::error::{Error, Result};
use crate::midi::{CHANNEL_COUNT, DRUM_BANK};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded call. Timestamps are kept so tests can check pass-through.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ControlChange { channel: u8, controller: u8, value: u8, time: f64 },
    ProgramChange { channel: u8, program: u8, time: f64 },
    ChannelEvent { channel: u8, event: ChannelEvent, value: u8 },
    FineTuning { channel: u8, cents: f64 },
    CoarseTuning { channel: u8, cents: f64 },
    MasterFineTuning(f64),
    MasterCoarseTuning(f64),
    PitchBendRange { channel: u8, cents: f64 },
    MasterVolume(u8),
    ReverbType(u8),
    ChorusType(u8),
    ScaleOctaveTuning { data: Vec<u8>, realtime: bool, time: f64 },
    Pressure { data: Vec<u8>, table: PressureTable, time: f64 },
    ControlChangeSysEx { data: Vec<u8>, time: f64 },
    KeyBasedSysEx { data: Vec<u8>, time: f64 },
    Load(String),
}

/// Records every call. Loads succeed after `load_delay` unless the file stem
/// was registered with [`RecordingSynth::fail_loads_of`]; a successful load of
/// `NNN` provides program NNN in every melodic bank, `128` provides every drum kit.
pub struct RecordingSynth {
    calls: Mutex<Vec<Call>>,
    channels: Mutex<[ChannelState; CHANNEL_COUNT as usize]>,
    presets: Mutex<HashSet<(u8, u16)>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<u8>>,
    load_delay: Duration,
    pub now: f64,
}

impl RecordingSynth {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            channels: Mutex::new(std::array::from_fn(|ch| ChannelState::initial(ch as u8))),
            presets: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            load_delay: Duration::from_millis(5),
            now: 1.25,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Load(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn program_changes(&self) -> Vec<(u8, u8)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ProgramChange { channel, program, .. } => Some((channel, program)),
                _ => None,
            })
            .collect()
    }

    pub fn set_channel(&self, channel: u8, state: ChannelState) {
        self.channels.lock().unwrap()[channel as usize] = state;
    }

    pub fn add_preset(&self, program: u8, bank: u16) {
        self.presets.lock().unwrap().insert((program, bank));
    }

    pub fn fail_loads_of(&self, stem: &str) {
        self.failing.lock().unwrap().insert(stem.to_string());
    }

    /// Makes `set_program_change` panic for `channel`.
    pub fn panic_on_program_change(&self, channel: u8) {
        self.panicking.lock().unwrap().insert(channel);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn stem_of(source: &SoundFontSource) -> String {
    match source {
        SoundFontSource::Path(path) => Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string(),
        SoundFontSource::Bytes { name, .. } => name.clone(),
    }
}

impl Synthesizer for RecordingSynth {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn set_control_change(&self, channel: u8, controller: u8, value: u8, time: f64) {
        self.record(Call::ControlChange { channel, controller, value, time });
    }

    fn set_program_change(&self, channel: u8, program: u8, time: f64) {
        let panics = self.panicking.lock().unwrap().contains(&channel);
        if panics {
            panic!("program change on channel {}", channel);
        }
        self.record(Call::ProgramChange { channel, program, time });
    }

    fn set_channel_event(&self, channel: u8, event: ChannelEvent, value: u8, _time: f64) {
        self.record(Call::ChannelEvent { channel, event, value });
    }

    fn set_fine_tuning(&self, channel: u8, cents: f64, _time: f64) {
        self.record(Call::FineTuning { channel, cents });
    }

    fn set_coarse_tuning(&self, channel: u8, cents: f64, _time: f64) {
        self.record(Call::CoarseTuning { channel, cents });
    }

    fn set_master_fine_tuning(&self, cents: f64, _time: f64) {
        self.record(Call::MasterFineTuning(cents));
    }

    fn set_master_coarse_tuning(&self, cents: f64, _time: f64) {
        self.record(Call::MasterCoarseTuning(cents));
    }

    fn set_pitch_bend_range(&self, channel: u8, cents: f64, _time: f64) {
        self.record(Call::PitchBendRange { channel, cents });
    }

    fn set_master_volume(&self, value: u8, _time: f64) {
        self.record(Call::MasterVolume(value));
    }

    fn set_reverb_type(&self, value: u8) {
        self.record(Call::ReverbType(value));
    }

    fn set_chorus_type(&self, value: u8, _time: f64) {
        self.record(Call::ChorusType(value));
    }

    fn handle_scale_octave_tuning_1byte_sysex(&self, data: &[u8], realtime: bool, time: f64) {
        self.record(Call::ScaleOctaveTuning { data: data.to_vec(), realtime, time });
    }

    fn handle_pressure_sysex(&self, data: &[u8], table: PressureTable, time: f64) {
        self.record(Call::Pressure { data: data.to_vec(), table, time });
    }

    fn handle_control_change_sysex(&self, data: &[u8], time: f64) {
        self.record(Call::ControlChangeSysEx { data: data.to_vec(), time });
    }

    fn handle_key_based_instrument_control_sysex(&self, data: &[u8], time: f64) {
        self.record(Call::KeyBasedSysEx { data: data.to_vec(), time });
    }

    fn channel_state(&self, channel: u8) -> ChannelState {
        self.channels.lock().unwrap()[channel as usize]
    }

    fn has_preset(&self, program: u8, bank: u16) -> bool {
        self.presets.lock().unwrap().contains(&(program, bank))
    }

    fn load_soundfont(&self, source: SoundFontSource) -> impl Future<Output = Result<()>> + Send {
        async move {
            let stem = stem_of(&source);
            self.record(Call::Load(source.name()));
            tokio::time::sleep(self.load_delay).await;

            if self.failing.lock().unwrap().contains(&stem) {
                return Err(Error::SoundFontLoad {
                    path: PathBuf::from(source.name()),
                    reason: "simulated failure".to_string(),
                });
            }

            let mut presets = self.presets.lock().unwrap();
            if stem == DRUM_BANK.to_string() {
                for program in 0..=127u8 {
                    presets.insert((program, DRUM_BANK));
                }
            } else if let Ok(program) = stem.parse::<u8>() {
                for bank in 0..DRUM_BANK {
                    presets.insert((program, bank));
                }
            }
            Ok(())
        }
    }
}
