//! Audio engine for real-time MIDI synthesis.
//!
//! [`AudioEngine`] is the [`Synthesizer`] the mixer talks to. It owns the
//! [`SynthBank`] behind a mutex shared with the audio callback, so it can be
//! handed to loader tasks on other threads. [`AudioOutput`] holds the rodio
//! stream that renders the bank; it stays on the thread that created it.
//!
//! rustysynth renders immediately, so scheduling timestamps are accepted for
//! interface compatibility and otherwise ignored.

use super::bank::{EffectState, PreparedFont, SynthBank, SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::midi::sysex::RealtimeMessage;
use crate::synth::{ChannelEvent, ChannelState, PressureTable, SoundFontSource, Synthesizer};
use anyhow::Context;
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Audio buffer size for low-latency playback.
/// Smaller = lower latency but higher CPU usage.
const BUFFER_SIZE: usize = 256;

/// Audio source that generates samples from the synth bank.
/// Implements rodio's Source trait for playback.
struct SynthSource {
    bank: Arc<Mutex<SynthBank>>,
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    buf_pos: usize,
    /// Current channel (0 = left, 1 = right).
    channel: usize,
}

impl SynthSource {
    fn new(bank: Arc<Mutex<SynthBank>>) -> Self {
        Self {
            bank,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
        }
    }
}

impl Iterator for SynthSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= BUFFER_SIZE {
            if let Ok(mut bank) = self.bank.lock() {
                bank.render(&mut self.left_buf, &mut self.right_buf);
            } else {
                self.left_buf.fill(0.0);
                self.right_buf.fill(0.0);
            }
            self.buf_pos = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for SynthSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// The running audio device. Dropping it stops output.
pub struct AudioOutput {
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
}

impl AudioOutput {
    /// Opens the default output device and starts rendering `engine`.
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available or playback cannot start.
    pub fn start(engine: &AudioEngine) -> anyhow::Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().context("Failed to open audio output")?;

        let source = SynthSource::new(Arc::clone(&engine.bank));
        stream_handle
            .play_raw(source)
            .context("Failed to start audio playback")?;

        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
        })
    }
}

/// The synthesizer: a [`SynthBank`] plus the engine clock.
#[derive(Clone)]
pub struct AudioEngine {
    bank: Arc<Mutex<SynthBank>>,
    started: Instant,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    /// Creates an engine with no SoundFonts loaded. It renders silence until
    /// one is added with [`Synthesizer::load_soundfont`].
    pub fn new() -> Self {
        Self {
            bank: Arc::new(Mutex::new(SynthBank::new())),
            started: Instant::now(),
        }
    }

    fn bank(&self) -> MutexGuard<'_, SynthBank> {
        self.bank.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Plays a single note immediately.
    pub fn note_on(&self, channel: u8, key: u8, velocity: u8) {
        self.bank().note_on(channel, key, velocity);
    }

    pub fn note_off(&self, channel: u8, key: u8) {
        self.bank().note_off(channel, key);
    }

    /// Stops all playing notes.
    ///
    /// # Arguments
    ///
    /// * `immediate` - If true, notes stop immediately without release
    pub fn all_notes_off(&self, immediate: bool) {
        self.bank().all_notes_off(immediate);
    }

    /// 14-bit pitch bend from a MIDI file, 8192 is centre.
    pub fn pitch_bend(&self, channel: u8, value: u16) {
        self.bank().pitch_bend(channel, value);
    }

    pub fn channel_pressure(&self, channel: u8, value: u8) {
        self.bank().channel_pressure(channel, value);
    }

    /// Resets all controllers and stops all notes.
    pub fn reset(&self) {
        self.bank().reset();
    }

    /// Handles a SysEx event from a MIDI file. Universal Realtime messages
    /// this crate understands are recorded; anything else is skipped.
    pub fn handle_sysex(&self, data: &[u8]) {
        match RealtimeMessage::parse(data) {
            Ok(message) => self.bank().effects_mut().record(&message),
            Err(e) => tracing::trace!("Skipping SysEx: {}", e),
        }
    }

    /// Names of the loaded SoundFonts, oldest first.
    pub fn font_names(&self) -> Vec<String> {
        self.bank()
            .font_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn program(&self, channel: u8) -> u8 {
        self.bank().program(channel)
    }

    pub fn master_volume(&self) -> u8 {
        self.bank().master_volume()
    }

    /// Snapshot of the effect state for display.
    pub fn effects(&self) -> EffectState {
        self.bank().effects().clone()
    }

    /// Decodes a message arriving at one of the SysEx entry points and
    /// records it. Malformed messages are logged and dropped.
    fn record_sysex(&self, data: &[u8], entry: &str) {
        match RealtimeMessage::parse(data) {
            Ok(message) => {
                tracing::trace!(entry, ?message, "sysex");
                self.bank().effects_mut().record(&message);
            }
            Err(e) => tracing::warn!("Dropping {} message: {}", entry, e),
        }
    }
}

impl Synthesizer for AudioEngine {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn set_control_change(&self, channel: u8, controller: u8, value: u8, _time: f64) {
        self.bank().control_change(channel, controller, value);
    }

    fn set_program_change(&self, channel: u8, program: u8, _time: f64) {
        self.bank().program_change(channel, program);
    }

    fn set_channel_event(&self, channel: u8, event: ChannelEvent, value: u8, _time: f64) {
        self.bank().channel_event(channel, event, value);
    }

    fn set_fine_tuning(&self, channel: u8, cents: f64, _time: f64) {
        self.bank().set_fine_tuning(channel, cents);
    }

    fn set_coarse_tuning(&self, channel: u8, cents: f64, _time: f64) {
        self.bank().set_coarse_tuning(channel, cents);
    }

    fn set_master_fine_tuning(&self, cents: f64, _time: f64) {
        self.bank().set_master_fine_tuning(cents);
    }

    fn set_master_coarse_tuning(&self, cents: f64, _time: f64) {
        self.bank().set_master_coarse_tuning(cents);
    }

    fn set_pitch_bend_range(&self, channel: u8, cents: f64, _time: f64) {
        self.bank().set_pitch_bend_range(channel, cents);
    }

    fn set_master_volume(&self, value: u8, _time: f64) {
        self.bank().set_master_volume(value);
    }

    fn set_reverb_type(&self, value: u8) {
        self.bank().effects_mut().reverb_type = Some(value);
    }

    fn set_chorus_type(&self, value: u8, _time: f64) {
        self.bank().effects_mut().chorus_type = Some(value);
    }

    fn handle_scale_octave_tuning_1byte_sysex(&self, data: &[u8], _realtime: bool, _time: f64) {
        self.record_sysex(data, "scale/octave tuning");
    }

    fn handle_pressure_sysex(&self, data: &[u8], table: PressureTable, _time: f64) {
        self.record_sysex(data, table.name());
    }

    fn handle_control_change_sysex(&self, data: &[u8], _time: f64) {
        self.record_sysex(data, "control change");
    }

    fn handle_key_based_instrument_control_sysex(&self, data: &[u8], _time: f64) {
        self.record_sysex(data, "key-based instrument control");
    }

    fn channel_state(&self, channel: u8) -> ChannelState {
        self.bank().channel_state(channel)
    }

    fn has_preset(&self, program: u8, bank: u16) -> bool {
        self.bank().has_preset(program, bank)
    }

    fn load_soundfont(&self, source: SoundFontSource) -> impl Future<Output = Result<()>> + Send {
        let bank = Arc::clone(&self.bank);
        async move {
            let name = source.name();
            let data = match source {
                SoundFontSource::Path(path) => {
                    tokio::fs::read(&path)
                        .await
                        .map_err(|e| Error::SoundFontLoad {
                            path: path.clone(),
                            reason: e.to_string(),
                        })?
                }
                SoundFontSource::Bytes { data, .. } => data,
            };

            let parse_name = name.clone();
            let font = tokio::task::spawn_blocking(move || PreparedFont::parse(parse_name, &data))
                .await
                .map_err(|e| Error::TaskFailed(e.to_string()))??;
            let presets = font.preset_count();

            let index = bank
                .lock()
                .map_err(|_| Error::SoundFontLoad {
                    path: PathBuf::from(&name),
                    reason: "synthesizer lock poisoned".to_string(),
                })?
                .add_font(font);
            tracing::info!("Loaded SoundFont {} ({} presets) as font {}", name, presets, index);
            Ok(())
        }
    }
}
