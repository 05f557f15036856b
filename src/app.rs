//! Application state management.
//!
//! [`App`] owns the synthesizer, the MIDI player, the mixer table and the
//! effects form, and turns UI actions into calls on them. Slow work (SoundFont
//! loads and program changes that may need a bank loaded first) runs on the
//! tokio runtime and reports back through [`App::drain_tasks`].

use crate::audio::{AudioEngine, AudioOutput};
use crate::config::{Config, Settings};
use crate::error::Error;
use crate::files::{display_name, BrowserAction, FileBrowser, FileKind};
use crate::midi::player::MidiPlayer;
use crate::midi::ChannelTarget;
use crate::mixer::{
    BankLoader, EffectField, EffectsForm, MixerResolver, MixerTable, Operation, Resolution,
};
use crate::synth::{SoundFontSource, Synthesizer};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// How long a status message stays visible.
const STATUS_TIMEOUT: Duration = Duration::from_secs(4);

/// Step for the value column; PageUp/PageDown use ten of these.
pub const VALUE_STEP: f64 = 0.01;

/// Seconds skipped by the seek keys.
pub const SEEK_STEP: f64 = 5.0;

/// Which panel receives editing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusedPanel {
    #[default]
    Mixer,
    Effects,
}

impl FocusedPanel {
    pub fn next(self) -> Self {
        match self {
            FocusedPanel::Mixer => FocusedPanel::Effects,
            FocusedPanel::Effects => FocusedPanel::Mixer,
        }
    }
}

/// Column of the mixer table under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerColumn {
    Channel,
    Operation,
    #[default]
    Value,
}

impl MixerColumn {
    pub fn left(self) -> Self {
        match self {
            MixerColumn::Channel | MixerColumn::Operation => MixerColumn::Channel,
            MixerColumn::Value => MixerColumn::Operation,
        }
    }

    pub fn right(self) -> Self {
        match self {
            MixerColumn::Channel => MixerColumn::Operation,
            MixerColumn::Operation | MixerColumn::Value => MixerColumn::Value,
        }
    }
}

/// Result of a background task, delivered to the frame loop.
#[derive(Debug)]
pub enum TaskOutcome {
    SoundFontLoaded { name: String },
    ProgramChanged { target: ChannelTarget, program: u8 },
    /// Bank loads for a song finished; `failed` lists the unavailable
    /// (program, bank) pairs.
    SongBanksLoaded {
        song: String,
        requested: usize,
        failed: Vec<((u8, u16), Error)>,
    },
    Failed { action: String, error: Error },
}

/// Main application state.
pub struct App {
    pub config: Config,
    pub settings: Settings,
    pub engine: Arc<AudioEngine>,
    /// `None` when no audio device could be opened.
    output: Option<AudioOutput>,
    pub player: MidiPlayer,
    pub mixer: MixerTable,
    resolver: MixerResolver<AudioEngine>,
    pub effects: EffectsForm,
    pub file_browser: FileBrowser,
    pub focused_panel: FocusedPanel,
    pub selected_row: usize,
    pub column: MixerColumn,
    /// Index into [`EffectsForm::slots`].
    pub effect_slot: usize,
    pub status_message: Option<(String, Instant)>,
    pub show_help: bool,
    pub help_scroll: u16,
    runtime: Handle,
    task_tx: mpsc::UnboundedSender<TaskOutcome>,
    task_rx: mpsc::UnboundedReceiver<TaskOutcome>,
    /// Background tasks that have not reported back yet.
    pub pending_tasks: usize,
}

impl App {
    /// Creates the application. No audio device is opened; see
    /// [`App::start_audio`].
    pub fn new(config: Config, runtime: Handle) -> Self {
        let settings = Settings::load_or_default(&config.settings_path);
        let engine = Arc::new(AudioEngine::new());
        let loader = Arc::new(BankLoader::new(
            Arc::clone(&engine),
            config.bank_dir.clone(),
            config.bank_extension.clone(),
        ));
        let resolver = MixerResolver::new(Arc::clone(&engine), loader);
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        Self {
            config,
            settings,
            engine,
            output: None,
            player: MidiPlayer::new(),
            mixer: MixerTable::default(),
            resolver,
            effects: EffectsForm::default(),
            file_browser: FileBrowser::default(),
            focused_panel: FocusedPanel::default(),
            selected_row: 0,
            column: MixerColumn::default(),
            effect_slot: 0,
            status_message: None,
            show_help: false,
            help_scroll: 0,
            runtime,
            task_tx,
            task_rx,
            pending_tasks: 0,
        }
    }

    /// Opens the default audio device. The app keeps running silently if
    /// this fails.
    pub fn start_audio(&mut self) -> anyhow::Result<()> {
        let output = AudioOutput::start(&self.engine).context("Audio output unavailable")?;
        self.output = Some(output);
        Ok(())
    }

    pub fn has_audio(&self) -> bool {
        self.output.is_some()
    }

    /// Sets a status message to display.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Clears expired status messages.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    /// Logs a failed action and shows it in the status line.
    fn report_error(&mut self, action: &str, error: impl std::fmt::Display) {
        tracing::error!("{} failed: {}", action, error);
        self.set_status(format!("{} failed: {}", action, error));
    }

    /// Per-frame housekeeping: advances playback, collects finished tasks and
    /// expires the status line.
    pub fn tick(&mut self) {
        self.player.update(self.engine.as_ref());
        self.drain_tasks();
        self.clear_expired_status();
    }

    // ---- Files ----

    /// Opens a MIDI file or SoundFont, chosen by extension.
    pub fn load_file(&mut self, path: PathBuf) {
        match FileKind::from_path(&path) {
            Ok(FileKind::Midi) => {
                if let Err(e) = self.load_midi_file(&path) {
                    self.report_error("Load MIDI", format!("{:#}", e));
                }
            }
            Ok(FileKind::SoundFont) => self.spawn_soundfont_load(path),
            Err(e) => self.report_error("Open", e),
        }
    }

    /// Stops playback, then reads and loads the song and starts loading the
    /// banks it selects.
    fn load_midi_file(&mut self, path: &std::path::Path) -> anyhow::Result<()> {
        self.player.handle_stop(self.engine.as_ref());
        let data =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = display_name(path);
        self.player
            .load_midi(self.engine.as_ref(), &name, &data)
            .with_context(|| format!("Failed to parse {}", name))?;

        let duration = self.player.duration_seconds();
        tracing::info!("Loaded MIDI file {} ({:.1}s)", path.display(), duration);
        self.set_status(format!("Loaded {} ({})", name, format_time(duration)));
        self.spawn_song_bank_loads(name);
        Ok(())
    }

    fn spawn_song_bank_loads(&mut self, song: String) {
        let pairs = self
            .player
            .song()
            .map(|s| s.bank_requests())
            .unwrap_or_default();
        if pairs.is_empty() {
            return;
        }

        let loader = Arc::clone(self.resolver.loader());
        let tx = self.task_tx.clone();
        self.pending_tasks += 1;
        self.runtime.spawn(async move {
            let failed = loader.ensure_all(&pairs).await;
            let _ = tx.send(TaskOutcome::SongBanksLoaded {
                song,
                requested: pairs.len(),
                failed,
            });
        });
    }

    /// Replays the song's program and controller state up to the current
    /// position so channels route to banks that arrived after playback began.
    fn resync_song(&mut self, song: &str) {
        if self.player.song_name() != Some(song) || self.player.position_seconds() <= 0.0 {
            return;
        }
        let position = self.player.position_seconds();
        self.player.seek(self.engine.as_ref(), position);
    }

    fn spawn_soundfont_load(&mut self, path: PathBuf) {
        let name = display_name(&path);
        let engine = Arc::clone(&self.engine);
        let tx = self.task_tx.clone();

        self.pending_tasks += 1;
        self.set_status(format!("Loading {}...", name));
        self.runtime.spawn(async move {
            let outcome = match engine.load_soundfont(SoundFontSource::Path(path)).await {
                Ok(()) => TaskOutcome::SoundFontLoaded { name },
                Err(error) => TaskOutcome::Failed {
                    action: format!("Load {}", name),
                    error,
                },
            };
            let _ = tx.send(outcome);
        });
    }

    /// Applies results from finished background tasks.
    pub fn drain_tasks(&mut self) {
        while let Ok(outcome) = self.task_rx.try_recv() {
            self.pending_tasks = self.pending_tasks.saturating_sub(1);
            match outcome {
                TaskOutcome::SoundFontLoaded { name } => {
                    self.set_status(format!("Loaded SoundFont {}", name));
                }
                TaskOutcome::ProgramChanged { target, program } => {
                    self.set_status(format!("Program {} on {}", program, target));
                }
                TaskOutcome::SongBanksLoaded {
                    song,
                    requested,
                    failed,
                } => {
                    match failed.first() {
                        None => self.set_status(format!("Banks ready for {}", song)),
                        Some(((program, bank), error)) => {
                            let message = format!(
                                "{} of {} unavailable, first program {} bank {}: {}",
                                failed.len(),
                                requested,
                                program,
                                bank,
                                error
                            );
                            self.report_error(&format!("Load banks for {}", song), message);
                        }
                    }
                    self.resync_song(&song);
                }
                TaskOutcome::Failed { action, error } => self.report_error(&action, error),
            }
        }
    }

    // ---- File browser ----

    pub fn open_file_browser(&mut self) {
        let dir = self.file_browser.current_dir.clone();
        self.file_browser.open_at(dir);
    }

    pub fn file_browser_select(&mut self) {
        if let BrowserAction::Chosen(path) = self.file_browser.select() {
            self.load_file(path);
        }
    }

    // ---- Transport ----

    pub fn toggle_playback(&mut self) {
        if !self.player.is_loaded() {
            self.set_status("No MIDI file loaded");
            return;
        }
        self.player.toggle(self.engine.as_ref());
    }

    pub fn stop(&mut self) {
        self.player.handle_stop(self.engine.as_ref());
    }

    pub fn seek_by(&mut self, delta: f64) {
        let target = (self.player.position_seconds() + delta).max(0.0);
        self.player.seek(self.engine.as_ref(), target);
    }

    // ---- Mixer ----

    /// Sends the selected row's current value.
    pub fn apply_selected_row(&mut self) {
        let Some(row) = self.mixer.get(self.selected_row).copied() else {
            return;
        };
        self.apply_row(row.channel, row.operation, row.value);
    }

    fn apply_row(&mut self, target: ChannelTarget, operation: Operation, value: f64) {
        let time = self.engine.current_time();
        match self.resolver.dispatch(target, operation, value, time) {
            Ok(Resolution::Applied(_)) => {}
            Ok(Resolution::ProgramChange { target, program }) => {
                self.spawn_program_change(target, program, time)
            }
            Err(e) => self.report_error(&operation.label(), e),
        }
    }

    fn spawn_program_change(&mut self, target: ChannelTarget, program: u8, time: f64) {
        let loader = Arc::clone(self.resolver.loader());
        let tx = self.task_tx.clone();

        self.pending_tasks += 1;
        self.runtime.spawn(async move {
            let outcome = match loader.program_change_on(target, program, time).await {
                Ok(()) => TaskOutcome::ProgramChanged { target, program },
                Err(error) => TaskOutcome::Failed {
                    action: format!("Program {}", program),
                    error,
                },
            };
            let _ = tx.send(outcome);
        });
    }

    pub fn select_row_up(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
    }

    pub fn select_row_down(&mut self) {
        if self.selected_row + 1 < self.mixer.len() {
            self.selected_row += 1;
        }
    }

    /// Changes the cell under the cursor by `steps`. Only value edits are
    /// sent; the selectors just pick what the next send addresses.
    pub fn adjust_selected(&mut self, steps: i32) {
        let index = self.selected_row;
        match self.column {
            MixerColumn::Channel => {
                if let Some(row) = self.mixer.get_mut(index) {
                    row.channel = row.channel.cycle(steps.clamp(-16, 16) as i8);
                }
            }
            MixerColumn::Operation => self.mixer.cycle_operation(index, steps as isize),
            MixerColumn::Value => {
                if let Some(row) = self.mixer.get_mut(index) {
                    row.nudge(steps as f64 * VALUE_STEP);
                }
                self.apply_selected_row();
            }
        }
    }

    /// Sets the selected row's value directly (mouse drag, paste).
    pub fn set_selected_value(&mut self, value: f64) {
        if let Some(row) = self.mixer.get_mut(self.selected_row) {
            row.value = value.clamp(0.0, 1.0);
        }
        self.apply_selected_row();
    }

    pub fn add_row(&mut self) {
        self.selected_row = self.mixer.add_after(self.selected_row);
    }

    pub fn remove_row(&mut self) {
        if self.mixer.remove(self.selected_row) {
            self.selected_row = self.selected_row.min(self.mixer.len() - 1);
        } else {
            self.set_status("The mixer keeps at least two rows");
        }
    }

    // ---- Effects ----

    pub fn selected_effect(&self) -> Option<(EffectField, usize)> {
        EffectsForm::slots().get(self.effect_slot).copied()
    }

    pub fn select_effect_up(&mut self) {
        self.effect_slot = self.effect_slot.saturating_sub(1);
    }

    pub fn select_effect_down(&mut self) {
        if self.effect_slot + 1 < EffectsForm::slots().len() {
            self.effect_slot += 1;
        }
    }

    /// Moves the selected effects input by `delta` and sends it.
    pub fn adjust_effect(&mut self, delta: i32) {
        let Some((field, index)) = self.selected_effect() else {
            return;
        };
        let time = self.engine.current_time();
        let result = self
            .effects
            .adjust(field, index, delta)
            .and_then(|change| self.effects.apply(self.engine.as_ref(), change, time));
        if let Err(e) = result {
            self.report_error(field.title(), e);
        }
    }

    /// Re-sends the whole effects form.
    pub fn apply_all_effects(&mut self) {
        let time = self.engine.current_time();
        match self.effects.apply_all(self.engine.as_ref(), time) {
            Ok(sent) => self.set_status(format!("Sent effects ({} messages)", sent)),
            Err(e) => self.report_error("Effects", e),
        }
    }

    // ---- Settings ----

    pub fn toggle_dark_mode(&mut self) {
        let dark = self.settings.toggle_dark_mode();
        match self.settings.save(&self.config.settings_path) {
            Ok(()) => self.set_status(if dark { "Dark mode" } else { "Light mode" }),
            Err(e) => self.report_error("Save settings", e),
        }
    }

    /// Transport position as `m:ss / m:ss`.
    pub fn position_string(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.player.position_seconds()),
            format_time(self.player.duration_seconds())
        )
    }
}

/// Formats seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
