//! tunemix - A terminal mixer for playing MIDI files through SoundFonts.
//!
//! Loads a MIDI file and one or more SoundFonts, plays the song, and lets the
//! user reshape it live: per-channel controllers, tuning, program changes
//! that pull in per-program banks, and MIDI Tuning Standard and Universal
//! Realtime SysEx effects.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- song.mid GeneralUser.sf2
//! cargo run -- --bank-dir ./banks song.mid
//! ```
//!
//! Press `?` for help with keyboard shortcuts.

use tunemix::app::{App, FocusedPanel, MixerColumn};
use tunemix::config::{usage, Command, Config};
use tunemix::files::parse_pasted_path;
use tunemix::ui;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    Event, KeyCode, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::time::Duration;

/// Frame interval; also the playback scheduling granularity.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "tunemix".to_string());
    let config = match Config::from_args(args).context("Invalid arguments")? {
        Command::Run(config) => config,
        Command::Help => {
            println!("{}", usage(&program));
            return Ok(());
        }
    };

    // Initialize logging (optional, for debugging)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Loads and program changes run here; the UI stays on the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("tunemix-loader")
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let startup_files = config.files.clone();
    let mut app = App::new(config, runtime.handle().clone());
    if let Err(e) = app.start_audio() {
        tracing::warn!("{:#}", e);
        app.set_status(format!("{:#}", e));
    }
    for path in startup_files {
        app.load_file(path);
    }

    let mut terminal = setup_terminal().context("Failed to setup terminal")?;

    let result = run_app(&mut terminal, &mut app);

    restore_terminal(&mut terminal).context("Failed to restore terminal")?;

    result
}

/// Sets up the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )
    .context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("Failed to create terminal")?;
    Ok(terminal)
}

/// Restores the terminal to its previous state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )
    .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.tick();

        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events with a short timeout to keep playback moving
        if !event::poll(FRAME_INTERVAL)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if handle_key(app, key.code, key.modifiers) {
                    break;
                }
            }
            Event::Mouse(mouse) => handle_mouse(app, mouse),
            Event::Paste(text) => match parse_pasted_path(&text) {
                Some(path) => app.load_file(path),
                None => app.set_status("Paste a single file path to open it"),
            },
            _ => {}
        }
    }

    // Silence the synth before the audio stream is dropped
    app.stop();
    Ok(())
}

/// Handles a key press. Returns `true` when the app should quit.
fn handle_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> bool {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return true;
    }

    if app.show_help {
        match code {
            KeyCode::Char('?') | KeyCode::Esc => {
                app.show_help = false;
                app.help_scroll = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.help_scroll = app.help_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.help_scroll = (app.help_scroll + 1).min(ui::HELP_LINE_COUNT);
            }
            KeyCode::Home => app.help_scroll = 0,
            _ => {}
        }
        return false;
    }

    if app.file_browser.open {
        match code {
            KeyCode::Enter => app.file_browser_select(),
            KeyCode::Esc => app.file_browser.close(),
            KeyCode::Up | KeyCode::Char('k') => app.file_browser.up(),
            KeyCode::Down | KeyCode::Char('j') => app.file_browser.down(),
            _ => {}
        }
        return false;
    }

    match code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Tab | KeyCode::BackTab => app.focused_panel = app.focused_panel.next(),
        KeyCode::Char('o') => app.open_file_browser(),
        KeyCode::Char('t') => app.toggle_dark_mode(),
        KeyCode::Char(' ') => app.toggle_playback(),
        KeyCode::Char('s') | KeyCode::Char('.') => app.stop(),
        KeyCode::Char('[') => app.seek_by(-tunemix::app::SEEK_STEP),
        KeyCode::Char(']') => app.seek_by(tunemix::app::SEEK_STEP),
        _ => match app.focused_panel {
            FocusedPanel::Mixer => handle_mixer_key(app, code),
            FocusedPanel::Effects => handle_effects_key(app, code),
        },
    }
    false
}

fn handle_mixer_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.select_row_up(),
        KeyCode::Down | KeyCode::Char('j') => app.select_row_down(),
        KeyCode::Left | KeyCode::Char('h') => app.column = app.column.left(),
        KeyCode::Right | KeyCode::Char('l') => app.column = app.column.right(),
        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_selected(1),
        KeyCode::Char('-') => app.adjust_selected(-1),
        KeyCode::PageUp if app.column == MixerColumn::Value => app.adjust_selected(10),
        KeyCode::PageDown if app.column == MixerColumn::Value => app.adjust_selected(-10),
        KeyCode::Enter => app.apply_selected_row(),
        KeyCode::Char('a') => app.add_row(),
        KeyCode::Char('d') | KeyCode::Delete => app.remove_row(),
        _ => {}
    }
}

fn handle_effects_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.select_effect_up(),
        KeyCode::Down | KeyCode::Char('j') => app.select_effect_down(),
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('+') | KeyCode::Char('=') => {
            app.adjust_effect(1)
        }
        KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('-') => app.adjust_effect(-1),
        KeyCode::PageUp => app.adjust_effect(10),
        KeyCode::PageDown => app.adjust_effect(-10),
        KeyCode::Enter => app.apply_all_effects(),
        _ => {}
    }
}

/// Handles mouse events: the wheel changes the selected cell or input.
fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.show_help {
        match mouse.kind {
            MouseEventKind::ScrollUp => app.help_scroll = app.help_scroll.saturating_sub(3),
            MouseEventKind::ScrollDown => {
                app.help_scroll = (app.help_scroll + 3).min(ui::HELP_LINE_COUNT)
            }
            MouseEventKind::Down(_) => {
                app.show_help = false;
                app.help_scroll = 0;
            }
            _ => {}
        }
        return;
    }

    let delta = match mouse.kind {
        MouseEventKind::ScrollUp => 1,
        MouseEventKind::ScrollDown => -1,
        _ => return,
    };
    if app.file_browser.open {
        if delta > 0 {
            app.file_browser.up();
        } else {
            app.file_browser.down();
        }
        return;
    }
    match app.focused_panel {
        FocusedPanel::Mixer => app.adjust_selected(delta),
        FocusedPanel::Effects => app.adjust_effect(delta),
    }
}
