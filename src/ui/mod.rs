//! Terminal user interface components.
//!
//! This module provides the visual components for the mixer: the transport
//! bar, the mixer table, the effects panel, and the file browser and help
//! overlays.

mod dialogs;
mod effects;
mod help;
mod mixer;
mod transport;

use crate::app::{App, FocusedPanel};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::Block;
use ratatui::Frame;

pub use dialogs::render_file_browser;
pub use effects::render_effects;
pub use help::{render_help, HELP_LINE_COUNT};
pub use mixer::render_mixer;
pub use transport::render_transport;

/// Colors for the light and dark themes.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub background: Color,
    pub text: Color,
    pub dim: Color,
    pub accent: Color,
    pub highlight: Color,
    pub border: Color,
    pub focused_border: Color,
}

impl Theme {
    pub fn for_mode(dark_mode: bool) -> Self {
        if dark_mode {
            Self {
                background: Color::Black,
                text: Color::White,
                dim: Color::DarkGray,
                accent: Color::Yellow,
                highlight: Color::Green,
                border: Color::Gray,
                focused_border: Color::Cyan,
            }
        } else {
            Self {
                background: Color::Reset,
                text: Color::Reset,
                dim: Color::Gray,
                accent: Color::Blue,
                highlight: Color::Magenta,
                border: Color::DarkGray,
                focused_border: Color::Blue,
            }
        }
    }

    pub fn border(&self, focused: bool) -> Style {
        Style::default().fg(if focused {
            self.focused_border
        } else {
            self.border
        })
    }
}

/// Renders the complete UI layout.
///
/// The layout is divided into:
/// - Top: transport bar with song position and status
/// - Left: mixer table
/// - Right: effects panel
pub fn render(frame: &mut Frame, app: &App) {
    let theme = Theme::for_mode(app.settings.dark_mode);
    let size = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(theme.background)), size);

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Transport
            Constraint::Min(10),   // Mixer + effects
        ])
        .split(size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[1]);

    render_transport(frame, main_chunks[0], app, &theme);
    render_mixer(
        frame,
        content_chunks[0],
        app,
        &theme,
        app.focused_panel == FocusedPanel::Mixer,
    );
    render_effects(
        frame,
        content_chunks[1],
        app,
        &theme,
        app.focused_panel == FocusedPanel::Effects,
    );

    render_file_browser(frame, app, &theme);
    if app.show_help {
        render_help(frame, app.help_scroll, &theme);
    }
}

/// Helper function to center a rectangle within another rectangle.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
