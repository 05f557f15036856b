//! Transport bar rendering.
//!
//! Displays the loaded song, playback state, position and the status line.

use super::Theme;
use crate::app::App;
use crate::midi::player::PlaybackState;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Renders the transport bar at the top of the screen.
pub fn render_transport(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let block = Block::default()
        .title(" tunemix ")
        .borders(Borders::ALL)
        .border_style(theme.border(false));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(13), // Playback state
            Constraint::Length(20), // Position
            Constraint::Min(20),    // Song and SoundFonts
        ])
        .split(rows[0]);

    let play_status = match app.player.state() {
        PlaybackState::Playing => Span::styled(
            " [>] PLAY ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        PlaybackState::Paused => Span::styled(
            " [||] PAUSE ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        PlaybackState::Stopped => Span::styled(
            " [.] STOP ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    };
    frame.render_widget(Paragraph::new(Line::from(play_status)), chunks[0]);

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Pos: ", Style::default().fg(theme.dim)),
            Span::styled(
                app.position_string(),
                Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
            ),
        ])),
        chunks[1],
    );

    let song = app.player.song_name().unwrap_or("no song");
    let fonts = app.engine.font_names();
    let fonts = if fonts.is_empty() {
        "no SoundFont".to_string()
    } else {
        fonts.join(", ")
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(song.to_string(), Style::default().fg(theme.accent)),
            Span::styled("  |  ", Style::default().fg(theme.dim)),
            Span::styled(fonts, Style::default().fg(theme.text)),
        ])),
        chunks[2],
    );

    // Status message, loading indicator or key hint
    let status_line = if let Some((msg, _)) = &app.status_message {
        Line::from(Span::styled(
            msg.as_str(),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::ITALIC),
        ))
    } else if app.pending_tasks > 0 {
        Line::from(Span::styled(
            format!("Loading ({})...", app.pending_tasks),
            Style::default().fg(theme.dim),
        ))
    } else if !app.has_audio() {
        Line::from(Span::styled(
            "No audio device; changes are applied silently",
            Style::default().fg(Color::Red),
        ))
    } else {
        Line::from(vec![
            Span::styled("[o]", Style::default().fg(theme.accent)),
            Span::styled(" Open  ", Style::default().fg(theme.dim)),
            Span::styled("[?]", Style::default().fg(theme.accent)),
            Span::styled(" Help", Style::default().fg(theme.dim)),
        ])
    };
    frame.render_widget(Paragraph::new(status_line), rows[1]);
}
