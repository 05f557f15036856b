//! File browser overlay for opening MIDI files and SoundFonts.

use super::{centered_rect, Theme};
use crate::app::App;
use crate::files::{display_name, FileKind, BROWSER_PAGE};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph};
use ratatui::Frame;
use std::path::Path;

/// Truncates a path string to fit within max_width, adding "..." prefix if needed.
#[inline]
fn truncate_path(path_str: &str, max_width: usize) -> String {
    let chars: Vec<char> = path_str.chars().collect();
    if chars.len() > max_width && max_width > 3 {
        let tail: String = chars[chars.len() - (max_width - 3)..].iter().collect();
        format!("...{}", tail)
    } else {
        path_str.to_string()
    }
}

/// Renders the file browser dialog overlay.
pub fn render_file_browser(frame: &mut Frame, app: &App, theme: &Theme) {
    let browser = &app.file_browser;
    if !browser.open {
        return;
    }

    let area = centered_rect(60, 60, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Open MIDI file or SoundFont ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.focused_border))
        .style(Style::default().bg(theme.background));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Current path
            Constraint::Length(1), // Separator
            Constraint::Min(3),    // File list
            Constraint::Length(1), // Instructions
        ])
        .split(inner);

    let path_str = browser.current_dir.display().to_string();
    let max_width = chunks[0].width.saturating_sub(2) as usize;
    frame.render_widget(
        Paragraph::new(Span::styled(
            truncate_path(&path_str, max_width),
            Style::default().fg(theme.focused_border),
        )),
        chunks[0],
    );

    let visible_height = (chunks[2].height as usize).min(BROWSER_PAGE);
    let start_idx = browser.scroll.min(browser.entries.len());
    let end_idx = (start_idx + visible_height).min(browser.entries.len());

    let items: Vec<ListItem> = if browser.entries.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "Nothing to open in this directory",
            Style::default().fg(theme.dim).add_modifier(Modifier::ITALIC),
        )))]
    } else {
        browser.entries[start_idx..end_idx]
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let is_selected = start_idx + i == browser.selected;
                let (icon, name, style) = entry_style(path);
                let display_style = if is_selected {
                    style.add_modifier(Modifier::REVERSED)
                } else {
                    style
                };

                ListItem::new(Line::from(vec![
                    Span::styled(format!("{} ", icon), Style::default().fg(theme.dim)),
                    Span::styled(name, display_style),
                ]))
            })
            .collect()
    };
    frame.render_widget(List::new(items), chunks[2]);

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("[Up/Down]", Style::default().fg(theme.accent)),
            Span::styled(" Navigate  ", Style::default().fg(theme.dim)),
            Span::styled("[Enter]", Style::default().fg(theme.accent)),
            Span::styled(" Open  ", Style::default().fg(theme.dim)),
            Span::styled("[Esc]", Style::default().fg(theme.accent)),
            Span::styled(" Cancel", Style::default().fg(theme.dim)),
        ])),
        chunks[3],
    );
}

fn entry_style(path: &Path) -> (&'static str, String, Style) {
    if path == Path::new("..") {
        return (
            "[..]",
            "Parent Directory".to_string(),
            Style::default().fg(Color::Blue),
        );
    }
    if path.is_dir() {
        return ("[D]", display_name(path), Style::default().fg(Color::Blue));
    }
    match FileKind::from_path(path) {
        Ok(FileKind::Midi) => ("[M]", display_name(path), Style::default().fg(Color::Magenta)),
        _ => ("[SF]", display_name(path), Style::default().fg(Color::Green)),
    }
}
