//! Mixer table rendering.
//!
//! One line per row: channel target, operation and value, with the value
//! drawn as a bar next to what is actually sent.

use super::Theme;
use crate::app::{App, MixerColumn};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Width of the value bar in cells.
const BAR_WIDTH: usize = 16;

/// Height reserved for the control hints at the bottom.
const CONTROLS_HEIGHT: u16 = 1;

fn value_bar(value: f64) -> String {
    let filled = (value.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// Renders the mixer table.
pub fn render_mixer(frame: &mut Frame, area: Rect, app: &App, theme: &Theme, focused: bool) {
    let block = Block::default()
        .title(" Mixer ")
        .borders(Borders::ALL)
        .border_style(theme.border(focused));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),               // Header
            Constraint::Min(1),                  // Rows
            Constraint::Length(CONTROLS_HEIGHT), // Control hints
        ])
        .split(inner);

    let header_style = Style::default().fg(theme.dim).add_modifier(Modifier::BOLD);
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            format!("  {:<5} {:<18} {}", "Ch", "Operation", "Value"),
            header_style,
        ))),
        chunks[0],
    );

    // Keep the selected row visible
    let visible = chunks[1].height as usize;
    let scroll = app.selected_row.saturating_sub(visible.saturating_sub(1));

    let lines: Vec<Line> = app
        .mixer
        .rows()
        .iter()
        .enumerate()
        .skip(scroll)
        .take(visible)
        .map(|(i, row)| {
            let selected = i == app.selected_row;
            let cell = |column: MixerColumn| {
                let style = Style::default().fg(theme.text);
                if selected && focused && app.column == column {
                    style.add_modifier(Modifier::REVERSED | Modifier::BOLD)
                } else if selected {
                    style.add_modifier(Modifier::BOLD)
                } else {
                    style
                }
            };

            Line::from(vec![
                Span::styled(
                    if selected { "> " } else { "  " },
                    Style::default().fg(theme.accent),
                ),
                Span::styled(format!("{:<5}", row.channel.to_string()), cell(MixerColumn::Channel)),
                Span::raw(" "),
                Span::styled(format!("{:<18}", row.operation.label()), cell(MixerColumn::Operation)),
                Span::raw(" "),
                Span::styled(value_bar(row.value), Style::default().fg(theme.highlight)),
                Span::raw(" "),
                Span::styled(
                    format!("{:>6}", row.operation.scaled_display(row.value)),
                    cell(MixerColumn::Value),
                ),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), chunks[1]);

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("[a]", Style::default().fg(theme.accent)),
            Span::styled(" Add  ", Style::default().fg(theme.dim)),
            Span::styled("[d]", Style::default().fg(theme.accent)),
            Span::styled(" Remove  ", Style::default().fg(theme.dim)),
            Span::styled("[-/+]", Style::default().fg(theme.accent)),
            Span::styled(" Change", Style::default().fg(theme.dim)),
        ])),
        chunks[2],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_bar() {
        assert_eq!(value_bar(0.0), "-".repeat(BAR_WIDTH));
        assert_eq!(value_bar(1.0), "#".repeat(BAR_WIDTH));
        assert_eq!(value_bar(0.5).matches('#').count(), BAR_WIDTH / 2);
        assert_eq!(value_bar(2.0).len(), BAR_WIDTH);
    }
}
