//! Effects panel rendering: reverb and chorus type, scale/octave tuning and
//! the controller destination effects.

use super::Theme;
use crate::app::App;
use crate::mixer::EffectField;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Renders the effects form, one line per input under its fieldset title.
pub fn render_effects(frame: &mut Frame, area: Rect, app: &App, theme: &Theme, focused: bool) {
    let block = Block::default()
        .title(" Effects ")
        .borders(Borders::ALL)
        .border_style(theme.border(focused));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let selected = app.selected_effect();
    let title_style = Style::default()
        .fg(theme.accent)
        .add_modifier(Modifier::BOLD);

    let mut lines: Vec<Line> = Vec::new();
    let mut selected_line = 0;
    for field in EffectField::ALL {
        lines.push(Line::from(Span::styled(field.title(), title_style)));
        for index in 0..field.len() {
            let value = app.effects.value(field, index).unwrap_or_default();
            let is_selected = selected == Some((field, index));
            if is_selected {
                selected_line = lines.len();
            }

            let style = if is_selected && focused {
                Style::default()
                    .fg(theme.text)
                    .add_modifier(Modifier::REVERSED | Modifier::BOLD)
            } else if is_selected {
                Style::default().fg(theme.text).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.text)
            };
            lines.push(Line::from(vec![
                Span::styled(format!("  {:<10}", field.input_label(index)), Style::default().fg(theme.dim)),
                Span::styled(format!("{:>4}", value), style),
            ]));
        }
    }

    // Scroll so the selected input stays on screen
    let visible = inner.height as usize;
    let scroll = selected_line.saturating_sub(visible.saturating_sub(1));

    frame.render_widget(Paragraph::new(lines).scroll((scroll as u16, 0)), inner);
}
