//! Help overlay rendering.
//!
//! Displays keyboard shortcuts and commands in a modal overlay.

use super::{centered_rect, Theme};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

/// Key binding entry for the help display.
struct KeyBinding {
    key: &'static str,
    description: &'static str,
}

const fn bind(key: &'static str, description: &'static str) -> KeyBinding {
    KeyBinding { key, description }
}

const GENERAL_BINDINGS: &[KeyBinding] = &[
    bind("?", "Toggle this help"),
    bind("q / Ctrl+C", "Quit"),
    bind("Tab", "Switch between mixer and effects"),
    bind("o", "Open a MIDI file or SoundFont"),
    bind("Paste / drop", "Open the pasted file path"),
    bind("t", "Toggle dark mode"),
];

const TRANSPORT_BINDINGS: &[KeyBinding] = &[
    bind("Space", "Play / Pause"),
    bind("s / .", "Stop (reset to start)"),
    bind("[ / ]", "Seek back / forward 5 seconds"),
];

const MIXER_BINDINGS: &[KeyBinding] = &[
    bind("Up / Down", "Select row"),
    bind("Left / Right", "Select column (channel, operation, value)"),
    bind("- / +", "Change the selected cell"),
    bind("PgUp / PgDn", "Change the value in larger steps"),
    bind("Enter", "Send the row again"),
    bind("a", "Add a row below"),
    bind("d / Delete", "Remove the row (two always remain)"),
];

const EFFECTS_BINDINGS: &[KeyBinding] = &[
    bind("Up / Down", "Select input"),
    bind("- / + / Left / Right", "Change by 1"),
    bind("PgUp / PgDn", "Change by 10"),
    bind("Enter", "Send every effect again"),
];

const MOUSE_BINDINGS: &[KeyBinding] = &[
    bind("Scroll", "Change the selected cell or input"),
    bind("Click", "Close this help"),
];

const SECTIONS: &[(&str, &[KeyBinding])] = &[
    ("General", GENERAL_BINDINGS),
    ("Transport", TRANSPORT_BINDINGS),
    ("Mixer", MIXER_BINDINGS),
    ("Effects", EFFECTS_BINDINGS),
    ("Mouse", MOUSE_BINDINGS),
];

/// Total help lines, for clamping the scroll offset.
pub const HELP_LINE_COUNT: u16 = {
    let mut total = 0;
    let mut i = 0;
    while i < SECTIONS.len() {
        total += SECTIONS[i].1.len() + 2;
        i += 1;
    }
    total as u16
};

/// Renders the help overlay.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `scroll` - Vertical scroll offset
/// * `theme` - Active color theme
pub fn render_help(frame: &mut Frame, scroll: u16, theme: &Theme) {
    let area = centered_rect(70, 80, frame.area());

    // Clear the area behind the popup
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Help - Keyboard Shortcuts ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.focused_border))
        .style(Style::default().bg(theme.background));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Scrollable content
            Constraint::Length(1), // Fixed footer
        ])
        .split(inner);

    let section_style = Style::default()
        .fg(theme.accent)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let key_style = Style::default()
        .fg(theme.focused_border)
        .add_modifier(Modifier::BOLD);
    let desc_style = Style::default().fg(theme.text);

    let mut lines: Vec<Line<'static>> = Vec::new();
    for (title, bindings) in SECTIONS {
        lines.push(Line::from(Span::styled(*title, section_style)));
        for binding in bindings.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("{:22}", binding.key), key_style),
                Span::styled(binding.description, desc_style),
            ]));
        }
        lines.push(Line::from(""));
    }

    let help_text = Paragraph::new(lines).scroll((scroll, 0));
    frame.render_widget(help_text, chunks[0]);

    let footer = Paragraph::new(Line::from(Span::styled(
        "Scroll: Up/Down/j/k/Mouse  |  Close: ?/Esc/Click",
        Style::default().fg(theme.dim).add_modifier(Modifier::ITALIC),
    )));
    frame.render_widget(footer, chunks[1]);
}
