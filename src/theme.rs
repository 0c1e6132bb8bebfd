use ratatui::style::{Color, Modifier, Style};

pub const ACCENT: Color = Color::Rgb(64, 160, 255);
pub const SELECTED: Color = Color::Rgb(255, 120, 0);
pub const MUTED: Color = Color::DarkGray;
pub const ERROR: Color = Color::Red;
pub const BG: Color = Color::Rgb(24, 24, 26);

pub fn border_focused() -> Style {
    Style::default().fg(SELECTED)
}

pub fn text_active_bold() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

pub fn text_editing_bold() -> Style {
    Style::default().fg(SELECTED).add_modifier(Modifier::BOLD)
}

pub fn text_muted() -> Style {
    Style::default().fg(MUTED)
}

pub fn text_error() -> Style {
    Style::default().fg(ERROR)
}

pub fn list_cursor_style() -> Style {
    Style::default()
        .fg(BG)
        .bg(SELECTED)
        .add_modifier(Modifier::BOLD)
}
