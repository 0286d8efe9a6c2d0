use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, BorderType, Borders};
use std::sync::OnceLock;

#[derive(Clone, Debug)]
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub fg_dim: Color,
    pub accent: Color,
    /// Background of the line the process is stopped at.
    pub accent_soft: Color,

    pub status_fg: Color,
    pub status_bg: Color,

    pub panel_border: Color,
    pub panel_border_focus: Color,
    pub panel_title: Color,

    pub pc_marker: Color,
    pub breakpoint: Color,
    pub breakpoint_pending: Color,
    pub error: Color,
    pub warn: Color,

    pub row_selected: Style,
    pub cursor_line: Style,
}

impl Default for Theme {
    fn default() -> Self {
        let fg = Color::White;
        let bg = Color::Black;
        Self {
            bg,
            fg,
            fg_dim: Color::DarkGray,
            accent: Color::Cyan,
            accent_soft: Color::Rgb(30, 40, 60),

            status_fg: fg,
            status_bg: Color::Rgb(20, 20, 28),

            panel_border: Color::Gray,
            panel_border_focus: Color::Cyan,
            panel_title: Color::White,

            pc_marker: Color::Yellow,
            breakpoint: Color::Red,
            breakpoint_pending: Color::Magenta,
            error: Color::Red,
            warn: Color::Yellow,

            row_selected: Style::default().add_modifier(Modifier::REVERSED),
            cursor_line: Style::default().add_modifier(Modifier::UNDERLINED),
        }
    }
}

pub fn theme() -> &'static Theme {
    static THEME: OnceLock<Theme> = OnceLock::new();
    THEME.get_or_init(Theme::default)
}

pub fn panel_block<'a>(title: &'a str, focused: bool, theme: &Theme) -> Block<'a> {
    let border = if focused {
        theme.panel_border_focus
    } else {
        theme.panel_border
    };
    Block::default()
        .borders(Borders::ALL)
        .border_type(if focused {
            BorderType::Thick
        } else {
            BorderType::Plain
        })
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.bg))
        .title(title)
        .title_style(Style::default().fg(theme.panel_title))
}
