use crate::backend::{Backend, State};
use crate::session::Controller;
use crate::tui::{
    state::{AppState, PaneId, SourceViewState},
    theme::{self, Theme},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, Clear, Paragraph},
};

pub fn draw<B: Backend>(f: &mut Frame, app: &mut AppState, ctl: &Controller<B>) {
    let theme = theme::theme();
    let full = f.size();

    f.render_widget(Clear, full);
    f.render_widget(Block::default().style(Style::default().bg(theme.bg)), full);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),      // header
            Constraint::Min(6),         // source | backtrace, variables, breakpoints
            Constraint::Percentage(25), // console
        ])
        .split(full);

    render_header(f, theme, layout[0], ctl);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(layout[1]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(30),
            Constraint::Percentage(25),
        ])
        .split(main[1]);

    render_source_panel(f, theme, main[0], app, ctl);
    render_backtrace_panel(f, theme, side[0], app, ctl);
    render_variables_panel(f, theme, side[1], app, ctl);
    render_breakpoints_panel(f, theme, side[2], app, ctl);
    render_console_panel(f, theme, layout[2], app);
}

fn render_header<B: Backend>(f: &mut Frame, theme: &Theme, area: Rect, ctl: &Controller<B>) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let state = ctl.state();
    let state_color = match state {
        State::Crashed => theme.error,
        State::Running | State::Stepping | State::Launching | State::Attaching => theme.warn,
        s if s.is_halted() => theme.accent,
        _ => theme.fg_dim,
    };
    let mut spans = vec![
        Span::styled(
            " lldb-nav ",
            Style::default()
                .bg(theme.accent)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("[{state}]"),
            Style::default().fg(state_color).add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(session) = ctl.session() {
        spans.push(Span::styled(
            format!("  pid {}  {}", session.pid, session.target),
            Style::default().fg(theme.fg_dim),
        ));
    }
    let left = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(theme.status_bg).fg(theme.status_fg));
    f.render_widget(left, chunks[0]);

    let mut hints = Vec::new();
    for (key, what) in [
        ("n/s/o", " step  "),
        ("c", " cont  "),
        ("p", " pause  "),
        ("b", " break  "),
        ("f", " fn break  "),
        ("Tab", " focus  "),
        ("q", " quit "),
    ] {
        hints.push(Span::styled(key, Style::default().fg(theme.accent)));
        hints.push(Span::raw(what));
    }
    let right = Paragraph::new(Line::from(hints))
        .alignment(Alignment::Right)
        .style(Style::default().bg(theme.status_bg).fg(theme.fg_dim));
    f.render_widget(right, chunks[1]);
}

fn render_source_panel<B: Backend>(
    f: &mut Frame,
    theme: &Theme,
    area: Rect,
    app: &mut AppState,
    ctl: &Controller<B>,
) {
    let title = source_title(&app.source);
    let block = theme::panel_block(&title, app.focus == PaneId::Source, theme);
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height == 0 {
        return;
    }

    app.source.keep_cursor_visible(inner.height as u32);
    let path = app
        .source
        .filename
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let source = &app.source;

    let mut lines = Vec::with_capacity(inner.height as usize);
    let first = source.scroll_top as usize;
    for (idx, text) in source
        .lines
        .iter()
        .enumerate()
        .skip(first)
        .take(inner.height as usize)
    {
        let line_no = idx as u32 + 1;
        let sign = match &path {
            Some(p) if app.has_sign(p, line_no) => {
                let pending = ctl.breakpoints().get(p, line_no).is_some_and(|b| b.pending);
                let color = if pending {
                    theme.breakpoint_pending
                } else {
                    theme.breakpoint
                };
                Span::styled("●", Style::default().fg(color))
            }
            _ => Span::raw(" "),
        };
        let is_pc = source.current_line == Some(line_no);
        let marker = if is_pc {
            Span::styled("▶", Style::default().fg(theme.pc_marker))
        } else {
            Span::raw(" ")
        };
        let gutter = Span::styled(format!("{line_no:>5} "), Style::default().fg(theme.fg_dim));
        let code = Span::styled(text.replace('\t', "    "), Style::default().fg(theme.fg));

        let mut line = pad_or_truncate_line(
            Line::from(vec![sign, marker, gutter, code]),
            inner.width as usize,
        );
        if is_pc {
            line = line.style(Style::default().bg(theme.accent_soft));
        }
        if line_no == source.cursor && app.focus == PaneId::Source {
            line = line.patch_style(theme.cursor_line);
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "(no source)",
            Style::default().fg(theme.fg_dim),
        )));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn source_title(source: &SourceViewState) -> String {
    if let Some(symbol) = &source.disassembly {
        return format!(" {symbol} (disassembly) ");
    }
    match &source.filename {
        Some(path) => {
            let name = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("(unknown)");
            let modified = if source.is_modified() { " [modified]" } else { "" };
            match source.current_line {
                Some(line) => format!(" {name}:{line}{modified} "),
                None => format!(" {name}{modified} "),
            }
        }
        None => " Source ".to_string(),
    }
}

fn render_backtrace_panel<B: Backend>(
    f: &mut Frame,
    theme: &Theme,
    area: Rect,
    app: &AppState,
    ctl: &Controller<B>,
) {
    let focused = app.focus == PaneId::Backtrace;
    let block = theme::panel_block(" Backtrace ", focused, theme);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = ctl.backtrace().rows();
    if rows.is_empty() {
        let msg = Paragraph::new(Span::styled(
            "(no threads)",
            Style::default().fg(theme.fg_dim),
        ));
        f.render_widget(msg, inner);
        return;
    }
    let height = inner.height as usize;
    let top = app.backtrace_selected.saturating_sub(height.saturating_sub(1));
    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(top)
        .take(height)
        .map(|(i, row)| {
            let mut style = Style::default().fg(if row.selected {
                theme.accent
            } else {
                theme.fg
            });
            if focused && i == app.backtrace_selected {
                style = style.patch(theme.row_selected);
            }
            pad_or_truncate_line(
                Line::from(Span::styled(row.text.clone(), style)),
                inner.width as usize,
            )
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_variables_panel<B: Backend>(
    f: &mut Frame,
    theme: &Theme,
    area: Rect,
    app: &AppState,
    ctl: &Controller<B>,
) {
    let block = theme::panel_block(" Variables ", app.focus == PaneId::Variables, theme);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let locals = ctl.locals();
    if locals.is_empty() {
        let msg = Paragraph::new(Span::styled(
            "(no variables)",
            Style::default().fg(theme.fg_dim),
        ));
        f.render_widget(msg, inner);
        return;
    }
    let lines: Vec<Line> = locals
        .iter()
        .skip(app.variables_top)
        .take(inner.height as usize)
        .map(|var| {
            pad_or_truncate_line(
                Line::from(vec![
                    Span::styled(var.name.clone(), Style::default().fg(theme.accent)),
                    Span::styled(
                        format!(" ({}) ", var.type_name),
                        Style::default().fg(theme.fg_dim),
                    ),
                    Span::styled(format!("= {}", var.value), Style::default().fg(theme.fg)),
                ]),
                inner.width as usize,
            )
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn breakpoint_status(
    applied: bool,
    pending: bool,
    id: Option<u32>,
    theme: &Theme,
) -> (&'static str, Color, String) {
    match (applied, pending, id) {
        (true, false, Some(id)) => ("●", theme.breakpoint, format!("#{id}")),
        (true, true, Some(id)) => ("●", theme.breakpoint_pending, format!("#{id} pending")),
        _ => ("○", theme.fg_dim, "not set".to_string()),
    }
}

fn render_breakpoints_panel<B: Backend>(
    f: &mut Frame,
    theme: &Theme,
    area: Rect,
    app: &AppState,
    ctl: &Controller<B>,
) {
    let focused = app.focus == PaneId::Breakpoints;
    let title = format!(" Breakpoints ({}) ", ctl.breakpoints().len());
    let block = theme::panel_block(&title, focused, theme);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let height = inner.height as usize;
    let top = app.breakpoint_selected.saturating_sub(height.saturating_sub(1));
    let registry = ctl.breakpoints();
    // line breakpoints first, then function breakpoints
    let entries = registry
        .iter()
        .map(|bp| (format!("{}:{}", bp.path, bp.line), bp.applied, bp.pending, bp.id))
        .chain(
            registry
                .functions()
                .map(|bp| (format!("{}()", bp.name), bp.applied, bp.pending, bp.id)),
        );
    let lines: Vec<Line> = entries
        .enumerate()
        .skip(top)
        .take(height)
        .map(|(i, (label, applied, pending, id))| {
            let (mark, color, status) = breakpoint_status(applied, pending, id, theme);
            let mut text_style = Style::default().fg(theme.fg);
            if focused && i == app.breakpoint_selected {
                text_style = text_style.patch(theme.row_selected);
            }
            pad_or_truncate_line(
                Line::from(vec![
                    Span::styled(format!("{mark} "), Style::default().fg(color)),
                    Span::styled(format!("{label}  "), text_style),
                    Span::styled(status, Style::default().fg(theme.fg_dim)),
                ]),
                inner.width as usize,
            )
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_console_panel(f: &mut Frame, theme: &Theme, area: Rect, app: &AppState) {
    let block = theme::panel_block(" Console ", app.focus == PaneId::Console, theme);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let entries: Vec<String> = match app.console.lock() {
        Ok(buf) => buf.iter().cloned().collect(),
        Err(_) => Vec::new(),
    };
    let height = inner.height as usize;
    // console_scroll counts lines back from the newest entry
    let end = entries.len().saturating_sub(app.console_scroll as usize);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = entries[start..end]
        .iter()
        .map(|entry| {
            let color = if entry.starts_with("ERROR") {
                theme.error
            } else if entry.starts_with("WARN") {
                theme.warn
            } else {
                theme.fg
            };
            pad_or_truncate_line(
                Line::from(Span::styled(entry.clone(), Style::default().fg(color))),
                inner.width as usize,
            )
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

/// Pad with spaces or cut to exactly `width` characters.
fn pad_or_truncate_line(mut line: Line<'_>, width: usize) -> Line<'_> {
    let current: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
    if current < width {
        let style = line.spans.last().map(|s| s.style).unwrap_or_default();
        line.spans.push(Span::styled(" ".repeat(width - current), style));
    } else if current > width {
        let mut left = width;
        let mut kept = Vec::new();
        for span in line.spans {
            if left == 0 {
                break;
            }
            let n = span.content.chars().count();
            if n <= left {
                left -= n;
                kept.push(span);
            } else {
                let cut: String = span.content.chars().take(left).collect();
                kept.push(Span::styled(cut, span.style));
                left = 0;
            }
        }
        line.spans = kept;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn width(line: &Line) -> usize {
        line.spans.iter().map(|s| s.content.chars().count()).sum()
    }

    #[test]
    fn pads_and_truncates_by_chars() {
        let line = pad_or_truncate_line(Line::from(vec![Span::raw("●▶"), Span::raw("ab")]), 10);
        assert_eq!(width(&line), 10);

        let line = pad_or_truncate_line(Line::from(vec![Span::raw("●▶"), Span::raw("abcdef")]), 3);
        assert_eq!(width(&line), 3);
        assert_eq!(line.spans[1].content, "a");
    }
}
