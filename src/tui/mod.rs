//! Full-screen host: source with gutter signs, the thread/frame tree, the
//! breakpoint list and a console fed by the logger.

use crate::backend::Backend;
use crate::error::Result as DebugResult;
use crate::logger::ConsoleBuffer;
use crate::model::NavigationTarget;
use crate::session::Controller;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    io::{self, Stdout},
    time::Duration,
};

pub mod state;
pub mod theme;
pub mod ui;

use state::{AppState, PaneId};

pub fn run<B: Backend>(ctl: &mut Controller<B>, console: ConsoleBuffer) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    enable_raw_mode()?;
    if let Err(e) = execute!(terminal.backend_mut(), EnterAlternateScreen) {
        disable_raw_mode().ok();
        return Err(e.into());
    }

    let mut app = AppState::new(console);
    let result = event_loop(&mut terminal, &mut app, ctl);
    let cleanup_result = restore_terminal(&mut terminal);

    result.and(cleanup_result)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut AppState,
    ctl: &mut Controller<B>,
) -> Result<()> {
    loop {
        // Running processes stop on their own; pick that up between keys.
        if ctl.is_live() && !ctl.state().is_halted() {
            if let Err(e) = ctl.refresh(Duration::ZERO) {
                log::warn!("refresh failed: {e}");
            }
        }
        app.sync_from(ctl);
        terminal.draw(|f| ui::draw(f, app, ctl))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(key, app, ctl) {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Returns true when the user asked to quit.
fn handle_key<B: Backend>(key: KeyEvent, app: &mut AppState, ctl: &mut Controller<B>) -> bool {
    if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
        return false;
    }
    if key.code == KeyCode::Char('q')
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
    {
        return true;
    }

    let fast = ctl.timeouts().events_fast;
    match key.code {
        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::Up | KeyCode::Char('k') => move_selection(app, ctl, -1),
        KeyCode::Down | KeyCode::Char('j') => move_selection(app, ctl, 1),
        KeyCode::PageUp => move_selection(app, ctl, -10),
        KeyCode::PageDown => move_selection(app, ctl, 10),
        KeyCode::Enter => activate(app, ctl),
        KeyCode::Char('b') => match ctl.toggle_breakpoint(None, app) {
            Ok(t) => log::info!("breakpoint {t:?}"),
            Err(e) => log::warn!("breakpoint: {e}"),
        },
        KeyCode::Char('f') => {
            let name = ctl
                .backtrace()
                .selected_frame()
                .and_then(|frame| frame.function_name())
                .map(str::to_string);
            match name {
                Some(name) => match ctl.toggle_function_breakpoint(&name) {
                    Ok(t) => log::info!("breakpoint on {name}: {t:?}"),
                    Err(e) => log::warn!("breakpoint on {name}: {e}"),
                },
                None => log::warn!("the selected frame has no function name"),
            }
        }
        KeyCode::Char('x') => match ctl.clear_breakpoints(app) {
            Ok(n) => log::info!("deleted {n} breakpoint(s)"),
            Err(e) => log::warn!("delete breakpoints: {e}"),
        },
        KeyCode::Char('n') => request(ctl.step_over(), ctl, fast, "next"),
        KeyCode::Char('s') => request(ctl.step_into(), ctl, fast, "step"),
        KeyCode::Char('o') => request(ctl.step_out(), ctl, fast, "finish"),
        KeyCode::Char('c') => request(ctl.resume(), ctl, fast, "continue"),
        KeyCode::Char('p') => request(ctl.pause(), ctl, fast, "pause"),
        KeyCode::Char('r') => {
            let normal = ctl.timeouts().events;
            request(Ok(()), ctl, normal, "refresh");
        }
        KeyCode::Char('u') => selection(ctl.frame_up(), "frame up"),
        KeyCode::Char('d') => selection(ctl.frame_down(), "frame down"),
        KeyCode::Char(']') => selection(ctl.thread_next(), "next thread"),
        KeyCode::Char('[') => selection(ctl.thread_previous(), "previous thread"),
        _ => {}
    }
    false
}

fn request<B: Backend>(
    requested: DebugResult<()>,
    ctl: &mut Controller<B>,
    timeout: Duration,
    label: &str,
) {
    if let Err(e) = requested {
        log::warn!("{label}: {e}");
        return;
    }
    if let Err(e) = ctl.refresh(timeout) {
        log::warn!("{label}: {e}");
    }
}

fn selection(changed: DebugResult<bool>, label: &str) {
    if let Err(e) = changed {
        log::warn!("{label}: {e}");
    }
}

fn move_selection<B: Backend>(app: &mut AppState, ctl: &Controller<B>, delta: i32) {
    let step = |current: usize, len: usize| -> usize {
        if len == 0 {
            return 0;
        }
        (current as i64 + delta as i64).clamp(0, len as i64 - 1) as usize
    };
    match app.focus {
        PaneId::Source => app.source.move_cursor(delta),
        PaneId::Backtrace => {
            let len = ctl.backtrace().rows().len();
            app.backtrace_selected = step(app.backtrace_selected, len);
        }
        PaneId::Variables => {
            app.variables_top = step(app.variables_top, ctl.locals().len());
        }
        PaneId::Breakpoints => {
            app.breakpoint_selected = step(app.breakpoint_selected, ctl.breakpoints().len());
        }
        PaneId::Console => {
            let len = app.console.lock().map(|b| b.len()).unwrap_or(0);
            let scroll = app.console_scroll as i64 - delta as i64;
            app.console_scroll = scroll.clamp(0, len as i64) as u16;
        }
    }
}

/// Enter: follow a backtrace row, or open the file of a listed breakpoint.
fn activate<B: Backend>(app: &mut AppState, ctl: &mut Controller<B>) {
    match app.focus {
        PaneId::Backtrace => {
            let target: Option<NavigationTarget> = ctl
                .backtrace()
                .rows()
                .get(app.backtrace_selected)
                .map(|row| row.target);
            if let Err(e) = ctl.navigate(target) {
                log::warn!("navigate: {e}");
            }
        }
        PaneId::Breakpoints => {
            let Some((path, line)) = ctl
                .breakpoints()
                .iter()
                .nth(app.breakpoint_selected)
                .map(|bp| (bp.path.clone(), bp.line))
            else {
                return;
            };
            app.open(&path, ctl);
            app.source.jump_to(line);
            app.focus = PaneId::Source;
        }
        _ => {}
    }
}
