use crate::backend::{Backend, State, Variable};
use crate::model::{BacktraceModel, BreakpointRegistry, SourceLocation};
use crate::navigation::Toggle;
use crate::session::Controller;

pub fn print_state<B: Backend>(state: State, ctl: &Controller<B>) {
    match state {
        State::Stopped | State::Crashed | State::Stepping => {
            let label = if state == State::Crashed { "crashed" } else { "stopped" };
            match ctl.backtrace().selected_thread() {
                Some(t) => match &t.stop_reason {
                    Some(reason) => println!("{label} in thread {} | reason: {reason}", t.id),
                    None => println!("{label} in thread {}", t.id),
                },
                None => println!("{label}"),
            }
            print_location(ctl.source_location());
        }
        State::Invalid => println!("no new events (process {})", ctl.state()),
        other => println!("process {other}"),
    }
}

pub fn print_location(loc: Option<&SourceLocation>) {
    match loc {
        Some(SourceLocation::Source { path, line, column }) => {
            println!("  at {path}:{line}:{column}");
            if let Some(text) = source_line(path, *line) {
                println!("  {line:>5} | {text}");
            }
        }
        Some(SourceLocation::Disassembly { symbol, text, .. }) => {
            println!("  in {symbol} (no source)");
            for l in text.lines().take(8) {
                println!("  {l}");
            }
        }
        None => println!("  (location unknown)"),
    }
}

fn source_line(path: &str, line: u32) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .nth(line.checked_sub(1)? as usize)
        .map(|s| s.to_string())
}

pub fn print_backtrace(model: &BacktraceModel) {
    if model.is_empty() {
        println!("no backtrace");
        return;
    }
    for row in model.rows() {
        println!("{}", row.text);
    }
}

pub fn print_breakpoints(registry: &BreakpointRegistry) {
    if registry.is_empty() {
        println!("no breakpoints");
        return;
    }
    for bp in registry.iter() {
        let status = status(bp.applied, bp.pending, bp.id);
        println!("{}:{} [{status}]", bp.path, bp.line);
    }
    for bp in registry.functions() {
        let status = status(bp.applied, bp.pending, bp.id);
        println!("{}() [{status}]", bp.name);
    }
}

fn status(applied: bool, pending: bool, id: Option<u32>) -> String {
    match (applied, pending, id) {
        (true, true, Some(id)) => format!("#{id} pending"),
        (true, false, Some(id)) => format!("#{id}"),
        _ => "not set".to_string(),
    }
}

/// `at` is a `file:line` or a function name.
pub fn print_toggle(at: &str, toggle: Toggle) {
    match toggle {
        Toggle::Added => println!("breakpoint at {at}"),
        Toggle::Pending => println!("breakpoint at {at} (pending)"),
        Toggle::Removed => println!("removed breakpoint at {at}"),
    }
}

pub fn print_locals(vars: &[Variable]) {
    if vars.is_empty() {
        println!("no variables");
        return;
    }
    for var in vars {
        println!("({}) {} = {}", var.type_name, var.name, var.value);
    }
}
