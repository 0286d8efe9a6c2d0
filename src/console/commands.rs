use super::printers::{
    print_backtrace, print_breakpoints, print_locals, print_location, print_state, print_toggle,
};
use crate::backend::Backend;
use crate::editor::SignBook;
use crate::error::Result;
use crate::model::NavigationTarget;
use crate::session::Controller;
use std::path::Path;

pub enum CommandOutcome {
    Continue,
    Quit,
}

pub fn execute_command<B: Backend>(
    input: &str,
    cmd: &str,
    rest: &str,
    ctl: &mut Controller<B>,
    signs: &mut SignBook,
) -> CommandOutcome {
    let fast = ctl.timeouts().events_fast;
    let normal = ctl.timeouts().events;
    match cmd {
        "quit" | "q" => return CommandOutcome::Quit,
        "help" => print_help(),
        "run" | "r" => {
            let mut words = rest.split_whitespace();
            match words.next() {
                None => println!("usage: run <program> [args...]"),
                Some(program) => {
                    let args: Vec<String> = words.map(str::to_string).collect();
                    match ctl.launch(Path::new(program), &args) {
                        Ok(pid) => {
                            println!("launched pid {pid}");
                            report(ctl.refresh(normal), ctl);
                        }
                        Err(e) => eprintln!("run error: {e}"),
                    }
                }
            }
        }
        "attach" => {
            if rest.is_empty() {
                println!("usage: attach <pid|name>");
            } else {
                let result = match rest.parse::<u32>() {
                    Ok(pid) => ctl.attach(Some(pid), None),
                    Err(_) => ctl.attach(None, Some(rest)),
                };
                match result {
                    Ok(pid) => {
                        println!("attached to pid {pid}");
                        print_state(ctl.state(), ctl);
                    }
                    Err(e) => eprintln!("attach error: {e}"),
                }
            }
        }
        "detach" => match ctl.detach() {
            Ok(()) => println!("detached"),
            Err(e) => eprintln!("detach error: {e}"),
        },
        "kill" => match ctl.quit() {
            Ok(()) => println!("session ended"),
            Err(e) => eprintln!("kill error: {e}"),
        },
        "break" | "b" => match parse_location(rest) {
            Some((path, line)) => match ctl.toggle_breakpoint(Some((path.as_str(), line)), signs) {
                Ok(t) => print_toggle(&format!("{path}:{line}"), t),
                Err(e) => eprintln!("break error: {e}"),
            },
            None if is_function_name(rest) => match ctl.toggle_function_breakpoint(rest) {
                Ok(t) => print_toggle(rest, t),
                Err(e) => eprintln!("break error: {e}"),
            },
            None => println!("usage: break <file>:<line> | break <function>"),
        },
        "delete" => match ctl.clear_breakpoints(signs) {
            Ok(n) => println!("deleted {n} breakpoint(s)"),
            Err(e) => eprintln!("delete error: {e}"),
        },
        "breakpoints" | "bl" => print_breakpoints(ctl.breakpoints()),
        "bt" | "backtrace" => print_backtrace(ctl.backtrace()),
        "where" => print_location(ctl.source_location()),
        "locals" | "vars" => print_locals(ctl.locals()),
        "frame" | "f" => match rest.parse::<u32>() {
            Ok(index) => {
                let tid = ctl.backtrace().selected_thread().map(|t| t.id);
                match tid {
                    Some(tid) => report_selection(ctl.select_frame(tid, index), ctl),
                    None => eprintln!("frame error: no backtrace"),
                }
            }
            Err(_) => println!("usage: frame <index>"),
        },
        "thread" | "t" => match parse_tid(rest) {
            Some(tid) => {
                let first = ctl
                    .backtrace()
                    .find_thread(tid)
                    .and_then(|t| t.frames.first())
                    .map(|f| f.index)
                    .unwrap_or(0);
                report_selection(ctl.select_frame(tid, first), ctl);
            }
            None => println!("usage: thread <tid>"),
        },
        "fold" => match parse_tid(rest) {
            Some(id) => match ctl.navigate(Some(NavigationTarget::Thread { id })) {
                Ok(_) => print_backtrace(ctl.backtrace()),
                Err(e) => eprintln!("fold error: {e}"),
            },
            None => println!("usage: fold <tid>"),
        },
        "up" => report_selection(ctl.frame_up(), ctl),
        "down" => report_selection(ctl.frame_down(), ctl),
        "tnext" => report_selection(ctl.thread_next(), ctl),
        "tprev" => report_selection(ctl.thread_previous(), ctl),
        "next" | "n" => after(ctl.step_over(), fast, ctl, "next"),
        "step" | "s" => after(ctl.step_into(), fast, ctl, "step"),
        "finish" => after(ctl.step_out(), fast, ctl, "finish"),
        "continue" | "c" => after(ctl.resume(), fast, ctl, "continue"),
        "pause" => after(ctl.pause(), fast, ctl, "pause"),
        "wait" | "refresh" => report(ctl.refresh(normal), ctl),
        "status" => match ctl.status() {
            Ok(state) => println!("process {state}"),
            Err(e) => eprintln!("status error: {e}"),
        },
        _ => println!("unknown command: '{input}'"),
    }
    CommandOutcome::Continue
}

/// Poll briefly after a request so the common case reports its result at once.
fn after<B: Backend>(
    requested: Result<()>,
    timeout: std::time::Duration,
    ctl: &mut Controller<B>,
    label: &str,
) {
    match requested {
        Ok(()) => report(ctl.refresh(timeout), ctl),
        Err(e) => eprintln!("{label} error: {e}"),
    }
}

fn report<B: Backend>(state: Result<crate::backend::State>, ctl: &Controller<B>) {
    match state {
        Ok(state) => print_state(state, ctl),
        Err(e) => eprintln!("refresh error: {e}"),
    }
}

fn report_selection<B: Backend>(changed: Result<bool>, ctl: &Controller<B>) {
    match changed {
        Ok(true) => print_location(ctl.source_location()),
        Ok(false) => println!("selection unchanged"),
        Err(e) => eprintln!("{e}"),
    }
}

fn parse_tid(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// A bare symbol such as `main` or `ns::worker`, as opposed to a file location.
fn is_function_name(s: &str) -> bool {
    !s.is_empty() && !s.contains(char::is_whitespace) && !s.contains(['/', '.'])
}

/// `file:line`; the file part may itself contain colons.
fn parse_location(s: &str) -> Option<(String, u32)> {
    let (path, line) = s.trim().rsplit_once(':')?;
    if path.is_empty() {
        return None;
    }
    Some((path.to_string(), line.parse().ok()?))
}

fn print_help() {
    println!("Commands:");
    println!("  run <prog> [args] | r - launch a program");
    println!("  attach <pid|name>     - attach to a running process");
    println!("  detach | kill         - leave or end the current process");
    println!("  break <file>:<line>   - toggle a breakpoint (b)");
    println!("  break <function>      - toggle a breakpoint on a function");
    println!("  breakpoints | bl      - list breakpoints");
    println!("  delete                - delete all breakpoints");
    println!("  bt                    - show threads and frames");
    println!("  frame <n> | up | down - select a frame in the current thread");
    println!("  thread <tid> | tnext | tprev - select a thread");
    println!("  fold <tid>            - fold or unfold a thread in bt");
    println!("  next | step | finish  - step over, into, out (n, s)");
    println!("  continue | pause      - resume or interrupt (c)");
    println!("  wait                  - wait for the next process event");
    println!("  status | where        - process state, current location");
    println!("  locals | vars         - variables of the selected frame");
    println!("  quit | q              - exit");
}
