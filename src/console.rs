//! Line-oriented host: one command per line on stdin, results on stdout.

mod commands;
mod printers;

use crate::backend::{Backend, State};
use crate::editor::SignBook;
use crate::session::Controller;
use anyhow::Result;
use commands::{execute_command, CommandOutcome};
use std::io::{self, Write};
use std::time::Duration;

pub fn repl<B: Backend>(ctl: &mut Controller<B>) -> Result<()> {
    println!("Type 'help' for commands.");
    let mut signs = SignBook::new();
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        report_pending_events(ctl);
        print!("(nav) ");
        io::stdout().flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let mut parts = input.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or("").trim();
        let rest = parts.next().unwrap_or("").trim();
        match execute_command(input, cmd, rest, ctl, &mut signs) {
            CommandOutcome::Continue => {}
            CommandOutcome::Quit => break,
        }
    }
    if let Err(e) = ctl.quit() {
        eprintln!("quit error: {e}");
    }
    Ok(())
}

/// Pick up state changes that arrived while waiting for input.
fn report_pending_events<B: Backend>(ctl: &mut Controller<B>) {
    if !ctl.is_live() {
        return;
    }
    match ctl.refresh(Duration::ZERO) {
        Ok(State::Invalid) => {}
        Ok(state) => printers::print_state(state, ctl),
        Err(e) => eprintln!("refresh error: {e}"),
    }
}
