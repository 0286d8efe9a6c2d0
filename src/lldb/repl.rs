use crate::backend::{
    AttachTarget, Backend, BreakpointAck, State, StepKind, ThreadRecord, Variable,
};
use crate::config::Timeouts;
use crate::error::{DebugError, Result};
use crate::lldb::models::{CommandOutput, LineKind};
use crate::lldb::parser::{
    classify_line, parse_backtrace, parse_breakpoint_ack, parse_breakpoint_locations,
    parse_process_event, parse_sync_token, parse_target_created, parse_thread_line,
    parse_variables, quote_arg, strip_prompt, FRAME_FORMAT, SYNC_COMMAND, THREAD_FORMAT,
};
use os_pipe::PipeReader;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use timeout_readwrite::TimeoutReader;

const PROMPT: &str = "(lldb) ";
const STARTUP_WAIT: Duration = Duration::from_secs(2);

/// Process state changes seen in LLDB's output, waiting to be polled.
#[derive(Debug, Default)]
struct EventQueue {
    events: VecDeque<State>,
    listening: bool,
    /// The last event handed out was `Stopped` and nothing was queued since.
    stop_delivered: bool,
}

impl EventQueue {
    /// Queue process state changes found in `lines`. A crash stop reason
    /// upgrades the `Stopped` it belongs to. If that stop was already handed
    /// out, a `Crashed` event follows it instead.
    fn absorb<S: AsRef<str>>(&mut self, lines: &[S]) {
        for line in lines {
            match classify_line(line.as_ref()) {
                LineKind::ProcessEvent { pid, state } => {
                    if self.listening {
                        log::debug!("process {pid} -> {state}");
                        self.events.push_back(state);
                        self.stop_delivered = false;
                    }
                }
                LineKind::CrashReason => {
                    if self.events.back() == Some(&State::Stopped) {
                        if let Some(last) = self.events.back_mut() {
                            *last = State::Crashed;
                        }
                    } else if self.events.is_empty() && self.stop_delivered {
                        log::debug!("late crash reason for the delivered stop");
                        self.events.push_back(State::Crashed);
                    }
                    self.stop_delivered = false;
                }
                LineKind::Text => {}
            }
        }
    }

    /// A command answer may repeat the current stop reason; it is not a new event.
    fn settle(&mut self) {
        self.stop_delivered = false;
    }

    fn pop(&mut self) -> Option<State> {
        let event = self.events.pop_front();
        if let Some(state) = event {
            self.stop_delivered = state == State::Stopped;
        }
        event
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn reset(&mut self) {
        self.listening = false;
        self.events.clear();
        self.stop_delivered = false;
    }
}

/// What LLDB printed for one command.
struct Response {
    /// Lines that arrived before LLDB echoed the command: leftovers of earlier
    /// asynchronous activity.
    preamble: Vec<String>,
    output: CommandOutput,
}

/// Split off everything up to and including the echo of `cmd`. Without an
/// echo the whole block is the command's answer.
fn split_echo(mut lines: Vec<String>, cmd: &str) -> (Vec<String>, Vec<String>) {
    match lines.iter().position(|l| l.trim() == cmd.trim()) {
        Some(pos) => {
            let rest = lines.split_off(pos + 1);
            lines.pop();
            (lines, rest)
        }
        None => (Vec::new(), lines),
    }
}

/// A line-oriented LLDB session driven through stdin and a merged
/// stdout/stderr pipe.
///
/// Every command is followed by a sync command (`lldb-nav-sync-<n>`). LLDB
/// either echoes it or rejects it, and whichever line shows up first marks
/// the end of the previous answer, whether or not LLDB draws prompts.
pub struct LldbRepl {
    child: Child,
    stdin: ChildStdin,
    output: TimeoutReader<PipeReader>,
    /// Bytes read past the last newline.
    pending: String,
    /// Lines read past a sync marker, handed out by the next read.
    backlog: Vec<String>,
    timeouts: Timeouts,
    queue: EventQueue,
    /// tid -> LLDB thread index, from the most recent listing.
    thread_indices: HashMap<u64, u32>,
    sync: u64,
    closed: bool,
}

impl LldbRepl {
    pub fn start(lldb: &Path, timeouts: Timeouts) -> Result<Self> {
        let (reader, writer) = os_pipe::pipe()?;
        let mut command = Command::new(lldb);
        command
            .arg("--no-lldbinit")
            .arg("--no-use-colors")
            .stdin(Stdio::piped())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        let spawned = command.spawn();
        // our copies of the write end live in `command`; EOF needs them gone
        drop(command);
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound {
                    log::error!(
                        "lldb binary '{}' not found; install lldb or pass --lldb <path>",
                        lldb.display()
                    );
                } else {
                    log::error!("failed to launch lldb '{}': {e}", lldb.display());
                }
                return Err(DebugError::Io(e));
            }
        };

        let stdin = child.stdin.take().ok_or(DebugError::Disconnected)?;

        let mut repl = Self {
            child,
            stdin,
            output: TimeoutReader::new(reader, timeouts.read_slice),
            pending: String::new(),
            backlog: Vec::new(),
            timeouts,
            queue: EventQueue::default(),
            thread_indices: HashMap::new(),
            sync: 0,
            closed: false,
        };
        repl.drain_initial_output();
        repl.configure()?;
        Ok(repl)
    }

    /// Consume the banner. A slow start is not fatal here; `configure` will
    /// find out if LLDB is unresponsive.
    fn drain_initial_output(&mut self) {
        match self.read_until_sync(Instant::now() + STARTUP_WAIT, "startup") {
            Ok(lines) => log::debug!("lldb ready ({} banner lines)", lines.len()),
            Err(e) => log::debug!("no startup sync from lldb: {e}"),
        }
    }

    fn configure(&mut self) -> Result<()> {
        let settings = [
            "settings set auto-confirm true".to_string(),
            "settings set use-color false".to_string(),
            "settings set stop-line-count-before 0".to_string(),
            "settings set stop-line-count-after 0".to_string(),
            "settings set stop-disassembly-count 0".to_string(),
            "settings set target.load-script-from-symbol-file false".to_string(),
            format!("settings set thread-format {}", quote_arg(THREAD_FORMAT)),
            format!("settings set thread-stop-format {}", quote_arg(THREAD_FORMAT)),
            format!("settings set frame-format {}", quote_arg(FRAME_FORMAT)),
        ];
        for cmd in &settings {
            let out = self.exec(cmd)?;
            if let Some(msg) = out.error() {
                log::warn!("`{cmd}` rejected: {msg}");
            }
        }
        Ok(())
    }

    /// Send a command and collect its answer. Process state lines anywhere in
    /// the output are queued as events.
    pub fn exec(&mut self, cmd: &str) -> Result<CommandOutput> {
        let response = self.round_trip(cmd)?;
        self.queue.absorb(&response.preamble);
        self.queue.settle();
        self.queue.absorb(&response.output.lines);
        Ok(response.output)
    }

    /// For commands whose answer describes the current state rather than a
    /// change: only the lines that came before the echo are queued.
    fn query(&mut self, cmd: &str) -> Result<CommandOutput> {
        let response = self.round_trip(cmd)?;
        self.queue.absorb(&response.preamble);
        self.queue.settle();
        Ok(response.output)
    }

    /// `exec`, turning an `error:` line into `DebugError::Command`.
    fn exec_checked(&mut self, cmd: &str) -> Result<CommandOutput> {
        let out = self.exec(cmd)?;
        if let Some(msg) = out.error() {
            return Err(DebugError::Command {
                command: cmd.to_string(),
                message: msg.to_string(),
            });
        }
        Ok(out)
    }

    fn round_trip(&mut self, cmd: &str) -> Result<Response> {
        self.send_line(cmd)?;
        let lines = self.read_until_sync(Instant::now() + self.timeouts.command, cmd)?;
        let (preamble, lines) = split_echo(lines, cmd);
        Ok(Response {
            preamble,
            output: CommandOutput {
                command: cmd.to_string(),
                lines,
            },
        })
    }

    fn send_line(&mut self, cmd: &str) -> Result<()> {
        if self.closed {
            return Err(DebugError::Disconnected);
        }
        log::debug!("[lldb->] {cmd}");
        let mut line = cmd.to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Send the next sync command and collect lines until LLDB mentions it.
    /// Mentions of older sync commands are dropped.
    fn read_until_sync(&mut self, deadline: Instant, label: &str) -> Result<Vec<String>> {
        self.sync += 1;
        let token = self.sync;
        self.send_line(&format!("{SYNC_COMMAND}{token}"))?;

        let mut lines = Vec::new();
        loop {
            if Instant::now() >= deadline {
                self.queue.absorb(&lines);
                return Err(DebugError::Timeout(label.to_string()));
            }
            let Some(chunk) = self.read_chunk()? else {
                continue;
            };
            let mut chunk = chunk.into_iter();
            while let Some(line) = chunk.next() {
                match parse_sync_token(&line) {
                    Some(n) if n == token => {
                        self.backlog.extend(chunk);
                        return Ok(lines);
                    }
                    Some(_) => {}
                    None => lines.push(line),
                }
            }
        }
    }

    /// Complete lines from one read slice, prompts stripped. `None` when
    /// nothing arrived in time.
    fn read_chunk(&mut self) -> Result<Option<Vec<String>>> {
        if !self.backlog.is_empty() {
            return Ok(Some(std::mem::take(&mut self.backlog)));
        }
        let mut buf = [0u8; 4096];
        let n = match self.output.read(&mut buf) {
            Ok(0) => {
                self.closed = true;
                return Err(DebugError::Disconnected);
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let raw: String = self.pending.drain(..=pos).collect();
            let line = strip_prompt(raw.trim_end_matches(['\r', '\n']), PROMPT).trim_end();
            if !line.is_empty() {
                log::debug!("[lldb<-] {line}");
                lines.push(line.to_string());
            }
        }
        Ok(Some(lines))
    }

    fn remember_threads(&mut self, threads: &[ThreadRecord]) {
        self.thread_indices = threads.iter().map(|t| (t.id, t.index)).collect();
    }

    fn thread_index(&mut self, id: u64) -> Result<u32> {
        if let Some(index) = self.thread_indices.get(&id) {
            return Ok(*index);
        }
        let out = self.exec_checked("thread list")?;
        let threads: Vec<ThreadRecord> =
            out.lines.iter().filter_map(|l| parse_thread_line(l)).collect();
        self.remember_threads(&threads);
        self.thread_indices
            .get(&id)
            .copied()
            .ok_or(DebugError::InvalidThread(id))
    }

    fn reset_process(&mut self) {
        self.queue.reset();
        self.thread_indices.clear();
    }

    /// Ask LLDB to quit, wait a bounded time, then kill it.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.send_line("quit");
        self.closed = true;
        let deadline = Instant::now() + self.timeouts.quit;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(self.timeouts.read_slice),
                _ => break,
            }
        }
        log::warn!("lldb did not exit in time; killing it");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for LldbRepl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn step_command(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Over => "thread step-over",
        StepKind::Into => "thread step-in",
        StepKind::Out => "thread step-out",
    }
}

impl Backend for LldbRepl {
    fn create_target(&mut self, path: &Path) -> Result<()> {
        let cmd = format!("target create {}", quote_arg(&path.to_string_lossy()));
        let out = self.exec(&cmd)?;
        match parse_target_created(&out.lines) {
            Ok(arch) => {
                log::info!("target {} ({arch})", path.display());
                Ok(())
            }
            Err(message) => Err(DebugError::Command { command: cmd, message }),
        }
    }

    fn delete_target(&mut self) -> Result<()> {
        self.reset_process();
        self.exec_checked("target delete")?;
        Ok(())
    }

    fn launch(&mut self, args: &[String]) -> Result<u32> {
        let mut cmd = String::from("process launch");
        if !args.is_empty() {
            cmd.push_str(" --");
            for a in args {
                cmd.push(' ');
                cmd.push_str(&quote_arg(a));
            }
        }
        self.queue.listening = true;
        let out = match self.exec_checked(&cmd) {
            Ok(out) => out,
            Err(e) => {
                self.reset_process();
                return Err(e);
            }
        };
        match out.lines.iter().find_map(|l| parse_process_event(l)) {
            Some((pid, _)) => Ok(pid),
            None => {
                self.reset_process();
                Err(DebugError::Command {
                    command: cmd,
                    message: "no process id in launch response".to_string(),
                })
            }
        }
    }

    fn attach(&mut self, target: &AttachTarget) -> Result<u32> {
        let cmd = match target {
            AttachTarget::Pid(pid) => format!("process attach --pid {pid}"),
            AttachTarget::Name(name) => format!("process attach --name {}", quote_arg(name)),
        };
        self.queue.listening = true;
        let out = match self.exec_checked(&cmd) {
            Ok(out) => out,
            Err(e) => {
                self.reset_process();
                return Err(e);
            }
        };
        match out.lines.iter().find_map(|l| parse_process_event(l)) {
            Some((pid, _)) => Ok(pid),
            None => match target {
                AttachTarget::Pid(pid) => Ok(*pid),
                AttachTarget::Name(_) => {
                    self.reset_process();
                    Err(DebugError::Command {
                        command: cmd,
                        message: "no process id in attach response".to_string(),
                    })
                }
            },
        }
    }

    fn detach(&mut self) -> Result<()> {
        self.exec_checked("process detach")?;
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.exec_checked("process kill")?;
        Ok(())
    }

    fn interrupt(&mut self) -> Result<()> {
        self.exec_checked("process interrupt")?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.exec_checked("process continue")?;
        Ok(())
    }

    fn step(&mut self, kind: StepKind) -> Result<()> {
        self.exec_checked(step_command(kind))?;
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<State>> {
        if self.queue.is_empty() && !self.closed {
            if let Some(lines) = self.read_chunk()? {
                let lines: Vec<String> = lines
                    .into_iter()
                    .filter(|l| parse_sync_token(l).is_none())
                    .collect();
                self.queue.absorb(&lines);
            }
        }
        Ok(self.queue.pop())
    }

    fn process_state(&mut self) -> Result<State> {
        let out = self.query("process status")?;
        if let Some(state) = out
            .lines
            .iter()
            .find_map(|l| parse_process_event(l))
            .map(|(_, s)| s)
        {
            let crashed = out
                .lines
                .iter()
                .any(|l| classify_line(l) == LineKind::CrashReason);
            return Ok(if state == State::Stopped && crashed {
                State::Crashed
            } else {
                state
            });
        }
        match out.error() {
            Some(message) => Err(DebugError::Command {
                command: out.command.clone(),
                message: message.to_string(),
            }),
            None => Ok(State::Invalid),
        }
    }

    fn backtrace(&mut self) -> Result<Vec<ThreadRecord>> {
        let out = self.exec_checked("thread backtrace all")?;
        let threads = parse_backtrace(&out.lines);
        self.remember_threads(&threads);
        Ok(threads)
    }

    fn selected_thread_id(&mut self) -> Result<Option<u64>> {
        let out = self.exec("thread info")?;
        if out.error().is_some() {
            return Ok(None);
        }
        Ok(out.lines.iter().find_map(|l| parse_thread_line(l)).map(|t| t.id))
    }

    fn select_thread(&mut self, id: u64) -> Result<()> {
        let index = self.thread_index(id)?;
        self.exec_checked(&format!("thread select {index}"))?;
        Ok(())
    }

    fn select_frame(&mut self, index: u32) -> Result<()> {
        self.exec_checked(&format!("frame select {index}"))?;
        Ok(())
    }

    fn disassemble_selected_frame(&mut self) -> Result<String> {
        let out = self.exec_checked("disassemble --frame")?;
        Ok(out.text())
    }

    fn locals(&mut self) -> Result<Vec<Variable>> {
        let out = self.query("frame variable")?;
        if let Some(message) = out.error() {
            return Err(DebugError::Command {
                command: out.command.clone(),
                message: message.to_string(),
            });
        }
        Ok(parse_variables(&out.lines))
    }

    fn create_breakpoint(&mut self, path: &str, line: u32) -> Result<BreakpointAck> {
        let cmd = format!("breakpoint set --file {} --line {line}", quote_arg(path));
        let out = self.exec(&cmd)?;
        parse_breakpoint_ack(&out.lines)
            .map_err(|message| DebugError::Command { command: cmd, message })
    }

    fn create_function_breakpoint(&mut self, name: &str) -> Result<BreakpointAck> {
        let cmd = format!("breakpoint set --name {}", quote_arg(name));
        let out = self.exec(&cmd)?;
        parse_breakpoint_ack(&out.lines)
            .map_err(|message| DebugError::Command { command: cmd, message })
    }

    fn breakpoint_locations(&mut self, id: u32) -> Result<u32> {
        let cmd = format!("breakpoint list {id}");
        let out = self.exec_checked(&cmd)?;
        parse_breakpoint_locations(&out.lines).ok_or(DebugError::Command {
            command: cmd,
            message: "no location count in response".to_string(),
        })
    }

    fn delete_breakpoint(&mut self, id: u32) -> Result<()> {
        self.exec_checked(&format!("breakpoint delete {id}"))?;
        Ok(())
    }

    fn delete_all_breakpoints(&mut self) -> Result<()> {
        self.exec_checked("breakpoint delete --force")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRASH_LINE: &str = "* thread #1: tid = 0x1c03, 0x0000000000401136 demo`main + 4 at /src/main.c:5:3, stop reason = signal SIGSEGV: invalid address (fault address: 0x0)";

    #[test]
    fn crash_reason_upgrades_queued_stop() {
        let mut queue = EventQueue {
            listening: true,
            ..EventQueue::default()
        };
        queue.absorb(&["Process 7 stopped", CRASH_LINE]);
        assert_eq!(queue.pop(), Some(State::Crashed));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn crash_reason_after_delivered_stop_follows_up() {
        let mut queue = EventQueue {
            listening: true,
            ..EventQueue::default()
        };
        queue.absorb(&["Process 7 stopped"]);
        assert_eq!(queue.pop(), Some(State::Stopped));
        // the thread line came in a later read
        queue.absorb(&[CRASH_LINE]);
        assert_eq!(queue.pop(), Some(State::Crashed));

        // a backtrace repeating the reason is not a new crash
        queue.absorb(&[CRASH_LINE]);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn answers_do_not_reraise_a_delivered_stop() {
        let mut queue = EventQueue {
            listening: true,
            ..EventQueue::default()
        };
        queue.absorb(&["Process 7 stopped"]);
        assert_eq!(queue.pop(), Some(State::Stopped));
        queue.settle();
        queue.absorb(&[CRASH_LINE]);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn events_ignored_until_listening() {
        let mut queue = EventQueue::default();
        queue.absorb(&["Process 7 stopped"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn echo_splits_preamble_from_answer() {
        let lines = vec![
            "Process 7 stopped".to_string(),
            "process status".to_string(),
            "Process 7 stopped".to_string(),
        ];
        let (preamble, answer) = split_echo(lines, "process status");
        assert_eq!(preamble, vec!["Process 7 stopped".to_string()]);
        assert_eq!(answer, vec!["Process 7 stopped".to_string()]);

        let (preamble, answer) = split_echo(vec!["Breakpoint 1: 2 locations.".to_string()], "b main");
        assert!(preamble.is_empty());
        assert_eq!(answer.len(), 1);
    }
}
