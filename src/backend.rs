//! The seam between the controller and a concrete debugger connection.
//!
//! Everything crossing this boundary is a plain value: a backend that scrapes
//! the LLDB REPL and one that talks to a structured API produce the same
//! `ThreadRecord`/`FrameRecord`/`BreakpointAck` values, so nothing above it
//! cares which transport is active.

use crate::error::Result;
use std::fmt;
use std::path::Path;

/// Lifecycle state of a session, normalized from whatever the debugger reports.
///
/// `Invalid` is reserved for "nothing new within the poll window" and never
/// stands for a real process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Uninitialized,
    Initialized,
    Invalid,
    Unloaded,
    Connected,
    Attaching,
    Launching,
    Stopped,
    Running,
    Stepping,
    Crashed,
    Detached,
    Exited,
    Suspended,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::Initialized => "initialized",
            State::Invalid => "invalid",
            State::Unloaded => "unloaded",
            State::Connected => "connected",
            State::Attaching => "attaching",
            State::Launching => "launching",
            State::Stopped => "stopped",
            State::Running => "running",
            State::Stepping => "stepping",
            State::Crashed => "crashed",
            State::Detached => "detached",
            State::Exited => "exited",
            State::Suspended => "suspended",
        }
    }

    /// Map the verb LLDB prints after `Process <pid>` to a state.
    pub fn from_process_word(word: &str) -> Option<State> {
        let state = match word {
            "invalid" => State::Invalid,
            "unloaded" => State::Unloaded,
            "connected" => State::Connected,
            "attaching" => State::Attaching,
            "launching" => State::Launching,
            "stopped" => State::Stopped,
            "running" | "resuming" | "launched" => State::Running,
            "stepping" => State::Stepping,
            "crashed" => State::Crashed,
            "detached" => State::Detached,
            "exited" => State::Exited,
            "suspended" => State::Suspended,
            _ => return None,
        };
        Some(state)
    }

    /// States in which thread/frame queries and step requests are meaningful.
    pub fn is_halted(self) -> bool {
        matches!(self, State::Stopped | State::Stepping | State::Crashed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Exited | State::Detached)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Over,
    Into,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
    Pid(u32),
    Name(String),
}

impl fmt::Display for AttachTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachTarget::Pid(pid) => write!(f, "{pid}"),
            AttachTarget::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

/// One frame as reported by the debugger, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameRecord {
    pub index: u32,
    pub selected: bool,
    pub pc: Option<u64>,
    pub module: Option<String>,
    pub symbol: Option<String>,
    pub offset: Option<u64>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// One thread with its frames, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadRecord {
    pub index: u32,
    pub id: u64,
    pub selected: bool,
    pub stop_reason: Option<String>,
    pub frames: Vec<FrameRecord>,
}

/// One variable of the selected frame, as `frame variable` prints it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    /// Aggregates are folded onto one line.
    pub value: String,
}

/// Successful outcomes of a create-breakpoint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointAck {
    Resolved { id: u32, locations: u32 },
    /// Accepted, but no module containing the location is loaded yet.
    Pending { id: u32 },
}

impl BreakpointAck {
    pub fn id(&self) -> u32 {
        match *self {
            BreakpointAck::Resolved { id, .. } | BreakpointAck::Pending { id } => id,
        }
    }
}

/// A connection to one debugger instance.
///
/// Calls are synchronous request/response; asynchronous process state
/// changes are queued by the backend and handed out by `poll_event`.
pub trait Backend {
    fn create_target(&mut self, path: &Path) -> Result<()>;
    fn delete_target(&mut self) -> Result<()>;
    /// Spawn the target's process and start listening for its state changes.
    fn launch(&mut self, args: &[String]) -> Result<u32>;
    fn attach(&mut self, target: &AttachTarget) -> Result<u32>;
    fn detach(&mut self) -> Result<()>;
    fn kill(&mut self) -> Result<()>;
    fn interrupt(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn step(&mut self, kind: StepKind) -> Result<()>;

    /// Next queued state change, without blocking. `None` when the queue is empty.
    fn poll_event(&mut self) -> Result<Option<State>>;
    fn process_state(&mut self) -> Result<State>;

    fn backtrace(&mut self) -> Result<Vec<ThreadRecord>>;
    fn selected_thread_id(&mut self) -> Result<Option<u64>>;
    fn select_thread(&mut self, id: u64) -> Result<()>;
    fn select_frame(&mut self, index: u32) -> Result<()>;
    fn disassemble_selected_frame(&mut self) -> Result<String>;
    /// Arguments and locals of the selected frame.
    fn locals(&mut self) -> Result<Vec<Variable>>;

    fn create_breakpoint(&mut self, path: &str, line: u32) -> Result<BreakpointAck>;
    fn create_function_breakpoint(&mut self, name: &str) -> Result<BreakpointAck>;
    /// Number of resolved locations for an existing breakpoint.
    fn breakpoint_locations(&mut self, id: u32) -> Result<u32>;
    fn delete_breakpoint(&mut self, id: u32) -> Result<()>;
    fn delete_all_breakpoints(&mut self) -> Result<()>;
}
