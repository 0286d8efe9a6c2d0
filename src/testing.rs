//! In-memory backend for controller tests.

use crate::backend::{
    AttachTarget, Backend, BreakpointAck, FrameRecord, State, StepKind, ThreadRecord, Variable,
};
use crate::error::{DebugError, Result};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;

pub(crate) fn frame(index: u32, symbol: &str, file: &str, line: u32) -> FrameRecord {
    FrameRecord {
        index,
        pc: Some(0x4000 + index as u64 * 0x10),
        module: Some("demo".to_string()),
        symbol: Some(symbol.to_string()),
        file: Some(file.to_string()),
        line: Some(line),
        column: Some(1),
        ..FrameRecord::default()
    }
}

pub(crate) fn thread(index: u32, id: u64, selected: bool, frames: Vec<FrameRecord>) -> ThreadRecord {
    ThreadRecord {
        index,
        id,
        selected,
        stop_reason: None,
        frames,
    }
}

fn failure(command: &str) -> DebugError {
    DebugError::Command {
        command: command.to_string(),
        message: "scripted failure".to_string(),
    }
}

/// Events are released in stages: each stage becomes visible only after a
/// poll found the queue empty, like output trickling in from a real process.
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    pub events: VecDeque<State>,
    pub stages: VecDeque<Vec<State>>,
    /// Number of events handed out so far.
    pub delivered: usize,
    pub threads: Vec<ThreadRecord>,
    pub calls: Vec<String>,
    pub backtrace_calls: usize,
    pub fail_target: bool,
    pub fail_launch: bool,
    pub fail_attach: bool,
    pub fail_select_frame: bool,
    /// Returned by `locals()` for whichever frame is selected.
    pub variables: Vec<Variable>,
    pub pending_paths: HashSet<String>,
    pub failing_paths: HashSet<String>,
    pub breakpoints: BTreeMap<u32, (String, u32)>,
    next_breakpoint: u32,
}

impl ScriptedBackend {
    pub const LAUNCH_PID: u32 = 4242;
    pub const ATTACH_PID: u32 = 5150;

    pub fn stage(&mut self, events: &[State]) {
        self.stages.push_back(events.to_vec());
    }

    fn selected_thread_mut(&mut self) -> Option<&mut ThreadRecord> {
        self.threads.iter_mut().find(|t| t.selected)
    }
}

impl Backend for ScriptedBackend {
    fn create_target(&mut self, path: &Path) -> Result<()> {
        self.calls.push(format!("create_target {}", path.display()));
        if self.fail_target {
            return Err(failure("target create"));
        }
        Ok(())
    }

    fn delete_target(&mut self) -> Result<()> {
        self.calls.push("delete_target".to_string());
        self.breakpoints.clear();
        Ok(())
    }

    fn launch(&mut self, _args: &[String]) -> Result<u32> {
        self.calls.push("launch".to_string());
        if self.fail_launch {
            return Err(failure("process launch"));
        }
        Ok(Self::LAUNCH_PID)
    }

    fn attach(&mut self, target: &AttachTarget) -> Result<u32> {
        self.calls.push(format!("attach {target}"));
        if self.fail_attach {
            return Err(failure("process attach"));
        }
        self.events.push_back(State::Stopped);
        Ok(match target {
            AttachTarget::Pid(pid) => *pid,
            AttachTarget::Name(_) => Self::ATTACH_PID,
        })
    }

    fn detach(&mut self) -> Result<()> {
        self.calls.push("detach".to_string());
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.calls.push("kill".to_string());
        self.events.push_back(State::Exited);
        Ok(())
    }

    fn interrupt(&mut self) -> Result<()> {
        self.calls.push("interrupt".to_string());
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.calls.push("resume".to_string());
        Ok(())
    }

    fn step(&mut self, kind: StepKind) -> Result<()> {
        self.calls.push(format!("step {kind:?}"));
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<State>> {
        if let Some(state) = self.events.pop_front() {
            self.delivered += 1;
            return Ok(Some(state));
        }
        if let Some(stage) = self.stages.pop_front() {
            self.events.extend(stage);
        }
        Ok(None)
    }

    fn process_state(&mut self) -> Result<State> {
        Ok(State::Stopped)
    }

    fn backtrace(&mut self) -> Result<Vec<ThreadRecord>> {
        self.backtrace_calls += 1;
        Ok(self.threads.clone())
    }

    fn selected_thread_id(&mut self) -> Result<Option<u64>> {
        Ok(self.threads.iter().find(|t| t.selected).map(|t| t.id))
    }

    fn select_thread(&mut self, id: u64) -> Result<()> {
        self.calls.push(format!("select_thread {id}"));
        if !self.threads.iter().any(|t| t.id == id) {
            return Err(DebugError::InvalidThread(id));
        }
        for t in self.threads.iter_mut() {
            t.selected = t.id == id;
        }
        Ok(())
    }

    fn select_frame(&mut self, index: u32) -> Result<()> {
        self.calls.push(format!("select_frame {index}"));
        if self.fail_select_frame {
            return Err(failure("frame select"));
        }
        let Some(t) = self.selected_thread_mut() else {
            return Err(DebugError::InvalidFrame);
        };
        if !t.frames.iter().any(|f| f.index == index) {
            return Err(DebugError::InvalidFrame);
        }
        for f in t.frames.iter_mut() {
            f.selected = f.index == index;
        }
        Ok(())
    }

    fn disassemble_selected_frame(&mut self) -> Result<String> {
        Ok("nop".to_string())
    }

    fn locals(&mut self) -> Result<Vec<Variable>> {
        Ok(self.variables.clone())
    }

    fn create_breakpoint(&mut self, path: &str, line: u32) -> Result<BreakpointAck> {
        self.calls.push(format!("create_breakpoint {path}:{line}"));
        if self.failing_paths.contains(path) {
            return Err(failure("breakpoint set"));
        }
        self.next_breakpoint += 1;
        let id = self.next_breakpoint;
        self.breakpoints.insert(id, (path.to_string(), line));
        if self.pending_paths.contains(path) {
            Ok(BreakpointAck::Pending { id })
        } else {
            Ok(BreakpointAck::Resolved { id, locations: 1 })
        }
    }

    fn create_function_breakpoint(&mut self, name: &str) -> Result<BreakpointAck> {
        self.calls.push(format!("create_function_breakpoint {name}"));
        if self.failing_paths.contains(name) {
            return Err(failure("breakpoint set"));
        }
        self.next_breakpoint += 1;
        let id = self.next_breakpoint;
        self.breakpoints.insert(id, (name.to_string(), 0));
        if self.pending_paths.contains(name) {
            Ok(BreakpointAck::Pending { id })
        } else {
            Ok(BreakpointAck::Resolved { id, locations: 1 })
        }
    }

    fn breakpoint_locations(&mut self, id: u32) -> Result<u32> {
        let (path, _) = self
            .breakpoints
            .get(&id)
            .ok_or_else(|| failure("breakpoint list"))?;
        Ok(if self.pending_paths.contains(path) { 0 } else { 1 })
    }

    fn delete_breakpoint(&mut self, id: u32) -> Result<()> {
        self.calls.push(format!("delete_breakpoint {id}"));
        self.breakpoints
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| failure("breakpoint delete"))
    }

    fn delete_all_breakpoints(&mut self) -> Result<()> {
        self.calls.push("delete_all_breakpoints".to_string());
        self.breakpoints.clear();
        Ok(())
    }
}
