//! Session lifecycle and the event poller.
//!
//! The `Controller` is the context object every operation goes through. It
//! owns the backend, the live `Session` (at most one), the backtrace model and
//! the breakpoint registry. Errors are returned before anything is mutated, so
//! a failed call leaves the controller as it was.

use crate::backend::{AttachTarget, Backend, State, StepKind, Variable};
use crate::config::Timeouts;
use crate::error::{DebugError, Result};
use crate::model::{BacktraceModel, BreakpointRegistry, SourceLocation};
use std::path::Path;
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingOp {
    #[default]
    Idle,
    Stepping,
}

/// One debug run, from launch/attach until quit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Executable path, or the pid/name attached to.
    pub target: String,
    pub pid: u32,
    pub state: State,
    pub pending: PendingOp,
}

pub struct Controller<B: Backend> {
    pub(crate) backend: Option<B>,
    pub(crate) session: Option<Session>,
    pub(crate) backtrace: BacktraceModel,
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) source: Option<SourceLocation>,
    /// Variables of the selected frame, refreshed with every rebuild.
    locals: Vec<Variable>,
    timeouts: Timeouts,
}

impl<B: Backend> Controller<B> {
    /// `backend` is `None` when the debugger could not be started; every
    /// session operation then fails with `NotInitialized`.
    pub fn new(backend: Option<B>, timeouts: Timeouts) -> Self {
        Self {
            backend,
            session: None,
            backtrace: BacktraceModel::new(),
            breakpoints: BreakpointRegistry::new(),
            source: None,
            locals: Vec::new(),
            timeouts,
        }
    }

    pub fn state(&self) -> State {
        match (&self.session, &self.backend) {
            (Some(s), _) => s.state,
            (None, Some(_)) => State::Initialized,
            (None, None) => State::Uninitialized,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn backtrace(&self) -> &BacktraceModel {
        &self.backtrace
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointRegistry {
        &mut self.breakpoints
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source.as_ref()
    }

    pub fn locals(&self) -> &[Variable] {
        &self.locals
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    /// True while a process is attached and has not exited or detached.
    pub fn is_live(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.state.is_terminal())
            .unwrap_or(false)
    }

    pub(crate) fn live_session(&self) -> Result<&Session> {
        match &self.session {
            Some(s) if !s.state.is_terminal() => Ok(s),
            _ => Err(DebugError::NoProcess),
        }
    }

    pub(crate) fn backend(&mut self) -> Result<&mut B> {
        self.backend.as_mut().ok_or(DebugError::NotInitialized)
    }

    /// Detach a session whose process already exited or detached, deleting
    /// its target. The caller puts it back if the new start fails.
    fn take_finished(&mut self) -> Option<Session> {
        if self.session.as_ref().map(|s| s.state.is_terminal()) != Some(true) {
            return None;
        }
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.delete_target() {
                log::debug!("target cleanup: {e}");
            }
        }
        self.session.take()
    }

    fn check_can_start(&mut self) -> Result<()> {
        if self.backend.is_none() {
            return Err(DebugError::NotInitialized);
        }
        if let Some(s) = &self.session {
            if !s.state.is_terminal() {
                return Err(DebugError::AlreadyAttached(s.pid));
            }
        }
        Ok(())
    }

    pub fn launch(&mut self, target: &Path, args: &[String]) -> Result<u32> {
        self.check_can_start()?;
        let path = target.display().to_string();
        let finished = self.take_finished();
        let Some(backend) = self.backend.as_mut() else {
            return Err(DebugError::NotInitialized);
        };

        if let Err(e) = backend.create_target(target) {
            self.session = finished;
            return Err(DebugError::TargetCreation {
                path,
                reason: e.reason(),
            });
        }

        let report = self.breakpoints.apply_all(backend);
        if !report.failed.is_empty() {
            log::warn!("{} breakpoint(s) could not be set", report.failed.len());
        }

        let pid = match backend.launch(args) {
            Ok(pid) => pid,
            Err(e) => {
                self.breakpoints.unset_all();
                if let Err(e) = backend.delete_target() {
                    log::debug!("target cleanup after failed launch: {e}");
                }
                self.session = finished;
                return Err(DebugError::Launch {
                    path,
                    reason: e.reason(),
                });
            }
        };

        log::info!("launched {path} as pid {pid}");
        self.backtrace.clear();
        self.source = None;
        self.locals.clear();
        self.session = Some(Session {
            target: path,
            pid,
            state: State::Running,
            pending: PendingOp::Idle,
        });
        Ok(pid)
    }

    /// Attach by pid or by process name; exactly one must be given.
    pub fn attach(&mut self, pid: Option<u32>, name: Option<&str>) -> Result<u32> {
        let target = match (pid, name) {
            (Some(pid), None) => AttachTarget::Pid(pid),
            (None, Some(name)) if !name.is_empty() => AttachTarget::Name(name.to_string()),
            _ => return Err(DebugError::InvalidArguments("exactly one of pid or name")),
        };
        self.check_can_start()?;
        let finished = self.take_finished();

        let Some(backend) = self.backend.as_mut() else {
            return Err(DebugError::NotInitialized);
        };
        let pid = match backend.attach(&target) {
            Ok(pid) => pid,
            Err(e) => {
                self.session = finished;
                return Err(DebugError::Attach {
                    target: target.to_string(),
                    reason: e.reason(),
                });
            }
        };
        self.backtrace.clear();
        self.source = None;
        self.locals.clear();

        let report = self.breakpoints.apply_all(backend);
        if !report.failed.is_empty() {
            log::warn!("{} breakpoint(s) could not be set", report.failed.len());
        }

        log::info!("attached to {target} (pid {pid})");
        self.session = Some(Session {
            target: target.to_string(),
            pid,
            state: State::Attaching,
            pending: PendingOp::Idle,
        });
        if let Err(e) = self.refresh(self.timeouts.events_fast) {
            log::warn!("refresh after attach failed: {e}");
        }
        Ok(pid)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.live_session()?;
        self.backend()?.interrupt()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.live_session()?;
        self.backend()?.resume()
    }

    pub fn step_over(&mut self) -> Result<()> {
        self.step(StepKind::Over)
    }

    pub fn step_into(&mut self) -> Result<()> {
        self.step(StepKind::Into)
    }

    pub fn step_out(&mut self) -> Result<()> {
        self.step(StepKind::Out)
    }

    fn step(&mut self, kind: StepKind) -> Result<()> {
        let state = self.live_session()?.state;
        if !state.is_halted() {
            return Err(DebugError::NotStopped(state));
        }
        self.backend()?.step(kind)?;
        if let Some(s) = self.session.as_mut() {
            s.pending = PendingOp::Stepping;
        }
        Ok(())
    }

    /// Kill the process and release the session. A no-op without a session.
    pub fn quit(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        if !session.state.is_terminal() {
            let quit_wait = self.timeouts.quit;
            let interval = self.timeouts.poll_interval;
            if let Some(backend) = self.backend.as_mut() {
                match backend.kill() {
                    Ok(()) => wait_for_exit(backend, quit_wait, interval),
                    Err(e) => log::warn!("kill failed: {e}"),
                }
            }
        }
        self.release();
        Ok(())
    }

    /// Leave the process running and release the session.
    pub fn detach(&mut self) -> Result<()> {
        self.live_session()?;
        self.backend()?.detach()?;
        self.release();
        Ok(())
    }

    /// Ask the debugger directly, bypassing the event queue.
    pub fn status(&mut self) -> Result<State> {
        self.live_session()?;
        self.backend()?.process_state()
    }

    fn release(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.delete_target() {
                log::debug!("target cleanup: {e}");
            }
        }
        if let Some(s) = self.session.take() {
            log::info!("session for {} released", s.target);
        }
        self.breakpoints.unset_all();
        self.backtrace.clear();
        self.source = None;
        self.locals.clear();
    }

    /// Observe the latest process state and bring the models up to date.
    ///
    /// Returns `Invalid` when nothing happened within `timeout`. While a step
    /// is pending, a `Running` or `Invalid` result is polled again, at most
    /// `max_repolls` more times.
    pub fn refresh(&mut self, timeout: std::time::Duration) -> Result<State> {
        if self.session.is_none() {
            return Err(DebugError::NoProcess);
        }
        let mut repolls = 0;
        let state = loop {
            let state = self.poll_pinned(timeout)?;
            let stepping = self.session.as_ref().map(|s| s.pending) == Some(PendingOp::Stepping);
            if stepping
                && matches!(state, State::Invalid | State::Running)
                && repolls < self.timeouts.max_repolls
            {
                repolls += 1;
                log::debug!("step still in flight ({state}), polling again");
                continue;
            }
            break state;
        };

        if state == State::Invalid {
            return Ok(state);
        }
        if let Some(s) = self.session.as_mut() {
            s.state = state;
        }
        match state {
            State::Stopped | State::Stepping | State::Crashed => {
                if let Some(s) = self.session.as_mut() {
                    s.pending = PendingOp::Idle;
                }
                self.rebuild()?;
                if let Some(backend) = self.backend.as_mut() {
                    self.breakpoints.resolve_pending(backend);
                }
                if state == State::Crashed {
                    log::warn!("process crashed");
                }
            }
            State::Exited | State::Detached => {
                log::info!("process {state}");
                self.backtrace.clear();
                self.source = None;
                self.locals.clear();
            }
            _ => {}
        }
        Ok(state)
    }

    /// One poll window with the selected thread re-pinned around it.
    fn poll_pinned(&mut self, timeout: std::time::Duration) -> Result<State> {
        let halted = self
            .session
            .as_ref()
            .map(|s| s.state.is_halted())
            .unwrap_or(false);
        let interval = self.timeouts.poll_interval;
        let backend = self.backend()?;
        let pinned = if halted {
            backend.selected_thread_id()?
        } else {
            None
        };
        let state = poll_events(backend, timeout, interval)?;
        if let Some(tid) = pinned {
            if state.is_halted() {
                if let Err(e) = backend.select_thread(tid) {
                    log::debug!("could not re-select thread {tid}: {e}");
                }
            }
        }
        Ok(state)
    }

    /// Replace the backtrace model from a fresh listing.
    pub(crate) fn rebuild(&mut self) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(DebugError::NotInitialized);
        };
        let records = backend.backtrace()?;
        self.backtrace.rebuild(records, || match backend.disassemble_selected_frame() {
            Ok(text) => Some(text),
            Err(e) => {
                log::debug!("disassembly unavailable: {e}");
                None
            }
        });
        // Same as `self.update_source()`, written on disjoint fields so `backend` stays borrowed.
        self.source = self.backtrace.selected_frame().map(SourceLocation::from_frame);
        self.locals = match backend.locals() {
            Ok(vars) => vars,
            Err(e) => {
                log::debug!("no variables for the selected frame: {e}");
                Vec::new()
            }
        };
        Ok(())
    }

    pub(crate) fn update_source(&mut self) {
        self.source = self.backtrace.selected_frame().map(SourceLocation::from_frame);
    }
}

/// Drain queued events; if none arrive, keep checking every `interval` until
/// `timeout`. The last drained event wins. Nothing within the window is `Invalid`.
pub fn poll_events<B: Backend + ?Sized>(
    backend: &mut B,
    timeout: std::time::Duration,
    interval: std::time::Duration,
) -> Result<State> {
    let deadline = Instant::now() + timeout;
    let mut state = State::Invalid;
    loop {
        let mut drained = false;
        while let Some(next) = backend.poll_event()? {
            state = next;
            drained = true;
        }
        let now = Instant::now();
        if drained || now >= deadline {
            return Ok(state);
        }
        thread::sleep(interval.min(deadline - now));
    }
}

fn wait_for_exit<B: Backend + ?Sized>(
    backend: &mut B,
    timeout: std::time::Duration,
    interval: std::time::Duration,
) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match poll_events(backend, remaining, interval) {
            Ok(s) if s.is_terminal() => return,
            Ok(State::Invalid) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("waiting for exit: {e}");
                return;
            }
        }
    }
    log::warn!("no exit confirmation from the debugger");
}
