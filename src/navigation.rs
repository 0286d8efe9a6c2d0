use crate::backend::Backend;
use crate::editor::Editor;
use crate::error::{DebugError, Result};
use crate::model::NavigationTarget;
use crate::session::Controller;

/// What a breakpoint toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    /// Added; LLDB accepted it but has no location for it yet.
    Pending,
    Removed,
}

impl<B: Backend> Controller<B> {
    /// Make `(thread_id, frame_index)` the debugger's selection.
    ///
    /// The thread is switched only when it differs, the frame only when it
    /// differs or the thread changed. Returns whether anything changed; the
    /// backtrace is rebuilt only then.
    pub fn select_frame(&mut self, thread_id: u64, frame_index: u32) -> Result<bool> {
        self.live_session()?;
        let thread = self
            .backtrace
            .find_thread(thread_id)
            .ok_or(DebugError::InvalidThread(thread_id))?;
        thread.frame(frame_index).ok_or(DebugError::InvalidFrame)?;

        let current_thread = self.backtrace.selected_thread().map(|t| t.id);
        let current_frame = self.backtrace.selected_frame().map(|f| f.index);
        let thread_changed = current_thread != Some(thread_id);
        let frame_changed = thread_changed || current_frame != Some(frame_index);

        let backend = self.backend()?;
        if thread_changed {
            backend.select_thread(thread_id)?;
        }
        if frame_changed {
            if let Err(e) = backend.select_frame(frame_index) {
                // the thread switch already happened; follow LLDB's focus
                if thread_changed {
                    if let Err(re) = self.rebuild() {
                        log::debug!("rebuild after failed frame select: {re}");
                    }
                }
                return Err(e);
            }
            self.rebuild()?;
        }
        self.update_source();
        Ok(frame_changed)
    }

    /// Act on a backtrace row: threads fold, frames get selected.
    pub fn navigate(&mut self, target: Option<NavigationTarget>) -> Result<bool> {
        match target {
            None => Err(DebugError::InvalidFrame),
            Some(NavigationTarget::Thread { id }) => {
                self.backtrace.fold(id).ok_or(DebugError::InvalidThread(id))?;
                Ok(false)
            }
            Some(NavigationTarget::Frame { thread_id, index }) => {
                self.select_frame(thread_id, index)
            }
        }
    }

    /// Select the caller of the current frame. False at the outermost frame.
    pub fn frame_up(&mut self) -> Result<bool> {
        self.move_frame(1)
    }

    /// Select the callee of the current frame. False at frame 0.
    pub fn frame_down(&mut self) -> Result<bool> {
        self.move_frame(-1)
    }

    fn move_frame(&mut self, delta: i64) -> Result<bool> {
        self.live_session()?;
        let thread = self.backtrace.selected_thread().ok_or(DebugError::InvalidFrame)?;
        let pos = thread
            .frames
            .iter()
            .position(|f| f.selected)
            .ok_or(DebugError::InvalidFrame)?;
        let Some(next) = pos
            .checked_add_signed(delta as isize)
            .and_then(|p| thread.frames.get(p))
        else {
            return Ok(false);
        };
        let (tid, index) = (thread.id, next.index);
        self.select_frame(tid, index)
    }

    pub fn thread_next(&mut self) -> Result<bool> {
        self.move_thread(1)
    }

    pub fn thread_previous(&mut self) -> Result<bool> {
        self.move_thread(-1)
    }

    fn move_thread(&mut self, delta: i64) -> Result<bool> {
        self.live_session()?;
        let threads = self.backtrace.threads();
        let pos = threads
            .iter()
            .position(|t| t.selected)
            .ok_or(DebugError::InvalidFrame)?;
        let Some(next) = pos
            .checked_add_signed(delta as isize)
            .and_then(|p| threads.get(p))
        else {
            return Ok(false);
        };
        let Some(frame) = next.frames.first() else {
            return Ok(false);
        };
        let (tid, index) = (next.id, frame.index);
        self.select_frame(tid, index)
    }

    /// Toggle the breakpoint at `location`, or at the editor's cursor when
    /// `None`. A cursor in a modified buffer is rejected.
    pub fn toggle_breakpoint<E: Editor + ?Sized>(
        &mut self,
        location: Option<(&str, u32)>,
        editor: &mut E,
    ) -> Result<Toggle> {
        let (path, line) = match location {
            Some((path, line)) => (path.to_string(), line),
            None => {
                let cursor = editor
                    .cursor_location()
                    .ok_or(DebugError::InvalidArguments("no cursor location"))?;
                if cursor.modified {
                    return Err(DebugError::UnsavedChanges);
                }
                (cursor.path, cursor.line)
            }
        };
        let live = self.is_live();

        if let Some(existing) = self.breakpoints.get(&path, line).cloned() {
            if let (true, Some(id)) = (live, existing.id) {
                self.backend()?.delete_breakpoint(id)?;
            }
            self.breakpoints.delete(&existing.path, existing.line);
            editor.unplace_sign(&existing.path, existing.line);
            log::info!("breakpoint {}:{} removed", existing.path, existing.line);
            return Ok(Toggle::Removed);
        }

        self.breakpoints.add(&path, line);
        editor.place_sign(&path, line);
        if !live {
            return Ok(Toggle::Added);
        }

        let created = match self.backend.as_mut() {
            Some(backend) => backend.create_breakpoint(&path, line),
            None => Err(DebugError::NotInitialized),
        };
        match created {
            Ok(ack) => {
                let Some(bp) = self.breakpoints.get_mut(&path, line) else {
                    return Ok(Toggle::Added);
                };
                bp.mark_applied(ack);
                Ok(if bp.pending {
                    Toggle::Pending
                } else {
                    Toggle::Added
                })
            }
            Err(e) => {
                self.breakpoints.delete(&path, line);
                editor.unplace_sign(&path, line);
                Err(DebugError::BreakpointCreation {
                    path,
                    line,
                    reason: e.reason(),
                })
            }
        }
    }

    /// Toggle a breakpoint on every function called `name`.
    pub fn toggle_function_breakpoint(&mut self, name: &str) -> Result<Toggle> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DebugError::InvalidArguments("empty function name"));
        }
        let live = self.is_live();

        if let Some(existing) = self.breakpoints.get_function(name).cloned() {
            if let (true, Some(id)) = (live, existing.id) {
                self.backend()?.delete_breakpoint(id)?;
            }
            self.breakpoints.delete_function(name);
            log::info!("breakpoint on {name} removed");
            return Ok(Toggle::Removed);
        }

        self.breakpoints.add_function(name);
        if !live {
            return Ok(Toggle::Added);
        }
        let created = match self.backend.as_mut() {
            Some(backend) => backend.create_function_breakpoint(name),
            None => Err(DebugError::NotInitialized),
        };
        match created {
            Ok(ack) => {
                let Some(bp) = self.breakpoints.get_function_mut(name) else {
                    return Ok(Toggle::Added);
                };
                bp.mark_applied(ack);
                Ok(if bp.pending {
                    Toggle::Pending
                } else {
                    Toggle::Added
                })
            }
            Err(e) => {
                self.breakpoints.delete_function(name);
                Err(DebugError::BreakpointCreation {
                    path: name.to_string(),
                    line: 0,
                    reason: e.reason(),
                })
            }
        }
    }

    /// Remove every breakpoint from the debugger, the registry and the gutter.
    pub fn clear_breakpoints<E: Editor + ?Sized>(&mut self, editor: &mut E) -> Result<usize> {
        if self.is_live() && self.breakpoints.any_applied() {
            self.backend()?.delete_all_breakpoints()?;
        }
        let count = self.breakpoints.len();
        for bp in self.breakpoints.iter() {
            editor.unplace_sign(&bp.path, bp.line);
        }
        self.breakpoints.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::State;
    use crate::config::Timeouts;
    use crate::editor::{CursorLocation, SignBook};
    use crate::model::SourceLocation;
    use crate::testing::{frame, thread, ScriptedBackend};
    use std::path::Path;
    use std::time::Duration;

    fn stopped() -> Controller<ScriptedBackend> {
        let mut backend = ScriptedBackend::default();
        backend.threads = vec![
            thread(
                1,
                100,
                true,
                vec![
                    frame(0, "leaf", "/src/main.c", 3),
                    frame(1, "middle", "/src/main.c", 9),
                    frame(2, "main", "/src/main.c", 20),
                ],
            ),
            thread(2, 200, false, vec![frame(0, "worker", "/src/w.c", 7)]),
        ];
        let timeouts = Timeouts {
            poll_interval: Duration::from_millis(1),
            ..Timeouts::default()
        };
        let mut ctl = Controller::new(Some(backend), timeouts);
        ctl.launch(Path::new("/bin/demo"), &[]).unwrap();
        ctl.backend_mut().unwrap().stage(&[State::Stopped]);
        ctl.refresh(Duration::from_millis(50)).unwrap();
        ctl
    }

    fn rebuilds(ctl: &mut Controller<ScriptedBackend>) -> usize {
        ctl.backend_mut().unwrap().backtrace_calls
    }

    #[test]
    fn redundant_selection_does_not_rebuild() {
        let mut ctl = stopped();
        let before = rebuilds(&mut ctl);
        assert!(!ctl.select_frame(100, 0).unwrap());
        assert_eq!(rebuilds(&mut ctl), before);
        assert!(!ctl
            .backend_mut()
            .unwrap()
            .calls
            .iter()
            .any(|c| c.starts_with("select_")));
    }

    #[test]
    fn frame_change_in_same_thread() {
        let mut ctl = stopped();
        let before = rebuilds(&mut ctl);
        assert!(ctl.select_frame(100, 2).unwrap());
        assert_eq!(rebuilds(&mut ctl), before + 1);
        let calls = &ctl.backend_mut().unwrap().calls;
        assert!(calls.iter().any(|c| c == "select_frame 2"));
        assert!(!calls.iter().any(|c| c.starts_with("select_thread")));
        assert_eq!(ctl.backtrace().selected_frame().map(|f| f.index), Some(2));
        assert_eq!(
            ctl.source_location(),
            Some(&SourceLocation::Source {
                path: "/src/main.c".to_string(),
                line: 20,
                column: 1
            })
        );
    }

    #[test]
    fn thread_change_selects_both() {
        let mut ctl = stopped();
        assert!(ctl.select_frame(200, 0).unwrap());
        let calls = &ctl.backend_mut().unwrap().calls;
        assert!(calls.iter().any(|c| c == "select_thread 200"));
        assert!(calls.iter().any(|c| c == "select_frame 0"));
        assert_eq!(ctl.backtrace().selected_thread().map(|t| t.id), Some(200));
    }

    #[test]
    fn failed_frame_select_follows_the_new_thread() {
        let mut ctl = stopped();
        let before = rebuilds(&mut ctl);
        ctl.backend_mut().unwrap().fail_select_frame = true;
        assert!(ctl.select_frame(200, 0).is_err());
        assert_eq!(rebuilds(&mut ctl), before + 1);
        assert_eq!(ctl.backtrace().selected_thread().map(|t| t.id), Some(200));
        assert_eq!(
            ctl.source_location().and_then(|l| l.path()),
            Some("/src/w.c")
        );
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let mut ctl = stopped();
        assert!(matches!(
            ctl.select_frame(999, 0),
            Err(DebugError::InvalidThread(999))
        ));
        assert!(matches!(
            ctl.select_frame(100, 7),
            Err(DebugError::InvalidFrame)
        ));
        assert!(matches!(ctl.navigate(None), Err(DebugError::InvalidFrame)));
    }

    #[test]
    fn navigate_folds_threads_without_debugger_calls() {
        let mut ctl = stopped();
        let calls = ctl.backend_mut().unwrap().calls.len();
        assert!(ctl.backtrace().is_expanded(100));
        assert!(!ctl
            .navigate(Some(NavigationTarget::Thread { id: 100 }))
            .unwrap());
        assert!(!ctl.backtrace().is_expanded(100));
        assert_eq!(ctl.backend_mut().unwrap().calls.len(), calls);

        assert!(ctl
            .navigate(Some(NavigationTarget::Frame {
                thread_id: 100,
                index: 1
            }))
            .unwrap());
    }

    #[test]
    fn relative_movement_stops_at_the_ends() {
        let mut ctl = stopped();
        assert!(!ctl.frame_down().unwrap());
        assert!(ctl.frame_up().unwrap());
        assert!(ctl.frame_up().unwrap());
        assert!(!ctl.frame_up().unwrap());
        assert_eq!(ctl.backtrace().selected_frame().map(|f| f.index), Some(2));

        assert!(!ctl.thread_previous().unwrap());
        assert!(ctl.thread_next().unwrap());
        assert_eq!(ctl.backtrace().selected_thread().map(|t| t.id), Some(200));
        assert!(!ctl.thread_next().unwrap());
    }

    #[test]
    fn toggle_from_cursor_rejects_unsaved_buffer() {
        let mut ctl = stopped();
        let mut book = SignBook::new();
        book.set_cursor(Some(CursorLocation {
            path: "/src/main.c".to_string(),
            line: 5,
            modified: true,
        }));
        assert!(matches!(
            ctl.toggle_breakpoint(None, &mut book),
            Err(DebugError::UnsavedChanges)
        ));
        assert!(ctl.breakpoints().is_empty());

        book.set_cursor(Some(CursorLocation {
            path: "/src/main.c".to_string(),
            line: 5,
            modified: false,
        }));
        assert_eq!(ctl.toggle_breakpoint(None, &mut book).unwrap(), Toggle::Added);
        assert_eq!(book.placed_signs("/src/main.c"), vec![5]);
        assert!(ctl.breakpoints().get("/src/main.c", 5).unwrap().applied);
    }

    #[test]
    fn toggle_twice_removes_from_debugger() {
        let mut ctl = stopped();
        let mut book = SignBook::new();
        assert_eq!(
            ctl.toggle_breakpoint(Some(("/src/main.c", 9)), &mut book)
                .unwrap(),
            Toggle::Added
        );
        let id = ctl.breakpoints().get("/src/main.c", 9).unwrap().id.unwrap();
        assert_eq!(
            ctl.toggle_breakpoint(Some(("main.c", 9)), &mut book)
                .unwrap(),
            Toggle::Removed
        );
        assert!(ctl.breakpoints().get("/src/main.c", 9).is_none());
        // the sign placed under the full path goes too
        assert_eq!(book.signs().count(), 0);
        let calls = &ctl.backend_mut().unwrap().calls;
        assert!(calls.iter().any(|c| *c == format!("delete_breakpoint {id}")));
    }

    #[test]
    fn function_breakpoints_toggle_and_roll_back() {
        let mut ctl = stopped();
        assert_eq!(ctl.toggle_function_breakpoint("worker").unwrap(), Toggle::Added);
        let id = ctl.breakpoints().get_function("worker").unwrap().id.unwrap();
        assert!(ctl
            .backend_mut()
            .unwrap()
            .calls
            .iter()
            .any(|c| c == "create_function_breakpoint worker"));

        assert_eq!(ctl.toggle_function_breakpoint("worker").unwrap(), Toggle::Removed);
        assert!(ctl.breakpoints().get_function("worker").is_none());
        let calls = &ctl.backend_mut().unwrap().calls;
        assert!(calls.iter().any(|c| *c == format!("delete_breakpoint {id}")));

        ctl.backend_mut()
            .unwrap()
            .failing_paths
            .insert("missing".to_string());
        assert!(matches!(
            ctl.toggle_function_breakpoint("missing"),
            Err(DebugError::BreakpointCreation { .. })
        ));
        assert!(ctl.breakpoints().get_function("missing").is_none());
        assert!(matches!(
            ctl.toggle_function_breakpoint("  "),
            Err(DebugError::InvalidArguments(_))
        ));
    }

    #[test]
    fn failed_creation_rolls_back() {
        let mut ctl = stopped();
        ctl.backend_mut()
            .unwrap()
            .failing_paths
            .insert("/src/gen.c".to_string());
        let mut book = SignBook::new();
        assert!(matches!(
            ctl.toggle_breakpoint(Some(("/src/gen.c", 2)), &mut book),
            Err(DebugError::BreakpointCreation { line: 2, .. })
        ));
        assert!(ctl.breakpoints().get("/src/gen.c", 2).is_none());
        assert!(book.placed_signs("/src/gen.c").is_empty());
    }

    #[test]
    fn pending_toggle_and_offline_toggle() {
        let mut ctl = stopped();
        ctl.backend_mut()
            .unwrap()
            .pending_paths
            .insert("/src/late.c".to_string());
        let mut book = SignBook::new();
        assert_eq!(
            ctl.toggle_breakpoint(Some(("/src/late.c", 1)), &mut book)
                .unwrap(),
            Toggle::Pending
        );

        let mut offline: Controller<ScriptedBackend> =
            Controller::new(Some(ScriptedBackend::default()), Timeouts::default());
        assert_eq!(
            offline
                .toggle_breakpoint(Some(("/src/a.c", 1)), &mut book)
                .unwrap(),
            Toggle::Added
        );
        assert!(!offline.breakpoints().get("/src/a.c", 1).unwrap().applied);
        assert!(offline.backend_mut().unwrap().calls.is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let mut ctl = stopped();
        let mut book = SignBook::new();
        ctl.toggle_breakpoint(Some(("/src/main.c", 3)), &mut book)
            .unwrap();
        ctl.toggle_breakpoint(Some(("/src/w.c", 7)), &mut book)
            .unwrap();
        assert_eq!(ctl.clear_breakpoints(&mut book).unwrap(), 2);
        assert!(ctl.breakpoints().is_empty());
        assert_eq!(book.signs().count(), 0);
        assert!(ctl.backend_mut().unwrap().breakpoints.is_empty());
    }
}
