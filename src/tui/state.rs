use crate::backend::Backend;
use crate::editor::{sync_signs, CursorLocation, Editor, SignBook};
use crate::logger::ConsoleBuffer;
use crate::model::{NavigationTarget, SourceLocation};
use crate::session::Controller;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PaneId {
    Source,
    Backtrace,
    Variables,
    Breakpoints,
    Console,
}

impl PaneId {
    pub fn next(self) -> Self {
        match self {
            PaneId::Source => PaneId::Backtrace,
            PaneId::Backtrace => PaneId::Variables,
            PaneId::Variables => PaneId::Breakpoints,
            PaneId::Breakpoints => PaneId::Console,
            PaneId::Console => PaneId::Source,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SourceViewState {
    pub filename: Option<PathBuf>,
    pub lines: Vec<String>,
    /// Line the selected frame is stopped at (1-based).
    pub current_line: Option<u32>,
    /// Line the user is on (1-based).
    pub cursor: u32,
    pub scroll_top: u32,
    /// Showing disassembly rather than a file.
    pub disassembly: Option<String>,
    loaded_mtime: Option<SystemTime>,
}

impl SourceViewState {
    pub fn load_file(&mut self, path: &Path) -> io::Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.lines = split_lines(&text);
        self.loaded_mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        self.filename = Some(path.to_path_buf());
        self.disassembly = None;
        self.cursor = 1;
        self.scroll_top = 0;
        Ok(())
    }

    pub fn show_disassembly(&mut self, symbol: &str, text: &str) {
        self.lines = split_lines(text);
        self.filename = None;
        self.loaded_mtime = None;
        self.disassembly = Some(symbol.to_string());
        self.current_line = Some(1);
        self.cursor = 1;
        self.scroll_top = 0;
    }

    /// The file changed on disk after it was loaded, so line numbers may be stale.
    pub fn is_modified(&self) -> bool {
        let Some(path) = &self.filename else {
            return false;
        };
        let now = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        match (self.loaded_mtime, now) {
            (Some(loaded), Some(now)) => now > loaded,
            _ => false,
        }
    }

    pub fn move_cursor(&mut self, delta: i32) {
        let max = self.lines.len().max(1) as i64;
        self.cursor = (self.cursor as i64 + delta as i64).clamp(1, max) as u32;
    }

    pub fn jump_to(&mut self, line: u32) {
        self.cursor = line.max(1);
        self.scroll_top = line.saturating_sub(1);
    }

    /// Keep the cursor inside a view `height` rows tall.
    pub fn keep_cursor_visible(&mut self, height: u32) {
        let idx = self.cursor.saturating_sub(1);
        if idx < self.scroll_top {
            self.scroll_top = idx;
        } else if height > 0 && idx >= self.scroll_top + height {
            self.scroll_top = idx + 1 - height;
        }
    }
}

pub struct AppState {
    pub focus: PaneId,
    pub source: SourceViewState,
    pub backtrace_selected: usize,
    pub breakpoint_selected: usize,
    /// First variable row shown.
    pub variables_top: usize,
    pub console_scroll: u16,
    pub console: ConsoleBuffer,
    signs: SignBook,
    last_generation: Option<u64>,
}

impl AppState {
    pub fn new(console: ConsoleBuffer) -> Self {
        Self {
            focus: PaneId::Source,
            source: SourceViewState::default(),
            backtrace_selected: 0,
            breakpoint_selected: 0,
            variables_top: 0,
            console_scroll: 0,
            console,
            signs: SignBook::new(),
            last_generation: None,
        }
    }

    /// Follow the controller after a rebuild: show the selected frame's code.
    pub fn sync_from<B: Backend>(&mut self, ctl: &Controller<B>) {
        let generation = ctl.backtrace().generation();
        if self.last_generation == Some(generation) {
            return;
        }
        self.last_generation = Some(generation);
        self.variables_top = 0;

        let rows = ctl.backtrace().rows();
        let selected_frame = rows
            .iter()
            .position(|r| r.selected && matches!(r.target, NavigationTarget::Frame { .. }));
        if let Some(pos) = selected_frame {
            self.backtrace_selected = pos;
        } else {
            self.backtrace_selected = self.backtrace_selected.min(rows.len().saturating_sub(1));
        }

        match ctl.source_location() {
            Some(SourceLocation::Source { path, line, .. }) => {
                self.open(path, ctl);
                self.source.current_line = Some(*line);
                self.source.jump_to(*line);
            }
            Some(SourceLocation::Disassembly { symbol, text, .. }) => {
                self.source.show_disassembly(symbol, text);
            }
            None => self.source.current_line = None,
        }
    }

    /// Load `path` into the source pane unless it is already showing, and
    /// place the registry's signs for it.
    pub fn open<B: Backend>(&mut self, path: &str, ctl: &Controller<B>) {
        let showing = self
            .source
            .filename
            .as_deref()
            .map(|p| p == Path::new(path))
            .unwrap_or(false);
        if showing && !self.source.is_modified() {
            return;
        }
        if let Err(e) = self.source.load_file(Path::new(path)) {
            log::warn!("cannot open {path}: {e}");
            self.source.lines.clear();
            self.source.filename = Some(PathBuf::from(path));
            return;
        }
        let placed = sync_signs(self, ctl.breakpoints(), path);
        log::debug!("opened {path} ({placed} breakpoint signs)");
    }

    pub fn has_sign(&self, path: &str, line: u32) -> bool {
        self.signs.placed_signs(path).contains(&line)
    }
}

impl Editor for AppState {
    fn cursor_location(&self) -> Option<CursorLocation> {
        let path = self.source.filename.as_ref()?;
        Some(CursorLocation {
            path: path.to_string_lossy().into_owned(),
            line: self.source.cursor,
            modified: self.source.is_modified(),
        })
    }

    fn place_sign(&mut self, path: &str, line: u32) {
        self.signs.place_sign(path, line);
    }

    fn unplace_sign(&mut self, path: &str, line: u32) {
        self.signs.unplace_sign(path, line);
    }

    fn placed_signs(&self, path: &str) -> Vec<u32> {
        self.signs.placed_signs(path)
    }
}

fn split_lines(s: &str) -> Vec<String> {
    s.lines().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::console_buffer;

    #[test]
    fn cursor_stays_in_bounds_and_visible() {
        let mut source = SourceViewState {
            lines: (1..=30).map(|i| format!("line {i}")).collect(),
            cursor: 1,
            ..SourceViewState::default()
        };
        source.move_cursor(-5);
        assert_eq!(source.cursor, 1);
        source.move_cursor(100);
        assert_eq!(source.cursor, 30);
        source.keep_cursor_visible(10);
        assert_eq!(source.scroll_top, 20);
        source.move_cursor(-29);
        source.keep_cursor_visible(10);
        assert_eq!(source.scroll_top, 0);
    }

    #[test]
    fn focus_ring_visits_every_pane() {
        let mut pane = PaneId::Source;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(pane);
            pane = pane.next();
        }
        assert_eq!(pane, PaneId::Source);
        assert!(seen.contains(&PaneId::Variables));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn no_cursor_location_without_a_file() {
        let mut app = AppState::new(console_buffer());
        assert_eq!(app.cursor_location(), None);
        app.source.show_disassembly("memcpy", "ret");
        assert_eq!(app.cursor_location(), None);
        assert_eq!(app.source.current_line, Some(1));
    }

    #[test]
    fn loaded_file_is_unmodified() {
        let dir = std::env::temp_dir().join(format!("lldb-nav-state-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("main.c");
        std::fs::write(&path, "int main() {\n  return 0;\n}\n").unwrap();

        let mut app = AppState::new(console_buffer());
        app.source.load_file(&path).unwrap();
        app.source.move_cursor(1);
        let cursor = app.cursor_location().unwrap();
        assert_eq!(cursor.line, 2);
        assert!(!cursor.modified);
        std::fs::remove_dir_all(&dir).ok();
    }
}
