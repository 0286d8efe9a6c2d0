use crate::backend::{FrameRecord, ThreadRecord};
use std::collections::BTreeSet;
use std::path::Path;

pub(crate) const UNKNOWN_SYMBOL: &str = "<unknown>";

/// Where a frame's code can be shown from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameCode {
    Source {
        path: String,
        line: u32,
        column: u32,
    },
    /// No usable source info. The text is only fetched for the selected frame.
    Disassembly { text: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u32,
    pub thread_id: u64,
    pub selected: bool,
    pub module: Option<String>,
    pub symbol: String,
    pub pc: Option<u64>,
    pub code: FrameCode,
}

impl Frame {
    fn from_record(thread_id: u64, record: FrameRecord) -> Self {
        let has_dir = record
            .file
            .as_deref()
            .and_then(|f| Path::new(f).parent())
            .map(|p| !p.as_os_str().is_empty())
            .unwrap_or(false);
        let code = match (&record.symbol, has_dir, &record.file) {
            (Some(_), true, Some(file)) => FrameCode::Source {
                path: file.clone(),
                line: record.line.unwrap_or(1),
                column: record.column.unwrap_or(0),
            },
            _ => FrameCode::Disassembly { text: None },
        };
        let symbol = record
            .symbol
            .filter(|s| !s.is_empty())
            .or_else(|| record.pc.map(|pc| format!("{pc:#x}")))
            .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string());
        Self {
            index: record.index,
            thread_id,
            selected: false,
            module: record.module,
            symbol,
            pc: record.pc,
            code,
        }
    }

    /// Function name usable with `breakpoint set --name`: the symbol without
    /// its argument list. `None` for a bare pc or an unknown symbol.
    pub fn function_name(&self) -> Option<&str> {
        if self.symbol.starts_with("0x") || self.symbol == UNKNOWN_SYMBOL {
            return None;
        }
        let name = match self.symbol.find('(') {
            Some(pos) => &self.symbol[..pos],
            None => &self.symbol,
        };
        Some(name.trim()).filter(|n| !n.is_empty())
    }

    pub fn disassembled(&self) -> bool {
        matches!(self.code, FrameCode::Disassembly { .. })
    }

    /// One-line description used by the backtrace views.
    pub fn describe(&self) -> String {
        match &self.code {
            FrameCode::Source { path, line, .. } => {
                let file = Path::new(path)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                format!("{} at {file}:{line}", self.symbol)
            }
            FrameCode::Disassembly { .. } => match &self.module {
                Some(module) => format!("{} [{module}]", self.symbol),
                None => self.symbol.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// LLDB's ordinal, for display only.
    pub index: u32,
    pub id: u64,
    pub selected: bool,
    pub stop_reason: Option<String>,
    pub frames: Vec<Frame>,
}

impl Thread {
    pub fn selected_frame(&self) -> Option<&Frame> {
        self.frames.iter().find(|f| f.selected)
    }

    pub fn frame(&self, index: u32) -> Option<&Frame> {
        self.frames.iter().find(|f| f.index == index)
    }
}

/// What a backtrace row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationTarget {
    Thread { id: u64 },
    Frame { thread_id: u64, index: u32 },
}

/// A rendered line of the backtrace view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceRow {
    pub text: String,
    pub selected: bool,
    pub target: NavigationTarget,
}

/// Threads and frames as of the last stop, plus which threads are folded open.
#[derive(Debug, Default)]
pub struct BacktraceModel {
    threads: Vec<Thread>,
    expanded: BTreeSet<u64>,
    generation: u64,
}

impl BacktraceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the model wholesale from a fresh listing.
    ///
    /// The selected thread is the one LLDB marked, else the first. Its selected
    /// frame is the marked one, else frame 0. `disassemble` is called at most
    /// once, and only when that frame has no source.
    pub fn rebuild<F>(&mut self, records: Vec<ThreadRecord>, disassemble: F)
    where
        F: FnOnce() -> Option<String>,
    {
        let selected_pos = records
            .iter()
            .position(|t| t.selected)
            .or(if records.is_empty() { None } else { Some(0) });

        let mut threads: Vec<Thread> = records
            .into_iter()
            .map(|record| {
                let marked_frame = record.frames.iter().position(|f| f.selected);
                let frames = record
                    .frames
                    .into_iter()
                    .map(|f| Frame::from_record(record.id, f))
                    .collect::<Vec<_>>();
                (record.index, record.id, record.stop_reason, frames, marked_frame)
            })
            .enumerate()
            .map(|(pos, (index, id, stop_reason, mut frames, marked))| {
                let selected = Some(pos) == selected_pos;
                if selected && !frames.is_empty() {
                    frames[marked.unwrap_or(0)].selected = true;
                }
                Thread {
                    index,
                    id,
                    selected,
                    stop_reason,
                    frames,
                }
            })
            .collect();

        if let Some(frame) = threads
            .iter_mut()
            .find(|t| t.selected)
            .and_then(|t| t.frames.iter_mut().find(|f| f.selected))
        {
            if frame.disassembled() {
                frame.code = FrameCode::Disassembly {
                    text: disassemble(),
                };
            }
        }

        self.expanded
            .retain(|id| threads.iter().any(|t| t.id == *id));
        if let Some(t) = threads.iter().find(|t| t.selected) {
            self.expanded.insert(t.id);
        }
        std::mem::swap(&mut self.threads, &mut threads);
        self.generation += 1;
        log::debug!(
            "backtrace rebuilt: {} threads (generation {})",
            self.threads.len(),
            self.generation
        );
    }

    /// Drop all threads and fold state.
    pub fn clear(&mut self) {
        self.threads.clear();
        self.expanded.clear();
        self.generation += 1;
    }

    /// Toggle a thread's fold state. `None` if the thread is unknown.
    pub fn fold(&mut self, id: u64) -> Option<bool> {
        self.find_thread(id)?;
        if self.expanded.remove(&id) {
            Some(false)
        } else {
            self.expanded.insert(id);
            Some(true)
        }
    }

    pub fn is_expanded(&self, id: u64) -> bool {
        self.expanded.contains(&id)
    }

    pub fn expanded(&self) -> &BTreeSet<u64> {
        &self.expanded
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Bumped on every rebuild or clear.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn find_thread(&self, id: u64) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn find_frame(&self, thread_id: u64, index: u32) -> Option<&Frame> {
        self.find_thread(thread_id)?.frame(index)
    }

    pub fn selected_thread(&self) -> Option<&Thread> {
        self.threads.iter().find(|t| t.selected)
    }

    pub fn selected_frame(&self) -> Option<&Frame> {
        self.selected_thread()?.selected_frame()
    }

    /// Flatten into view rows: every thread, plus frames of expanded threads.
    pub fn rows(&self) -> Vec<BacktraceRow> {
        let mut rows = Vec::new();
        for t in &self.threads {
            let open = self.is_expanded(t.id);
            let mut text = format!(
                "{} {} thread #{}: tid = {}",
                if t.selected { "*" } else { " " },
                if open { "▾" } else { "▸" },
                t.index,
                t.id
            );
            if let Some(reason) = &t.stop_reason {
                text.push_str(&format!(", {reason}"));
            }
            rows.push(BacktraceRow {
                text,
                selected: t.selected,
                target: NavigationTarget::Thread { id: t.id },
            });
            if !open {
                continue;
            }
            for f in &t.frames {
                rows.push(BacktraceRow {
                    text: format!(
                        "    {} frame #{}: {}",
                        if f.selected { "*" } else { " " },
                        f.index,
                        f.describe()
                    ),
                    selected: f.selected,
                    target: NavigationTarget::Frame {
                        thread_id: t.id,
                        index: f.index,
                    },
                });
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u32, symbol: Option<&str>, file: Option<&str>) -> FrameRecord {
        FrameRecord {
            index,
            pc: Some(0x1000 + index as u64),
            module: Some("a.out".to_string()),
            symbol: symbol.map(str::to_string),
            file: file.map(str::to_string),
            line: file.map(|_| 10 + index),
            ..FrameRecord::default()
        }
    }

    fn thread(index: u32, id: u64, selected: bool, frames: Vec<FrameRecord>) -> ThreadRecord {
        ThreadRecord {
            index,
            id,
            selected,
            stop_reason: None,
            frames,
        }
    }

    #[test]
    fn function_names_drop_arguments() {
        let named = Frame::from_record(1, frame(0, Some("main(argc=1, argv=0x0)"), None));
        assert_eq!(named.function_name(), Some("main"));
        let bare = Frame::from_record(1, frame(1, None, None));
        assert_eq!(bare.function_name(), None);
        let plain = Frame::from_record(1, frame(2, Some("ns::worker"), None));
        assert_eq!(plain.function_name(), Some("ns::worker"));
    }

    fn assert_single_selection(model: &BacktraceModel) {
        let selected_threads: Vec<_> = model.threads().iter().filter(|t| t.selected).collect();
        assert_eq!(selected_threads.len(), 1);
        let selected_frames: Vec<_> = model
            .threads()
            .iter()
            .flat_map(|t| t.frames.iter())
            .filter(|f| f.selected)
            .collect();
        assert_eq!(selected_frames.len(), 1);
        assert_eq!(selected_frames[0].thread_id, selected_threads[0].id);
    }

    #[test]
    fn rebuild_keeps_single_selection() {
        let mut model = BacktraceModel::new();
        let mut f1 = frame(1, Some("caller"), Some("/src/main.c"));
        f1.selected = true;
        model.rebuild(
            vec![
                thread(1, 100, false, vec![frame(0, Some("worker"), Some("/src/w.c"))]),
                thread(
                    2,
                    200,
                    true,
                    vec![frame(0, Some("callee"), Some("/src/main.c")), f1],
                ),
            ],
            || None,
        );
        assert_single_selection(&model);
        assert_eq!(model.selected_thread().map(|t| t.id), Some(200));
        assert_eq!(model.selected_frame().map(|f| f.index), Some(1));
    }

    #[test]
    fn rebuild_falls_back_to_first_thread_and_frame() {
        let mut model = BacktraceModel::new();
        model.rebuild(
            vec![
                thread(1, 100, false, vec![frame(0, Some("a"), Some("/x/a.c"))]),
                thread(2, 200, false, vec![frame(0, Some("b"), Some("/x/b.c"))]),
            ],
            || None,
        );
        assert_single_selection(&model);
        assert_eq!(model.selected_thread().map(|t| t.id), Some(100));
    }

    #[test]
    fn frames_without_source_are_disassembled() {
        let mut model = BacktraceModel::new();
        let mut calls = 0;
        model.rebuild(
            vec![thread(
                1,
                7,
                true,
                vec![
                    frame(0, None, None),
                    frame(1, Some("main"), Some("main.c")),
                    frame(2, Some("start"), Some("/src/start.c")),
                ],
            )],
            || {
                calls += 1;
                Some("mov rax, rbx".to_string())
            },
        );
        assert_eq!(calls, 1);
        let t = model.find_thread(7).unwrap();
        assert_eq!(t.frames[0].symbol, "0x1000");
        assert_eq!(
            t.frames[0].code,
            FrameCode::Disassembly {
                text: Some("mov rax, rbx".to_string())
            }
        );
        // a bare file name carries no directory
        assert!(t.frames[1].disassembled());
        assert_eq!(t.frames[1].code, FrameCode::Disassembly { text: None });
        assert!(!t.frames[2].disassembled());
    }

    #[test]
    fn placeholder_symbol_when_nothing_is_known() {
        let f = Frame::from_record(1, FrameRecord::default());
        assert_eq!(f.symbol, UNKNOWN_SYMBOL);
    }

    #[test]
    fn expanded_set_is_pruned() {
        let mut model = BacktraceModel::new();
        model.rebuild(
            vec![
                thread(1, 100, true, vec![frame(0, Some("a"), Some("/x/a.c"))]),
                thread(2, 200, false, vec![frame(0, Some("b"), Some("/x/b.c"))]),
                thread(3, 300, false, vec![frame(0, Some("c"), Some("/x/c.c"))]),
            ],
            || None,
        );
        assert_eq!(model.fold(200), Some(true));
        assert_eq!(model.fold(300), Some(true));

        model.rebuild(
            vec![
                thread(1, 100, true, vec![frame(0, Some("a"), Some("/x/a.c"))]),
                thread(2, 200, false, vec![frame(0, Some("b"), Some("/x/b.c"))]),
            ],
            || None,
        );
        assert!(model.is_expanded(200));
        assert!(!model.is_expanded(300));
        assert!(model.is_expanded(100));
    }

    #[test]
    fn fold_toggles_and_rows_follow() {
        let mut model = BacktraceModel::new();
        model.rebuild(
            vec![thread(
                1,
                100,
                true,
                vec![
                    frame(0, Some("a"), Some("/x/a.c")),
                    frame(1, Some("main"), Some("/x/main.c")),
                ],
            )],
            || None,
        );
        assert_eq!(model.rows().len(), 3);
        assert_eq!(model.fold(100), Some(false));
        let rows = model.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target, NavigationTarget::Thread { id: 100 });
        assert_eq!(model.fold(999), None);
    }

    #[test]
    fn clear_empties_everything() {
        let mut model = BacktraceModel::new();
        model.rebuild(
            vec![thread(1, 1, true, vec![frame(0, Some("a"), Some("/x/a.c"))])],
            || None,
        );
        let gen = model.generation();
        model.clear();
        assert!(model.is_empty());
        assert!(model.expanded().is_empty());
        assert!(model.selected_frame().is_none());
        assert!(model.generation() > gen);
    }
}
