//! The host surface the controller draws breakpoints into.

use crate::model::BreakpointRegistry;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorLocation {
    pub path: String,
    pub line: u32,
    /// The buffer differs from the file on disk.
    pub modified: bool,
}

pub trait Editor {
    fn cursor_location(&self) -> Option<CursorLocation>;
    fn place_sign(&mut self, path: &str, line: u32);
    fn unplace_sign(&mut self, path: &str, line: u32);
    /// Lines in `path` that currently carry a breakpoint sign.
    fn placed_signs(&self, path: &str) -> Vec<u32>;
}

/// Exact match, or basename match when one side carries no directory.
fn same_file(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let bare = |p: &str| Path::new(p).parent().map_or(true, |d| d.as_os_str().is_empty());
    (bare(a) || bare(b)) && Path::new(a).file_name() == Path::new(b).file_name()
}

/// Place signs for every registry entry that belongs to a freshly opened
/// `path`, skipping lines that already have one. Returns how many were placed.
pub fn sync_signs<E: Editor + ?Sized>(
    editor: &mut E,
    registry: &BreakpointRegistry,
    path: &str,
) -> usize {
    let placed = editor.placed_signs(path);
    let mut added = 0;
    for bp in registry.iter().filter(|bp| same_file(&bp.path, path)) {
        if placed.contains(&bp.line) {
            continue;
        }
        editor.place_sign(path, bp.line);
        added += 1;
    }
    added
}

/// Signs kept in memory, for hosts without a gutter of their own.
#[derive(Debug, Default)]
pub struct SignBook {
    signs: BTreeSet<(String, u32)>,
    cursor: Option<CursorLocation>,
}

impl SignBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cursor(&mut self, cursor: Option<CursorLocation>) {
        self.cursor = cursor;
    }

    pub fn signs(&self) -> impl Iterator<Item = (&str, u32)> {
        self.signs.iter().map(|(p, l)| (p.as_str(), *l))
    }
}

impl Editor for SignBook {
    fn cursor_location(&self) -> Option<CursorLocation> {
        self.cursor.clone()
    }

    fn place_sign(&mut self, path: &str, line: u32) {
        self.signs.insert((path.to_string(), line));
    }

    fn unplace_sign(&mut self, path: &str, line: u32) {
        self.signs.remove(&(path.to_string(), line));
    }

    fn placed_signs(&self, path: &str) -> Vec<u32> {
        self.signs
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, l)| *l)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_places_missing_signs_once() {
        let mut reg = BreakpointRegistry::new();
        reg.add("/src/main.c", 4);
        reg.add("main.c", 9);
        reg.add("/src/other.c", 1);
        reg.add("/elsewhere/main.c", 12);

        let mut book = SignBook::new();
        book.place_sign("/src/main.c", 4);
        assert_eq!(sync_signs(&mut book, &reg, "/src/main.c"), 1);
        assert_eq!(book.placed_signs("/src/main.c"), vec![4, 9]);
        assert_eq!(sync_signs(&mut book, &reg, "/src/main.c"), 0);
    }
}
