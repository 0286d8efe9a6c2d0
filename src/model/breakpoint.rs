use crate::backend::{Backend, BreakpointAck};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub path: String,
    pub line: u32,
    /// LLDB's id, present only while applied to a live session.
    pub id: Option<u32>,
    pub applied: bool,
    /// Accepted by LLDB without a resolved location yet.
    pub pending: bool,
}

impl Breakpoint {
    fn new(path: &str, line: u32) -> Self {
        Self {
            path: path.to_string(),
            line,
            id: None,
            applied: false,
            pending: false,
        }
    }

    /// Record the debugger's acknowledgement.
    pub fn mark_applied(&mut self, ack: BreakpointAck) {
        self.id = Some(ack.id());
        self.applied = true;
        self.pending = matches!(ack, BreakpointAck::Pending { .. });
    }

    pub fn unset(&mut self) {
        self.id = None;
        self.applied = false;
        self.pending = false;
    }
}

/// A breakpoint on every function called `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBreakpoint {
    pub name: String,
    pub id: Option<u32>,
    pub applied: bool,
    pub pending: bool,
}

impl FunctionBreakpoint {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            applied: false,
            pending: false,
        }
    }

    pub fn mark_applied(&mut self, ack: BreakpointAck) {
        self.id = Some(ack.id());
        self.applied = true;
        self.pending = matches!(ack, BreakpointAck::Pending { .. });
    }

    pub fn unset(&mut self) {
        self.id = None;
        self.applied = false;
        self.pending = false;
    }
}

/// Outcome of pushing the registry into a fresh session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub pending: usize,
    pub failed: Vec<(String, u32, String)>,
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

fn is_bare(path: &str) -> bool {
    basename(path) == path
}

/// Breakpoints keyed by (source path, line), plus function breakpoints keyed
/// by name, independent of any session.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    entries: BTreeMap<(String, u32), Breakpoint>,
    functions: BTreeMap<String, FunctionBreakpoint>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact key, else an entry matching by base name when either side is bare.
    fn resolve_key(&self, path: &str, line: u32) -> Option<(String, u32)> {
        let exact = (path.to_string(), line);
        if self.entries.contains_key(&exact) {
            return Some(exact);
        }
        let name = basename(path);
        let query_bare = is_bare(path);
        self.entries
            .keys()
            .find(|(p, l)| *l == line && basename(p) == name && (query_bare || is_bare(p)))
            .cloned()
    }

    /// Returns false when an entry already exists.
    pub fn add(&mut self, path: &str, line: u32) -> bool {
        if self.resolve_key(path, line).is_some() {
            return false;
        }
        self.entries
            .insert((path.to_string(), line), Breakpoint::new(path, line));
        true
    }

    pub fn delete(&mut self, path: &str, line: u32) -> Option<Breakpoint> {
        let key = self.resolve_key(path, line)?;
        self.entries.remove(&key)
    }

    pub fn get(&self, path: &str, line: u32) -> Option<&Breakpoint> {
        let key = self.resolve_key(path, line)?;
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, path: &str, line: u32) -> Option<&mut Breakpoint> {
        let key = self.resolve_key(path, line)?;
        self.entries.get_mut(&key)
    }

    /// Returns false when a breakpoint on `name` already exists.
    pub fn add_function(&mut self, name: &str) -> bool {
        if self.functions.contains_key(name) {
            return false;
        }
        self.functions
            .insert(name.to_string(), FunctionBreakpoint::new(name));
        true
    }

    pub fn delete_function(&mut self, name: &str) -> Option<FunctionBreakpoint> {
        self.functions.remove(name)
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionBreakpoint> {
        self.functions.get(name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut FunctionBreakpoint> {
        self.functions.get_mut(name)
    }

    pub fn unset_all(&mut self) {
        for bp in self.entries.values_mut() {
            bp.unset();
        }
        for bp in self.functions.values_mut() {
            bp.unset();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.functions.clear();
    }

    /// Line breakpoints in (path, line) order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.values()
    }

    /// Function breakpoints in name order.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionBreakpoint> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.functions.is_empty()
    }

    pub fn any_applied(&self) -> bool {
        self.entries.values().any(|b| b.applied) || self.functions.values().any(|b| b.applied)
    }

    /// Create every entry in the debugger. A failing entry is logged and
    /// reported; the rest are still applied.
    pub fn apply_all<B: Backend + ?Sized>(&mut self, backend: &mut B) -> ApplyReport {
        let mut report = ApplyReport::default();
        for bp in self.entries.values_mut() {
            match backend.create_breakpoint(&bp.path, bp.line) {
                Ok(ack) => {
                    bp.mark_applied(ack);
                    if bp.pending {
                        log::info!("breakpoint {}:{} pending", bp.path, bp.line);
                        report.pending += 1;
                    } else {
                        report.applied += 1;
                    }
                }
                Err(e) => {
                    log::warn!("could not set breakpoint {}:{}: {e}", bp.path, bp.line);
                    bp.unset();
                    report.failed.push((bp.path.clone(), bp.line, e.reason()));
                }
            }
        }
        for bp in self.functions.values_mut() {
            match backend.create_function_breakpoint(&bp.name) {
                Ok(ack) => {
                    bp.mark_applied(ack);
                    if bp.pending {
                        log::info!("breakpoint on {} pending", bp.name);
                        report.pending += 1;
                    } else {
                        report.applied += 1;
                    }
                }
                Err(e) => {
                    log::warn!("could not set breakpoint on {}: {e}", bp.name);
                    bp.unset();
                    report.failed.push((bp.name.clone(), 0, e.reason()));
                }
            }
        }
        report
    }

    /// Re-check pending entries; returns how many now have a location.
    pub fn resolve_pending<B: Backend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut resolved = 0;
        for bp in self.entries.values_mut().filter(|b| b.pending) {
            let Some(id) = bp.id else {
                continue;
            };
            match backend.breakpoint_locations(id) {
                Ok(n) if n > 0 => {
                    log::info!("breakpoint {}:{} resolved ({n} locations)", bp.path, bp.line);
                    bp.pending = false;
                    resolved += 1;
                }
                Ok(_) => {}
                Err(e) => log::debug!("breakpoint {id} still unresolved: {e}"),
            }
        }
        for bp in self.functions.values_mut().filter(|b| b.pending) {
            let Some(id) = bp.id else {
                continue;
            };
            match backend.breakpoint_locations(id) {
                Ok(n) if n > 0 => {
                    log::info!("breakpoint on {} resolved ({n} locations)", bp.name);
                    bp.pending = false;
                    resolved += 1;
                }
                Ok(_) => {}
                Err(e) => log::debug!("breakpoint {id} still unresolved: {e}"),
            }
        }
        resolved
    }
}
