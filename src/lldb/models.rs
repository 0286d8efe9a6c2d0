use crate::backend::State;

/// Everything LLDB printed between sending a command and the next prompt.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub command: String,
    pub lines: Vec<String>,
}

impl CommandOutput {
    /// Message of the first `error: ...` line, if any.
    pub fn error(&self) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|l| l.trim_start().strip_prefix("error: "))
            .map(str::trim)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Classification of a single line of REPL output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `Process <pid> <state>...`
    ProcessEvent { pid: u32, state: State },
    /// A thread line whose stop reason is a fatal signal or exception.
    CrashReason,
    Text,
}
