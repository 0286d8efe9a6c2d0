use crate::model::backtrace::{Frame, FrameCode};

/// What the host should show for the selected frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Source {
        path: String,
        line: u32,
        column: u32,
    },
    /// Disassembly view; `line` is always 1.
    Disassembly {
        symbol: String,
        text: String,
        line: u32,
    },
}

impl SourceLocation {
    pub fn from_frame(frame: &Frame) -> Self {
        match &frame.code {
            FrameCode::Source { path, line, column } => SourceLocation::Source {
                path: path.clone(),
                line: *line,
                column: *column,
            },
            FrameCode::Disassembly { text } => SourceLocation::Disassembly {
                symbol: frame.symbol.clone(),
                text: text.clone().unwrap_or_default(),
                line: 1,
            },
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            SourceLocation::Source { line, .. } | SourceLocation::Disassembly { line, .. } => *line,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            SourceLocation::Source { path, .. } => Some(path),
            SourceLocation::Disassembly { .. } => None,
        }
    }
}
