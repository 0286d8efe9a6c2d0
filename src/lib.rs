//! Drive an LLDB session from an editor-like host: launch or attach, step,
//! keep breakpoints across sessions and follow the selected frame.

pub mod backend;
pub mod config;
pub mod console;
pub mod editor;
pub mod error;
pub mod lldb;
pub mod logger;
pub mod model;
pub mod navigation;
pub mod session;
pub mod tui;

#[cfg(test)]
mod testing;

pub use backend::{AttachTarget, Backend, State, StepKind};
pub use error::{DebugError, Result};
pub use navigation::Toggle;
pub use session::{Controller, Session};
