use crate::backend::State;

#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    // --------------------------------- session lifecycle -----------------------------------------
    #[error("debugger not initialized")]
    NotInitialized,
    #[error("error creating target \"{path}\": {reason}")]
    TargetCreation { path: String, reason: String },
    #[error("error launching process \"{path}\": {reason}")]
    Launch { path: String, reason: String },
    #[error("error attaching to process {target}: {reason}")]
    Attach { target: String, reason: String },
    #[error("already attached to process {0}")]
    AlreadyAttached(u32),
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),
    #[error("no running process")]
    NoProcess,
    #[error("process is {0}; it must be stopped first")]
    NotStopped(State),

    // --------------------------------- navigation ------------------------------------------------
    #[error("invalid frame")]
    InvalidFrame,
    #[error("invalid thread {0}")]
    InvalidThread(u64),
    #[error("error creating breakpoint {path}:{line}: {reason}")]
    BreakpointCreation {
        path: String,
        line: u32,
        reason: String,
    },
    #[error("buffer has unsaved changes")]
    UnsavedChanges,

    // --------------------------------- transport -------------------------------------------------
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },
    #[error("lldb exited unexpectedly")]
    Disconnected,
    #[error("timed out waiting for `{0}`")]
    Timeout(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DebugError>;

impl DebugError {
    /// Reason text used when a transport failure is folded into a lifecycle error.
    pub(crate) fn reason(&self) -> String {
        match self {
            DebugError::Command { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
