use std::path::PathBuf;
use std::time::Duration;

/// Bounds for every wait the controller and the LLDB transport perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Window for an ordinary refresh to see a new process event.
    pub events: Duration,
    /// Shorter window used while a step is in flight.
    pub events_fast: Duration,
    /// Sleep slice between queue checks inside a refresh window.
    pub poll_interval: Duration,
    /// Extra polls granted while the process is still stepping.
    pub max_repolls: u32,
    /// Upper bound on a single REPL command.
    pub command: Duration,
    /// How long `quit` waits for LLDB to exit before killing it.
    pub quit: Duration,
    /// Read slice on LLDB's merged output pipe.
    pub read_slice: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            events: Duration::from_millis(1000),
            events_fast: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            max_repolls: 2,
            command: Duration::from_secs(10),
            quit: Duration::from_secs(1),
            read_slice: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub lldb_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lldb_path: PathBuf::from("lldb"),
            log_file: None,
            verbose: false,
            timeouts: Timeouts::default(),
        }
    }
}
