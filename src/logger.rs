use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const CONSOLE_CAPACITY: usize = 500;

/// Recent log lines, shared with the TUI console pane.
pub type ConsoleBuffer = Arc<Mutex<VecDeque<String>>>;

pub fn console_buffer() -> ConsoleBuffer {
    Arc::new(Mutex::new(VecDeque::with_capacity(CONSOLE_CAPACITY)))
}

/// `log` sink: level filtering comes from `env_logger` (`RUST_LOG`), output
/// goes to an optional file, optionally stderr, and the console buffer.
pub struct Logger {
    inner: env_logger::Logger,
    file: Mutex<Option<File>>,
    stderr: bool,
    console: ConsoleBuffer,
}

impl Logger {
    pub fn new(verbose: bool, file: Option<File>, stderr: bool, console: ConsoleBuffer) -> Self {
        let default = if verbose { "debug" } else { "info" };
        let env = env_logger::Env::default().default_filter_or(default);
        Self {
            inner: env_logger::Builder::from_env(env).build(),
            file: Mutex::new(file),
            stderr,
            console,
        }
    }

    pub fn filter(&self) -> LevelFilter {
        self.inner.filter()
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.inner.matches(record) {
            return;
        }
        let line = format!("[{} {}] {}", record.level(), record.target(), record.args());

        if let Ok(mut guard) = self.file.lock() {
            if let Some(f) = guard.as_mut() {
                let _ = writeln!(f, "{line}");
            }
        }
        if self.stderr {
            let _ = writeln!(io::stderr(), "{line}");
        }
        // transport traffic stays out of the console pane
        if record.level() <= Level::Info {
            if let Ok(mut buf) = self.console.lock() {
                if buf.len() == CONSOLE_CAPACITY {
                    buf.pop_front();
                }
                buf.push_back(format!("{}: {}", record.level(), record.args()));
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(f) = guard.as_mut() {
                let _ = f.flush();
            }
        }
    }
}

/// Install the global logger.
pub fn init(
    log_file: Option<&Path>,
    verbose: bool,
    stderr: bool,
    console: ConsoleBuffer,
) -> io::Result<()> {
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
        None => None,
    };
    let logger = Logger::new(verbose, file, stderr, console);
    let filter = logger.filter();
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;
    log::set_max_level(filter);
    Ok(())
}
