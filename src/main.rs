use anyhow::Context;
use clap::Parser;
use lldb_nav::config::{Config, Timeouts};
use lldb_nav::lldb::LldbRepl;
use lldb_nav::{console, logger, tui, Controller};
use std::path::PathBuf;
use std::time::Duration;

/// Drive an LLDB session and follow the stopped frame in a source view.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program to launch.
    target: Option<PathBuf>,

    /// Arguments passed to the launched program.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Attach to a running process by pid instead of launching.
    #[clap(long, conflicts_with_all = ["name", "target"])]
    pid: Option<u32>,

    /// Attach to a running process by name.
    #[clap(long, conflicts_with = "target")]
    name: Option<String>,

    /// LLDB executable.
    #[clap(long, env = "LLDB", default_value = "lldb")]
    lldb: PathBuf,

    /// Append the debug log to this file.
    #[clap(long, env = "LLDB_NAV_LOG")]
    log_file: Option<PathBuf>,

    /// Log LLDB traffic.
    #[clap(short, long)]
    verbose: bool,

    /// Line-oriented console instead of the full-screen view.
    #[clap(long)]
    console: bool,

    #[clap(long, default_value_t = 1000)]
    event_timeout_ms: u64,

    /// Event window right after a step or continue.
    #[clap(long, default_value_t = 500)]
    fast_timeout_ms: u64,

    #[clap(long, default_value_t = 10_000)]
    command_timeout_ms: u64,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            lldb_path: self.lldb.clone(),
            log_file: self.log_file.clone(),
            verbose: self.verbose,
            timeouts: Timeouts {
                events: Duration::from_millis(self.event_timeout_ms),
                events_fast: Duration::from_millis(self.fast_timeout_ms),
                command: Duration::from_millis(self.command_timeout_ms),
                ..Timeouts::default()
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config();

    let console_buf = logger::console_buffer();
    let stderr = cli.console && config.log_file.is_none();
    logger::init(
        config.log_file.as_deref(),
        config.verbose,
        stderr,
        console_buf.clone(),
    )
    .context("cannot set up logging")?;

    let backend = match LldbRepl::start(&config.lldb_path, config.timeouts) {
        Ok(repl) => Some(repl),
        Err(e) => {
            log::error!("cannot start {}: {e}", config.lldb_path.display());
            None
        }
    };
    let mut ctl = Controller::new(backend, config.timeouts);

    if let Some(target) = &cli.target {
        match ctl.launch(target, &cli.args) {
            Ok(pid) => {
                log::info!("launched {} (pid {pid})", target.display());
                if let Err(e) = ctl.refresh(config.timeouts.events) {
                    log::warn!("refresh after launch: {e}");
                }
            }
            Err(e) => log::error!("launch {}: {e}", target.display()),
        }
    } else if cli.pid.is_some() || cli.name.is_some() {
        match ctl.attach(cli.pid, cli.name.as_deref()) {
            Ok(pid) => log::info!("attached to pid {pid}"),
            Err(e) => log::error!("attach: {e}"),
        }
    }

    let result = if cli.console {
        console::repl(&mut ctl)
    } else {
        tui::run(&mut ctl, console_buf)
    };
    if let Err(e) = ctl.quit() {
        log::warn!("quit: {e}");
    }
    result
}
