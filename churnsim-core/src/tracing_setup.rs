//! Tracing setup for churnsim
//!
//! The console shows churnsim's own targets at the requested level and
//! everything else at `warn`. When a logs directory is given, a second layer
//! writes every churnsim event down to per-event `trace!` diagnostics into
//! [`LOG_FILE_NAME`], replaced on each run.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the full-detail log.
pub const LOG_FILE_NAME: &str = "churnsim-last-run.log";

/// Targets whose verbosity follows the user's choice.
const CHURNSIM_TARGETS: [&str; 2] = ["churnsim_core", "churnsim_cli"];

/// Filter directives: `warn` globally, `level` for churnsim targets.
pub fn directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    CHURNSIM_TARGETS
        .iter()
        .fold(String::from("warn"), |acc, target| format!("{acc},{target}={level}"))
}

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, replaces the console directives. Returns the path of
/// the log file if one was opened. A subscriber installed earlier (by a test
/// harness or an embedding program) is left in place.
///
/// # Errors
///
/// - `std::io::Error` - If the logs directory cannot be created or the log file cannot be opened
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<Option<PathBuf>, std::io::Error> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(console_level)));
    let console_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file_layer, log_path) = match logs_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(LOG_FILE_NAME);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_line_number(true)
                .with_writer(Mutex::new(File::create(&path)?))
                .with_filter(EnvFilter::new(directives(Level::TRACE)));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            console = %console_level,
            log_file = ?log_path,
            "tracing initialized"
        );
    }
    Ok(log_path)
}

/// Console verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Failures only
    Error,
    /// Also runs that ended with components still bound
    Warn,
    /// Also experiment progress
    Info,
    /// Also engine lifecycle: builds, bindings, burn-in
    Debug,
    /// Also every periodic-action decision
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use churnsim_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Debug.as_tracing_level(), tracing::Level::DEBUG);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        Level::from(self)
    }
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Level::from(*self).as_str().to_ascii_lowercase())
    }
}
