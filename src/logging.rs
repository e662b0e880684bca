//! Tracing subscriber for the launcher
//!
//! Everything goes to stdout; when the config directory is writable the same
//! events are also appended to `veil.log` there (`~/.config/veil` on Linux,
//! `%APPDATA%\veil` on Windows), rotated at 10 MB with one backup kept.
//! `DEBUG_LOGGING=1` raises the veil crates to debug.

use std::path::{Path, PathBuf};

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "veil.log";
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const ROTATED_FILES: usize = 1;

/// Non-blocking writer into the rotated log file.
struct LogFile {
    writer: NonBlocking,
    guard: WorkerGuard,
    path: PathBuf,
}

/// Install the global subscriber.
///
/// Hold the returned guard until exit; dropping it flushes the file writer.
/// `None` means the log file could not be opened and only stdout is used.
pub fn init() -> Option<WorkerGuard> {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();

    let log_file = match log_directory() {
        Some(dir) => open_log_file(&dir),
        None => Err("no config directory on this platform".to_string()),
    };
    let (file_writer, guard, path) = match log_file {
        Ok(LogFile {
            writer,
            guard,
            path,
        }) => (Some(writer), Some(guard), Some(path)),
        Err(reason) => {
            // Nothing can be traced before the subscriber exists
            eprintln!("veil: file logging disabled, {reason}");
            (None, None, None)
        }
    };

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
        .with(EnvFilter::new(filter_directive(debug_logging)))
        .init();

    tracing::info!(log_file = ?path, debug_logging, "logging initialized");
    guard
}

/// Directory holding the log file, next to the settings.
pub fn log_directory() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join("veil"))
}

/// Create `dir` if needed and open `veil.log` in it behind a worker thread.
fn open_log_file(dir: &Path) -> Result<LogFile, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;

    let path = dir.join(LOG_FILE);
    let appender = BasicRollingFileAppender::new(
        &path,
        RollingConditionBasic::new().max_size(MAX_LOG_SIZE),
        ROTATED_FILES,
    )
    .map_err(|e| format!("cannot open {}: {e}", path.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok(LogFile {
        writer,
        guard,
        path,
    })
}

fn filter_directive(debug_logging: bool) -> &'static str {
    if debug_logging {
        "info,veil=debug,veil_overlay=debug"
    } else {
        "info"
    }
}
