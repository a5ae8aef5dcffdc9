//! Logging and observability helpers.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_FILE_PREFIX: &str = "dbstudio.log";
const LOG_RETENTION_DAYS: u64 = 14;
const DEFAULT_FILTER: &str = "dbstudio=info,dbstudio_lib=info";

/// Installs the global JSON subscriber writing to a daily rolling file.
///
/// Falls back to stderr when the log directory cannot be created. Calling
/// it twice keeps the first subscriber.
pub fn init_tracing(config: &LogConfig) {
    let log_dir = config.directory.clone().unwrap_or_else(default_log_directory);

    let writer = match fs::create_dir_all(&log_dir) {
        Ok(()) => {
            if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS) {
                eprintln!("Failed to clean up old logs: {}", e);
            }
            let appender: RollingFileAppender =
                tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
            BoxMakeWriter::new(appender)
        }
        Err(e) => {
            eprintln!("Cannot create log directory {:?} ({}), logging to stderr", log_dir, e);
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .json()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();

    install_panic_hook();

    tracing::info!("Tracing initialized. Logs directory: {:?}", log_dir);
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "Application panicked");

        previous_hook(panic_info);
    }));
}

/// `~/.dbstudio/logs`, or `./logs` when no home directory is known
pub fn default_log_directory() -> PathBuf {
    match dirs::home_dir() {
        Some(mut path) => {
            path.push(".dbstudio");
            path.push("logs");
            path
        }
        None => PathBuf::from("logs"),
    }
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if matches!(age, Some(age) if age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}
