use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/folder-keeper.log";
const DEFAULT_FILTER: &str = "info";

/// Install stdout and file logging. Keep the guard alive for the whole run or
/// buffered file lines are lost.
///
/// `TRACING_LEVEL` takes full `EnvFilter` syntax, e.g.
/// `folder_keeper_core=debug,info`. `LOG_FILE_PATH` names the log file.
pub fn init_logger() -> WorkerGuard {
    let filter_layer = EnvFilter::try_from_env("TRACING_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let log_file = env::var_os("LOG_FILE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    let (log_dir, file_name) = split_log_path(&log_file);

    let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!("Logging to stdout and {}", log_file.display());

    guard
}

/// Directory and file name for the appender. A bare file name logs to the
/// working directory; a path without a file name falls back to the default.
fn split_log_path(path: &Path) -> (PathBuf, OsString) {
    let default_name = || OsString::from("folder-keeper.log");
    match path.file_name() {
        Some(name) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (dir, name.to_os_string())
        }
        None => (path.to_path_buf(), default_name()),
    }
}
