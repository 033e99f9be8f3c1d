use once_cell::sync::OnceCell;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging. The level is `info` unless `debug` is set, in which
/// case it is `debug` and may be overridden via `RUST_LOG`. With `log_file`
/// the output is appended to that file instead of stderr.
///
/// Later calls are ignored once a subscriber is installed.
pub fn init(debug: bool, log_file: Option<&Path>) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| eprintln!("failed to open log file {}: {err}", path.display()))
            .ok()
    });

    match file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .is_ok();
            if installed {
                let _ = FILE_GUARD.set(guard);
            }
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
}
