//! Terminal and per-op file logging.
//!
//! One global subscriber is installed on first use. Later ops only repoint the
//! file writer at `<op_dir>/logs/<op_name>.log`, so several runs in one process
//! each get their own file.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

type FileLayer = fmt::Layer<
    Registry,
    fmt::format::DefaultFields,
    fmt::format::Format<fmt::format::Full, fmt::time::ChronoUtc>,
    NonBlocking,
>;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

static LOGGING_GUARDS: OnceLock<LoggingGuards> = OnceLock::new();

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("logging file guard lock poisoned")]
    Poisoned,

    #[error("failed to reload file logger: {0}")]
    Reload(String),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Writer thread handles, kept alive for as long as logging is in use.
/// Flushed when dropped.
pub struct LoggingGuards {
    _stdout: Mutex<WorkerGuard>,
    file: Mutex<WorkerGuard>,

    /// Swaps the file logger's writer
    file_reload: reload::Handle<FileLayer, Registry>,
}

impl LoggingGuards {
    fn update_file_layer(&self, logfile: File) -> Result<(), LoggingError> {
        let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);
        let file_layer = build_file_layer(file_writer);

        let mut guard = self.file.lock().map_err(|_| LoggingError::Poisoned)?;
        self.file_reload
            .modify(|layer| *layer = file_layer)
            .map_err(|e| LoggingError::Reload(e.to_string()))?;

        // Dropping the old guard flushes the previous op's file
        *guard = file_guard;
        Ok(())
    }
}

fn build_file_layer(file_writer: NonBlocking) -> FileLayer {
    fmt::layer::<Registry>()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(file_writer)
        .with_ansi(false)
}

/// Path of an op's log file
pub fn log_path(op_dir: &Path, op_name: &str) -> PathBuf {
    op_dir.join("logs").join(format!("{op_name}.log"))
}

fn open_log(path: &Path) -> Result<File, LoggingError> {
    let file_err = |source: std::io::Error| LoggingError::File {
        path: path.to_owned(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(file_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(file_err)
}

/// Set up file and terminal logging for an op, returning the log file path
pub fn init_logging(
    op_dir: &Path,
    op_name: &str,
) -> Result<(PathBuf, &'static LoggingGuards), LoggingError> {
    let path = log_path(op_dir, op_name);
    let logfile = open_log(&path)?;

    if let Some(guards) = LOGGING_GUARDS.get() {
        guards.update_file_layer(logfile)?;
        return Ok((path, guards));
    }

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stdout_writer)
        .with_target(false);

    let (file_layer, file_reload) =
        reload::Layer::<FileLayer, Registry>::new(build_file_layer(file_writer));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    let guards = LOGGING_GUARDS.get_or_init(|| LoggingGuards {
        _stdout: Mutex::new(stdout_guard),
        file: Mutex::new(file_guard),
        file_reload,
    });

    Ok((path, guards))
}
