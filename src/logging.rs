//! Tracing setup shared by the server and the CLI.
//!
//! Events go to stdout and to a log file picked from the environment:
//!
//! | Variable | Effect |
//! |---|---|
//! | `DOCQA_LOG_FILE` | append to this exact file; `off` disables file logging |
//! | `DOCQA_LOG_DIR` | directory for `docqa.log` (default `logs`) |
//! | `DOCQA_LOG_ROTATION` | `never` (default), `daily` or `hourly` for `DOCQA_LOG_DIR` |
//!
//! `RUST_LOG` overrides the filter.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn";
const LOG_FILE_NAME: &str = "docqa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where file logging should go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogTarget {
    Disabled,
    File(PathBuf),
    Directory { dir: PathBuf, rotation: LogRotation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogRotation {
    Never,
    Daily,
    Hourly,
}

impl LogRotation {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "never" => Some(Self::Never),
            "daily" => Some(Self::Daily),
            "hourly" => Some(Self::Hourly),
            _ => None,
        }
    }

    fn appender(self, dir: &Path) -> RollingFileAppender {
        match self {
            Self::Never => tracing_appender::rolling::never(dir, LOG_FILE_NAME),
            Self::Daily => tracing_appender::rolling::daily(dir, LOG_FILE_NAME),
            Self::Hourly => tracing_appender::rolling::hourly(dir, LOG_FILE_NAME),
        }
    }
}

impl LogTarget {
    fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(file) = value("DOCQA_LOG_FILE") {
            return if file.trim().eq_ignore_ascii_case("off") {
                Self::Disabled
            } else {
                Self::File(PathBuf::from(file.trim()))
            };
        }

        let rotation = match value("DOCQA_LOG_ROTATION") {
            Some(raw) => LogRotation::parse(&raw).unwrap_or_else(|| {
                eprintln!("Unknown DOCQA_LOG_ROTATION '{raw}'; logs will not rotate");
                LogRotation::Never
            }),
            None => LogRotation::Never,
        };
        Self::Directory {
            dir: value("DOCQA_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            rotation,
        }
    }
}

/// Install the stdout and file subscribers.
///
/// Calling it again after a subscriber is installed only reports the conflict on stderr.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let file_layer = file_writer(&LogTarget::from_env()).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .compact()
    });

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init();

    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

/// Open the non-blocking writer for `target`, or `None` when file logging is off or unavailable.
fn file_writer(target: &LogTarget) -> Option<NonBlocking> {
    if LOG_GUARD.get().is_some() {
        return None;
    }

    let opened = match target {
        LogTarget::Disabled => return None,
        LogTarget::File(path) => open_append(path).map(tracing_appender::non_blocking),
        LogTarget::Directory { dir, rotation } => std::fs::create_dir_all(dir)
            .map(|()| tracing_appender::non_blocking(rotation.appender(dir))),
    };

    match opened {
        Ok((writer, guard)) => {
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("File logging disabled, {target:?} unavailable: {err}");
            None
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
