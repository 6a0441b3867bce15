use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "recommender.log";

pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Where log lines go besides stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOutputs {
    pub file_dir: Option<PathBuf>,
}

impl LogOutputs {
    pub fn from_env() -> Self {
        let enabled = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        let file_dir = enabled.then(|| {
            std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs"))
        });
        Self { file_dir }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Installs the global subscriber. Keep the returned guard alive to flush file logs.
///
/// Stdout is left to the demo's JSON output, so console logs go to stderr.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    init_tracing_with(log_level, &LogOutputs::from_env())
}

pub fn init_tracing_with(log_level: &str, outputs: &LogOutputs) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let Some(dir) = &outputs.file_dir else {
        tracing_subscriber::registry().with(env_filter).with(console).init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("failed to create log directory {}: {err}", dir.display());
        tracing_subscriber::registry().with(env_filter).with(console).init();
        return None;
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    tracing::debug!(dir = %dir.display(), "file logging enabled");
    Some(FileLogGuard { _guard: guard })
}
