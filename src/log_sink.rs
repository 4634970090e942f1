use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("failed to write log entry to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log writer task failed")]
    Worker(#[from] tokio::task::JoinError),
}

/// Append-only destination for traffic records.
///
/// A failed append affects only that entry; callers keep going.
pub trait LogSink: Send + Sync {
    fn append_entry(&self, timestamp: DateTime<Local>, text: &str) -> Result<(), LogSinkError>;
}

/// Appends `HH:MM:SS <text>` lines to a file, opening it for every entry.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Append one entry, stamped now, from the blocking thread pool.
pub async fn append_blocking(
    sink: &Arc<dyn LogSink>,
    text: impl Into<String>,
) -> Result<(), LogSinkError> {
    let sink = Arc::clone(sink);
    let text = text.into();
    let timestamp = Local::now();
    tokio::task::spawn_blocking(move || sink.append_entry(timestamp, &text)).await?
}

impl LogSink for FileLogSink {
    fn append_entry(&self, timestamp: DateTime<Local>, text: &str) -> Result<(), LogSinkError> {
        let io_err = |source| LogSinkError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;

        writeln!(file, "{} {}", timestamp.format("%H:%M:%S"), text.trim_end_matches('\n'))
            .map_err(io_err)
    }
}
