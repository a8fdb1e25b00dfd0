//! Wrapper for work that must never fail the request it runs in.
//!
//! Failures are logged through `tracing` and, when a sink is attached,
//! written to the error log. Neither path propagates.

use crate::core::Result;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{Level, event};

/// Runs `operation`, returning its value or `None` after logging the error.
pub fn non_fatal<T>(operation: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(err) => {
            event!(Level::WARN, operation, error = %err, "Non-fatal operation failed");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub logged_at: NaiveDateTime,
    /// Request path the failure happened under
    pub url: String,
    pub user: Option<String>,
    pub message: String,
}

impl ErrorLogEntry {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            logged_at: Local::now().naive_local(),
            url: url.into(),
            user: None,
            message: message.into(),
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

pub trait ErrorLogSink: fmt::Debug + Send + Sync {
    fn write(&self, entry: &ErrorLogEntry) -> Result<()>;
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    entries: Mutex<Vec<ErrorLogEntry>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Result<Vec<ErrorLogEntry>> {
        Ok(self.entries.lock()?.clone())
    }
}

impl ErrorLogSink for MemoryErrorLog {
    fn write(&self, entry: &ErrorLogEntry) -> Result<()> {
        self.entries.lock()?.push(entry.clone());
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonLinesErrorLog {
    path: PathBuf,
}

impl JsonLinesErrorLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorLogSink for JsonLinesErrorLog {
    fn write(&self, entry: &ErrorLogEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Writes `entry` to `sink`. A failing sink is only logged.
pub fn log_error(sink: &dyn ErrorLogSink, entry: &ErrorLogEntry) {
    event!(Level::ERROR, url = %entry.url, message = %entry.message, "Request error");
    non_fatal("error_log", || sink.write(entry));
}

/// Async form of [`non_fatal`]. With a sink attached the failure is also
/// filed under `url`.
pub async fn non_fatal_logged<T, F>(
    operation: &str,
    sink: Option<&dyn ErrorLogSink>,
    url: &str,
    user: Option<&str>,
    future: F,
) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match future.await {
        Ok(value) => Some(value),
        Err(err) => {
            event!(Level::WARN, operation, error = %err, "Non-fatal operation failed");
            if let Some(sink) = sink {
                let mut entry = ErrorLogEntry::new(url, err.to_string());
                entry.user = user.map(str::to_string);
                log_error(sink, &entry);
            }
            None
        }
    }
}
