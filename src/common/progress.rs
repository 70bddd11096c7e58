use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Receives progress and status from a run.
///
/// Implemented by whatever presenter is attached (console, GUI, log file).
/// Purely observational: nothing a sink does influences the run.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, percent: u8, message: &str);
    fn status(&self, message: &str, level: StatusLevel);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn progress(&self, _percent: u8, _message: &str) {}
    fn status(&self, _message: &str, _level: StatusLevel) {}
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    progress: Mutex<Vec<(u8, String)>>,
    statuses: Mutex<Vec<(StatusLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_events(&self) -> Vec<(u8, String)> {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<(StatusLevel, String)> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Messages at `level`
    pub fn messages(&self, level: StatusLevel) -> Vec<String> {
        self.statuses()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, percent: u8, message: &str) {
        if let Ok(mut p) = self.progress.lock() {
            p.push((percent, message.to_string()));
        }
    }

    fn status(&self, message: &str, level: StatusLevel) {
        if let Ok(mut s) = self.statuses.lock() {
            s.push((level, message.to_string()));
        }
    }
}

/// Fans every message out to `tracing` (the persistent record) and to the
/// attached sink, and keeps progress monotonic.
pub struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    last_percent: AtomicU8,
    warnings: Mutex<Vec<String>>,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last_percent: AtomicU8::new(0),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Report progress. Values never go backwards and are capped at 100.
    pub fn progress(&self, percent: u8, message: &str) {
        let percent = percent.min(100);
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        self.sink.progress(percent.max(previous), message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}", message);
        self.sink.status(message, StatusLevel::Info);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Ok(mut w) = self.warnings.lock() {
            w.push(message.to_string());
        }
        self.sink.status(message, StatusLevel::Warning);
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{}", message);
        self.sink.status(message, StatusLevel::Error);
    }

    /// Every warning emitted so far
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }
}
