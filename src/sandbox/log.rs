//! Progress and diagnostic events reported to the caller while a scan runs.
//!
//! Events are observational only and never change the verdict. Every event is also forwarded to
//! the `log` facade, so a host without a sink still sees them.

use std::fmt;

/// Severity of a [`ScanLog`] event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanLogKind {
    /// Progress and timing
    Info,
    /// A finding the caller should surface
    Error,
}

/// A single event emitted during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLog {
    /// Severity of the event
    pub kind: ScanLogKind,
    /// Human-readable message
    pub message: String,
}

impl ScanLog {
    /// An informational event.
    pub fn info(message: impl Into<String>) -> Self {
        ScanLog {
            kind: ScanLogKind::Info,
            message: message.into(),
        }
    }

    /// An error event.
    pub fn error(message: impl Into<String>) -> Self {
        ScanLog {
            kind: ScanLogKind::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for ScanLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScanLogKind::Info => write!(f, "[INFO] {}", self.message),
            ScanLogKind::Error => write!(f, "[ERROR] {}", self.message),
        }
    }
}

/// Receives [`ScanLog`] events. Called synchronously, possibly from several threads.
pub type LogSink<'a> = &'a (dyn Fn(ScanLog) + Send + Sync);

/// Forward `event` to the `log` facade and to `sink`
pub(crate) fn emit(sink: LogSink<'_>, event: ScanLog) {
    match event.kind {
        ScanLogKind::Info => log::info!("{}", event.message),
        ScanLogKind::Error => log::error!("{}", event.message),
    }
    sink(event);
}

/// A sink that drops every event
pub fn discard(_: ScanLog) {}
