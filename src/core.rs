//! Core domain types for the alert delivery pipeline
//!
//! This module defines the log entry value handed over by the logging
//! facade, the severity levels it carries, and the diagnostic events the
//! pipeline emits when delivery fails.

use crate::serializer::ErrorNode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// A log entry as assembled by the logging facade.
///
/// The dispatcher only ever sees this boundary value; raw error objects are
/// folded into an [`ErrorNode`] by the caller before the entry is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogEntry {
    /// ISO 8601 timestamp when the entry was created.
    pub timestamp: String,
    /// Severity of the entry.
    pub level: Level,
    /// The component or subsystem that emitted the entry.
    pub origin: String,
    /// Short identifier for this entry, assigned by the facade.
    pub entry_id: String,
    /// The message body.
    pub message: String,
    /// Whether this entry should be delivered to the webhook endpoints.
    /// Independent of `level`; set explicitly per entry.
    pub notify: bool,
    /// Serialized error attached to the entry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorNode>,
    /// Free-form operator comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Correlation identifier linking related entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Session identifier, when the facade tracks one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LogEntry {
    /// Creates an entry with the current timestamp and no optional fields.
    pub fn new(level: Level, origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            level,
            origin: origin.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Internal diagnostic events emitted by the delivery pipeline.
///
/// These never reach the emitting call site as errors; they are published on
/// a broadcast channel for operators and tests to observe.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// Every configured endpoint was exhausted for one entry.
    DispatchFailed {
        entry_id: String,
        origin: String,
        reason: String,
    },
}
