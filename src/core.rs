//! Core domain types and capability traits for logroute
//!
//! This module defines the event model shared by every component and the
//! narrow trait contracts the router, config cache and alert path use to talk
//! to their collaborators (file sinks, formatters, mail delivery).

use crate::error::{AlertError, SinkError};
use crate::sink::RotationPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Severity of a log event. Totally ordered from `Trace` to `Error`.
///
/// The router only uses it as a routing-key component; no filtering by level
/// happens in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Every severity, lowest first.
    pub const ALL: [Severity; 5] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
    ];

    /// The upper-case label used in rendered lines and alert subjects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// The lower-case stem used for the sink's file name (`info.log`, ...).
    pub fn file_stem(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A single structured log event.
///
/// The application name travels with the event instead of living in
/// thread-local context, so the router never depends on the caller's thread.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Name of the application that emitted the event.
    pub application: String,
    pub severity: Severity,
    /// The raw, unformatted message.
    pub message: String,
    /// Marks the event for the alert channel in addition to the file sink.
    pub escalate: bool,
    pub timestamp: DateTime<Utc>,
    /// Name of the emitting thread, captured at construction.
    pub thread: String,
}

impl LogEvent {
    /// Creates an event stamped with the current time and thread.
    pub fn new(application: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        let current = std::thread::current();
        let thread = current
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", current.id()));
        Self {
            application: application.into(),
            severity,
            message: message.into(),
            escalate: false,
            timestamp: Utc::now(),
            thread,
        }
    }

    /// Sets the escalation marker.
    pub fn escalated(mut self, escalate: bool) -> Self {
        self.escalate = escalate;
        self
    }

    /// The routing key of this event.
    pub fn sink_key(&self) -> SinkKey {
        SinkKey::new(self.application.clone(), self.severity)
    }
}

/// Whether `name` can name an application: not blank, and made only of plain
/// path segments so its sinks stay below the log root. Absolute names and
/// names with `.` or `..` segments are rejected.
pub fn is_valid_application_name(name: &str) -> bool {
    !name.trim().is_empty()
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Identifies exactly one sink: an (application, severity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkKey {
    pub application: String,
    pub severity: Severity,
}

impl SinkKey {
    pub fn new(application: impl Into<String>, severity: Severity) -> Self {
        Self {
            application: application.into(),
            severity,
        }
    }
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.severity.file_stem())
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// An output target that accepts formatted bytes and manages its own files.
pub trait RollingSink: Send {
    /// Appends one rendered event.
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Flushes buffered output, if any.
    fn flush(&mut self) -> std::io::Result<()>;

    /// Flushes and releases the underlying resources. Writes after close fail.
    fn close(&mut self) -> std::io::Result<()>;
}

/// Everything a factory needs to build the sink for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub key: SinkKey,
    /// `<log_path>/<application>`; the sink's files live directly inside it.
    pub directory: PathBuf,
    pub policy: RotationPolicy,
}

/// Creates sinks on demand for the router.
pub trait SinkFactory: Send + Sync {
    /// Builds a ready-to-write sink.
    ///
    /// # Returns
    /// * `Ok(sink)` once the directory exists and the active file is open
    /// * `Err` if the directory or file cannot be created
    fn create(&self, spec: &SinkSpec) -> Result<Box<dyn RollingSink>, SinkError>;
}

/// Renders a structured event into a line of text.
pub trait Formatter: Send + Sync {
    fn format(&self, event: &LogEvent) -> String;
}

/// Connection settings handed to the mail transport with every message.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SmtpSettings {
    /// Authentication is used only when a username is configured.
    pub fn requires_auth(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "******"))
            .finish()
    }
}

/// A fully rendered alert message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers alert messages to an external notification channel.
pub trait MailTransport: Send + Sync {
    /// Sends one message.
    ///
    /// # Returns
    /// * `Ok(())` if the message was handed off
    /// * `Err` for any delivery failure; callers log and drop it
    fn send(&self, smtp: &SmtpSettings, message: &MailMessage) -> Result<(), AlertError>;
}
