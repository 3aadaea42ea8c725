//! Error types for routing, configuration, sinks and alert delivery.

use crate::core::Severity;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of `Router::route`.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Event has a blank or non-relative application name")]
    InvalidApplication,

    #[error("No sink available for app={app}, severity={severity}: {source}")]
    SinkUnavailable {
        app: String,
        severity: Severity,
        #[source]
        source: SinkError,
    },
}

/// Failures of `ConfigCache::resolve` and `ConfigCache::reload`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Application name must be a non-blank relative name")]
    InvalidConfig,

    #[error("Failed to configure logger for app: {app}")]
    Configuration {
        app: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures while creating or writing a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to create directory {}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file {}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid size specification: {0:?}")]
    InvalidSize(String),

    #[error("Failed to write to sink: {0}")]
    Write(#[source] std::io::Error),

    #[error("Sink is closed")]
    Closed,
}

/// Failures on the alert path. Always logged and swallowed by the dispatcher.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert configuration is missing required fields: {}", missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("Alert body pattern is invalid: {0}")]
    Pattern(#[from] PatternError),

    #[error("Alert transport failed: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Failures while compiling a format pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("Unclosed '{{' in pattern at offset {0}")]
    UnclosedBrace(usize),

    #[error("Invalid date format: {0:?}")]
    InvalidDateFormat(String),
}
