//! Configuration management for logroute
//!
//! This module defines the per-application `LoggerConfig` value object and the
//! process-level `Settings` struct. `Settings` uses the `figment` crate to load
//! configuration from a `logroute.toml` file and merge it with environment
//! variables and command-line overrides.

use crate::cli::Cli;
use crate::core::SmtpSettings;
use crate::formatting::DEFAULT_PATTERN;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Per-file rollover threshold used when none is configured.
pub const DEFAULT_MAX_FILE_SIZE: &str = "10MB";
/// Aggregate retention cap used when none is configured.
pub const DEFAULT_TOTAL_SIZE_CAP: &str = "4GB";
/// Fallback base directory when neither the config nor `LOG_PATH` names one.
pub const DEFAULT_LOG_PATH: &str = "logs/CustomLogger";
pub const DEFAULT_SMTP_PORT: u16 = 25;
pub const DEFAULT_EMAIL_SUBJECT: &str = "Application Error Notification";

/// Immutable logging configuration for one application.
///
/// Text fields are optional; `None` and `Some("")` are interchangeable for
/// equivalence checks and both fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Base directory for the application's sink tree.
    pub log_path: Option<String>,
    /// Per-file rollover threshold, e.g. "10MB".
    pub max_file_size: Option<String>,
    /// Aggregate retention cap across rotated files, e.g. "4GB".
    pub total_size_cap: Option<String>,
    /// Format pattern for file output.
    pub log_pattern: Option<String>,
    /// Alert-path configuration.
    pub alert: AlertSettings,
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_path(mut self, path: impl Into<String>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn max_file_size(mut self, size: impl Into<String>) -> Self {
        self.max_file_size = Some(size.into());
        self
    }

    pub fn total_size_cap(mut self, size: impl Into<String>) -> Self {
        self.total_size_cap = Some(size.into());
        self
    }

    pub fn log_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.log_pattern = Some(pattern.into());
        self
    }

    pub fn alert(mut self, alert: AlertSettings) -> Self {
        self.alert = alert;
        self
    }

    /// Field-wise equality with missing text treated as the empty string.
    pub fn is_equivalent(&self, other: &LoggerConfig) -> bool {
        text_eq(&self.log_path, &other.log_path)
            && text_eq(&self.max_file_size, &other.max_file_size)
            && text_eq(&self.total_size_cap, &other.total_size_cap)
            && text_eq(&self.log_pattern, &other.log_pattern)
            && self.alert.is_equivalent(&other.alert)
    }

    /// The base directory, falling back to `$LOG_PATH` and then the built-in default.
    pub fn effective_log_path(&self) -> PathBuf {
        match non_blank(&self.log_path) {
            Some(path) => PathBuf::from(path),
            None => std::env::var("LOG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
        }
    }

    pub fn effective_max_file_size(&self) -> &str {
        non_blank(&self.max_file_size).unwrap_or(DEFAULT_MAX_FILE_SIZE)
    }

    pub fn effective_total_size_cap(&self) -> &str {
        non_blank(&self.total_size_cap).unwrap_or(DEFAULT_TOTAL_SIZE_CAP)
    }

    pub fn effective_pattern(&self) -> &str {
        non_blank(&self.log_pattern).unwrap_or(DEFAULT_PATTERN)
    }
}

/// Alert-path configuration. Required fields are enforced only when `enabled`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub email_subject: Option<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_username: None,
            smtp_password: None,
            email_from: None,
            email_to: None,
            email_subject: Some(DEFAULT_EMAIL_SUBJECT.to_string()),
        }
    }
}

impl AlertSettings {
    /// Enabled settings with the three required fields filled in.
    pub fn enabled(host: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            enabled: true,
            smtp_host: Some(host.into()),
            email_from: Some(from.into()),
            email_to: Some(to.into()),
            ..Self::default()
        }
    }

    pub fn is_equivalent(&self, other: &AlertSettings) -> bool {
        self.enabled == other.enabled
            && text_eq(&self.smtp_host, &other.smtp_host)
            && self.smtp_port == other.smtp_port
            && text_eq(&self.smtp_username, &other.smtp_username)
            && text_eq(&self.smtp_password, &other.smtp_password)
            && text_eq(&self.email_from, &other.email_from)
            && text_eq(&self.email_to, &other.email_to)
            && text_eq(&self.email_subject, &other.email_subject)
    }

    /// Names of the required fields (host, from, to) that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if non_blank(&self.smtp_host).is_none() {
            missing.push("smtp_host");
        }
        if non_blank(&self.email_from).is_none() {
            missing.push("email_from");
        }
        if non_blank(&self.email_to).is_none() {
            missing.push("email_to");
        }
        missing
    }

    pub fn smtp(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp_host.clone().unwrap_or_default(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
        }
    }

    pub fn effective_subject(&self) -> &str {
        non_blank(&self.email_subject).unwrap_or(DEFAULT_EMAIL_SUBJECT)
    }
}

impl fmt::Debug for AlertSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertSettings")
            .field("enabled", &self.enabled)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"******")
            .field("email_from", &self.email_from)
            .field("email_to", &self.email_to)
            .field("email_subject", &self.email_subject)
            .finish()
    }
}

fn text_eq(a: &Option<String>, b: &Option<String>) -> bool {
    a.as_deref().unwrap_or("") == b.as_deref().unwrap_or("")
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Process-level settings for the demo binary and `LogRouter::from_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Filter for the crate's own diagnostics.
    pub log_level: String,
    /// Configuration used for applications that were never resolved.
    #[serde(default)]
    pub defaults: LoggerConfig,
    /// Applications to configure at startup.
    #[serde(default)]
    pub applications: BTreeMap<String, LoggerConfig>,
}

impl Settings {
    /// Loads settings by layering defaults, the TOML file, environment and CLI.
    ///
    /// Environment variables use the `LOGROUTE_` prefix with `__` as the
    /// nesting separator, e.g. `LOGROUTE_DEFAULTS__LOG_PATH=/var/log/apps`.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed("LOGROUTE_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            defaults: LoggerConfig::default(),
            applications: BTreeMap::new(),
        }
    }
}
