//! File-backed sinks.
//!
//! The router treats sinks as opaque `RollingSink` values created through a
//! `SinkFactory`. This module provides the default implementations: a
//! size-based `RollingFileSink` and the `FileSinkFactory` that lays sinks out
//! as `<log_path>/<application>/<severity>.log`.

pub mod rolling;

pub use rolling::RollingFileSink;

use crate::config::LoggerConfig;
use crate::core::{RollingSink, SinkFactory, SinkSpec};
use crate::error::SinkError;
use regex::Regex;
use std::fs;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

/// Rotated files older than this many days are deleted on rollover.
pub const DEFAULT_MAX_HISTORY_DAYS: u32 = 90;

static SIZE_SPEC: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(\d+)\s*(b|kb|mb|gb)?\s*$"));

/// A byte count parsed from specs like `"10MB"` or `"512 kb"`.
///
/// Units are binary (1KB = 1024 bytes). A bare number is a byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileSize(pub u64);

impl FromStr for FileSize {
    type Err = SinkError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let re = SIZE_SPEC
            .as_ref()
            .map_err(|_| SinkError::InvalidSize(spec.to_string()))?;
        let caps = re
            .captures(spec)
            .ok_or_else(|| SinkError::InvalidSize(spec.to_string()))?;

        let amount: u64 = caps[1]
            .parse()
            .map_err(|_| SinkError::InvalidSize(spec.to_string()))?;
        let multiplier: u64 = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            None | Some("b") => 1,
            Some("kb") => 1024,
            Some("mb") => 1024 * 1024,
            _ => 1024 * 1024 * 1024,
        };

        amount
            .checked_mul(multiplier)
            .map(FileSize)
            .ok_or_else(|| SinkError::InvalidSize(spec.to_string()))
    }
}

/// Rollover and retention limits handed to every sink of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_file_size: u64,
    pub total_size_cap: u64,
    pub max_history_days: u32,
}

impl RotationPolicy {
    /// Parses the effective size limits of a config.
    pub fn from_config(config: &LoggerConfig) -> Result<Self, SinkError> {
        let max_file_size: FileSize = config.effective_max_file_size().parse()?;
        let total_size_cap: FileSize = config.effective_total_size_cap().parse()?;
        if max_file_size.0 == 0 {
            return Err(SinkError::InvalidSize(config.effective_max_file_size().to_string()));
        }
        Ok(Self {
            max_file_size: max_file_size.0,
            total_size_cap: total_size_cap.0,
            max_history_days: DEFAULT_MAX_HISTORY_DAYS,
        })
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            total_size_cap: 4 * 1024 * 1024 * 1024,
            max_history_days: DEFAULT_MAX_HISTORY_DAYS,
        }
    }
}

/// Creates the application directory and opens a `RollingFileSink` inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSinkFactory;

impl SinkFactory for FileSinkFactory {
    fn create(&self, spec: &SinkSpec) -> Result<Box<dyn RollingSink>, SinkError> {
        if !spec.directory.is_dir() {
            fs::create_dir_all(&spec.directory).map_err(|source| SinkError::CreateDirectory {
                path: spec.directory.clone(),
                source,
            })?;
            debug!(path = %spec.directory.display(), "Created sink directory");
        }
        let sink = RollingFileSink::open(&spec.directory, spec.key.severity.file_stem(), spec.policy)?;
        Ok(Box::new(sink))
    }
}
