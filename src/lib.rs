//! logroute - A per-application, per-severity log router
//!
//! This library routes structured log events into rolling files keyed by
//! application and severity. Per-application configuration lives in a cache
//! that rebuilds sinks only when the configuration really changes, volume is
//! tracked per application, and escalated events go to a mail transport.

pub mod app;
pub mod cli;
pub mod config;
pub mod config_cache;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod formatting;
pub mod internal_metrics;
pub mod notification;
pub mod router;
pub mod sink;

// Re-export core types for convenience
pub use app::{LogRouter, LogRouterBuilder};
pub use config::{AlertSettings, LoggerConfig, Settings};
pub use crate::core::*;
pub use dispatch::LoggerHandle;
pub use error::{AlertError, ConfigError, PatternError, RouteError, SinkError};
