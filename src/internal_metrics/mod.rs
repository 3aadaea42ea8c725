//! # Internal Metrics Module
//!
//! Volume metrics for routed events.
//!
//! ## Components:
//!
//! - **`MetricsRegistry`**: (Defined in `registry.rs`) The per-application
//!   event and byte counters the router updates on every delivered event, and
//!   the read-only snapshot surface built on them.
//!
//! - **`describe_metrics`**: Registers descriptions for the counters mirrored
//!   into the `metrics` facade, so any recorder installed by the host process
//!   (Prometheus exporter, logging recorder, ...) sees the same volume.

pub mod registry;

pub use registry::{AppMetricsReport, MetricsRegistry, MetricsReport, MetricsSnapshot};

use metrics::Unit;

/// Registers descriptions for every counter logroute emits.
pub fn describe_metrics() {
    metrics::describe_counter!("log_events_total", Unit::Count, "Total number of events delivered to a sink, labeled by application.");
    metrics::describe_counter!("log_bytes_total", Unit::Bytes, "Total raw message bytes delivered to a sink, labeled by application.");
    metrics::describe_counter!("sinks_created_total", Unit::Count, "Total number of sinks created by the router.");
    metrics::describe_counter!("sink_creation_failures_total", Unit::Count, "Total number of failed sink creation attempts.");
    metrics::describe_counter!("events_dropped_total", Unit::Count, "Total number of events dropped by the dispatcher, labeled by reason.");
    metrics::describe_counter!("config_rebuilds_total", Unit::Count, "Total number of application configuration rebuilds.");
    metrics::describe_counter!("alerts_sent_total", Unit::Count, "Total number of alerts handed to the mail transport.");
    metrics::describe_counter!("alert_failures_total", Unit::Count, "Total number of alerts whose delivery failed.");
}
