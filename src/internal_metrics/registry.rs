//! Per-application event and byte counters.

use arc_swap::ArcSwap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live counters for one application.
#[derive(Debug)]
struct AppCounters {
    creation_timestamp: i64,
    total_events: AtomicU64,
    total_bytes: AtomicU64,
}

impl AppCounters {
    fn new() -> Self {
        Self {
            creation_timestamp: Utc::now().timestamp_millis(),
            total_events: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            creation_timestamp: self.creation_timestamp,
            total_log_events: self.total_events.load(Ordering::Relaxed),
            total_log_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one application's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Milliseconds since the Unix epoch when the application was first seen.
    pub creation_timestamp: i64,
    pub total_log_events: u64,
    pub total_log_bytes: u64,
}

/// A snapshot tagged with its application, as returned by single-app queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetricsReport {
    pub app_name: String,
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
}

/// Aggregate view across all applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub total_logger_count: usize,
    pub total_log_event_count: u64,
    pub total_log_bytes: u64,
    pub applications: BTreeMap<String, MetricsSnapshot>,
}

impl MetricsReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Process-wide counters keyed by application name.
///
/// Counters only ever grow and are never removed automatically, so history
/// survives reconfiguration of an application. The application map is
/// published copy-on-write: readers iterate a snapshot without locking, and
/// registering a new application never waits for them.
#[derive(Debug)]
pub struct MetricsRegistry {
    apps: ArcSwap<HashMap<String, Arc<AppCounters>>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            apps: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Creates the counters for `app` if they do not exist yet.
    pub fn register(&self, app: &str) {
        self.counters(app);
    }

    /// Adds one event of `bytes` bytes to `app`, registering it if needed.
    pub fn record(&self, app: &str, bytes: u64) {
        let counters = self.counters(app);
        counters.total_events.fetch_add(1, Ordering::Relaxed);
        counters.total_bytes.fetch_add(bytes, Ordering::Relaxed);

        metrics::counter!("log_events_total", "application" => app.to_string()).increment(1);
        metrics::counter!("log_bytes_total", "application" => app.to_string()).increment(bytes);
    }

    pub fn snapshot(&self, app: &str) -> Option<MetricsSnapshot> {
        self.apps.load().get(app).map(|counters| counters.snapshot())
    }

    /// Reads every application's counters. Fields are read independently, so
    /// the result is not a single consistent instant across applications.
    pub fn snapshot_all(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.apps
            .load()
            .iter()
            .map(|(app, counters)| (app.clone(), counters.snapshot()))
            .collect()
    }

    pub fn total_events(&self) -> u64 {
        self.apps
            .load()
            .values()
            .map(|counters| counters.total_events.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.apps
            .load()
            .values()
            .map(|counters| counters.total_bytes.load(Ordering::Relaxed))
            .sum()
    }

    /// Number of applications being tracked.
    pub fn logger_count(&self) -> usize {
        self.apps.load().len()
    }

    pub fn app_report(&self, app: &str) -> Option<AppMetricsReport> {
        self.snapshot(app).map(|snapshot| AppMetricsReport {
            app_name: app.to_string(),
            snapshot,
        })
    }

    pub fn report(&self) -> MetricsReport {
        let applications = self.snapshot_all();
        MetricsReport {
            total_logger_count: applications.len(),
            total_log_event_count: applications.values().map(|s| s.total_log_events).sum(),
            total_log_bytes: applications.values().map(|s| s.total_log_bytes).sum(),
            applications,
        }
    }

    fn counters(&self, app: &str) -> Arc<AppCounters> {
        if let Some(existing) = self.apps.load().get(app) {
            return Arc::clone(existing);
        }

        // Racing registrations keep whichever counters were published first.
        let fresh = Arc::new(AppCounters::new());
        self.apps.rcu(|current| {
            if current.contains_key(app) {
                return Arc::clone(current);
            }
            let mut next = HashMap::clone(current);
            next.insert(app.to_string(), Arc::clone(&fresh));
            Arc::new(next)
        });
        self.apps.load().get(app).cloned().unwrap_or(fresh)
    }
}
