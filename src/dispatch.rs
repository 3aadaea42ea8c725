//! The event-dispatch entry point and the per-application logger handle.

use crate::config_cache::ProfileStore;
use crate::core::{LogEvent, Severity};
use crate::error::RouteError;
use crate::router::Router;
use std::sync::Arc;
use tracing::warn;

/// Sends every event through the router and, when escalated, the alert path.
///
/// Neither path's failures reach the caller: log delivery must never crash
/// the host application.
#[derive(Debug)]
pub struct Dispatcher {
    router: Arc<Router>,
    profiles: Arc<ProfileStore>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, profiles: Arc<ProfileStore>) -> Self {
        Self { router, profiles }
    }

    pub fn dispatch(&self, event: &LogEvent) {
        if let Err(e) = self.router.route(event) {
            let reason = match &e {
                RouteError::InvalidApplication => "invalid_application",
                RouteError::SinkUnavailable { .. } => "sink_unavailable",
            };
            metrics::counter!("events_dropped_total", "reason" => reason).increment(1);
            warn!(app = %event.application, severity = %event.severity, error = %e, "Dropping log event");
        }

        if event.escalate {
            if let Some(forwarder) = self
                .profiles
                .get(&event.application)
                .and_then(|profile| profile.forwarder.clone())
            {
                forwarder.notify(event);
            }
        }
    }
}

/// A cheap, cloneable logger bound to one application name.
#[derive(Debug, Clone)]
pub struct LoggerHandle {
    app: Arc<str>,
    dispatcher: Arc<Dispatcher>,
}

impl LoggerHandle {
    pub(crate) fn new(app: &str, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            app: Arc::from(app),
            dispatcher,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app
    }

    /// Emits one event. `escalate` also sends it through the alert path.
    pub fn log(&self, severity: Severity, message: impl Into<String>, escalate: bool) {
        let event = LogEvent::new(self.app.as_ref(), severity, message).escalated(escalate);
        self.dispatcher.dispatch(&event);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(Severity::Trace, message, false);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message, false);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message, false);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message, false);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message, false);
    }

    pub fn trace_with_alert(&self, message: impl Into<String>) {
        self.log(Severity::Trace, message, true);
    }

    pub fn debug_with_alert(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message, true);
    }

    pub fn info_with_alert(&self, message: impl Into<String>) {
        self.log(Severity::Info, message, true);
    }

    pub fn warn_with_alert(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message, true);
    }

    pub fn error_with_alert(&self, message: impl Into<String>) {
        self.log(Severity::Error, message, true);
    }
}
