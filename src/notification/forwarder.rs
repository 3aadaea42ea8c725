//! Forwards escalated events to a `MailTransport`.

use crate::config::AlertSettings;
use crate::core::{Formatter, LogEvent, MailMessage, MailTransport, SmtpSettings};
use crate::error::AlertError;
use crate::formatting::{PatternFormatter, ALERT_PATTERN};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Renders escalated events and hands them to the mail transport.
pub struct AlertForwarder {
    app: String,
    smtp: SmtpSettings,
    from: String,
    to: String,
    subject: String,
    formatter: PatternFormatter,
    transport: Arc<dyn MailTransport>,
}

impl AlertForwarder {
    /// Creates a forwarder for `app`.
    ///
    /// # Returns
    /// * `Err(AlertError::Incomplete)` if host, from or to is blank
    /// * `Err(AlertError::Pattern)` if the alert body pattern does not compile
    pub fn new(
        app: &str,
        settings: &AlertSettings,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, AlertError> {
        let missing = settings.missing_fields();
        if !missing.is_empty() {
            return Err(AlertError::Incomplete { missing });
        }
        let formatter = PatternFormatter::new(ALERT_PATTERN)?;

        Ok(Self {
            app: app.to_string(),
            smtp: settings.smtp(),
            from: settings.email_from.clone().unwrap_or_default(),
            to: settings.email_to.clone().unwrap_or_default(),
            subject: settings.effective_subject().to_string(),
            formatter,
            transport,
        })
    }

    /// True iff the event carries the escalation marker.
    pub fn should_forward(&self, event: &LogEvent) -> bool {
        event.escalate
    }

    /// Renders `event` and sends it. The subject is `<subject> - <SEVERITY>`.
    #[instrument(skip_all, fields(app = %self.app, severity = %event.severity))]
    pub fn forward(&self, event: &LogEvent) -> Result<(), AlertError> {
        let message = MailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: format!("{} - {}", self.subject, event.severity),
            body: self.formatter.format(event),
        };
        self.transport.send(&self.smtp, &message)?;
        debug!("Sent alert");
        Ok(())
    }

    /// Forwards `event` if it is escalated. Delivery failures are logged and
    /// swallowed.
    pub fn notify(&self, event: &LogEvent) {
        if !self.should_forward(event) {
            return;
        }
        match self.forward(event) {
            Ok(()) => metrics::counter!("alerts_sent_total").increment(1),
            Err(e) => {
                metrics::counter!("alert_failures_total").increment(1);
                error!(app = %self.app, severity = %event.severity, error = %e, "Failed to send alert");
            }
        }
    }
}

impl std::fmt::Debug for AlertForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertForwarder")
            .field("app", &self.app)
            .field("smtp", &self.smtp)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
