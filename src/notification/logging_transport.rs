//! A transport that logs alerts instead of mailing them.
//!
//! This serves as the default transport when the host process has not plugged
//! in a real mail client, and is handy for validating the alert pipeline.

use crate::core::{MailMessage, MailTransport, SmtpSettings};
use crate::error::AlertError;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Emits each alert as a structured `tracing` event on the `logroute::alert` target.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    delivered: AtomicUsize,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alerts logged so far.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl MailTransport for LoggingTransport {
    fn send(&self, smtp: &SmtpSettings, message: &MailMessage) -> Result<(), AlertError> {
        info!(
            target: "logroute::alert",
            smtp_host = %smtp.host,
            smtp_port = smtp.port,
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body.trim_end(),
            "Alert"
        );
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
