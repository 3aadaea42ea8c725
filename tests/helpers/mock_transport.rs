#![allow(dead_code)]
//! Mail transports for testing the alert path.

use anyhow::anyhow;
use logroute::core::{MailMessage, MailTransport, SmtpSettings};
use logroute::error::AlertError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Records every message it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl MailTransport for RecordingTransport {
    fn send(&self, _smtp: &SmtpSettings, message: &MailMessage) -> Result<(), AlertError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Fails every send, counting the attempts.
#[derive(Debug, Default)]
pub struct FailingTransport {
    attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MailTransport for FailingTransport {
    fn send(&self, _smtp: &SmtpSettings, _message: &MailMessage) -> Result<(), AlertError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AlertError::Transport(anyhow!("connection refused")))
    }
}
