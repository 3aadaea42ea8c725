//! Escalation of marked events to an external notification channel.
//!
//! The alert path is a best-effort side channel: the dispatcher invokes it
//! after routing, and its failures are logged and dropped so they can never
//! prevent or roll back the primary file write.
pub mod forwarder;
pub mod logging_transport;

pub use forwarder::AlertForwarder;
pub use logging_transport::LoggingTransport;
