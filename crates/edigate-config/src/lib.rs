//! Shared configuration for the edigate services.
//!
//! The dispatcher daemon, the change watcher, and the worker binaries all
//! draw their socket endpoints, logging setup, platform capabilities, and
//! notification addressing from this crate so that the processes agree on
//! defaults without sharing mutable state. Everything here is plain data:
//! values are constructed once at startup and passed into components by
//! value.

mod capability;
mod defaults;
mod logging;
mod socket;

pub use capability::ProcessCapabilities;
pub use defaults::{
    DEBOUNCE_DELAY, DEFAULT_LISTEN_PORT, DEFAULT_LOG_FILTER, DEFAULT_PARTNER_PORT,
    ESCALATION_WINDOW, HANDOFF_GRACE, INTAKE_SETTLE, default_listen_endpoint,
    default_partner_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError, LogSettings, TelemetryError, init_telemetry};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Addressing and delivery settings for operator notifications.
///
/// `mail_command` names a local delivery command (for example `sendmail -t`
/// split into words by the caller); when absent, notifications are emitted
/// through the log stream instead.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    /// Originator mailbox recorded on every notification.
    pub from: String,
    /// Operator mailbox that receives every notification.
    pub to: String,
    /// Local mail delivery command, if any.
    pub mail_command: Option<String>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            from: "edigate@localhost".to_string(),
            to: "operator@localhost".to_string(),
            mail_command: None,
        }
    }
}
