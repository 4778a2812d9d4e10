//! Operator notification delivery.
//!
//! Every terminal failure in the system — spawn failures, non-zero worker
//! exits, protocol failures, quarantined intake files — reaches a
//! [`Notifier`] with enough context for a human operator to act. Delivery
//! status is ignorable by contract: a notification that cannot be delivered
//! is logged and dropped, never allowed to fail the flow that raised it.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{info, warn};

use edigate_config::NotifySettings;

const NOTIFY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::delivery");

/// One operator notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Originator mailbox.
    pub from: String,
    /// Recipient mailbox.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Free-text body.
    pub body: String,
}

impl Notification {
    /// Builds a notification.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Renders the notification as an RFC-822-shaped message for a local
    /// mail command.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "To: {}\r\nFrom: {}\r\nSubject: {}\r\n\r\n{}\r\n",
            self.to, self.from, self.subject, self.body
        )
    }
}

/// Delivers notifications to the operator.
pub trait Notifier: Send + Sync {
    /// Delivers one notification; delivery status is ignorable.
    fn notify(&self, notification: &Notification);
}

/// Notifier that emits notifications through the log stream.
///
/// Used in terminal mode and wherever no mail command is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Builds a log-backed notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        info!(
            target: NOTIFY_TARGET,
            to = %notification.to,
            subject = %notification.subject,
            body = %notification.body,
            "operator notification"
        );
    }
}

/// Notifier that pipes the rendered message to a local mail command.
#[derive(Debug)]
pub struct MailCommandNotifier {
    command: String,
    args: Vec<String>,
}

impl MailCommandNotifier {
    /// Builds a notifier from a whitespace-separated command line, e.g.
    /// `sendmail -t`. Returns `None` for an empty command line.
    #[must_use]
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let command = words.next()?;
        Some(Self {
            command,
            args: words.collect(),
        })
    }

    fn deliver(&self, notification: &Notification) -> std::io::Result<()> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(notification.render().as_bytes())?;
            // Dropping the handle closes the pipe so the command sees EOF.
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(std::io::Error::other(format!(
                "mail command exited with {status}"
            )));
        }
        Ok(())
    }
}

impl Notifier for MailCommandNotifier {
    fn notify(&self, notification: &Notification) {
        if let Err(error) = self.deliver(notification) {
            warn!(
                target: NOTIFY_TARGET,
                command = %self.command,
                subject = %notification.subject,
                error = %error,
                "notification delivery failed"
            );
        }
    }
}

/// Builds the notifier selected by the settings: the mail command when one
/// is configured, the log stream otherwise.
#[must_use]
pub fn from_settings(settings: &NotifySettings) -> Box<dyn Notifier> {
    settings
        .mail_command
        .as_deref()
        .and_then(MailCommandNotifier::parse)
        .map_or_else(
            || Box::new(LogNotifier::new()) as Box<dyn Notifier>,
            |notifier| Box::new(notifier) as Box<dyn Notifier>,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headers_then_body() {
        let notification = Notification::new(
            "edigate@localhost",
            "operator@localhost",
            "[EDI] File Received: ORDER_G41_PROJ1_12345.json",
            "Filename: ORDER_G41_PROJ1_12345.json",
        );
        let rendered = notification.render();
        assert!(rendered.starts_with("To: operator@localhost\r\n"));
        assert!(rendered.contains("Subject: [EDI] File Received: ORDER_G41_PROJ1_12345.json\r\n"));
        assert!(rendered.ends_with("\r\n\r\nFilename: ORDER_G41_PROJ1_12345.json\r\n"));
    }

    #[test]
    fn parse_splits_command_and_arguments() {
        let notifier = MailCommandNotifier::parse("sendmail -t -oi").unwrap();
        assert_eq!(notifier.command, "sendmail");
        assert_eq!(notifier.args, vec!["-t", "-oi"]);
        assert!(MailCommandNotifier::parse("   ").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn delivery_runs_the_configured_command() {
        let notifier = MailCommandNotifier::parse("/bin/cat").unwrap();
        let notification = Notification::new("a@x", "b@x", "subject", "body");
        notifier
            .deliver(&notification)
            .expect("cat should accept the message");
    }

    #[cfg(unix)]
    #[test]
    fn delivery_failure_is_swallowed() {
        let notifier = MailCommandNotifier::parse("/bin/false").unwrap();
        // Must not panic or propagate.
        notifier.notify(&Notification::new("a@x", "b@x", "s", "b"));
    }

    #[test]
    fn settings_without_a_command_select_the_log_notifier() {
        let settings = edigate_config::NotifySettings::default();
        let notifier = from_settings(&settings);
        notifier.notify(&Notification::new("a@x", "b@x", "s", "b"));
    }
}
