//! Outbound notifications (activation and password-reset links).
//!
//! Delivery is fire-and-forget from the caller's perspective: a failed send is
//! logged by the session service and never rolls back committed state.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    AccountActivation,
    PasswordReset,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::AccountActivation => "Activate your account",
            NotificationKind::PasswordReset => "Reset your password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub recipient_name: String,
    pub link: String,
    /// How long the embedded link stays usable.
    pub expires_in: Duration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifierError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        info!(
            recipient = %notification.recipient,
            subject = notification.kind.subject(),
            expires_in_minutes = notification.expires_in.num_minutes(),
            "notification dispatched"
        );
        debug!(link = %notification.link, "notification link");
        Ok(())
    }
}

/// Keeps every notification in memory; optionally fails every send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails (after recording the attempt).
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification.clone()),
            Err(poisoned) => poisoned.into_inner().push(notification.clone()),
        }
        if self.fail {
            return Err(NotifierError("smtp unavailable".to_string()));
        }
        Ok(())
    }
}

/// Builds the public links embedded in notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    base_url: String,
}

impl Links {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn activation(&self, token: &str) -> String {
        format!("{}/auth/enable-user/{}", self.base_url, token)
    }

    pub fn password_reset(&self, token: &str) -> String {
        format!("{}/auth/reset-password/{}", self.base_url, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_strip_trailing_slash() {
        let links = Links::new("https://id.example.com/");
        assert_eq!(links.activation("t"), "https://id.example.com/auth/enable-user/t");
        assert_eq!(links.password_reset("t"), "https://id.example.com/auth/reset-password/t");
    }

    #[tokio::test]
    async fn failing_notifier_still_records() {
        let notifier = RecordingNotifier::failing();
        let n = Notification {
            kind: NotificationKind::PasswordReset,
            recipient: "a@x.com".into(),
            recipient_name: "A".into(),
            link: "l".into(),
            expires_in: Duration::minutes(15),
        };
        assert!(notifier.send(&n).await.is_err());
        assert_eq!(notifier.sent(), vec![n]);
    }
}
