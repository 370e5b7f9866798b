use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Out-of-band message delivery. Used only by the registration workflow.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Hands messages to a mail relay (or any HTTP endpoint) as a JSON POST.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { to, subject, body })
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "relay answered {}",
                resp.status()
            )));
        }

        info!("Notification sent to {}", to);
        Ok(())
    }
}

/// Development notifier: writes the message to the log instead of sending
/// it. The body (which carries the activation secret) is only logged at
/// debug level.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!("Notification for {}: {}", to, subject);
        debug!("Notification body: {}", body);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct SentMessage {
        pub to: String,
        pub subject: String,
        pub body: String,
    }

    /// Records every message; optionally fails all deliveries.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<SentMessage>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn last_secret(&self) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            sent.last()
                .and_then(|m| m.body.lines().next())
                .and_then(|line| line.rsplit(' ').next())
                .map(str::to_string)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Delivery("relay down".into()));
            }
            self.sent.lock().unwrap().push(SentMessage {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            Ok(())
        }
    }
}
