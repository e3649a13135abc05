//! Notifier seam for job lifecycle events.
//!
//! The real notification fan-out (Slack, etc.) lives outside this service;
//! the engine only knows how to emit a structured event. The webhook
//! implementation posts JSON; the no-op implementation is the default when
//! no webhook is configured.

use async_trait::async_trait;
use scanner::Platform;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct NotifyEvent {
    pub job_id: Uuid,
    pub workflow_id: String,
    pub platform: Platform,
    pub kind: String,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent) -> Result<(), NotifyError>;
}

/// Posts events as JSON to a configured webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Swallows events; used when no webhook is configured.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        tracing::debug!(job_id = %event.job_id, kind = %event.kind, "notification dropped (no sink)");
        Ok(())
    }
}

/// Records events for test assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: std::sync::Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
