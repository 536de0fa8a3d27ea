//! Notification Transport Seam
//!
//! The sweep only needs two things from the outside world: deliver a text
//! to a worker, and learn whether the delivery failed for good (the worker
//! revoked access) or just for now. Everything else about the messaging
//! platform stays behind this trait.

use crate::error::NotifyError;
use crate::store::types::WorkerId;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, worker_id: WorkerId, text: &str) -> Result<(), NotifyError>;
}

/// Log-only notifier for deployments without a delivery channel.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, worker_id: WorkerId, text: &str) -> Result<(), NotifyError> {
        tracing::info!("(noop) notify worker {}: {}", worker_id.0, text);
        Ok(())
    }
}

#[derive(Serialize)]
struct NotifyRequest<'a> {
    worker_id: i64,
    text: &'a str,
}

/// Delivers notifications by POSTing to an external gateway, with bounded
/// retries and jittered backoff for transient trouble. HTTP 403 and 410
/// mean the recipient is gone for good.
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    base_url: String,
}

impl WebhookNotifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, worker_id: WorkerId, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/notify", self.base_url);
        let payload = NotifyRequest {
            worker_id: worker_id.0,
            text,
        };

        let mut delay_ms = 150u64;
        const ATTEMPTS: usize = 3;

        for attempt in 0..ATTEMPTS {
            let response = self
                .http_client
                .post(&url)
                .json(&payload)
                .timeout(Duration::from_millis(2_000))
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if status == reqwest::StatusCode::FORBIDDEN
                        || status == reqwest::StatusCode::GONE
                    {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(NotifyError::Permanent(format!("{}: {}", status, body)));
                    }
                    if attempt + 1 == ATTEMPTS {
                        return Err(NotifyError::Transient(format!("HTTP {}", status)));
                    }
                }
                Err(e) => {
                    if attempt + 1 == ATTEMPTS {
                        return Err(NotifyError::Transient(e.to_string()));
                    }
                }
            }

            // Simple jitter to avoid hammering a struggling gateway
            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1_200);
        }

        Err(NotifyError::Transient("retry attempts exhausted".to_string()))
    }
}
