use std::sync::Arc;
use std::time::Duration;

use agenda_config::{Config, Delivery};
use agenda_contracts::{Message, PushRequest, ReplyRequest, MAX_MESSAGES_PER_REQUEST};
use agenda_kernel::{Backoff, FailureClass, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::DeliveryError;

/// Sent in place of the original payload once every retry has failed.
pub const FALLBACK_TEXT: &str = "❌ เกิดข้อผิดพลาด กรุณาลองใหม่";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<(), DeliveryError>;
    async fn push(&self, user_id: &str, messages: &[Message]) -> Result<(), DeliveryError>;
}

pub struct LineMessagingApi {
    http: Client,
    api_base_url: String,
    access_token: String,
}

impl LineMessagingApi {
    pub fn new(cfg: &Config) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.line.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            http,
            api_base_url: cfg.line.api_base_url.trim_end_matches('/').to_string(),
            access_token: cfg.access_token().to_string(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), DeliveryError> {
        let url = format!("{}{path}", self.api_base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_response(status, body))
    }
}

fn classify_response(status: StatusCode, body: String) -> DeliveryError {
    match status {
        StatusCode::BAD_REQUEST if body.to_lowercase().contains("invalid reply token") => {
            DeliveryError::InvalidToken
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DeliveryError::Unauthorized(status.as_u16())
        }
        StatusCode::TOO_MANY_REQUESTS => DeliveryError::RateLimited,
        _ => DeliveryError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl MessagingApi for LineMessagingApi {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<(), DeliveryError> {
        let body = ReplyRequest {
            reply_token: reply_token.to_string(),
            messages: messages.to_vec(),
        };
        self.post("/v2/bot/message/reply", &body).await
    }

    async fn push(&self, user_id: &str, messages: &[Message]) -> Result<(), DeliveryError> {
        let body = PushRequest {
            to: user_id.to_string(),
            messages: messages.to_vec(),
        };
        self.post("/v2/bot/message/push", &body).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Single-use token from an inbound event.
    Reply(String),
    /// Unsolicited message to a user id.
    Push(String),
}

pub fn retry_policy(cfg: &Delivery) -> RetryPolicy {
    let backoff = |step: u64, cap: u64| Backoff {
        step: Duration::from_millis(step),
        cap: Duration::from_millis(cap),
    };
    RetryPolicy {
        max_attempts: cfg.max_attempts.max(1),
        connection: backoff(cfg.connection_step_ms, cfg.connection_cap_ms),
        rate_limit: backoff(cfg.rate_limit_step_ms, cfg.rate_limit_cap_ms),
        other: backoff(cfg.other_step_ms, cfg.other_cap_ms),
    }
}

/// Outbound sends with bounded retry. Never fails past its boundary: every
/// outcome collapses to a delivered flag, which is also true when only the
/// fallback notice got through.
pub struct DeliveryGateway {
    api: Arc<dyn MessagingApi>,
    policy: RetryPolicy,
}

enum Outcome {
    Delivered,
    GaveUp,
    Exhausted,
}

impl DeliveryGateway {
    pub fn new(api: Arc<dyn MessagingApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    pub async fn send(&self, destination: &Destination, messages: Vec<Message>) -> bool {
        self.send_with(destination, messages, true).await
    }

    /// Like [`DeliveryGateway::send`] but never substitutes the fallback
    /// notice: true only when the given messages themselves went through.
    pub async fn send_exact(&self, destination: &Destination, messages: Vec<Message>) -> bool {
        self.send_with(destination, messages, false).await
    }

    async fn send_with(
        &self,
        destination: &Destination,
        messages: Vec<Message>,
        fallback: bool,
    ) -> bool {
        if messages.is_empty() {
            return true;
        }
        match destination {
            Destination::Reply(_) => {
                let mut messages = messages;
                if messages.len() > MAX_MESSAGES_PER_REQUEST {
                    warn!(
                        count = messages.len(),
                        "Reply exceeds per-request limit, truncating"
                    );
                    messages.truncate(MAX_MESSAGES_PER_REQUEST);
                }
                self.send_batch(destination, &messages, fallback).await
            }
            Destination::Push(_) => {
                let mut delivered = true;
                for chunk in messages.chunks(MAX_MESSAGES_PER_REQUEST) {
                    delivered &= self.send_batch(destination, chunk, fallback).await;
                }
                delivered
            }
        }
    }

    async fn send_batch(
        &self,
        destination: &Destination,
        messages: &[Message],
        fallback: bool,
    ) -> bool {
        match self.attempt_with_retry(destination, messages).await {
            Outcome::Delivered => true,
            Outcome::GaveUp => false,
            Outcome::Exhausted if !fallback => {
                error!(count = messages.len(), "Delivery retries exhausted");
                false
            }
            Outcome::Exhausted => {
                let fallback = [Message::text(FALLBACK_TEXT)];
                match self.deliver(destination, &fallback).await {
                    Ok(()) => {
                        warn!("Delivered fallback notice after exhausting retries");
                        true
                    }
                    Err(e) => {
                        error!(error = %e, "Fallback notice failed");
                        false
                    }
                }
            }
        }
    }

    async fn attempt_with_retry(&self, destination: &Destination, messages: &[Message]) -> Outcome {
        for attempt in 1..=self.policy.max_attempts {
            let err = match self.deliver(destination, messages).await {
                Ok(()) => {
                    info!(attempt, count = messages.len(), "Messages delivered");
                    return Outcome::Delivered;
                }
                Err(e) => e,
            };
            let class = err.class();
            if class == FailureClass::Permanent {
                warn!(error = %err, attempt, "Permanent delivery failure");
                return Outcome::GaveUp;
            }
            match self.policy.delay_after(class, attempt) {
                Some(delay) => {
                    warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Delivery failed, retrying");
                    sleep(delay).await;
                }
                None => {
                    warn!(error = %err, attempt, "Delivery attempts exhausted");
                }
            }
        }
        Outcome::Exhausted
    }

    async fn deliver(&self, destination: &Destination, messages: &[Message]) -> Result<(), DeliveryError> {
        match destination {
            Destination::Reply(token) => self.api.reply(token, messages).await,
            Destination::Push(user) => self.api.push(user, messages).await,
        }
    }
}
