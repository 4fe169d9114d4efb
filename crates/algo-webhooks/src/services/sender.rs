//! Outbound HTTP delivery of a single signed attempt.

use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::crypto::SignedPayload;
use crate::error::WebhookError;
use crate::models::Subscription;

pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";
pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_DELIVERY: &str = "X-Webhook-Delivery";
pub const HEADER_ATTEMPT: &str = "X-Webhook-Attempt";

/// Result of an attempt the subscriber answered with 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub status: u16,
    pub body: String,
    pub latency_ms: u64,
}

/// Performs one outbound attempt and classifies the outcome.
///
/// Non-2xx answers surface as [`WebhookError::NonSuccessStatus`], transport
/// failures as [`WebhookError::Transport`].
#[async_trait::async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &SignedPayload,
        delivery_id: Uuid,
        attempt: i32,
    ) -> Result<SendOutcome, WebhookError>;
}

/// reqwest-backed sender.
#[derive(Clone)]
pub struct HttpSender {
    client: Client,
    response_body_limit: usize,
}

impl HttpSender {
    /// Create a sender with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            response_body_limit: config.response_body_limit,
        })
    }
}

/// Build the outbound header set for one attempt.
pub fn build_headers(
    payload: &SignedPayload,
    delivery_id: Uuid,
    attempt: i32,
) -> Result<HeaderMap, WebhookError> {
    fn value(name: &str, raw: &str) -> Result<HeaderValue, WebhookError> {
        HeaderValue::from_str(raw)
            .map_err(|e| WebhookError::Internal(format!("Invalid {name} header value: {e}")))
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HEADER_SIGNATURE,
        value(HEADER_SIGNATURE, payload.signature())?,
    );
    headers.insert(HEADER_EVENT, value(HEADER_EVENT, payload.event())?);
    headers.insert(
        HEADER_DELIVERY,
        value(HEADER_DELIVERY, &delivery_id.to_string())?,
    );
    headers.insert(HEADER_ATTEMPT, HeaderValue::from(attempt));
    Ok(headers)
}

#[async_trait::async_trait]
impl WebhookSender for HttpSender {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &SignedPayload,
        delivery_id: Uuid,
        attempt: i32,
    ) -> Result<SendOutcome, WebhookError> {
        let headers = build_headers(payload, delivery_id, attempt)?;

        let start = Instant::now();
        let response = self
            .client
            .post(&subscription.url)
            .headers(headers)
            .body(payload.body().to_vec())
            .send()
            .await
            .map_err(|e| {
                WebhookError::Transport(if e.is_timeout() {
                    format!("Request timeout: {e}")
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::NonSuccessStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(self.response_body_limit)
            .collect::<String>();

        Ok(SendOutcome {
            status: status.as_u16(),
            body,
            latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}
