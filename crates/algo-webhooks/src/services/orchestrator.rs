//! Retry/backoff state machine for a single delivery.
//!
//! ```text
//! Created -> Attempting(1) -> Delivered
//!                          -> RetryScheduled(1, d) -> Attempting(2) -> ...
//!                          -> Failed
//! ```
//!
//! Attempts of one delivery are strictly sequential. The only state carried
//! from one attempt to the next is the attempt counter and the sealed payload.

use std::sync::Arc;
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::crypto::SignedPayload;
use crate::error::WebhookError;
use crate::models::{Delivery, DeliveryStatus, Subscription, WebhookPayload};
use crate::services::sender::WebhookSender;
use crate::store::DeliveryLedger;
use crate::timer::Timer;

/// Attempt limit and inter-attempt delay schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: i32,
    schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WebhookConfig::default())
    }
}

impl RetryPolicy {
    /// `max_attempts` is raised to at least 1; an empty schedule means no delay.
    #[must_use]
    pub fn new(max_attempts: i32, schedule: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule,
        }
    }

    #[must_use]
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_schedule.clone())
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Delay after the 1-based attempt `completed` failed.
    ///
    /// Indexes the schedule by `completed - 1` and reuses the last entry once
    /// the schedule is exhausted.
    #[must_use]
    pub fn delay_after(&self, completed: i32) -> Duration {
        let idx = usize::try_from(completed.saturating_sub(1)).unwrap_or(0);
        self.schedule
            .get(idx)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&self, completed: i32) -> Option<Duration> {
        if completed >= self.max_attempts {
            return None;
        }
        Some(self.delay_after(completed))
    }
}

/// States of one delivery. `Delivered` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Created,
    Attempting { attempt: i32 },
    RetryScheduled { attempt: i32, delay: Duration },
    Delivered { attempts: i32 },
    Failed { attempts: i32 },
}

impl DeliveryState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::Failed { .. })
    }
}

/// Drives one delivery from its `pending` row to a terminal status.
///
/// The orchestrator is the only writer of a delivery's lifecycle fields.
pub struct DeliveryOrchestrator {
    ledger: Arc<dyn DeliveryLedger>,
    sender: Arc<dyn WebhookSender>,
    timer: Arc<dyn Timer>,
    policy: RetryPolicy,
}

impl DeliveryOrchestrator {
    pub fn new(
        ledger: Arc<dyn DeliveryLedger>,
        sender: Arc<dyn WebhookSender>,
        timer: Arc<dyn Timer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            sender,
            timer,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Persist a `pending` delivery for `subscription` and run it to completion.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::LedgerWrite` if the pending row cannot be
    /// stored, and `WebhookError::Serialization` if the payload cannot be
    /// serialized. Delivery failures are not errors: they resolve the
    /// returned delivery as `failed`.
    pub async fn run(
        &self,
        subscription: &Subscription,
        payload: &WebhookPayload,
    ) -> Result<Delivery, WebhookError> {
        let sealed = SignedPayload::seal(payload, &subscription.secret)?;
        let snapshot = serde_json::to_value(payload)?;

        let delivery = Delivery::pending(
            subscription.id,
            payload.event.clone(),
            snapshot,
            self.timer.now(),
        );

        self.ledger.create(&delivery).await.map_err(|e| match e {
            WebhookError::LedgerWrite(msg) => WebhookError::LedgerWrite(msg),
            other => WebhookError::LedgerWrite(other.to_string()),
        })?;

        tracing::debug!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %subscription.id,
            event = %delivery.event,
            "Created pending delivery"
        );

        Ok(self.drive(delivery, subscription, &sealed).await)
    }

    /// Run the attempt loop for an already-persisted pending delivery.
    async fn drive(
        &self,
        mut delivery: Delivery,
        subscription: &Subscription,
        sealed: &SignedPayload,
    ) -> Delivery {
        let mut state = DeliveryState::Created;

        while !state.is_terminal() {
            state = match state {
                DeliveryState::Created => DeliveryState::Attempting { attempt: 1 },
                DeliveryState::Attempting { attempt } => {
                    self.attempt(&mut delivery, subscription, sealed, attempt)
                        .await
                }
                DeliveryState::RetryScheduled { attempt, delay } => {
                    self.timer.sleep(delay).await;
                    DeliveryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                terminal => terminal,
            };
        }

        delivery
    }

    /// Perform attempt number `attempt` and decide the next state.
    async fn attempt(
        &self,
        delivery: &mut Delivery,
        subscription: &Subscription,
        sealed: &SignedPayload,
        attempt: i32,
    ) -> DeliveryState {
        delivery.attempts = attempt;

        match self
            .sender
            .send(subscription, sealed, delivery.id, attempt)
            .await
        {
            Ok(outcome) => {
                tracing::info!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    subscription_id = %subscription.id,
                    event = %delivery.event,
                    response_code = outcome.status,
                    latency_ms = outcome.latency_ms,
                    attempt,
                    "Webhook delivery succeeded"
                );

                let delivered_at = self.timer.now();
                delivery.status = DeliveryStatus::Delivered;
                delivery.response_status = Some(outcome.status);
                delivery.response_body = Some(outcome.body);
                delivery.error_message = None;
                delivery.delivered_at = Some(delivered_at);

                if let Err(e) = self
                    .ledger
                    .mark_delivered(
                        delivery.id,
                        attempt,
                        outcome.status,
                        delivery.response_body.as_deref().unwrap_or_default(),
                        delivered_at,
                    )
                    .await
                {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to update delivery status to delivered"
                    );
                }

                DeliveryState::Delivered { attempts: attempt }
            }
            Err(err) => {
                let error_message = err.to_string();
                let next_delay = if err.is_retryable() {
                    self.policy.next_delay(attempt)
                } else {
                    None
                };
                delivery.error_message = Some(error_message.clone());

                tracing::warn!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    subscription_id = %subscription.id,
                    event = %delivery.event,
                    error = %error_message,
                    attempt,
                    has_next_retry = next_delay.is_some(),
                    "Webhook delivery attempt failed"
                );

                match next_delay {
                    Some(delay) => {
                        if let Err(e) = self
                            .ledger
                            .record_attempt(delivery.id, attempt, &error_message)
                            .await
                        {
                            tracing::error!(
                                target: "webhook_delivery",
                                delivery_id = %delivery.id,
                                error = %e,
                                "Failed to record delivery attempt"
                            );
                        }
                        DeliveryState::RetryScheduled { attempt, delay }
                    }
                    None => {
                        delivery.status = DeliveryStatus::Failed;

                        if let Err(e) = self
                            .ledger
                            .mark_failed(delivery.id, attempt, &error_message)
                            .await
                        {
                            tracing::error!(
                                target: "webhook_delivery",
                                delivery_id = %delivery.id,
                                error = %e,
                                "Failed to update delivery status to failed"
                            );
                        }

                        DeliveryState::Failed { attempts: attempt }
                    }
                }
            }
        }
    }
}
