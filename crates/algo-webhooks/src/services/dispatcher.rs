//! Entry point: fan one triggered event out to every matching subscription.
//!
//! Notification is best-effort. Callers never see lookup or delivery failures;
//! those are logged and recorded in the ledger.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::WebhookConfig;
use crate::error::WebhookError;
use crate::models::{Delivery, ScopeId, WebhookPayload};
use crate::services::matcher::SubscriptionMatcher;
use crate::services::orchestrator::{DeliveryOrchestrator, RetryPolicy};
use crate::services::sender::{HttpSender, WebhookSender};
use crate::store::{DeliveryLedger, SubscriptionStore};
use crate::timer::{Timer, TokioTimer};

/// Fan-out service owning the matcher and the per-delivery orchestrator.
///
/// Cheap to clone; clones share the same stores, sender, and concurrency
/// permits.
#[derive(Clone)]
pub struct WebhookDispatcher {
    matcher: SubscriptionMatcher,
    orchestrator: Arc<DeliveryOrchestrator>,
    timer: Arc<dyn Timer>,
    permits: Arc<Semaphore>,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        ledger: Arc<dyn DeliveryLedger>,
        sender: Arc<dyn WebhookSender>,
        timer: Arc<dyn Timer>,
        config: &WebhookConfig,
    ) -> Self {
        let orchestrator = DeliveryOrchestrator::new(
            ledger,
            sender,
            timer.clone(),
            RetryPolicy::from_config(config),
        );

        Self {
            matcher: SubscriptionMatcher::new(store),
            orchestrator: Arc::new(orchestrator),
            timer,
            permits: Arc::new(Semaphore::new(config.max_concurrent_deliveries)),
        }
    }

    /// Production wiring: reqwest sender and tokio timer.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn with_http(
        store: Arc<dyn SubscriptionStore>,
        ledger: Arc<dyn DeliveryLedger>,
        config: &WebhookConfig,
    ) -> Result<Self, WebhookError> {
        let sender = HttpSender::new(config)?;
        Ok(Self::new(
            store,
            ledger,
            Arc::new(sender),
            Arc::new(TokioTimer),
            config,
        ))
    }

    /// Notify subscribers of `event` without waiting for delivery.
    ///
    /// Spawns the fan-out on the current tokio runtime and returns at once.
    /// Dropping the returned handle detaches the deliveries; they still run
    /// to a terminal status.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn trigger_event(
        &self,
        event: impl Into<String>,
        data: serde_json::Value,
        scope: Option<ScopeId>,
    ) -> TriggerHandle {
        let dispatcher = self.clone();
        let event = event.into();
        let handle =
            tokio::spawn(async move { dispatcher.deliver_event(&event, data, scope).await });
        TriggerHandle { handle }
    }

    /// Notify subscribers of `event` and wait until every delivery resolves.
    ///
    /// Returns the resolved deliveries in completion order. Subscriptions whose
    /// pending row could not be written are logged and left out.
    pub async fn deliver_event(
        &self,
        event: &str,
        data: serde_json::Value,
        scope: Option<ScopeId>,
    ) -> Vec<Delivery> {
        let payload = Arc::new(WebhookPayload::new(event, data, self.timer.now()));

        let subscriptions = match self.matcher.find_matches(event, scope).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event = %event,
                    scope = ?scope,
                    error = %e,
                    "Failed to query matching subscriptions"
                );
                return Vec::new();
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event = %event,
                scope = ?scope,
                "No active subscriptions match event"
            );
            return Vec::new();
        }

        tracing::info!(
            target: "webhook_delivery",
            event = %event,
            scope = ?scope,
            subscription_count = subscriptions.len(),
            "Delivering event to matching subscriptions"
        );

        let mut tasks = JoinSet::new();
        for subscription in subscriptions {
            let orchestrator = self.orchestrator.clone();
            let permits = self.permits.clone();
            let payload = payload.clone();

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(WebhookError::Internal(e.to_string())),
                };

                let result = orchestrator.run(&subscription, &payload).await;
                if let Err(ref e) = result {
                    tracing::error!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to start delivery"
                    );
                }
                result
            });
        }

        let mut deliveries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(delivery)) => deliveries.push(delivery),
                Ok(Err(_)) => {}
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        event = %event,
                        error = %e,
                        "Delivery task panicked or was cancelled"
                    );
                }
            }
        }
        deliveries
    }
}

/// Handle to a spawned fan-out. Safe to drop.
#[derive(Debug)]
pub struct TriggerHandle {
    handle: JoinHandle<Vec<Delivery>>,
}

impl TriggerHandle {
    /// Wait for every delivery of the triggered event to resolve.
    pub async fn wait(self) -> Vec<Delivery> {
        match self.handle.await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Event fan-out task failed"
                );
                Vec::new()
            }
        }
    }
}
