//! Storage seams of the delivery engine.
//!
//! [`SubscriptionStore`] is read-only from the engine's point of view.
//! [`DeliveryLedger`] is the only mutable shared resource; every write is
//! scoped to one delivery row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{Delivery, DeliveryListQuery, DeliveryStatus, ScopeId, Subscription};

/// Source of registered subscriptions.
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions that list `event` and accept `scope`.
    async fn find_active_by_event(
        &self,
        event: &str,
        scope: Option<ScopeId>,
    ) -> Result<Vec<Subscription>, WebhookError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>, WebhookError>;
}

/// Durable record of deliveries and their outcomes.
///
/// Updates only ever touch a `pending` row; once a delivery is `delivered` or
/// `failed` further updates are ignored.
#[async_trait::async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Insert a new `pending` row.
    async fn create(&self, delivery: &Delivery) -> Result<(), WebhookError>;

    /// Record a failed attempt that will be retried.
    async fn record_attempt(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError>;

    async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        response_status: u16,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), WebhookError>;

    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Delivery>, WebhookError>;

    /// Deliveries of one subscription, newest first.
    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        query: &DeliveryListQuery,
    ) -> Result<Vec<Delivery>, WebhookError>;

    async fn count_by_subscription(
        &self,
        subscription_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<i64, WebhookError>;
}

/// In-memory subscription store for embedding and tests.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscription.
    pub async fn upsert(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }

    /// Toggle the active flag. Returns false if the subscription is unknown.
    pub async fn set_active(&self, id: Uuid, active: bool) -> bool {
        match self.subscriptions.write().await.get_mut(&id) {
            Some(sub) => {
                sub.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_active_by_event(
        &self,
        event: &str,
        scope: Option<ScopeId>,
    ) -> Result<Vec<Subscription>, WebhookError> {
        let subs = self.subscriptions.read().await;
        Ok(subs
            .values()
            .filter(|s| s.active && s.subscribes_to(event) && s.accepts_scope(scope))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>, WebhookError> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }
}

/// In-memory delivery ledger for embedding and tests.
#[derive(Default)]
pub struct InMemoryDeliveryLedger {
    deliveries: RwLock<HashMap<Uuid, Delivery>>,
}

impl InMemoryDeliveryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored delivery.
    pub async fn all(&self) -> Vec<Delivery> {
        self.deliveries.read().await.values().cloned().collect()
    }

    /// Apply `update` to a pending row; terminal rows are left untouched.
    async fn update_pending<F>(&self, id: Uuid, update: F) -> Result<(), WebhookError>
    where
        F: FnOnce(&mut Delivery) + Send,
    {
        let mut deliveries = self.deliveries.write().await;
        let delivery = deliveries
            .get_mut(&id)
            .ok_or(WebhookError::DeliveryNotFound)?;

        if delivery.status.is_terminal() {
            tracing::warn!(
                target: "webhook_delivery",
                delivery_id = %id,
                status = %delivery.status,
                "Ignoring update to resolved delivery"
            );
            return Ok(());
        }

        update(delivery);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeliveryLedger for InMemoryDeliveryLedger {
    async fn create(&self, delivery: &Delivery) -> Result<(), WebhookError> {
        let mut deliveries = self.deliveries.write().await;
        if deliveries.contains_key(&delivery.id) {
            return Err(WebhookError::LedgerWrite(format!(
                "delivery {} already exists",
                delivery.id
            )));
        }
        deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError> {
        let error_message = error_message.to_string();
        self.update_pending(id, move |d| {
            d.attempts = attempts;
            d.error_message = Some(error_message);
        })
        .await
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        response_status: u16,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let response_body = response_body.to_string();
        self.update_pending(id, move |d| {
            d.status = DeliveryStatus::Delivered;
            d.attempts = attempts;
            d.response_status = Some(response_status);
            d.response_body = Some(response_body);
            d.error_message = None;
            d.delivered_at = Some(delivered_at);
        })
        .await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError> {
        let error_message = error_message.to_string();
        self.update_pending(id, move |d| {
            d.status = DeliveryStatus::Failed;
            d.attempts = attempts;
            d.error_message = Some(error_message);
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Delivery>, WebhookError> {
        Ok(self.deliveries.read().await.get(&id).cloned())
    }

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        query: &DeliveryListQuery,
    ) -> Result<Vec<Delivery>, WebhookError> {
        let deliveries = self.deliveries.read().await;
        let mut matching: Vec<Delivery> = deliveries
            .values()
            .filter(|d| d.subscription_id == subscription_id)
            .filter(|d| query.status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(query.offset).unwrap_or(0);
        let limit = usize::try_from(query.limit).unwrap_or(0);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_by_subscription(
        &self,
        subscription_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<i64, WebhookError> {
        let deliveries = self.deliveries.read().await;
        let count = deliveries
            .values()
            .filter(|d| d.subscription_id == subscription_id)
            .filter(|d| status.map_or(true, |s| d.status == s))
            .count();
        Ok(count as i64)
    }
}
