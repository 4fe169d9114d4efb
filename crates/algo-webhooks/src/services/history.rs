//! Delivery history queries for operators.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{Delivery, DeliveryListQuery, DeliveryPage};
use crate::store::{DeliveryLedger, SubscriptionStore};

/// Read-only view over the ledger, scoped per subscription.
#[derive(Clone)]
pub struct DeliveryHistory {
    subscriptions: Arc<dyn SubscriptionStore>,
    ledger: Arc<dyn DeliveryLedger>,
}

impl DeliveryHistory {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, ledger: Arc<dyn DeliveryLedger>) -> Self {
        Self {
            subscriptions,
            ledger,
        }
    }

    /// List deliveries of a subscription with pagination, newest first.
    pub async fn list(
        &self,
        subscription_id: Uuid,
        query: DeliveryListQuery,
    ) -> Result<DeliveryPage, WebhookError> {
        self.ensure_subscription(subscription_id).await?;

        let query = query.normalized();
        let items = self
            .ledger
            .list_by_subscription(subscription_id, &query)
            .await?;
        let total = self
            .ledger
            .count_by_subscription(subscription_id, query.status)
            .await?;

        Ok(DeliveryPage {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Get a single delivery belonging to a subscription.
    pub async fn get(
        &self,
        subscription_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Delivery, WebhookError> {
        self.ensure_subscription(subscription_id).await?;

        self.ledger
            .find_by_id(delivery_id)
            .await?
            .filter(|d| d.subscription_id == subscription_id)
            .ok_or(WebhookError::DeliveryNotFound)
    }

    async fn ensure_subscription(&self, subscription_id: Uuid) -> Result<(), WebhookError> {
        self.subscriptions
            .find_by_id(subscription_id)
            .await?
            .map(|_| ())
            .ok_or(WebhookError::SubscriptionNotFound)
    }
}
