//! Axum router setup for webhook endpoints.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::deliveries;
use crate::services::history::DeliveryHistory;
use crate::store::{DeliveryLedger, SubscriptionStore};

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct WebhooksState {
    pub history: Arc<DeliveryHistory>,
}

impl WebhooksState {
    /// Create a new webhooks state.
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, ledger: Arc<dyn DeliveryLedger>) -> Self {
        Self {
            history: Arc::new(DeliveryHistory::new(subscriptions, ledger)),
        }
    }
}

/// Creates the webhook router with the delivery history routes.
pub fn webhooks_router(state: WebhooksState) -> Router {
    Router::new()
        .route(
            "/webhooks/:id/deliveries",
            get(deliveries::list_deliveries_handler),
        )
        .route(
            "/webhooks/:id/deliveries/:delivery_id",
            get(deliveries::get_delivery_handler),
        )
        .with_state(state)
}
