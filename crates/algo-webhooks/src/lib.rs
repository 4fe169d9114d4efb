//! Webhook delivery engine for platform state-change events.
//!
//! Matches triggered events against registered subscriptions, delivers each
//! match as a signed HTTP POST with bounded retries and fixed backoff, and
//! records every delivery and its outcome in a ledger.
//!
//! ```no_run
//! use std::sync::Arc;
//! use algo_webhooks::{
//!     InMemoryDeliveryLedger, InMemorySubscriptionStore, ScopeId, WebhookConfig,
//!     WebhookDispatcher,
//! };
//!
//! # async fn run() -> Result<(), algo_webhooks::WebhookError> {
//! let config = WebhookConfig::from_env()?;
//! let dispatcher = WebhookDispatcher::with_http(
//!     Arc::new(InMemorySubscriptionStore::new()),
//!     Arc::new(InMemoryDeliveryLedger::new()),
//!     &config,
//! )?;
//!
//! dispatcher.trigger_event("project.created", serde_json::json!({"id": 42}), Some(ScopeId(7)));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod router;
pub mod services;
pub mod store;
pub mod timer;

pub use config::WebhookConfig;
pub use crypto::{sign, verify_signature, SignedPayload};
pub use error::WebhookError;
pub use models::{Delivery, DeliveryStatus, ScopeId, Subscription, WebhookPayload};
pub use postgres::{PgDeliveryLedger, PgSubscriptionStore};
pub use router::{webhooks_router, WebhooksState};
pub use services::dispatcher::{TriggerHandle, WebhookDispatcher};
pub use services::history::DeliveryHistory;
pub use services::orchestrator::{DeliveryOrchestrator, RetryPolicy};
pub use services::sender::{HttpSender, SendOutcome, WebhookSender};
pub use store::{DeliveryLedger, InMemoryDeliveryLedger, InMemorySubscriptionStore, SubscriptionStore};
pub use timer::{Timer, TokioTimer};
