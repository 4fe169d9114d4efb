//! Domain types shared by the matcher, orchestrator, ledger, and history API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier narrowing which events a subscription receives (e.g. a project).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub i64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ScopeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A registered endpoint interested in a set of named events.
///
/// Owned by the registry; the delivery engine only reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub url: String,
    /// Shared HMAC secret. Never logged.
    pub secret: String,
    pub events: Vec<String>,
    /// `None` matches every caller scope.
    pub scope: Option<ScopeId>,
    pub active: bool,
}

impl Subscription {
    /// Exact membership test on the subscribed event names.
    #[must_use]
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    /// Global subscriptions accept any scope; scoped ones only their own.
    #[must_use]
    pub fn accepts_scope(&self, scope: Option<ScopeId>) -> bool {
        match self.scope {
            None => true,
            Some(own) => scope == Some(own),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .field("events", &self.events)
            .field("scope", &self.scope)
            .field("active", &self.active)
            .finish()
    }
}

/// JSON body POSTed to subscriber endpoints.
///
/// Field order is the wire order: `event`, `data`, `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: serde_json::Value,
    /// Fixed at trigger time and reused verbatim by every retry.
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn new(event: impl Into<String>, data: serde_json::Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp,
        }
    }
}

/// Lifecycle status of a delivery. `Delivered` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification of one subscription about one event occurrence.
///
/// `id`, `subscription_id`, `event`, `payload`, and `created_at` never change
/// after the row is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// A fresh `pending` delivery with no attempts yet.
    #[must_use]
    pub fn pending(
        subscription_id: Uuid,
        event: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            event: event.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            response_status: None,
            response_body: None,
            error_message: None,
            created_at,
            delivered_at: None,
        }
    }
}

/// Query parameters for listing a subscription's delivery history.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub status: Option<DeliveryStatus>,
}

fn default_limit() -> i64 {
    20
}

impl Default for DeliveryListQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            status: None,
        }
    }
}

impl DeliveryListQuery {
    /// Clamp `limit` to 1..=100 and `offset` to non-negative.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 100),
            offset: self.offset.max(0),
            status: self.status,
        }
    }
}

/// A page of delivery history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPage {
    pub items: Vec<Delivery>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
