//! PostgreSQL-backed subscription store and delivery ledger.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::WebhookError;
use crate::models::{Delivery, DeliveryListQuery, DeliveryStatus, ScopeId, Subscription};
use crate::store::{DeliveryLedger, SubscriptionStore};

/// Apply the bundled migrations (`webhook_subscriptions`, `webhook_deliveries`).
pub async fn run_migrations(pool: &PgPool) -> Result<(), WebhookError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    url: String,
    secret: String,
    events: Vec<String>,
    scope_id: Option<i64>,
    active: bool,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            secret: row.secret,
            events: row.events,
            scope: row.scope_id.map(ScopeId),
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
struct DeliveryRow {
    id: Uuid,
    subscription_id: Uuid,
    event: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    response_status: Option<i32>,
    response_body: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = WebhookError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status).ok_or_else(|| {
            WebhookError::Internal(format!(
                "Unknown delivery status {:?} for delivery {}",
                row.status, row.id
            ))
        })?;

        Ok(Self {
            id: row.id,
            subscription_id: row.subscription_id,
            event: row.event,
            payload: row.payload,
            status,
            attempts: row.attempts,
            response_status: row.response_status.and_then(|s| u16::try_from(s).ok()),
            response_body: row.response_body,
            error_message: row.error_message,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        })
    }
}

const DELIVERY_COLUMNS: &str = "id, subscription_id, event, payload, status, attempts, \
     response_status, response_body, error_message, created_at, delivered_at";

/// Subscription store reading the `webhook_subscriptions` table.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_active_by_event(
        &self,
        event: &str,
        scope: Option<ScopeId>,
    ) -> Result<Vec<Subscription>, WebhookError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, url, secret, events, scope_id, active
            FROM webhook_subscriptions
            WHERE active
              AND $1 = ANY(events)
              AND (scope_id IS NULL OR scope_id = $2)
            "#,
        )
        .bind(event)
        .bind(scope.map(|s| s.0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>, WebhookError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, url, secret, events, scope_id, active
            FROM webhook_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Subscription::from))
    }
}

/// Delivery ledger over the `webhook_deliveries` table.
///
/// Lifecycle updates carry `AND status = 'pending'` so resolved rows stay
/// frozen.
#[derive(Clone)]
pub struct PgDeliveryLedger {
    pool: PgPool,
}

impl PgDeliveryLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_exists(&self, id: Uuid, rows_affected: u64) -> Result<(), WebhookError> {
        if rows_affected > 0 {
            return Ok(());
        }
        match self.find_by_id(id).await? {
            Some(existing) => {
                tracing::warn!(
                    target: "webhook_delivery",
                    delivery_id = %id,
                    status = %existing.status,
                    "Ignoring update to resolved delivery"
                );
                Ok(())
            }
            None => Err(WebhookError::DeliveryNotFound),
        }
    }
}

#[async_trait::async_trait]
impl DeliveryLedger for PgDeliveryLedger {
    async fn create(&self, delivery: &Delivery) -> Result<(), WebhookError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries
                (id, subscription_id, event, payload, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.subscription_id)
        .bind(&delivery.event)
        .bind(&delivery.payload)
        .bind(delivery.status.as_str())
        .bind(delivery.attempts)
        .bind(delivery.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| WebhookError::LedgerWrite(e.to_string()))?;

        Ok(())
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET attempts = $2, error_message = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        self.ensure_exists(id, result.rows_affected()).await
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        response_status: u16,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'delivered', attempts = $2, response_status = $3,
                response_body = $4, error_message = NULL, delivered_at = $5
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(i32::from(response_status))
        .bind(response_body)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;

        self.ensure_exists(id, result.rows_affected()).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'failed', attempts = $2, error_message = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        self.ensure_exists(id, result.rows_affected()).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Delivery>, WebhookError> {
        let row: Option<DeliveryRow> = sqlx::query_as(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        query: &DeliveryListQuery,
    ) -> Result<Vec<Delivery>, WebhookError> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE subscription_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(subscription_id)
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Delivery::try_from).collect()
    }

    async fn count_by_subscription(
        &self,
        subscription_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<i64, WebhookError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM webhook_deliveries
            WHERE subscription_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(subscription_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
