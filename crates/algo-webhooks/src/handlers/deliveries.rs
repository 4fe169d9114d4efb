//! Delivery history query handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{Delivery, DeliveryListQuery, DeliveryPage};
use crate::router::WebhooksState;

/// List deliveries for a subscription.
///
/// `GET /webhooks/{id}/deliveries?limit=&offset=&status=`
pub async fn list_deliveries_handler(
    State(state): State<WebhooksState>,
    Path(subscription_id): Path<Uuid>,
    Query(query): Query<DeliveryListQuery>,
) -> ApiResult<Json<DeliveryPage>> {
    let page = state.history.list(subscription_id, query).await?;
    Ok(Json(page))
}

/// Get a single delivery, including its payload snapshot and outcome.
///
/// `GET /webhooks/{id}/deliveries/{delivery_id}`
pub async fn get_delivery_handler(
    State(state): State<WebhooksState>,
    Path((subscription_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Delivery>> {
    let delivery = state.history.get(subscription_id, delivery_id).await?;
    Ok(Json(delivery))
}
