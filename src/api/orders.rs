use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::api::dto::*;
use crate::api::AppState;
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::aggregates::preorder::PreorderStatus;
use crate::domain::value_objects::{OrderId, PreorderId};
use crate::{MarketplaceError, Result};

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderView>> {
    Ok(Json(s.fulfillment.get_order(OrderId::from_uuid(id)).await?.into()))
}

pub async fn update_order_status(
    State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusUpdateRequest>,
) -> Result<Json<OrderView>> {
    r.validate()?;
    let next: OrderStatus = r.status.parse().map_err(MarketplaceError::InvalidRequest)?;
    let description = r.description.unwrap_or_else(|| format!("Order {next}"));
    let order = s.fulfillment.update_order_status(OrderId::from_uuid(id), next, &description, r.role).await?;
    Ok(Json(order.into()))
}

pub async fn get_preorder(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PreorderView>> {
    Ok(Json(s.fulfillment.get_preorder(PreorderId::from_uuid(id)).await?.into()))
}

pub async fn update_preorder_status(
    State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StatusUpdateRequest>,
) -> Result<Json<PreorderView>> {
    r.validate()?;
    let next: PreorderStatus = r.status.parse().map_err(MarketplaceError::InvalidRequest)?;
    let description = r.description.unwrap_or_else(|| format!("Preorder {next}"));
    let preorder = s.fulfillment.update_preorder_status(PreorderId::from_uuid(id), next, &description, r.role).await?;
    Ok(Json(preorder.into()))
}

/// Operator override for payments confirmed outside the hosted checkout.
pub async fn confirm_preorder_payment(
    State(s): State<AppState>, Path(id): Path<Uuid>, body: Option<Json<ConfirmPaymentRequest>>,
) -> Result<Json<PreorderView>> {
    let Json(r) = body.unwrap_or_default();
    let note = r.note.unwrap_or_else(|| "confirmed by operator".into());
    let preorder = s.checkout.confirm_preorder_payment(PreorderId::from_uuid(id), &note).await?;
    Ok(Json(preorder.into()))
}
