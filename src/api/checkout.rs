use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::dto::*;
use crate::api::AppState;
use crate::domain::aggregates::cart_session::CartSession;
use crate::domain::services::discount::AffiliateDiscount;
use crate::Result;

pub async fn active_campaign(State(s): State<AppState>) -> Result<Json<ActiveCampaignResponse>> {
    Ok(Json(ActiveCampaignResponse { campaign: s.discounts.fetch_active_campaign().await? }))
}

/// Prices a code against the regular cart without redeeming it.
pub async fn quote_affiliate_code(
    State(s): State<AppState>, Json(r): Json<AffiliateQuoteRequest>,
) -> Result<Json<AffiliateDiscount>> {
    r.validate()?;
    let cart = CartSession::load(s.backends.carts.clone(), r.cart_session)?;
    Ok(Json(s.discounts.apply_affiliate_code(&r.code, cart.regular()).await?))
}

pub async fn start_regular(
    State(s): State<AppState>, Json(r): Json<StartCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutStartedResponse>)> {
    r.validate()?;
    let session = s.checkout.start_regular_checkout(
        &r.cart_session, r.customer.into(), r.shipping_address.into(), r.affiliate_code.as_deref(),
    ).await?;
    Ok((StatusCode::CREATED, Json(CheckoutStartedResponse {
        session_id: session.session_id,
        redirect_url: session.redirect_url,
        preorder_id: None,
    })))
}

pub async fn start_preorder(
    State(s): State<AppState>, Json(r): Json<StartCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutStartedResponse>)> {
    r.validate()?;
    if r.affiliate_code.is_some() {
        tracing::debug!(cart_session = %r.cart_session, "affiliate code ignored on preorder checkout");
    }
    let started = s.checkout.start_preorder_checkout(&r.cart_session, r.customer.into(), r.shipping_address.into()).await?;
    Ok((StatusCode::CREATED, Json(CheckoutStartedResponse {
        session_id: started.session.session_id,
        redirect_url: started.session.redirect_url,
        preorder_id: Some(started.preorder_id),
    })))
}

/// Webhook / callback body form.
pub async fn complete(State(s): State<AppState>, Json(r): Json<CompleteCheckoutRequest>) -> Result<Json<CompletionResponse>> {
    r.validate()?;
    Ok(Json(s.checkout.complete_checkout(&r.session_id).await?.into()))
}

/// Success-redirect form: `?session_id=...`.
pub async fn complete_redirect(State(s): State<AppState>, Query(q): Query<CompleteCheckoutQuery>) -> Result<Json<CompletionResponse>> {
    Ok(Json(s.checkout.complete_checkout(&q.session_id).await?.into()))
}
