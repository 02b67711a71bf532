//! HTTP surface for the storefront and admin frontends.

pub mod carts;
pub mod checkout;
pub mod dto;
pub mod error;
pub mod orders;

use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::services::checkout::{CheckoutConfig, CheckoutService};
use crate::domain::services::discount::DiscountEngine;
use crate::domain::services::fulfillment::FulfillmentService;
use crate::infrastructure::Backends;

#[derive(Clone)]
pub struct AppState {
    pub backends: Backends,
    pub discounts: Arc<DiscountEngine>,
    pub checkout: Arc<CheckoutService>,
    pub fulfillment: Arc<FulfillmentService>,
}

impl AppState {
    pub fn new(backends: Backends, config: CheckoutConfig) -> Self {
        let discounts = Arc::new(DiscountEngine::new(backends.campaigns.clone(), backends.affiliates.clone()));
        let checkout = Arc::new(CheckoutService::new(
            backends.carts.clone(),
            discounts.clone(),
            backends.inventory.clone(),
            backends.orders.clone(),
            backends.preorders.clone(),
            backends.payments.clone(),
            backends.events.clone(),
            backends.journal.clone(),
            config,
        ));
        let fulfillment = Arc::new(FulfillmentService::new(
            backends.orders.clone(),
            backends.preorders.clone(),
            backends.inventory.clone(),
            backends.events.clone(),
        ));
        Self { backends, discounts, checkout, fulfillment }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "kbeauty-orders"})) }))
        .route("/api/v1/prices/:product_id", get(carts::get_price))
        .route("/api/v1/carts/:session", get(carts::get_carts))
        .route("/api/v1/carts/:session/regular", post(carts::add_regular).delete(carts::clear_regular))
        .route("/api/v1/carts/:session/regular/:line_id", patch(carts::update_regular).delete(carts::remove_regular))
        .route("/api/v1/carts/:session/preorder", post(carts::add_preorder).delete(carts::clear_preorder))
        .route("/api/v1/carts/:session/preorder/:product_id", patch(carts::update_preorder).delete(carts::remove_preorder))
        .route("/api/v1/campaigns/active", get(checkout::active_campaign))
        .route("/api/v1/affiliate-codes/quote", post(checkout::quote_affiliate_code))
        .route("/api/v1/checkout/regular", post(checkout::start_regular))
        .route("/api/v1/checkout/preorder", post(checkout::start_preorder))
        .route("/api/v1/checkout/complete", post(checkout::complete).get(checkout::complete_redirect))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", put(orders::update_order_status))
        .route("/api/v1/preorders/:id", get(orders::get_preorder))
        .route("/api/v1/preorders/:id/status", put(orders::update_preorder_status))
        .route("/api/v1/preorders/:id/confirm-payment", post(orders::confirm_preorder_payment))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
