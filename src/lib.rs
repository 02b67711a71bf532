//! K-Beauty Marketplace Order Engine
//!
//! Transaction core for a wholesale (B2B) and retail (B2C) K-beauty marketplace.
//!
//! ## Features
//! - Channel-aware price resolution with legacy-schema fallback
//! - Regular and preorder carts
//! - Preorder campaign and affiliate code discounts
//! - Order and preorder status lifecycles with timelines
//! - Hosted checkout with payment reconciliation
//! - Per-channel inventory reservation

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::aggregates::cart::CartError;
use crate::domain::aggregates::inventory::InventoryError;
use crate::domain::aggregates::lifecycle::LifecycleError;
use crate::domain::aggregates::order::OrderError;
use crate::domain::aggregates::preorder::PreorderError;
use crate::domain::services::checkout::{CheckoutError, PaymentError};
use crate::domain::services::discount::DiscountError;
use crate::domain::services::fulfillment::FulfillmentError;
use crate::domain::services::pricing::PricingError;
use crate::domain::value_objects::ValueError;
use crate::ports::StorageError;

// =============================================================================
// Error Types
// =============================================================================

/// Crate-wide error taxonomy. Module errors fold into one of these kinds.
#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("pricing unavailable: {0}")]
    PricingUnavailable(String),

    #[error("invalid transition from {current} to {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error("no preorder campaign is running")]
    CampaignInactive,

    #[error("campaign ineligible: {0}")]
    CampaignIneligible(String),

    #[error("affiliate code invalid: {0}")]
    AffiliateCodeInvalid(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("checkout reconciliation failed for session {session_id}: {reason}")]
    CheckoutReconciliationFailure { session_id: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("payment provider error: {0}")]
    Payment(String),

    #[error("record changed concurrently: {0}")]
    ConcurrentUpdate(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarketplaceError {
    /// Stable machine-readable kind for API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PricingUnavailable(_) => "pricing_unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CampaignInactive => "campaign_inactive",
            Self::CampaignIneligible(_) => "campaign_ineligible",
            Self::AffiliateCodeInvalid(_) => "affiliate_code_invalid",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::CheckoutReconciliationFailure { .. } => "checkout_reconciliation_failure",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Payment(_) => "payment_error",
            Self::ConcurrentUpdate(_) => "concurrent_update",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
        }
    }
}

impl From<StorageError> for MarketplaceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Stale(what) => Self::ConcurrentUpdate(what),
            e => Self::Storage(e.to_string()),
        }
    }
}

impl From<ValueError> for MarketplaceError {
    fn from(e: ValueError) -> Self { Self::InvalidRequest(e.to_string()) }
}

impl From<PricingError> for MarketplaceError {
    fn from(e: PricingError) -> Self { Self::PricingUnavailable(e.to_string()) }
}

impl From<LifecycleError> for MarketplaceError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidTransition { current, requested } => Self::InvalidTransition {
                current: current.to_string(),
                requested: requested.to_string(),
            },
        }
    }
}

impl From<InventoryError> for MarketplaceError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock { .. } => Self::InsufficientStock(e.to_string()),
            InventoryError::UnknownVariant(..) => Self::NotFound(e.to_string()),
            InventoryError::Storage(msg) => Self::Storage(msg),
        }
    }
}

impl From<DiscountError> for MarketplaceError {
    fn from(e: DiscountError) -> Self {
        match e {
            DiscountError::CampaignInactive => Self::CampaignInactive,
            DiscountError::CampaignIneligible { .. } => Self::CampaignIneligible(e.to_string()),
            DiscountError::AffiliateCodeInvalid { .. } => Self::AffiliateCodeInvalid(e.to_string()),
            DiscountError::Pricing(p) => p.into(),
            DiscountError::Storage(s) => s.into(),
        }
    }
}

impl From<CartError> for MarketplaceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(_) => Self::NotFound(e.to_string()),
            CartError::Storage(s) => s.into(),
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

impl From<OrderError> for MarketplaceError {
    fn from(e: OrderError) -> Self { Self::InvalidRequest(e.to_string()) }
}

impl From<PreorderError> for MarketplaceError {
    fn from(e: PreorderError) -> Self { Self::InvalidRequest(e.to_string()) }
}

impl From<PaymentError> for MarketplaceError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::UnknownSession(_) => Self::NotFound(e.to_string()),
            other => Self::Payment(other.to_string()),
        }
    }
}

impl From<CheckoutError> for MarketplaceError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Cart(e) => e.into(),
            CheckoutError::Discount(e) => e.into(),
            CheckoutError::Pricing(e) => e.into(),
            CheckoutError::Inventory(e) => e.into(),
            CheckoutError::Payment(e) => e.into(),
            CheckoutError::Preorder(e) => e.into(),
            CheckoutError::Order(e) => e.into(),
            CheckoutError::Storage(e) => e.into(),
            CheckoutError::Metadata(e) => Self::InvalidRequest(e.to_string()),
            CheckoutError::NotFound(what) => Self::NotFound(what),
            e @ CheckoutError::ChannelMismatch { .. } => Self::InvalidRequest(e.to_string()),
            CheckoutError::ReconciliationFailure { session_id, reason } => {
                Self::CheckoutReconciliationFailure { session_id, reason }
            }
        }
    }
}

impl From<FulfillmentError> for MarketplaceError {
    fn from(e: FulfillmentError) -> Self {
        match e {
            FulfillmentError::NotFound(what) => Self::NotFound(what),
            e @ FulfillmentError::Forbidden { .. } => Self::Forbidden(e.to_string()),
            FulfillmentError::Lifecycle(e) => e.into(),
            FulfillmentError::Storage(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketplaceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Channel, ProductId, VariantId};

    #[test]
    fn test_taxonomy_mapping() {
        let err: MarketplaceError = LifecycleError::InvalidTransition { current: "shipped", requested: "pending" }.into();
        assert!(matches!(&err, MarketplaceError::InvalidTransition { current, requested } if current == "shipped" && requested == "pending"));

        let err: MarketplaceError = CheckoutError::Discount(DiscountError::CampaignInactive).into();
        assert_eq!(err.kind(), "campaign_inactive");

        let err: MarketplaceError = CheckoutError::Inventory(InventoryError::InsufficientStock {
            variant_id: VariantId::new("v"), channel: Channel::B2b, available: 0, requested: 1,
        }).into();
        assert_eq!(err.kind(), "insufficient_stock");

        let err: MarketplaceError = PricingError::Unavailable { product_id: ProductId::new("p"), channel: Channel::B2c }.into();
        assert_eq!(err.kind(), "pricing_unavailable");

        let err: MarketplaceError = FulfillmentError::Storage(StorageError::Stale("order 1 at version 3".into())).into();
        assert_eq!(err.kind(), "concurrent_update");
    }
}
