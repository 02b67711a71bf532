//! Outside collaborators of the engine.
//!
//! Adapters live in `crate::infrastructure`. Everything except the cart
//! key-value store is async; cart mutation is synchronous.

use async_trait::async_trait;

use crate::domain::aggregates::affiliate::AffiliateCode;
use crate::domain::aggregates::campaign::PreorderCampaign;
use crate::domain::aggregates::inventory::InventoryError;
use crate::domain::aggregates::order::Order;
use crate::domain::aggregates::preorder::Preorder;
use crate::domain::aggregates::product::Product;
use crate::domain::events::DomainEvent;
use crate::domain::services::checkout::{CheckoutRequest, CheckoutSession, PaymentError, PaymentSession, ReconciliationIssue};
use crate::domain::value_objects::{CampaignId, Channel, OrderId, PreorderId, ProductId, VariantId};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("stored document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A unique key is taken. Carries the constraint name when the store reports one.
    #[error("record already exists: {0}")]
    Conflict(String),
    /// The record was written by someone else since it was read.
    #[error("stale write: {0}")]
    Stale(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(db.constraint().unwrap_or(db.message()).to_string())
            }
            _ => StorageError::Unavailable(e.to_string()),
        }
    }
}

/// Unique keys on the orders table, named as PostgreSQL names them.
pub mod unique {
    pub const ORDER_NUMBER: &str = "orders_order_number_key";
    pub const CHECKOUT_SESSION: &str = "orders_checkout_session_id_key";
}

/// Opaque string store backing cart persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StorageError>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// At most one campaign in `active` status; when several exist the store picks one.
    async fn fetch_active(&self) -> Result<Option<PreorderCampaign>, StorageError>;
    async fn find(&self, id: &CampaignId) -> Result<Option<PreorderCampaign>, StorageError>;
}

#[async_trait]
pub trait AffiliateCodeRepository: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_by_code(&self, code: &str) -> Result<Option<AffiliateCode>, StorageError>;
    /// Atomically bumps `usage_count` unless the cap is reached. `false` means the cap won.
    async fn redeem(&self, code_id: &str) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_available(&self, variant_id: &VariantId, channel: Channel) -> Result<u32, InventoryError>;
    /// All-or-nothing: either `reserved += qty` or `InsufficientStock`.
    async fn reserve_stock(&self, variant_id: &VariantId, channel: Channel, qty: u32) -> Result<(), InventoryError>;
    async fn release_stock(&self, variant_id: &VariantId, channel: Channel, qty: u32) -> Result<(), InventoryError>;
}

/// `update` is optimistic: it only succeeds while the stored version still equals
/// the one the record was read at, bumps it, and otherwise fails with `Stale`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), StorageError>;
    async fn update(&self, order: &mut Order) -> Result<(), StorageError>;
    async fn find(&self, id: OrderId) -> Result<Option<Order>, StorageError>;
    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, StorageError>;
}

#[async_trait]
pub trait PreorderRepository: Send + Sync {
    async fn insert(&self, preorder: &Preorder) -> Result<(), StorageError>;
    /// Same contract as [`OrderRepository::update`].
    async fn update(&self, preorder: &mut Preorder) -> Result<(), StorageError>;
    async fn find(&self, id: PreorderId) -> Result<Option<Preorder>, StorageError>;
}

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError>;
    async fn retrieve_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), StorageError>;
}

/// Durable record of payments that could not be matched to an order.
#[async_trait]
pub trait ReconciliationJournal: Send + Sync {
    async fn record(&self, issue: &ReconciliationIssue) -> Result<(), StorageError>;
}
