//! In-process adapters for every port.
//!
//! Used by tests and by the service when `DATABASE_URL` is unset. Each store keeps
//! its state behind one mutex, so read-modify-write operations are atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::aggregates::affiliate::AffiliateCode;
use crate::domain::aggregates::campaign::{CampaignStatus, PreorderCampaign};
use crate::domain::aggregates::inventory::{InventoryError, StockLevel};
use crate::domain::aggregates::order::Order;
use crate::domain::aggregates::preorder::Preorder;
use crate::domain::aggregates::product::Product;
use crate::domain::events::DomainEvent;
use crate::domain::services::checkout::ReconciliationIssue;
use crate::domain::value_objects::{CampaignId, Channel, OrderId, PreorderId, ProductId, VariantId};
use crate::ports::*;

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|_| StorageError::Unavailable("in-memory store lock poisoned".into()))
}

#[derive(Default)]
pub struct InMemoryKeyValueStore { entries: Mutex<HashMap<String, String>> }

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> { Ok(lock(&self.entries)?.get(key).cloned()) }
    fn set(&self, key: &str, value: String) -> Result<(), StorageError> { lock(&self.entries)?.insert(key.to_string(), value); Ok(()) }
    fn remove(&self, key: &str) -> Result<(), StorageError> { lock(&self.entries)?.remove(key); Ok(()) }
}

#[derive(Default)]
pub struct InMemoryCatalog { products: Mutex<HashMap<ProductId, Product>> }

impl InMemoryCatalog {
    pub fn insert(&self, product: Product) {
        if let Ok(mut products) = lock(&self.products) { products.insert(product.id.clone(), product); }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StorageError> {
        Ok(lock(&self.products)?.get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryCampaigns { campaigns: Mutex<Vec<PreorderCampaign>> }

impl InMemoryCampaigns {
    pub fn insert(&self, campaign: PreorderCampaign) {
        if let Ok(mut campaigns) = lock(&self.campaigns) {
            campaigns.retain(|c| c.id != campaign.id);
            campaigns.push(campaign);
        }
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaigns {
    async fn fetch_active(&self) -> Result<Option<PreorderCampaign>, StorageError> {
        Ok(lock(&self.campaigns)?.iter().find(|c| c.status == CampaignStatus::Active).cloned())
    }

    async fn find(&self, id: &CampaignId) -> Result<Option<PreorderCampaign>, StorageError> {
        Ok(lock(&self.campaigns)?.iter().find(|c| &c.id == id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAffiliateCodes { codes: Mutex<HashMap<String, AffiliateCode>> }

impl InMemoryAffiliateCodes {
    pub fn insert(&self, code: AffiliateCode) {
        if let Ok(mut codes) = lock(&self.codes) { codes.insert(code.id.clone(), code); }
    }

    pub fn usage_count(&self, id: &str) -> Option<u32> {
        lock(&self.codes).ok()?.get(id).map(|c| c.usage_count)
    }
}

#[async_trait]
impl AffiliateCodeRepository for InMemoryAffiliateCodes {
    async fn find_by_code(&self, code: &str) -> Result<Option<AffiliateCode>, StorageError> {
        Ok(lock(&self.codes)?.values().find(|c| c.matches(code)).cloned())
    }

    async fn redeem(&self, code_id: &str) -> Result<bool, StorageError> {
        let mut codes = lock(&self.codes)?;
        let Some(code) = codes.get_mut(code_id) else { return Ok(false) };
        if code.max_usage.is_some_and(|max| code.usage_count >= max) {
            return Ok(false);
        }
        code.usage_count += 1;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryInventory { levels: Mutex<HashMap<(VariantId, Channel), StockLevel>> }

impl InMemoryInventory {
    /// Seeds stock from the per-channel levels carried on catalog variants.
    pub fn from_products<'a>(products: impl IntoIterator<Item = &'a Product>) -> Self {
        let inventory = Self::default();
        for product in products {
            for variant in &product.variants {
                for channel in [Channel::B2b, Channel::B2c] {
                    inventory.set_level(&variant.id, channel, variant.stock(channel));
                }
            }
        }
        inventory
    }

    pub fn set_level(&self, variant_id: &VariantId, channel: Channel, level: StockLevel) {
        if let Ok(mut levels) = lock(&self.levels) { levels.insert((variant_id.clone(), channel), level); }
    }

    pub fn level(&self, variant_id: &VariantId, channel: Channel) -> Option<StockLevel> {
        lock(&self.levels).ok()?.get(&(variant_id.clone(), channel)).copied()
    }
}

fn inventory_lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, InventoryError> {
    m.lock().map_err(|_| InventoryError::Storage("in-memory inventory lock poisoned".into()))
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn get_available(&self, variant_id: &VariantId, channel: Channel) -> Result<u32, InventoryError> {
        inventory_lock(&self.levels)?
            .get(&(variant_id.clone(), channel))
            .map(StockLevel::available)
            .ok_or_else(|| InventoryError::UnknownVariant(variant_id.clone(), channel))
    }

    async fn reserve_stock(&self, variant_id: &VariantId, channel: Channel, qty: u32) -> Result<(), InventoryError> {
        let mut levels = inventory_lock(&self.levels)?;
        let level = levels
            .get_mut(&(variant_id.clone(), channel))
            .ok_or_else(|| InventoryError::UnknownVariant(variant_id.clone(), channel))?;
        *level = level.reserve(qty).map_err(|s| InventoryError::shortfall(variant_id, channel, s))?;
        Ok(())
    }

    async fn release_stock(&self, variant_id: &VariantId, channel: Channel, qty: u32) -> Result<(), InventoryError> {
        let mut levels = inventory_lock(&self.levels)?;
        let level = levels
            .get_mut(&(variant_id.clone(), channel))
            .ok_or_else(|| InventoryError::UnknownVariant(variant_id.clone(), channel))?;
        *level = level.release(qty);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrders { orders: Mutex<HashMap<OrderId, Order>> }

impl InMemoryOrders {
    pub fn all(&self) -> Vec<Order> { lock(&self.orders).map(|o| o.values().cloned().collect()).unwrap_or_default() }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn insert(&self, order: &Order) -> Result<(), StorageError> {
        let mut orders = lock(&self.orders)?;
        if orders.contains_key(&order.id()) {
            return Err(StorageError::Conflict(order.id().to_string()));
        }
        if orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(StorageError::Conflict(unique::ORDER_NUMBER.into()));
        }
        if let Some(session) = order.checkout_session_id() {
            if orders.values().any(|o| o.checkout_session_id() == Some(session)) {
                return Err(StorageError::Conflict(unique::CHECKOUT_SESSION.into()));
            }
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &mut Order) -> Result<(), StorageError> {
        let mut orders = lock(&self.orders)?;
        match orders.get(&order.id()) {
            Some(stored) if stored.version() == order.version() => {}
            _ => return Err(StorageError::Stale(format!("order {} at version {}", order.id(), order.version()))),
        }
        order.set_version(order.version() + 1);
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StorageError> { Ok(lock(&self.orders)?.get(&id).cloned()) }

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, StorageError> {
        Ok(lock(&self.orders)?.values().find(|o| o.checkout_session_id() == Some(session_id)).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryPreorders { preorders: Mutex<HashMap<PreorderId, Preorder>> }

#[async_trait]
impl PreorderRepository for InMemoryPreorders {
    async fn insert(&self, preorder: &Preorder) -> Result<(), StorageError> {
        let mut preorders = lock(&self.preorders)?;
        if preorders.contains_key(&preorder.id()) {
            return Err(StorageError::Conflict(preorder.id().to_string()));
        }
        preorders.insert(preorder.id(), preorder.clone());
        Ok(())
    }

    async fn update(&self, preorder: &mut Preorder) -> Result<(), StorageError> {
        let mut preorders = lock(&self.preorders)?;
        match preorders.get(&preorder.id()) {
            Some(stored) if stored.version() == preorder.version() => {}
            _ => return Err(StorageError::Stale(format!("preorder {} at version {}", preorder.id(), preorder.version()))),
        }
        preorder.set_version(preorder.version() + 1);
        preorders.insert(preorder.id(), preorder.clone());
        Ok(())
    }

    async fn find(&self, id: PreorderId) -> Result<Option<Preorder>, StorageError> { Ok(lock(&self.preorders)?.get(&id).cloned()) }
}

/// Keeps published events in memory; stands in for NATS when it is not configured.
#[derive(Default)]
pub struct InMemoryEventLog { events: Mutex<Vec<DomainEvent>> }

impl InMemoryEventLog {
    pub fn events(&self) -> Vec<DomainEvent> { lock(&self.events).map(|e| e.clone()).unwrap_or_default() }
}

#[async_trait]
impl EventPublisher for InMemoryEventLog {
    async fn publish(&self, event: &DomainEvent) -> Result<(), StorageError> {
        tracing::debug!(event = event.name(), "event recorded");
        lock(&self.events)?.push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryJournal { issues: Mutex<Vec<ReconciliationIssue>> }

impl InMemoryJournal {
    pub fn issues(&self) -> Vec<ReconciliationIssue> { lock(&self.issues).map(|i| i.clone()).unwrap_or_default() }
}

#[async_trait]
impl ReconciliationJournal for InMemoryJournal {
    async fn record(&self, issue: &ReconciliationIssue) -> Result<(), StorageError> {
        lock(&self.issues)?.push(issue.clone());
        Ok(())
    }
}
