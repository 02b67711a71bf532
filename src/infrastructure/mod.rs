//! Port adapters and the bundle the services are built from.

pub mod memory;
pub mod nats;
pub mod postgres;
pub mod sandbox_payment;

use std::sync::Arc;

use crate::ports::*;
use memory::*;
use postgres::PgStore;
use sandbox_payment::SandboxGateway;

/// One handle per port.
#[derive(Clone)]
pub struct Backends {
    pub carts: Arc<dyn KeyValueStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub affiliates: Arc<dyn AffiliateCodeRepository>,
    pub inventory: Arc<dyn InventoryStore>,
    pub orders: Arc<dyn OrderRepository>,
    pub preorders: Arc<dyn PreorderRepository>,
    pub payments: Arc<dyn PaymentGateway>,
    pub events: Arc<dyn EventPublisher>,
    pub journal: Arc<dyn ReconciliationJournal>,
}

impl Backends {
    /// Everything durable in PostgreSQL. Carts stay in process memory.
    pub fn postgres(store: PgStore, payments: Arc<dyn PaymentGateway>, events: Arc<dyn EventPublisher>) -> Self {
        let store = Arc::new(store);
        Self {
            carts: Arc::new(InMemoryKeyValueStore::default()),
            catalog: store.clone(),
            campaigns: store.clone(),
            affiliates: store.clone(),
            inventory: store.clone(),
            orders: store.clone(),
            preorders: store.clone(),
            payments,
            events,
            journal: store,
        }
    }
}

/// Concrete in-memory adapters, kept typed so callers can seed and inspect them.
#[derive(Clone, Default)]
pub struct MemoryBackends {
    pub carts: Arc<InMemoryKeyValueStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub campaigns: Arc<InMemoryCampaigns>,
    pub affiliates: Arc<InMemoryAffiliateCodes>,
    pub inventory: Arc<InMemoryInventory>,
    pub orders: Arc<InMemoryOrders>,
    pub preorders: Arc<InMemoryPreorders>,
    pub payments: Arc<SandboxGateway>,
    pub events: Arc<InMemoryEventLog>,
    pub journal: Arc<InMemoryJournal>,
}

impl MemoryBackends {
    pub fn backends(&self) -> Backends {
        Backends {
            carts: self.carts.clone(),
            catalog: self.catalog.clone(),
            campaigns: self.campaigns.clone(),
            affiliates: self.affiliates.clone(),
            inventory: self.inventory.clone(),
            orders: self.orders.clone(),
            preorders: self.preorders.clone(),
            payments: self.payments.clone(),
            events: self.events.clone(),
            journal: self.journal.clone(),
        }
    }
}
