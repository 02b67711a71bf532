//! Status updates on placed orders and preorders.

use std::sync::Arc;

use crate::domain::aggregates::lifecycle::{LifecycleError, LifecycleStatus};
use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::aggregates::preorder::{Preorder, PreorderStatus};
use crate::domain::events::DomainEvent;
use crate::domain::services::checkout::reservations;
use crate::domain::services::permissions::{may_transition_order, may_transition_preorder, Role};
use crate::domain::services::WRITE_ATTEMPTS;
use crate::domain::value_objects::{OrderId, PreorderId};
use crate::ports::{EventPublisher, InventoryStore, OrderRepository, PreorderRepository, StorageError};

pub struct FulfillmentService {
    orders: Arc<dyn OrderRepository>,
    preorders: Arc<dyn PreorderRepository>,
    inventory: Arc<dyn InventoryStore>,
    events: Arc<dyn EventPublisher>,
}

impl FulfillmentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>, preorders: Arc<dyn PreorderRepository>,
        inventory: Arc<dyn InventoryStore>, events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { orders, preorders, inventory, events }
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order, FulfillmentError> {
        self.orders.find(id).await?.ok_or_else(|| FulfillmentError::NotFound(format!("order {id}")))
    }

    pub async fn get_preorder(&self, id: PreorderId) -> Result<Preorder, FulfillmentError> {
        self.preorders.find(id).await?.ok_or_else(|| FulfillmentError::NotFound(format!("preorder {id}")))
    }

    /// Retries from a fresh read when another writer got there first. A cancellation
    /// returns reserved stock only after it is stored, so it is returned once.
    pub async fn update_order_status(
        &self, id: OrderId, next: OrderStatus, description: &str, role: Role,
    ) -> Result<Order, FulfillmentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = self.get_order(id).await?;
            let current = order.status();
            // Graph violations fall through to the lifecycle error.
            if !may_transition_order(role, current, next) && current.can_transition_to(next) {
                return Err(FulfillmentError::Forbidden { role, current: current.to_string(), requested: next.to_string() });
            }
            let event = order.transition(next, description)?;
            let releasing = next == OrderStatus::Cancelled && order.stock_reserved();
            if releasing {
                order.mark_stock_reserved(false);
            }

            match self.orders.update(&mut order).await {
                Ok(()) => {}
                Err(StorageError::Stale(reason)) if attempt < WRITE_ATTEMPTS => {
                    tracing::debug!(order_id = %id, attempt, %reason, "order changed underneath; reloading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let released = if releasing { self.release_stock(&order).await } else { 0 };
            tracing::info!(order_id = %id, from = %current, to = %next, ?role, released, "order status changed");
            self.publish(DomainEvent::StatusChanged(event)).await;
            return Ok(order);
        }
    }

    pub async fn update_preorder_status(
        &self, id: PreorderId, next: PreorderStatus, description: &str, role: Role,
    ) -> Result<Preorder, FulfillmentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut preorder = self.get_preorder(id).await?;
            let current = preorder.status();
            if !may_transition_preorder(role, current, next) && current.can_transition_to(next) {
                return Err(FulfillmentError::Forbidden { role, current: current.to_string(), requested: next.to_string() });
            }
            let event = preorder.transition(next, description)?;
            match self.preorders.update(&mut preorder).await {
                Ok(()) => {}
                Err(StorageError::Stale(reason)) if attempt < WRITE_ATTEMPTS => {
                    tracing::debug!(preorder_id = %id, attempt, %reason, "preorder changed underneath; reloading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            tracing::info!(preorder_id = %id, from = %current, to = %next, ?role, "preorder status changed");
            self.publish(DomainEvent::StatusChanged(event)).await;
            return Ok(preorder);
        }
    }

    /// Returns the cancelled order's reservations. The cancellation is already stored,
    /// so a variant that cannot be released is logged for manual correction and skipped.
    async fn release_stock(&self, order: &Order) -> usize {
        let mut released = 0;
        for (variant_id, qty) in reservations(order.items()) {
            match self.inventory.release_stock(&variant_id, order.channel(), qty).await {
                Ok(()) => released += 1,
                Err(e) => tracing::error!(
                    order_id = %order.id(), %variant_id, channel = %order.channel(), qty, error = %e,
                    "reservation of cancelled order not returned"
                ),
            }
        }
        released
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(&event).await {
            tracing::warn!(event = event.name(), error = %e, "event publish failed");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{role:?} may not move from {current} to {requested}")]
    Forbidden { role: Role, current: String, requested: String },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::inventory::{InventoryError, StockLevel};
    use crate::domain::aggregates::order::{LineItem, NewOrder};
    use crate::domain::value_objects::{Address, BuyerKind, Channel, Customer, CustomerId, Money, ProductId, VariantId};
    use crate::infrastructure::memory::{InMemoryEventLog, InMemoryInventory, InMemoryOrders, InMemoryPreorders};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        service: FulfillmentService,
        orders: Arc<InMemoryOrders>,
        inventory: Arc<InMemoryInventory>,
        events: Arc<InMemoryEventLog>,
    }

    fn fixture() -> Fixture {
        let orders = Arc::new(InMemoryOrders::default());
        let inventory = Arc::new(InMemoryInventory::default());
        let events = Arc::new(InMemoryEventLog::default());
        let service = FulfillmentService::new(orders.clone(), Arc::new(InMemoryPreorders::default()), inventory.clone(), events.clone());
        Fixture { service, orders, inventory, events }
    }

    async fn reserved_order(f: &Fixture) -> Order {
        let variant = VariantId::new("toner-200");
        f.inventory.set_level(&variant, Channel::B2c, StockLevel::new(10));
        holding(&f.inventory, &f.orders, vec![LineItem::new(ProductId::new("toner"), Some(variant), "Toner", 3, Money::new(dec!(22)))]).await
    }

    async fn holding(inventory: &InMemoryInventory, orders: &InMemoryOrders, items: Vec<LineItem>) -> Order {
        for (variant_id, qty) in reservations(&items) {
            inventory.reserve_stock(&variant_id, Channel::B2c, qty).await.unwrap();
        }
        let mut order = Order::place(NewOrder {
            customer: Customer { id: CustomerId::new("c-9"), email: "c9@example.com".into(), name: None, kind: BuyerKind::Consumer },
            brand_id: None,
            channel: Channel::B2c,
            items,
            tax: Money::ZERO,
            shipping: Money::ZERO,
            discount: None,
            shipping_address: Address::default(),
            affiliate_code: None,
            checkout_session_id: None,
        }, Utc::now()).unwrap();
        order.mark_stock_reserved(true);
        orders.insert(&order).await.unwrap();
        order
    }

    /// Refuses to release one variant.
    struct StuckRelease { inner: Arc<InMemoryInventory>, stuck: VariantId }

    #[async_trait]
    impl InventoryStore for StuckRelease {
        async fn get_available(&self, v: &VariantId, c: Channel) -> Result<u32, InventoryError> { self.inner.get_available(v, c).await }
        async fn reserve_stock(&self, v: &VariantId, c: Channel, qty: u32) -> Result<(), InventoryError> { self.inner.reserve_stock(v, c, qty).await }
        async fn release_stock(&self, v: &VariantId, c: Channel, qty: u32) -> Result<(), InventoryError> {
            if v == &self.stuck {
                return Err(InventoryError::Storage("inventory shard offline".into()));
            }
            self.inner.release_stock(v, c, qty).await
        }
    }

    /// Lets another writer confirm the order just before the first update lands.
    struct Interloper { inner: Arc<InMemoryOrders>, fired: AtomicBool }

    #[async_trait]
    impl OrderRepository for Interloper {
        async fn insert(&self, order: &Order) -> Result<(), StorageError> { self.inner.insert(order).await }
        async fn update(&self, order: &mut Order) -> Result<(), StorageError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let mut theirs = self.inner.find(order.id()).await?.unwrap();
                theirs.transition(OrderStatus::Confirmed, "confirmed by brand").unwrap();
                self.inner.update(&mut theirs).await?;
            }
            self.inner.update(order).await
        }
        async fn find(&self, id: OrderId) -> Result<Option<Order>, StorageError> { self.inner.find(id).await }
        async fn find_by_checkout_session(&self, s: &str) -> Result<Option<Order>, StorageError> { self.inner.find_by_checkout_session(s).await }
    }

    #[tokio::test]
    async fn test_cancel_releases_reserved_stock() {
        let f = fixture();
        let order = reserved_order(&f).await;
        let cancelled = f.service.update_order_status(order.id(), OrderStatus::Cancelled, "customer request", Role::Customer).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert!(!cancelled.stock_reserved());
        assert_eq!(f.inventory.get_available(&VariantId::new("toner-200"), Channel::B2c).await.unwrap(), 10);
        assert_eq!(f.events.events().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_move_leaves_order_untouched() {
        let f = fixture();
        let order = reserved_order(&f).await;
        f.service.update_order_status(order.id(), OrderStatus::Shipped, "shipped", Role::Admin).await.unwrap();
        let err = f.service.update_order_status(order.id(), OrderStatus::Confirmed, "back", Role::Admin).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Lifecycle(LifecycleError::InvalidTransition { current: "shipped", requested: "confirmed" })));
        let stored = f.service.get_order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Shipped);
        assert_eq!(stored.timeline().len(), 2);
    }

    #[tokio::test]
    async fn test_role_refusal() {
        let f = fixture();
        let order = reserved_order(&f).await;
        let err = f.service.update_order_status(order.id(), OrderStatus::Invoiced, "invoice", Role::Brand).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden { role: Role::Brand, .. }));
        let err = f.service.update_order_status(order.id(), OrderStatus::Confirmed, "confirm", Role::Customer).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden { .. }));
        assert!(f.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_commits_before_returning_stock() {
        let inventory = Arc::new(InMemoryInventory::default());
        let orders = Arc::new(InMemoryOrders::default());
        let (v1, v2) = (VariantId::new("cream-50"), VariantId::new("mask-10"));
        inventory.set_level(&v1, Channel::B2c, StockLevel::new(10));
        inventory.set_level(&v2, Channel::B2c, StockLevel::new(10));
        // Another order's hold on v1 that must survive.
        inventory.reserve_stock(&v1, Channel::B2c, 1).await.unwrap();
        let order = holding(&inventory, &orders, vec![
            LineItem::new(ProductId::new("cream"), Some(v1.clone()), "Cream", 2, Money::new(dec!(30))),
            LineItem::new(ProductId::new("mask"), Some(v2.clone()), "Mask", 1, Money::new(dec!(3))),
        ]).await;

        let stuck = Arc::new(StuckRelease { inner: inventory.clone(), stuck: v2.clone() });
        let service = FulfillmentService::new(orders.clone(), Arc::new(InMemoryPreorders::default()), stuck, Arc::new(InMemoryEventLog::default()));
        let cancelled = service.update_order_status(order.id(), OrderStatus::Cancelled, "out of budget", Role::Admin).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);

        let stored = orders.find(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Cancelled);
        assert!(!stored.stock_reserved());
        assert_eq!(inventory.level(&v1, Channel::B2c).unwrap().reserved, 1);
        assert_eq!(inventory.level(&v2, Channel::B2c).unwrap().reserved, 1);

        let err = service.update_order_status(order.id(), OrderStatus::Cancelled, "again", Role::Admin).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Lifecycle(_)));
        assert_eq!(inventory.level(&v1, Channel::B2c).unwrap().reserved, 1, "no second release");
    }

    #[tokio::test]
    async fn test_concurrent_write_is_not_lost() {
        let f = fixture();
        let order = reserved_order(&f).await;
        let interloper = Arc::new(Interloper { inner: f.orders.clone(), fired: AtomicBool::new(false) });
        let service = FulfillmentService::new(interloper, Arc::new(InMemoryPreorders::default()), f.inventory.clone(), f.events.clone());

        let shipped = service.update_order_status(order.id(), OrderStatus::Shipped, "on the truck", Role::Admin).await.unwrap();
        let stored = f.orders.find(order.id()).await.unwrap().unwrap();
        let history: Vec<OrderStatus> = stored.timeline().iter().map(|e| e.status).collect();
        assert_eq!(history, vec![OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Shipped]);
        assert_eq!(stored.version(), 2);
        assert_eq!(shipped.version(), 2);
        assert!(stored.is_consistent());
    }
}
