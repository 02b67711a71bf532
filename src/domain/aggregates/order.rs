//! Order Aggregate

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::aggregates::lifecycle::{LifecycleError, LifecycleStatus, StatusTrack, TimelineEntry};
use crate::domain::events::{RecordKind, StatusChanged};
use crate::domain::value_objects::{Address, BrandId, Channel, Customer, Money, OrderId, ProductId, VariantId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending, Confirmed, Processing, Invoiced, Paid, Preparing, Shipped, Delivered, Completed, Cancelled,
}

impl LifecycleStatus for OrderStatus {
    const FLOW: &'static [Self] = &[
        Self::Pending, Self::Confirmed, Self::Processing, Self::Invoiced, Self::Paid,
        Self::Preparing, Self::Shipped, Self::Delivered, Self::Completed,
    ];
    const CANCELLED: Self = Self::Cancelled;

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Invoiced => "invoiced",
            Self::Paid => "paid",
            Self::Preparing => "preparing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }

    /// Delivered goods can only be completed.
    fn cancellable_from(self) -> bool { !matches!(self, Self::Delivered | Self::Completed | Self::Cancelled) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::FLOW.iter().copied().chain([Self::Cancelled]).find(|v| v.as_str() == s).ok_or_else(|| format!("unknown order status {s}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

impl LineItem {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>, name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self { product_id, variant_id, name: name.into(), quantity, unit_price, total: unit_price.times(quantity) }
    }
}

/// `total = items + tax + shipping − discount`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub items: Money,
    pub tax: Money,
    pub shipping: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Money>,
    pub total: Money,
}

impl OrderTotals {
    pub fn compute(items: Money, tax: Money, shipping: Money, discount: Option<Money>) -> Self {
        let total = (items + tax + shipping).saturating_sub(discount.unwrap_or(Money::ZERO));
        Self { items, tax, shipping, discount, total }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub name: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    order_number: String,
    customer: Customer,
    brand_id: Option<BrandId>,
    channel: Channel,
    items: Vec<LineItem>,
    total_amount: OrderTotals,
    #[serde(flatten)]
    lifecycle: StatusTrack<OrderStatus>,
    shipping_address: Address,
    #[serde(default)]
    documents: Vec<DocumentRef>,
    #[serde(default)]
    message_thread_id: Option<String>,
    #[serde(default)]
    affiliate_code: Option<String>,
    #[serde(default)]
    checkout_session_id: Option<String>,
    /// Whether `items` currently hold inventory reservations.
    #[serde(default)]
    stock_reserved: bool,
    /// Optimistic concurrency token, bumped by the repository on every update.
    #[serde(default)]
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Everything needed to place an order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer: Customer,
    pub brand_id: Option<BrandId>,
    pub channel: Channel,
    pub items: Vec<LineItem>,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Option<Money>,
    pub shipping_address: Address,
    pub affiliate_code: Option<String>,
    pub checkout_session_id: Option<String>,
}

impl Order {
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if new.items.iter().any(|i| i.quantity == 0) {
            return Err(OrderError::ZeroQuantity);
        }
        let items_total: Money = new.items.iter().map(|i| i.total).sum();
        Ok(Self {
            id: OrderId::generate(),
            order_number: generate_number("ORD", now),
            customer: new.customer,
            brand_id: new.brand_id,
            channel: new.channel,
            total_amount: OrderTotals::compute(items_total, new.tax, new.shipping, new.discount),
            items: new.items,
            lifecycle: StatusTrack::start(OrderStatus::Pending, "Order placed", now),
            shipping_address: new.shipping_address,
            documents: vec![],
            message_thread_id: None,
            affiliate_code: new.affiliate_code,
            checkout_session_id: new.checkout_session_id,
            stock_reserved: false,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn customer(&self) -> &Customer { &self.customer }
    pub fn brand_id(&self) -> Option<&BrandId> { self.brand_id.as_ref() }
    pub fn channel(&self) -> Channel { self.channel }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn total_amount(&self) -> &OrderTotals { &self.total_amount }
    pub fn status(&self) -> OrderStatus { self.lifecycle.status() }
    pub fn timeline(&self) -> &[TimelineEntry<OrderStatus>] { self.lifecycle.timeline() }
    pub fn is_consistent(&self) -> bool { self.lifecycle.is_consistent() }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn documents(&self) -> &[DocumentRef] { &self.documents }
    pub fn message_thread_id(&self) -> Option<&str> { self.message_thread_id.as_deref() }
    pub fn affiliate_code(&self) -> Option<&str> { self.affiliate_code.as_deref() }
    pub fn checkout_session_id(&self) -> Option<&str> { self.checkout_session_id.as_deref() }
    pub fn stock_reserved(&self) -> bool { self.stock_reserved }
    pub fn version(&self) -> u32 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn transition(&mut self, next: OrderStatus, description: impl Into<String>) -> Result<StatusChanged, LifecycleError> {
        self.transition_at(next, description, Utc::now())
    }

    pub fn transition_at(&mut self, next: OrderStatus, description: impl Into<String>, now: DateTime<Utc>) -> Result<StatusChanged, LifecycleError> {
        let entry = self.lifecycle.advance(next, description, now)?;
        let event = StatusChanged {
            kind: RecordKind::Order,
            order_id: self.id.to_string(),
            status: entry.status.as_str().to_string(),
            description: entry.description.clone(),
            timestamp: entry.timestamp,
        };
        self.updated_at = event.timestamp;
        Ok(event)
    }

    pub fn mark_stock_reserved(&mut self, reserved: bool) { self.stock_reserved = reserved; }

    /// Draws a fresh order number. Only meaningful before the order is first stored.
    pub fn renumber(&mut self) { self.order_number = generate_number("ORD", self.created_at); }

    pub(crate) fn set_version(&mut self, version: u32) { self.version = version; }
}

// Crockford-style: no 0, O, 1 or I.
const NUMBER_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const NUMBER_SUFFIX_LEN: usize = 8;

/// `PREFIX-YYYYMMDD-XXXXXXXX` with 40 random bits in the suffix.
pub(crate) fn generate_number(prefix: &str, now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..NUMBER_SUFFIX_LEN)
        .map(|_| NUMBER_ALPHABET[rng.gen_range(0..NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", now.format("%Y%m%d"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("order line with zero quantity")]
    ZeroQuantity,
}
