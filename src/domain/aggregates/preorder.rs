//! Preorder Aggregate
//!
//! Parallel to [`Order`](super::order::Order) but with its own, shorter status graph
//! and a payment status tracked separately from fulfilment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::aggregates::cart::PreorderLine;
use crate::domain::aggregates::lifecycle::{LifecycleError, LifecycleStatus, StatusTrack, TimelineEntry};
use crate::domain::aggregates::order::generate_number;
use crate::domain::aggregates::product::ProductSnapshot;
use crate::domain::events::{RecordKind, StatusChanged};
use crate::domain::value_objects::{Address, CampaignId, Customer, Money, Percentage, PreorderId, ProductId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreorderStatus { Pending, Processing, Processed, Shipped, Delivered, Cancelled }

impl LifecycleStatus for PreorderStatus {
    const FLOW: &'static [Self] = &[Self::Pending, Self::Processing, Self::Processed, Self::Shipped, Self::Delivered];
    const CANCELLED: Self = Self::Cancelled;

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    fn cancellable_from(self) -> bool { self != Self::Delivered }
}

impl fmt::Display for PreorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for PreorderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::FLOW.iter().copied().chain([Self::Cancelled]).find(|v| v.as_str() == s).ok_or_else(|| format!("unknown preorder status {s}"))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderItem {
    pub product_id: ProductId,
    pub product: ProductSnapshot,
    pub quantity: u32,
    pub price_per_item: Money,
    pub discount_percentage: Percentage,
    /// `price_per_item × (1 − discount_percentage/100)`
    pub discounted_price: Money,
}

impl From<&PreorderLine> for PreorderItem {
    fn from(line: &PreorderLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            product: line.product.clone(),
            quantity: line.quantity,
            price_per_item: line.price_per_item,
            discount_percentage: line.discount_percentage,
            discounted_price: line.discounted_price,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preorder {
    id: PreorderId,
    preorder_number: String,
    customer: Customer,
    campaign_id: CampaignId,
    campaign_name: String,
    items: Vec<PreorderItem>,
    total_amount: Money,
    discount_amount: Money,
    final_amount: Money,
    #[serde(flatten)]
    lifecycle: StatusTrack<PreorderStatus>,
    payment_status: PaymentStatus,
    preorder_date: DateTime<Utc>,
    estimated_delivery: String,
    shipping_address: Address,
    #[serde(default)]
    checkout_session_id: Option<String>,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct DraftPreorder {
    pub customer: Customer,
    pub campaign_id: CampaignId,
    pub campaign_name: String,
    pub items: Vec<PreorderItem>,
    pub preorder_date: DateTime<Utc>,
    pub estimated_delivery: String,
    pub shipping_address: Address,
}

impl Preorder {
    /// Creates the pending, unpaid record that a payment confirmation later attaches to.
    pub fn draft(draft: DraftPreorder, now: DateTime<Utc>) -> Result<Self, PreorderError> {
        if draft.items.is_empty() {
            return Err(PreorderError::NoItems);
        }
        for item in &draft.items {
            if item.quantity == 0 {
                return Err(PreorderError::ZeroQuantity(item.product_id.clone()));
            }
            if item.discount_percentage.apply_to(item.price_per_item) != item.discounted_price {
                return Err(PreorderError::PriceMismatch(item.product_id.clone()));
            }
        }
        let total_amount: Money = draft.items.iter().map(|i| i.price_per_item.times(i.quantity)).sum();
        let discount_amount: Money = draft.items.iter().map(|i| (i.price_per_item - i.discounted_price).times(i.quantity)).sum();
        Ok(Self {
            id: PreorderId::generate(),
            preorder_number: generate_number("PRE", now),
            customer: draft.customer,
            campaign_id: draft.campaign_id,
            campaign_name: draft.campaign_name,
            items: draft.items,
            total_amount,
            discount_amount,
            final_amount: total_amount - discount_amount,
            lifecycle: StatusTrack::start(PreorderStatus::Pending, "Preorder created, awaiting payment", now),
            payment_status: PaymentStatus::Pending,
            preorder_date: draft.preorder_date,
            estimated_delivery: draft.estimated_delivery,
            shipping_address: draft.shipping_address,
            checkout_session_id: None,
            paid_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> PreorderId { self.id }
    pub fn preorder_number(&self) -> &str { &self.preorder_number }
    pub fn customer(&self) -> &Customer { &self.customer }
    pub fn campaign_id(&self) -> &CampaignId { &self.campaign_id }
    pub fn campaign_name(&self) -> &str { &self.campaign_name }
    pub fn items(&self) -> &[PreorderItem] { &self.items }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn discount_amount(&self) -> Money { self.discount_amount }
    pub fn final_amount(&self) -> Money { self.final_amount }
    pub fn status(&self) -> PreorderStatus { self.lifecycle.status() }
    pub fn timeline(&self) -> &[TimelineEntry<PreorderStatus>] { self.lifecycle.timeline() }
    pub fn is_consistent(&self) -> bool { self.lifecycle.is_consistent() }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn preorder_date(&self) -> DateTime<Utc> { self.preorder_date }
    pub fn estimated_delivery(&self) -> &str { &self.estimated_delivery }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn checkout_session_id(&self) -> Option<&str> { self.checkout_session_id.as_deref() }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn version(&self) -> u32 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub(crate) fn set_version(&mut self, version: u32) { self.version = version; }

    pub fn attach_checkout_session(&mut self, session_id: impl Into<String>) {
        self.checkout_session_id = Some(session_id.into());
        self.updated_at = Utc::now();
    }

    /// Returns `false` if the preorder was already paid.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<bool, PreorderError> {
        match self.payment_status {
            PaymentStatus::Paid => Ok(false),
            PaymentStatus::Refunded => Err(PreorderError::PaymentClosed(self.id)),
            PaymentStatus::Pending | PaymentStatus::Failed => {
                if self.status() == PreorderStatus::Cancelled {
                    return Err(PreorderError::PaymentClosed(self.id));
                }
                self.payment_status = PaymentStatus::Paid;
                self.paid_at = Some(now);
                self.updated_at = now;
                Ok(true)
            }
        }
    }

    pub fn transition(&mut self, next: PreorderStatus, description: impl Into<String>) -> Result<StatusChanged, LifecycleError> {
        self.transition_at(next, description, Utc::now())
    }

    pub fn transition_at(&mut self, next: PreorderStatus, description: impl Into<String>, now: DateTime<Utc>) -> Result<StatusChanged, LifecycleError> {
        let entry = self.lifecycle.advance(next, description, now)?;
        let event = StatusChanged {
            kind: RecordKind::Preorder,
            order_id: self.id.to_string(),
            status: entry.status.as_str().to_string(),
            description: entry.description.clone(),
            timestamp: entry.timestamp,
        };
        self.updated_at = event.timestamp;
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreorderError {
    #[error("preorder has no items")]
    NoItems,
    #[error("zero quantity for product {0}")]
    ZeroQuantity(ProductId),
    #[error("discounted price for product {0} does not match its discount percentage")]
    PriceMismatch(ProductId),
    #[error("preorder {0} can no longer accept payment")]
    PaymentClosed(PreorderId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{BuyerKind, CustomerId};
    use rust_decimal_macros::dec;

    fn item(pid: &str, price: Money, pct: u32, qty: u32) -> PreorderItem {
        let p = Percentage::from_whole(pct).unwrap();
        PreorderItem {
            product_id: ProductId::new(pid),
            product: ProductSnapshot { name: pid.into(), ..Default::default() },
            quantity: qty,
            price_per_item: price,
            discount_percentage: p,
            discounted_price: p.apply_to(price),
        }
    }

    fn draft(items: Vec<PreorderItem>) -> DraftPreorder {
        DraftPreorder {
            customer: Customer { id: CustomerId::new("u1"), email: "a@b.c".into(), name: None, kind: BuyerKind::Consumer },
            campaign_id: CampaignId::new("c1"),
            campaign_name: "Spring Glow".into(),
            items,
            preorder_date: Utc::now(),
            estimated_delivery: "2-3 weeks".into(),
            shipping_address: Address::default(),
        }
    }

    #[test]
    fn test_amounts_reconcile() {
        let p = Preorder::draft(draft(vec![
            item("a", Money::new(dec!(58.00)), 15, 2),
            item("b", Money::new(dec!(19.99)), 15, 3),
        ]), Utc::now()).unwrap();
        assert_eq!(p.final_amount(), p.total_amount() - p.discount_amount());
        let expected: Money = p.items().iter().map(|i| (i.price_per_item - i.discounted_price).times(i.quantity)).sum();
        assert_eq!(p.discount_amount(), expected);
        assert_eq!(p.status(), PreorderStatus::Pending);
        assert_eq!(p.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn test_tampered_price_rejected() {
        let mut bad = item("a", Money::new(dec!(58.00)), 15, 1);
        bad.discounted_price = Money::new(dec!(1.00));
        assert_eq!(Preorder::draft(draft(vec![bad]), Utc::now()).unwrap_err(), PreorderError::PriceMismatch(ProductId::new("a")));
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        let mut p = Preorder::draft(draft(vec![item("a", Money::new(dec!(10)), 10, 1)]), Utc::now()).unwrap();
        assert!(p.mark_paid(Utc::now()).unwrap());
        assert!(!p.mark_paid(Utc::now()).unwrap());
        assert_eq!(p.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn test_preorder_graph() {
        assert!(PreorderStatus::Pending.can_transition_to(PreorderStatus::Shipped));
        assert!(PreorderStatus::Shipped.can_transition_to(PreorderStatus::Cancelled));
        assert!(!PreorderStatus::Delivered.can_transition_to(PreorderStatus::Cancelled));
        assert!(PreorderStatus::Delivered.next_statuses().is_empty());
        assert!(PreorderStatus::Cancelled.next_statuses().is_empty());
        assert_eq!(
            PreorderStatus::Processed.next_statuses(),
            vec![PreorderStatus::Shipped, PreorderStatus::Delivered, PreorderStatus::Cancelled]
        );
    }

    #[test]
    fn test_cancelled_preorder_cannot_be_paid() {
        let mut p = Preorder::draft(draft(vec![item("a", Money::new(dec!(10)), 10, 1)]), Utc::now()).unwrap();
        p.transition(PreorderStatus::Cancelled, "customer request").unwrap();
        assert!(matches!(p.mark_paid(Utc::now()), Err(PreorderError::PaymentClosed(_))));
        assert!(p.is_consistent());
    }
}
