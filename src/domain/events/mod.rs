//! Domain events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Money, OrderId, PreorderId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    StatusChanged(StatusChanged),
    OrderPlaced { order_id: OrderId, order_number: String, total: Money },
    PreorderPaid { preorder_id: PreorderId, checkout_session_id: Option<String> },
    /// Money was captured for a checkout that can never become an order.
    RefundRequired { session_id: String, amount: Money, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind { Order, Preorder }

/// Emitted on every accepted status transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub kind: RecordKind,
    pub order_id: String,
    pub status: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "status_changed",
            Self::OrderPlaced { .. } => "order_placed",
            Self::PreorderPaid { .. } => "preorder_paid",
            Self::RefundRequired { .. } => "refund_required",
        }
    }
}
