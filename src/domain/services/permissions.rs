//! Who may request which status change.
//!
//! The lifecycle graph rejects impossible moves for everyone; this policy narrows the
//! graph-valid moves further by role.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::lifecycle::LifecycleStatus;
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::aggregates::preorder::PreorderStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Brand,
    Retailer,
    Customer,
}

impl Role {
    pub fn is_buyer(self) -> bool { matches!(self, Role::Retailer | Role::Customer) }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "brand" => Ok(Role::Brand),
            "retailer" => Ok(Role::Retailer),
            "customer" => Ok(Role::Customer),
            other => Err(format!("unknown role {other}")),
        }
    }
}

/// Invoicing and payment capture are operator steps.
const OPERATOR_ONLY: [OrderStatus; 2] = [OrderStatus::Invoiced, OrderStatus::Paid];

pub fn may_transition_order(role: Role, from: OrderStatus, to: OrderStatus) -> bool {
    if !from.can_transition_to(to) {
        return false;
    }
    match role {
        Role::Admin => true,
        Role::Brand => !OPERATOR_ONLY.contains(&to),
        Role::Retailer | Role::Customer => matches!(
            (from, to),
            (OrderStatus::Pending, OrderStatus::Cancelled) | (OrderStatus::Delivered, OrderStatus::Completed)
        ),
    }
}

pub fn may_transition_preorder(role: Role, from: PreorderStatus, to: PreorderStatus) -> bool {
    if !from.can_transition_to(to) {
        return false;
    }
    match role {
        Role::Admin | Role::Brand => true,
        Role::Retailer | Role::Customer => from == PreorderStatus::Pending && to == PreorderStatus::Cancelled,
    }
}

/// Order statuses `role` may move to from `from`, for action menus.
pub fn allowed_order_targets(role: Role, from: OrderStatus) -> Vec<OrderStatus> {
    from.next_statuses().into_iter().filter(|to| may_transition_order(role, from, *to)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_follows_graph_only() {
        assert!(may_transition_order(Role::Admin, OrderStatus::Processing, OrderStatus::Invoiced));
        assert!(may_transition_order(Role::Admin, OrderStatus::Pending, OrderStatus::Shipped));
        assert!(!may_transition_order(Role::Admin, OrderStatus::Shipped, OrderStatus::Pending));
        assert!(!may_transition_order(Role::Admin, OrderStatus::Completed, OrderStatus::Cancelled));
    }

    #[test]
    fn test_brand_cannot_invoice_or_capture() {
        assert!(may_transition_order(Role::Brand, OrderStatus::Pending, OrderStatus::Confirmed));
        assert!(!may_transition_order(Role::Brand, OrderStatus::Processing, OrderStatus::Invoiced));
        assert!(!may_transition_order(Role::Brand, OrderStatus::Invoiced, OrderStatus::Paid));
        assert!(may_transition_order(Role::Brand, OrderStatus::Paid, OrderStatus::Preparing));
        assert!(may_transition_preorder(Role::Brand, PreorderStatus::Processing, PreorderStatus::Processed));
    }

    #[test]
    fn test_buyer_moves() {
        assert!(may_transition_order(Role::Customer, OrderStatus::Pending, OrderStatus::Cancelled));
        assert!(!may_transition_order(Role::Retailer, OrderStatus::Confirmed, OrderStatus::Cancelled));
        assert!(may_transition_order(Role::Retailer, OrderStatus::Delivered, OrderStatus::Completed));
        assert!(!may_transition_preorder(Role::Customer, PreorderStatus::Processing, PreorderStatus::Cancelled));
        assert_eq!(
            allowed_order_targets(Role::Customer, OrderStatus::Pending),
            vec![OrderStatus::Cancelled]
        );
    }
}
