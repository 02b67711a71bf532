//! Display labels and badge tones for statuses.

use serde::Serialize;

use crate::domain::aggregates::order::OrderStatus;
use crate::domain::aggregates::preorder::{PaymentStatus, PreorderStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Neutral,
    Info,
    Progress,
    Success,
    Warning,
    Danger,
}

/// Anything with a human label and a tone.
pub trait StatusPresentation: Copy {
    fn label(self) -> &'static str;
    fn tone(self) -> StatusTone;
}

impl StatusPresentation for OrderStatus {
    fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Invoiced => "Invoiced",
            OrderStatus::Paid => "Paid",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    fn tone(self) -> StatusTone {
        match self {
            OrderStatus::Pending => StatusTone::Warning,
            OrderStatus::Confirmed | OrderStatus::Invoiced => StatusTone::Info,
            OrderStatus::Processing | OrderStatus::Paid | OrderStatus::Preparing | OrderStatus::Shipped => StatusTone::Progress,
            OrderStatus::Delivered | OrderStatus::Completed => StatusTone::Success,
            OrderStatus::Cancelled => StatusTone::Danger,
        }
    }
}

impl StatusPresentation for PreorderStatus {
    fn label(self) -> &'static str {
        match self {
            PreorderStatus::Pending => "Awaiting campaign close",
            PreorderStatus::Processing => "Processing",
            PreorderStatus::Processed => "Ready to ship",
            PreorderStatus::Shipped => "Shipped",
            PreorderStatus::Delivered => "Delivered",
            PreorderStatus::Cancelled => "Cancelled",
        }
    }

    fn tone(self) -> StatusTone {
        match self {
            PreorderStatus::Pending => StatusTone::Warning,
            PreorderStatus::Processing | PreorderStatus::Processed | PreorderStatus::Shipped => StatusTone::Progress,
            PreorderStatus::Delivered => StatusTone::Success,
            PreorderStatus::Cancelled => StatusTone::Danger,
        }
    }
}

impl StatusPresentation for PaymentStatus {
    fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Payment pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Payment failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }

    fn tone(self) -> StatusTone {
        match self {
            PaymentStatus::Pending => StatusTone::Warning,
            PaymentStatus::Paid => StatusTone::Success,
            PaymentStatus::Failed => StatusTone::Danger,
            PaymentStatus::Refunded => StatusTone::Neutral,
        }
    }
}

pub fn status_label<S: StatusPresentation>(status: S) -> &'static str { status.label() }

pub fn status_tone<S: StatusPresentation>(status: S) -> StatusTone { status.tone() }
