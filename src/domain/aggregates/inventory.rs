//! Per-channel stock accounting

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Channel, VariantId};

/// Stock for one variant in one channel. `available = stock − reserved`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub stock: u32,
    #[serde(default)]
    pub reserved: u32,
}

impl StockLevel {
    pub fn new(stock: u32) -> Self { Self { stock, reserved: 0 } }

    /// Never negative, even if a stored record has `reserved > stock`.
    pub fn available(&self) -> u32 { self.stock.saturating_sub(self.reserved) }

    /// Returns the level after reserving `qty`, or the shortfall. Leaves `self` untouched.
    pub fn reserve(&self, qty: u32) -> Result<StockLevel, Shortfall> {
        if qty == 0 || qty > self.available() {
            return Err(Shortfall { available: self.available(), requested: qty });
        }
        Ok(StockLevel { stock: self.stock, reserved: self.reserved + qty })
    }

    pub fn release(&self, qty: u32) -> StockLevel {
        StockLevel { stock: self.stock, reserved: self.reserved.saturating_sub(qty) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shortfall { pub available: u32, pub requested: u32 }

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InventoryError {
    #[error("insufficient {channel} stock for variant {variant_id}: available {available}, requested {requested}")]
    InsufficientStock { variant_id: VariantId, channel: Channel, available: u32, requested: u32 },
    #[error("no {1} inventory record for variant {0}")]
    UnknownVariant(VariantId, Channel),
    #[error("inventory storage: {0}")]
    Storage(String),
}

impl InventoryError {
    pub fn shortfall(variant_id: &VariantId, channel: Channel, s: Shortfall) -> Self {
        Self::InsufficientStock { variant_id: variant_id.clone(), channel, available: s.available, requested: s.requested }
    }
}
