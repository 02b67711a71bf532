//! Cart Aggregate
//!
//! A [`Cart`] is an ordered list of lines keyed by [`CartLine::key`]. The regular
//! cart keys lines by a [`LineId`] derived from the product selection; the preorder
//! cart keys them by product id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::aggregates::product::ProductSnapshot;
use crate::domain::value_objects::{CampaignId, Channel, LineId, Money, Percentage, ProductId, VariantId};

pub trait CartLine: Clone + fmt::Debug {
    type Key: Clone + PartialEq + fmt::Display;

    fn key(&self) -> &Self::Key;
    fn product_id(&self) -> &ProductId;
    fn quantity(&self) -> u32;
    fn set_quantity(&mut self, qty: u32);
    /// What the buyer pays for this line.
    fn line_total(&self) -> Money;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartKind { Regular, Preorder }

impl fmt::Display for CartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Regular => "regular", Self::Preorder => "preorder" })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart<L> {
    items: Vec<L>,
    updated_at: DateTime<Utc>,
}

impl<L> Default for Cart<L> {
    fn default() -> Self { Self { items: vec![], updated_at: Utc::now() } }
}

impl<L: CartLine> Cart<L> {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[L] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn line_count(&self) -> usize { self.items.len() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Total units across all lines.
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity()).sum() }

    pub fn subtotal(&self) -> Money { self.items.iter().map(|i| i.line_total()).sum() }

    pub fn get(&self, key: &L::Key) -> Option<&L> { self.items.iter().find(|i| i.key() == key) }

    pub fn contains_product(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|i| i.product_id() == product_id)
    }

    /// Adding an existing key bumps its quantity instead of adding a row.
    pub fn add(&mut self, line: L) -> Result<(), CartError> {
        if line.quantity() == 0 {
            return Err(CartError::InvalidQuantity(0));
        }
        if let Some(existing) = self.items.iter_mut().find(|i| i.key() == line.key()) {
            let qty = existing.quantity().saturating_add(line.quantity());
            existing.set_quantity(qty);
        } else {
            self.items.push(line);
        }
        self.touch();
        Ok(())
    }

    /// A quantity of zero or less removes the line.
    pub fn update_quantity(&mut self, key: &L::Key, qty: i64) -> Result<(), CartError> {
        if qty <= 0 {
            return self.remove(key);
        }
        let qty = u32::try_from(qty).map_err(|_| CartError::InvalidQuantity(qty))?;
        let item = self.items.iter_mut().find(|i| i.key() == key).ok_or_else(|| CartError::ItemNotFound(key.to_string()))?;
        item.set_quantity(qty);
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, key: &L::Key) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.key() != key);
        if self.items.len() == before { return Err(CartError::ItemNotFound(key.to_string())); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl LineId {
    /// Same product, variant and option set always yield the same id. Safe to use as a URL path segment.
    pub fn for_selection(product_id: &ProductId, variant_id: Option<&VariantId>, options: &BTreeMap<String, String>) -> Self {
        let opts = options.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
        let variant = variant_id.map(VariantId::as_str).unwrap_or("-");
        LineId::new(format!("{product_id}:{variant}:{opts}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularLine {
    pub line_id: LineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub channel: Channel,
    pub quantity: u32,
    /// Unit price at add time.
    pub unit_price: Money,
}

impl RegularLine {
    pub fn new(
        product_id: ProductId, variant_id: Option<VariantId>, name: impl Into<String>,
        options: BTreeMap<String, String>, channel: Channel, quantity: u32, unit_price: Money,
    ) -> Self {
        let line_id = LineId::for_selection(&product_id, variant_id.as_ref(), &options);
        Self { line_id, product_id, variant_id, name: name.into(), options, channel, quantity, unit_price }
    }
}

impl CartLine for RegularLine {
    type Key = LineId;
    fn key(&self) -> &LineId { &self.line_id }
    fn product_id(&self) -> &ProductId { &self.product_id }
    fn quantity(&self) -> u32 { self.quantity }
    fn set_quantity(&mut self, qty: u32) { self.quantity = qty; }
    fn line_total(&self) -> Money { self.unit_price.times(self.quantity) }
}

/// A preorder cart row. Price and discount are frozen when the line is first added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderLine {
    pub product_id: ProductId,
    pub product: ProductSnapshot,
    pub campaign_id: CampaignId,
    pub quantity: u32,
    pub price_per_item: Money,
    pub discount_percentage: Percentage,
    pub discounted_price: Money,
}

impl PreorderLine {
    pub fn original_total(&self) -> Money { self.price_per_item.times(self.quantity) }
    pub fn savings(&self) -> Money { self.original_total() - self.line_total() }
}

impl CartLine for PreorderLine {
    type Key = ProductId;
    fn key(&self) -> &ProductId { &self.product_id }
    fn product_id(&self) -> &ProductId { &self.product_id }
    fn quantity(&self) -> u32 { self.quantity }
    fn set_quantity(&mut self, qty: u32) { self.quantity = qty; }
    fn line_total(&self) -> Money { self.discounted_price.times(self.quantity) }
}

impl Cart<PreorderLine> {
    /// Pre-discount value of the cart.
    pub fn original_total(&self) -> Money { self.items.iter().map(PreorderLine::original_total).sum() }
    pub fn savings(&self) -> Money { self.items.iter().map(PreorderLine::savings).sum() }
    pub fn campaign_id(&self) -> Option<&CampaignId> { self.items.first().map(|i| &i.campaign_id) }
}

pub type RegularCart = Cart<RegularLine>;
pub type PreorderCart = Cart<PreorderLine>;

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("invalid quantity {0}")]
    InvalidQuantity(i64),
    #[error("cart line {0} not found")]
    ItemNotFound(String),
    #[error("product {product_id} is already in the {other} cart")]
    InOtherCart { product_id: ProductId, other: CartKind },
    #[error("preorder cart holds items from campaign {held}, not {offered}")]
    CampaignMismatch { held: CampaignId, offered: CampaignId },
    #[error("{0} cart is empty")]
    Empty(CartKind),
    #[error("cart persistence failed: {0}")]
    Storage(#[from] crate::ports::StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn toner(qty: u32) -> RegularLine {
        RegularLine::new(ProductId::new("P1"), None, "Toner", BTreeMap::new(), Channel::B2c, qty, Money::new(dec!(10)))
    }

    fn preorder_line(qty: u32) -> PreorderLine {
        PreorderLine {
            product_id: ProductId::new("P9"),
            product: ProductSnapshot { name: "Sun Serum".into(), ..Default::default() },
            campaign_id: CampaignId::new("spring"),
            quantity: qty,
            price_per_item: Money::new(dec!(58.00)),
            discount_percentage: Percentage::from_whole(15).unwrap(),
            discounted_price: Money::new(dec!(49.30)),
        }
    }

    #[test]
    fn test_add_twice_equals_add_two() {
        let mut twice = RegularCart::new();
        twice.add(toner(1)).unwrap();
        twice.add(toner(1)).unwrap();
        let mut once = RegularCart::new();
        once.add(toner(2)).unwrap();
        assert_eq!(twice.items(), once.items());
        assert_eq!(twice.line_count(), 1);
        assert_eq!(twice.item_count(), 2);
    }

    #[test]
    fn test_option_sets_get_distinct_lines() {
        let mut cart = RegularCart::new();
        cart.add(toner(1)).unwrap();
        let mut opts = BTreeMap::new();
        opts.insert("scent".to_string(), "yuzu".to_string());
        cart.add(RegularLine::new(ProductId::new("P1"), None, "Toner", opts, Channel::B2c, 1, Money::new(dec!(10)))).unwrap();
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.subtotal(), Money::new(dec!(20)));
    }

    #[test]
    fn test_update_to_zero_removes() {
        let mut cart = RegularCart::new();
        cart.add(toner(3)).unwrap();
        let key = cart.items()[0].line_id.clone();
        cart.update_quantity(&key, 5).unwrap();
        assert_eq!(cart.item_count(), 5);
        cart.update_quantity(&key, -1).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(cart.update_quantity(&key, 2), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn test_zero_quantity_add_rejected() {
        let mut cart = RegularCart::new();
        assert!(matches!(cart.add(toner(0)), Err(CartError::InvalidQuantity(0))));
    }

    #[test]
    fn test_preorder_totals() {
        let mut cart = PreorderCart::new();
        cart.add(preorder_line(2)).unwrap();
        assert_eq!(cart.subtotal(), Money::new(dec!(98.60)));
        assert_eq!(cart.savings(), Money::new(dec!(17.40)));
        assert_eq!(cart.original_total(), Money::new(dec!(116.00)));
    }

    #[test]
    fn test_preorder_readd_keeps_frozen_discount() {
        let mut cart = PreorderCart::new();
        cart.add(preorder_line(1)).unwrap();
        let mut repriced = preorder_line(1);
        repriced.discount_percentage = Percentage::from_whole(30).unwrap();
        repriced.discounted_price = Money::new(dec!(40.60));
        cart.add(repriced).unwrap();
        let line = cart.get(&ProductId::new("P9")).unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.discounted_price, Money::new(dec!(49.30)));
    }
}
