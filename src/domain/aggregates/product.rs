//! Product Aggregate
//!
//! Catalog records went through two schema generations. Current records carry
//! per-variant `b2b`/`b2c` terms; older ones only have the flat `retail_price.item`
//! and `price.item` fields. Both shapes deserialize into this one type.

use serde::{Deserialize, Serialize};
use crate::domain::aggregates::inventory::StockLevel;
use crate::domain::value_objects::{BrandId, Channel, Money, ProductId, VariantId};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub brand_id: Option<BrandId>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Legacy flat retail price.
    #[serde(default)]
    pub retail_price: Option<LegacyPrice>,
    /// Legacy flat wholesale price.
    #[serde(default)]
    pub price: Option<LegacyPrice>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Active, Draft, Archived }

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LegacyPrice {
    #[serde(default)]
    pub item: Option<Money>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub b2b: Option<WholesaleTerms>,
    #[serde(default)]
    pub b2c: Option<RetailTerms>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WholesaleTerms {
    #[serde(default)]
    pub wholesale_price: Option<Money>,
    #[serde(default)]
    pub stock: StockLevel,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailTerms {
    #[serde(default)]
    pub retail_price: Option<Money>,
    #[serde(default)]
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub stock: StockLevel,
}

/// Denormalized product data carried by preorder cart lines and preorder items.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub name: String,
    #[serde(default)]
    pub brand_id: Option<BrandId>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(), name: name.into(), brand_id: None, image_url: None,
            status: ProductStatus::Active, variants: vec![], retail_price: None, price: None,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self { self.variants.push(variant); self }

    pub fn with_legacy_prices(mut self, retail: Option<Money>, wholesale: Option<Money>) -> Self {
        self.retail_price = retail.map(|item| LegacyPrice { item: Some(item) });
        self.price = wholesale.map(|item| LegacyPrice { item: Some(item) });
        self
    }

    /// The first variant is the default one shown and priced in listings.
    pub fn default_variant(&self) -> Option<&Variant> { self.variants.first() }

    pub fn variant(&self, id: &VariantId) -> Option<&Variant> { self.variants.iter().find(|v| &v.id == id) }

    pub fn is_purchasable(&self) -> bool { self.status == ProductStatus::Active }

    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot { name: self.name.clone(), brand_id: self.brand_id.clone(), image_url: self.image_url.clone() }
    }
}

impl Variant {
    pub fn new(id: impl Into<VariantId>, name: impl Into<String>) -> Self {
        Self { id: id.into(), sku: None, name: name.into(), b2b: None, b2c: None }
    }

    pub fn wholesale(mut self, price: Option<Money>, stock: u32) -> Self {
        self.b2b = Some(WholesaleTerms { wholesale_price: price, stock: StockLevel::new(stock) });
        self
    }

    pub fn retail(mut self, price: Option<Money>, stock: u32) -> Self {
        self.b2c = Some(RetailTerms { retail_price: price, sale_price: None, stock: StockLevel::new(stock) });
        self
    }

    /// Channel-specific list price, if this variant carries one.
    pub fn channel_price(&self, channel: Channel) -> Option<Money> {
        match channel {
            Channel::B2b => self.b2b.as_ref().and_then(|t| t.wholesale_price),
            Channel::B2c => self.b2c.as_ref().and_then(|t| t.retail_price),
        }
    }

    pub fn stock(&self, channel: Channel) -> StockLevel {
        match channel {
            Channel::B2b => self.b2b.as_ref().map(|t| t.stock).unwrap_or_default(),
            Channel::B2c => self.b2c.as_ref().map(|t| t.stock).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_legacy_record_deserializes() {
        let json = r#"{"id":"p-1","name":"Snail Essence","retailPrice":{"item":"21.00"}}"#;
        let p: Product = serde_json::from_str(json).unwrap();
        assert!(p.variants.is_empty());
        assert_eq!(p.retail_price.unwrap().item, Some(Money::new(dec!(21.00))));
        assert_eq!(p.status, ProductStatus::Active);
    }

    #[test]
    fn test_variant_channel_price() {
        let v = Variant::new("v-1", "50ml").wholesale(Some(Money::new(dec!(30))), 10).retail(Some(Money::new(dec!(58))), 5);
        assert_eq!(v.channel_price(Channel::B2c), Some(Money::new(dec!(58))));
        assert_eq!(v.stock(Channel::B2b).available(), 10);
    }
}
