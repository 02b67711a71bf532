//! Unit price resolution across catalog schema generations.
//!
//! Each tier is a plain accessor returning `Option<Money>`; the first `Some` in
//! [`PRICE_TIERS`] wins. Non-positive stored prices count as missing.

use rust_decimal::Decimal;
use crate::domain::aggregates::product::{Product, Variant};
use crate::domain::value_objects::{Channel, Money, Percentage, ProductId, ValueError, VariantId};

/// What is being priced: a product, optionally pinned to one of its variants.
#[derive(Clone, Copy, Debug)]
pub struct PriceQuery<'a> {
    pub product: &'a Product,
    pub variant: Option<&'a Variant>,
    pub channel: Channel,
}

impl<'a> PriceQuery<'a> {
    pub fn new(product: &'a Product, channel: Channel) -> Self {
        Self { product, variant: product.default_variant(), channel }
    }

    /// Prices a specific variant; falls back to the default variant if the id is unknown.
    pub fn for_variant(product: &'a Product, variant_id: Option<&VariantId>, channel: Channel) -> Self {
        let variant = variant_id.and_then(|id| product.variant(id)).or_else(|| product.default_variant());
        Self { product, variant, channel }
    }
}

pub type PriceAccessor = fn(&PriceQuery<'_>) -> Option<Money>;

pub const PRICE_TIERS: [(&str, PriceAccessor); 3] = [
    ("variant", variant_price),
    ("legacy", legacy_price),
    ("opposite_channel", opposite_channel_price),
];

/// Tier 1: `b2c.retailPrice` / `b2b.wholesalePrice` on the variant.
pub fn variant_price(q: &PriceQuery<'_>) -> Option<Money> {
    q.variant?.channel_price(q.channel).filter(Money::is_positive)
}

/// Tier 2: flat `retailPrice.item` (retail) or `price.item` (wholesale) on older records.
pub fn legacy_price(q: &PriceQuery<'_>) -> Option<Money> {
    let field = match q.channel {
        Channel::B2c => q.product.retail_price.as_ref(),
        Channel::B2b => q.product.price.as_ref(),
    };
    field.and_then(|p| p.item).filter(Money::is_positive)
}

/// Tier 3: whatever the other channel would charge.
pub fn opposite_channel_price(q: &PriceQuery<'_>) -> Option<Money> {
    let flipped = PriceQuery { channel: q.channel.opposite(), ..*q };
    variant_price(&flipped).or_else(|| legacy_price(&flipped))
}

/// Returns `Money::ZERO` when nothing resolves. Zero means "not for sale", never "free".
pub fn resolve(q: &PriceQuery<'_>) -> Money {
    PRICE_TIERS.iter().find_map(|(_, tier)| tier(q)).unwrap_or(Money::ZERO)
}

pub fn resolve_price(product: &Product, channel: Channel) -> Money {
    resolve(&PriceQuery::new(product, channel))
}

/// Like [`resolve`], but a zero price becomes [`PricingError::Unavailable`].
pub fn purchasable_price(q: &PriceQuery<'_>) -> Result<Money, PricingError> {
    let price = resolve(q);
    if price.is_positive() {
        Ok(price)
    } else {
        tracing::debug!(product_id = %q.product.id, channel = %q.channel, "no resolvable price");
        Err(PricingError::Unavailable { product_id: q.product.id.clone(), channel: q.channel })
    }
}

pub fn apply_percentage_discount(price: Money, percent: Decimal) -> Result<Money, ValueError> {
    Ok(Percentage::new(percent)?.apply_to(price))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("product {product_id} has no {channel} price")]
    Unavailable { product_id: ProductId, channel: Channel },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn money(d: Decimal) -> Money { Money::new(d) }

    #[test]
    fn test_variant_price_wins() {
        let p = Product::new("p", "Toner")
            .with_variant(Variant::new("v", "150ml").retail(Some(money(dec!(58))), 1).wholesale(Some(money(dec!(31))), 1))
            .with_legacy_prices(Some(money(dec!(40))), Some(money(dec!(20))));
        assert_eq!(resolve_price(&p, Channel::B2c), money(dec!(58)));
        assert_eq!(resolve_price(&p, Channel::B2b), money(dec!(31)));
    }

    #[test]
    fn test_legacy_fallback() {
        let p = Product::new("p", "Toner")
            .with_variant(Variant::new("v", "150ml").retail(None, 1))
            .with_legacy_prices(Some(money(dec!(40))), None);
        assert_eq!(resolve_price(&p, Channel::B2c), money(dec!(40)));
    }

    #[test]
    fn test_opposite_channel_last_resort() {
        let p = Product::new("p", "Toner").with_variant(Variant::new("v", "150ml").wholesale(Some(money(dec!(25))), 1));
        assert_eq!(resolve_price(&p, Channel::B2c), money(dec!(25)));
        let legacy_only = Product::new("q", "Mask").with_legacy_prices(None, Some(money(dec!(3))));
        assert_eq!(resolve_price(&legacy_only, Channel::B2c), money(dec!(3)));
    }

    #[test]
    fn test_nothing_resolves_to_zero() {
        let bare = Product::new("p", "Toner");
        assert_eq!(resolve_price(&bare, Channel::B2c), Money::ZERO);
        assert_eq!(resolve_price(&bare, Channel::B2b), Money::ZERO);
        let zeroed = Product::new("p", "Toner")
            .with_variant(Variant::new("v", "x").retail(Some(Money::ZERO), 0))
            .with_legacy_prices(Some(money(dec!(-5))), None);
        assert_eq!(resolve_price(&zeroed, Channel::B2c), Money::ZERO);
    }

    #[test]
    fn test_zero_price_is_unavailable() {
        let bare = Product::new("p", "Toner");
        let err = purchasable_price(&PriceQuery::new(&bare, Channel::B2c)).unwrap_err();
        assert!(matches!(err, PricingError::Unavailable { channel: Channel::B2c, .. }));
    }

    #[test]
    fn test_specific_variant_priced() {
        let p = Product::new("p", "Cream")
            .with_variant(Variant::new("small", "30ml").retail(Some(money(dec!(20))), 1))
            .with_variant(Variant::new("large", "80ml").retail(Some(money(dec!(45))), 1));
        let q = PriceQuery::for_variant(&p, Some(&VariantId::new("large")), Channel::B2c);
        assert_eq!(resolve(&q), money(dec!(45)));
        let unknown = PriceQuery::for_variant(&p, Some(&VariantId::new("nope")), Channel::B2c);
        assert_eq!(resolve(&unknown), money(dec!(20)));
    }

    #[test]
    fn test_apply_percentage_discount_rejects_out_of_range() {
        assert_eq!(apply_percentage_discount(money(dec!(58)), dec!(15)).unwrap(), money(dec!(49.30)));
        assert!(apply_percentage_discount(money(dec!(58)), dec!(120)).is_err());
    }
}
