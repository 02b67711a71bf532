//! Preorder campaign and affiliate code discounts.
//!
//! The two never stack: campaign pricing only reaches the preorder cart and affiliate
//! codes only price the regular cart. Each cart has its own checkout path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::aggregates::affiliate::{AffiliateCode, Rejection};
use crate::domain::aggregates::campaign::PreorderCampaign;
use crate::domain::aggregates::cart::{PreorderLine, RegularCart};
use crate::domain::aggregates::product::{Product, ProductSnapshot};
use crate::domain::services::pricing::{purchasable_price, PriceQuery, PricingError};
use crate::domain::value_objects::{CampaignId, Channel, Money, Percentage, ProductId};
use crate::ports::{AffiliateCodeRepository, CampaignRepository, StorageError};

/// Campaign price for one product, frozen at the moment it is quoted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderQuote {
    pub campaign_id: CampaignId,
    pub product_id: ProductId,
    pub product: ProductSnapshot,
    pub price_per_item: Money,
    pub discount_percentage: Percentage,
    pub discounted_price: Money,
}

impl PreorderQuote {
    pub fn savings_per_item(&self) -> Money { self.price_per_item - self.discounted_price }

    pub fn into_line(self, quantity: u32) -> PreorderLine {
        PreorderLine {
            product_id: self.product_id,
            product: self.product,
            campaign_id: self.campaign_id,
            quantity,
            price_per_item: self.price_per_item,
            discount_percentage: self.discount_percentage,
            discounted_price: self.discounted_price,
        }
    }
}

/// A product is retail-eligible when it carries retail terms in either schema generation.
pub fn is_retail_eligible(product: &Product) -> bool {
    let variant_retail = product.default_variant().is_some_and(|v| v.b2c.is_some());
    let legacy_retail = product.retail_price.as_ref().is_some_and(|p| p.item.is_some());
    product.is_purchasable() && (variant_retail || legacy_retail)
}

/// Curated lists are trusted as-is; open campaigns admit retail-eligible products.
pub fn is_product_eligible(campaign: &PreorderCampaign, product: &Product) -> bool {
    if campaign.is_curated() {
        campaign.is_product_eligible(&product.id)
    } else {
        is_retail_eligible(product)
    }
}

pub fn quote_preorder(campaign: &PreorderCampaign, product: &Product, now: DateTime<Utc>) -> Result<PreorderQuote, DiscountError> {
    if !campaign.is_running(now) {
        return Err(DiscountError::CampaignInactive);
    }
    if !is_product_eligible(campaign, product) {
        return Err(DiscountError::CampaignIneligible { campaign_id: campaign.id.clone(), product_id: product.id.clone() });
    }
    let price = purchasable_price(&PriceQuery::new(product, Channel::B2c))?;
    Ok(PreorderQuote {
        campaign_id: campaign.id.clone(),
        product_id: product.id.clone(),
        product: product.snapshot(),
        price_per_item: price,
        discount_percentage: campaign.discount_percentage,
        discounted_price: campaign.discount_percentage.apply_to(price),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateDiscount {
    pub code_id: String,
    pub code: String,
    pub percent: Percentage,
    pub subtotal: Money,
    pub amount: Money,
}

impl AffiliateDiscount {
    /// Before shipping and tax.
    pub fn discounted_subtotal(&self) -> Money { self.subtotal.saturating_sub(self.amount) }
}

/// Prices an affiliate code against the regular cart subtotal.
pub fn affiliate_discount(code: &AffiliateCode, cart: &RegularCart, now: DateTime<Utc>) -> Result<AffiliateDiscount, DiscountError> {
    code.validate(now).map_err(|reason| DiscountError::AffiliateCodeInvalid { code: code.code.clone(), reason })?;
    let subtotal = cart.subtotal();
    Ok(AffiliateDiscount {
        code_id: code.id.clone(),
        code: code.code.clone(),
        percent: code.discount_percent,
        subtotal,
        amount: code.discount_percent.portion_of(subtotal),
    })
}

pub struct DiscountEngine {
    campaigns: Arc<dyn CampaignRepository>,
    affiliates: Arc<dyn AffiliateCodeRepository>,
}

impl DiscountEngine {
    pub fn new(campaigns: Arc<dyn CampaignRepository>, affiliates: Arc<dyn AffiliateCodeRepository>) -> Self {
        Self { campaigns, affiliates }
    }

    /// `None` when no campaign is running. Not an error.
    pub async fn fetch_active_campaign(&self) -> Result<Option<PreorderCampaign>, DiscountError> {
        let now = Utc::now();
        match self.campaigns.fetch_active().await? {
            Some(c) if c.is_running(now) => Ok(Some(c)),
            Some(c) => {
                tracing::debug!(campaign_id = %c.id, "active campaign is outside its window");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// The campaign a preorder cart was priced under, while it is still running.
    pub async fn running_campaign(&self, id: &CampaignId) -> Result<Option<PreorderCampaign>, DiscountError> {
        Ok(self.campaigns.find(id).await?.filter(|c| c.is_running(Utc::now())))
    }

    pub async fn preorder_quote(&self, product: &Product) -> Result<PreorderQuote, DiscountError> {
        let campaign = self.fetch_active_campaign().await?.ok_or(DiscountError::CampaignInactive)?;
        quote_preorder(&campaign, product, Utc::now())
    }

    pub async fn lookup_affiliate_code(&self, code: &str) -> Result<AffiliateCode, DiscountError> {
        self.affiliates.find_by_code(code).await?.ok_or_else(|| DiscountError::AffiliateCodeInvalid {
            code: code.trim().to_string(),
            reason: Rejection::Unknown,
        })
    }

    pub async fn apply_affiliate_code(&self, code: &str, cart: &RegularCart) -> Result<AffiliateDiscount, DiscountError> {
        let found = self.lookup_affiliate_code(code).await?;
        affiliate_discount(&found, cart, Utc::now())
    }

    /// Counts one use. Fails if a concurrent redemption took the last slot.
    pub async fn redeem(&self, discount: &AffiliateDiscount) -> Result<(), DiscountError> {
        if self.affiliates.redeem(&discount.code_id).await? {
            Ok(())
        } else {
            Err(DiscountError::AffiliateCodeInvalid { code: discount.code.clone(), reason: Rejection::UsageExhausted })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscountError {
    #[error("no preorder campaign is running")]
    CampaignInactive,
    #[error("product {product_id} is not part of campaign {campaign_id}")]
    CampaignIneligible { campaign_id: CampaignId, product_id: ProductId },
    #[error("affiliate code {code} rejected: {reason}")]
    AffiliateCodeInvalid { code: String, reason: Rejection },
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::campaign::CampaignStatus;
    use crate::domain::aggregates::cart::RegularLine;
    use crate::domain::aggregates::product::Variant;
    use crate::infrastructure::memory::{InMemoryAffiliateCodes, InMemoryCampaigns};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn campaign(products: Vec<ProductId>) -> PreorderCampaign {
        let now = Utc::now();
        PreorderCampaign {
            id: CampaignId::new("spring"),
            name: "Spring Glow".into(),
            status: CampaignStatus::Active,
            discount_percentage: Percentage::from_whole(15).unwrap(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(5),
            preorder_date: now + Duration::days(6),
            expected_delivery: "2-3 weeks".into(),
            available_products: products,
        }
    }

    fn serum() -> Product {
        Product::new("serum", "Vitamin C Serum").with_variant(Variant::new("serum-30", "30ml").retail(Some(Money::new(dec!(58.00))), 40))
    }

    fn demo10() -> AffiliateCode {
        AffiliateCode {
            id: "aff-demo".into(), code: "DEMO10".into(), affiliate_id: Some("influencer-7".into()),
            discount_percent: Percentage::from_whole(10).unwrap(), max_usage: Some(100), usage_count: 15,
            active: true, expires_at: None,
        }
    }

    fn cart_of(total: Money) -> RegularCart {
        let mut cart = RegularCart::new();
        cart.add(RegularLine::new(ProductId::new("set"), None, "Gift Set", BTreeMap::new(), Channel::B2c, 1, total)).unwrap();
        cart
    }

    #[test]
    fn test_campaign_scenario() {
        let quote = quote_preorder(&campaign(vec![]), &serum(), Utc::now()).unwrap();
        assert_eq!(quote.discounted_price, Money::new(dec!(49.30)));
        let line = quote.into_line(2);
        assert_eq!(line.original_total() - line.savings(), Money::new(dec!(98.60)));
        assert_eq!(line.savings(), Money::new(dec!(17.40)));
    }

    #[test]
    fn test_curated_campaign_trusts_list() {
        let wholesale_only = Product::new("ampoule", "Ampoule").with_variant(Variant::new("a", "a").wholesale(Some(Money::new(dec!(12))), 5));
        assert!(!is_product_eligible(&campaign(vec![]), &wholesale_only));
        let curated = campaign(vec![ProductId::new("ampoule")]);
        let quote = quote_preorder(&curated, &wholesale_only, Utc::now()).unwrap();
        assert_eq!(quote.price_per_item, Money::new(dec!(12)));
        assert!(matches!(
            quote_preorder(&curated, &serum(), Utc::now()),
            Err(DiscountError::CampaignIneligible { .. })
        ));
    }

    #[test]
    fn test_closed_campaign_refuses() {
        let mut c = campaign(vec![]);
        c.status = CampaignStatus::Completed;
        assert!(matches!(quote_preorder(&c, &serum(), Utc::now()), Err(DiscountError::CampaignInactive)));
    }

    #[test]
    fn test_affiliate_scenario() {
        let discount = affiliate_discount(&demo10(), &cart_of(Money::new(dec!(130.00))), Utc::now()).unwrap();
        assert_eq!(discount.amount, Money::new(dec!(13.00)));
        assert_eq!(discount.discounted_subtotal(), Money::new(dec!(117.00)));
    }

    #[tokio::test]
    async fn test_no_active_campaign_short_circuits() {
        let engine = DiscountEngine::new(Arc::new(InMemoryCampaigns::default()), Arc::new(InMemoryAffiliateCodes::default()));
        assert!(engine.fetch_active_campaign().await.unwrap().is_none());
        assert!(matches!(engine.preorder_quote(&serum()).await, Err(DiscountError::CampaignInactive)));
    }

    #[tokio::test]
    async fn test_running_campaign_by_id() {
        let campaigns = Arc::new(InMemoryCampaigns::default());
        campaigns.insert(campaign(vec![]));
        let engine = DiscountEngine::new(campaigns.clone(), Arc::new(InMemoryAffiliateCodes::default()));
        let spring = CampaignId::new("spring");
        assert!(engine.running_campaign(&spring).await.unwrap().is_some());
        assert!(engine.running_campaign(&CampaignId::new("winter")).await.unwrap().is_none());

        let mut ended = campaign(vec![]);
        ended.end_date = Utc::now() - Duration::hours(1);
        campaigns.insert(ended);
        assert!(engine.running_campaign(&spring).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_exhausted_codes() {
        let codes = Arc::new(InMemoryAffiliateCodes::default());
        let mut capped = demo10();
        capped.max_usage = Some(16);
        codes.insert(capped);
        let engine = DiscountEngine::new(Arc::new(InMemoryCampaigns::default()), codes);
        let cart = cart_of(Money::new(dec!(50)));

        let err = engine.apply_affiliate_code("NOPE", &cart).await.unwrap_err();
        assert!(matches!(err, DiscountError::AffiliateCodeInvalid { reason: Rejection::Unknown, .. }));

        let discount = engine.apply_affiliate_code("demo10", &cart).await.unwrap();
        engine.redeem(&discount).await.unwrap();
        let err = engine.redeem(&discount).await.unwrap_err();
        assert!(matches!(err, DiscountError::AffiliateCodeInvalid { reason: Rejection::UsageExhausted, .. }));
        let err = engine.apply_affiliate_code("DEMO10", &cart).await.unwrap_err();
        assert!(matches!(err, DiscountError::AffiliateCodeInvalid { reason: Rejection::UsageExhausted, .. }));
    }
}
