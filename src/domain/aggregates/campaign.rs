//! Preorder campaigns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{CampaignId, Percentage, ProductId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus { #[default] Draft, Active, Completed, Cancelled }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderCampaign {
    pub id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    pub discount_percentage: Percentage,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// When collected preorders are placed with the brand.
    pub preorder_date: DateTime<Utc>,
    /// Free-form, e.g. "2-3 weeks after campaign ends".
    pub expected_delivery: String,
    /// Empty means every retail-eligible product.
    #[serde(default)]
    pub available_products: Vec<ProductId>,
}

impl PreorderCampaign {
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active && self.start_date <= now && now <= self.end_date
    }

    pub fn is_curated(&self) -> bool { !self.available_products.is_empty() }

    pub fn is_product_eligible(&self, product_id: &ProductId) -> bool {
        !self.is_curated() || self.available_products.contains(product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn campaign(products: Vec<ProductId>) -> PreorderCampaign {
        let now = Utc::now();
        PreorderCampaign {
            id: CampaignId::new("c1"),
            name: "Spring Glow".into(),
            status: CampaignStatus::Active,
            discount_percentage: Percentage::from_whole(15).unwrap(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(6),
            preorder_date: now + Duration::days(7),
            expected_delivery: "2-3 weeks".into(),
            available_products: products,
        }
    }

    #[test]
    fn test_open_campaign_allows_everything() {
        assert!(campaign(vec![]).is_product_eligible(&ProductId::new("anything")));
    }

    #[test]
    fn test_curated_campaign_is_exact() {
        let c = campaign(vec![ProductId::new("p1")]);
        assert!(c.is_product_eligible(&ProductId::new("p1")));
        assert!(!c.is_product_eligible(&ProductId::new("p2")));
    }

    #[test]
    fn test_running_window() {
        let mut c = campaign(vec![]);
        assert!(c.is_running(Utc::now()));
        assert!(!c.is_running(c.end_date + Duration::seconds(1)));
        c.status = CampaignStatus::Completed;
        assert!(!c.is_running(Utc::now()));
    }
}
