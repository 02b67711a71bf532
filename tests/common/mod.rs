#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use kbeauty_orders::api::AppState;
use kbeauty_orders::domain::aggregates::affiliate::AffiliateCode;
use kbeauty_orders::domain::aggregates::campaign::{CampaignStatus, PreorderCampaign};
use kbeauty_orders::domain::aggregates::cart::RegularLine;
use kbeauty_orders::domain::aggregates::cart_session::CartSession;
use kbeauty_orders::domain::aggregates::inventory::StockLevel;
use kbeauty_orders::domain::aggregates::product::{Product, Variant};
use kbeauty_orders::domain::services::checkout::CheckoutConfig;
use kbeauty_orders::domain::value_objects::{
    Address, BuyerKind, CampaignId, Channel, Customer, CustomerId, Money, Percentage, ProductId, VariantId,
};
use kbeauty_orders::infrastructure::{Backends, MemoryBackends};

pub const SESSION: &str = "shopper-1";

pub fn serum() -> Product {
    Product::new("serum", "Vitamin C Serum")
        .with_variant(Variant::new("serum-30", "30ml").retail(Some(Money::new(dec!(58.00))), 5).wholesale(Some(Money::new(dec!(32.00))), 100))
}

pub fn toner() -> Product {
    Product::new("toner", "Rice Toner").with_variant(Variant::new("toner-150", "150ml").retail(Some(Money::new(dec!(20.00))), 2))
}

pub fn campaign() -> PreorderCampaign {
    let now = Utc::now();
    PreorderCampaign {
        id: CampaignId::new("spring-glow"),
        name: "Spring Glow".into(),
        status: CampaignStatus::Active,
        discount_percentage: Percentage::from_whole(15).unwrap(),
        start_date: now - Duration::days(2),
        end_date: now + Duration::days(5),
        preorder_date: now + Duration::days(6),
        expected_delivery: "2-3 weeks after campaign ends".into(),
        available_products: vec![],
    }
}

pub fn demo10() -> AffiliateCode {
    AffiliateCode {
        id: "aff-demo".into(),
        code: "DEMO10".into(),
        affiliate_id: Some("creator-7".into()),
        discount_percent: Percentage::from_whole(10).unwrap(),
        max_usage: Some(100),
        usage_count: 15,
        active: true,
        expires_at: None,
    }
}

pub fn consumer() -> Customer {
    Customer { id: CustomerId::new("cust-1"), email: "mina@example.com".into(), name: Some("Mina Park".into()), kind: BuyerKind::Consumer }
}

pub fn address() -> Address {
    Address {
        name: "Mina Park".into(),
        street1: "12 Garosu-gil".into(),
        city: "Seoul".into(),
        zip: "06028".into(),
        country: "KR".into(),
        ..Default::default()
    }
}

pub fn config() -> CheckoutConfig {
    CheckoutConfig {
        tax_rate: Percentage::from_whole(10).unwrap(),
        flat_shipping: Money::new(dec!(5)),
        ..CheckoutConfig::default()
    }
}

/// In-memory engine with two products, one running campaign and one affiliate code.
pub fn seeded() -> (MemoryBackends, AppState) {
    seeded_with(|_, backends| backends)
}

/// Like [`seeded`], but lets a test swap ports before the services are built.
pub fn seeded_with(wire: impl FnOnce(&MemoryBackends, Backends) -> Backends) -> (MemoryBackends, AppState) {
    let memory = MemoryBackends::default();
    for product in [serum(), toner()] {
        for variant in &product.variants {
            for channel in [Channel::B2b, Channel::B2c] {
                memory.inventory.set_level(&variant.id, channel, variant.stock(channel));
            }
        }
        memory.catalog.insert(product);
    }
    memory.campaigns.insert(campaign());
    memory.affiliates.insert(demo10());
    let state = AppState::new(wire(&memory, memory.backends()), config());
    (memory, state)
}

pub fn add_retail(memory: &MemoryBackends, session: &str, product: &str, variant: &str, qty: u32, price: Money) {
    let mut cart = CartSession::load(memory.carts.clone(), session).unwrap();
    cart.add_regular(RegularLine::new(
        ProductId::new(product), Some(VariantId::new(variant)), product, BTreeMap::new(), Channel::B2c, qty, price,
    )).unwrap();
}

pub fn available(memory: &MemoryBackends, variant: &str) -> u32 {
    memory.inventory.level(&VariantId::new(variant), Channel::B2c).map(|l| l.available()).unwrap_or(0)
}

pub fn level(memory: &MemoryBackends, variant: &str) -> StockLevel {
    memory.inventory.level(&VariantId::new(variant), Channel::B2c).unwrap_or_default()
}
