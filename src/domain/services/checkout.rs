//! Checkout and payment reconciliation.
//!
//! A checkout freezes every value needed to build the order later into a
//! [`CheckoutContext`], which crosses the hosted payment page as a flat string map.
//! Preorders get a pending draft record before payment; regular orders are only
//! created once the provider reports the session paid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::aggregates::cart::{CartError, CartKind, CartLine};
use crate::domain::aggregates::cart_session::CartSession;
use crate::domain::aggregates::inventory::InventoryError;
use crate::domain::aggregates::order::{LineItem, NewOrder, Order, OrderError};
use crate::domain::aggregates::preorder::{DraftPreorder, Preorder, PreorderError, PreorderItem};
use crate::domain::aggregates::lifecycle::LifecycleStatus;
use crate::domain::events::{DomainEvent, RecordKind, StatusChanged};
use crate::domain::services::discount::{AffiliateDiscount, DiscountEngine, DiscountError};
use crate::domain::services::pricing::PricingError;
use crate::domain::services::WRITE_ATTEMPTS;
use crate::domain::value_objects::{
    Address, BuyerKind, CampaignId, Channel, Customer, CustomerId, Money, Percentage, PreorderId, ProductId, VariantId,
};
use crate::ports::{
    EventPublisher, InventoryStore, KeyValueStore, OrderRepository, PaymentGateway, PreorderRepository,
    ReconciliationJournal, StorageError, unique,
};

#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    pub success_url: String,
    pub cancel_url: String,
    pub tax_rate: Percentage,
    pub flat_shipping: Money,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:3000/checkout/success".into(),
            cancel_url: "http://localhost:3000/checkout/cancel".into(),
            tax_rate: Percentage::ZERO,
            flat_shipping: Money::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider-facing types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLineItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer: Customer,
    pub line_items: Vec<CheckoutLineItem>,
    pub shipping_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Money>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutRequest {
    /// What the provider will charge.
    pub fn amount_total(&self) -> Money {
        let gross: Money = self.line_items.iter().map(|l| l.unit_price.times(l.quantity)).sum();
        gross.saturating_sub(self.discount.unwrap_or(Money::ZERO))
    }

    pub fn for_regular(ctx: &RegularCheckoutContext, config: &CheckoutConfig) -> Result<Self, CheckoutError> {
        let mut line_items: Vec<CheckoutLineItem> = ctx.items.iter().map(|i| CheckoutLineItem {
            id: i.variant_id.as_ref().map(|v| v.to_string()).unwrap_or_else(|| i.product_id.to_string()),
            name: i.name.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
        }).collect();
        if ctx.tax.is_positive() {
            line_items.push(CheckoutLineItem { id: "tax".into(), name: "Tax".into(), quantity: 1, unit_price: ctx.tax });
        }
        if ctx.shipping.is_positive() {
            line_items.push(CheckoutLineItem { id: "shipping".into(), name: "Shipping".into(), quantity: 1, unit_price: ctx.shipping });
        }
        Ok(Self {
            customer: ctx.customer.clone(),
            line_items,
            shipping_address: ctx.shipping_address.clone(),
            discount: ctx.affiliate.as_ref().map(|a| a.amount),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            metadata: CheckoutContext::Regular(ctx.clone()).to_metadata()?,
        })
    }

    /// Preorder lines are charged at their frozen discounted price.
    pub fn for_preorder(preorder: &Preorder, ctx: &PreorderCheckoutContext, config: &CheckoutConfig) -> Result<Self, CheckoutError> {
        let line_items = preorder.items().iter().map(|i| CheckoutLineItem {
            id: i.product_id.to_string(),
            name: i.product.name.clone(),
            quantity: i.quantity,
            unit_price: i.discounted_price,
        }).collect();
        Ok(Self {
            customer: ctx.customer.clone(),
            line_items,
            shipping_address: preorder.shipping_address().clone(),
            discount: None,
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            metadata: CheckoutContext::Preorder(ctx.clone()).to_metadata()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState { Open, Paid, Expired }

/// The provider's view of a session, returned on the success callback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub session_id: String,
    pub state: PaymentState,
    pub amount_total: Money,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider rejected the request: {0}")]
    Rejected(String),
    #[error("unknown checkout session {0}")]
    UnknownSession(String),
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Checkout context and its metadata codec
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum CheckoutContext {
    Regular(RegularCheckoutContext),
    Preorder(PreorderCheckoutContext),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegularCheckoutContext {
    pub cart_session: String,
    pub customer: Customer,
    pub channel: Channel,
    pub items: Vec<LineItem>,
    pub shipping_address: Address,
    pub tax: Money,
    pub shipping: Money,
    pub affiliate: Option<AffiliateDiscount>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreorderCheckoutContext {
    pub cart_session: String,
    pub customer: Customer,
    pub preorder_id: PreorderId,
    pub campaign_id: CampaignId,
    pub campaign_name: String,
    pub discount_percentage: Percentage,
    pub preorder_date: DateTime<Utc>,
    pub estimated_delivery: String,
}

pub mod keys {
    pub const ORDER_TYPE: &str = "orderType";
    pub const CART_SESSION: &str = "cartSession";
    pub const CUSTOMER_ID: &str = "customerId";
    pub const CUSTOMER_EMAIL: &str = "customerEmail";
    pub const CUSTOMER_NAME: &str = "customerName";
    pub const CUSTOMER_KIND: &str = "customerKind";
    pub const CHANNEL: &str = "channel";
    pub const ITEMS: &str = "items";
    pub const SHIPPING_ADDRESS: &str = "shippingAddress";
    pub const TAX: &str = "tax";
    pub const SHIPPING: &str = "shipping";
    pub const AFFILIATE_CODE: &str = "affiliateCode";
    pub const AFFILIATE_CODE_ID: &str = "affiliateCodeId";
    pub const AFFILIATE_DISCOUNT: &str = "affiliateDiscount";
    pub const DISCOUNT_PERCENTAGE: &str = "discountPercentage";
    pub const PREORDER_ID: &str = "preorderId";
    pub const CAMPAIGN_ID: &str = "campaignId";
    pub const CAMPAIGN_NAME: &str = "campaignName";
    pub const PREORDER_DATE: &str = "preorderDate";
    pub const ESTIMATED_DELIVERY: &str = "estimatedDelivery";
}

const REGULAR: &str = "regular";
const PREORDER: &str = "preorder";

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("checkout metadata is missing {0}")]
    Missing(&'static str),
    #[error("checkout metadata {key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("checkout metadata could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

type Metadata = BTreeMap<String, String>;

fn put(m: &mut Metadata, key: &str, value: impl ToString) { m.insert(key.to_string(), value.to_string()); }

fn required<'a>(m: &'a Metadata, key: &'static str) -> Result<&'a str, MetadataError> {
    m.get(key).map(String::as_str).ok_or(MetadataError::Missing(key))
}

fn parsed<T: FromStr>(m: &Metadata, key: &'static str) -> Result<T, MetadataError>
where
    T::Err: std::fmt::Display,
{
    required(m, key)?.parse().map_err(|e: T::Err| MetadataError::Invalid { key, reason: e.to_string() })
}

fn json<T: serde::de::DeserializeOwned>(m: &Metadata, key: &'static str) -> Result<T, MetadataError> {
    serde_json::from_str(required(m, key)?).map_err(|e| MetadataError::Invalid { key, reason: e.to_string() })
}

fn money(m: &Metadata, key: &'static str) -> Result<Money, MetadataError> {
    parsed::<rust_decimal::Decimal>(m, key).map(Money::new)
}

fn percentage(m: &Metadata, key: &'static str) -> Result<Percentage, MetadataError> {
    let raw = parsed::<rust_decimal::Decimal>(m, key)?;
    Percentage::new(raw).map_err(|e| MetadataError::Invalid { key, reason: e.to_string() })
}

fn put_customer(m: &mut Metadata, c: &Customer) {
    put(m, keys::CUSTOMER_ID, &c.id);
    put(m, keys::CUSTOMER_EMAIL, &c.email);
    if let Some(name) = &c.name {
        put(m, keys::CUSTOMER_NAME, name);
    }
    put(m, keys::CUSTOMER_KIND, match c.kind { BuyerKind::Retailer => "retailer", BuyerKind::Consumer => "consumer" });
}

fn customer(m: &Metadata) -> Result<Customer, MetadataError> {
    let kind = match required(m, keys::CUSTOMER_KIND)? {
        "retailer" => BuyerKind::Retailer,
        "consumer" => BuyerKind::Consumer,
        other => return Err(MetadataError::Invalid { key: keys::CUSTOMER_KIND, reason: format!("unknown kind {other}") }),
    };
    Ok(Customer {
        id: CustomerId::new(required(m, keys::CUSTOMER_ID)?),
        email: required(m, keys::CUSTOMER_EMAIL)?.to_string(),
        name: m.get(keys::CUSTOMER_NAME).cloned(),
        kind,
    })
}

impl CheckoutContext {
    pub fn order_type(&self) -> &'static str {
        match self { Self::Regular(_) => REGULAR, Self::Preorder(_) => PREORDER }
    }

    pub fn to_metadata(&self) -> Result<Metadata, MetadataError> {
        let mut m = Metadata::new();
        put(&mut m, keys::ORDER_TYPE, self.order_type());
        match self {
            Self::Regular(ctx) => {
                put(&mut m, keys::CART_SESSION, &ctx.cart_session);
                put_customer(&mut m, &ctx.customer);
                put(&mut m, keys::CHANNEL, ctx.channel);
                put(&mut m, keys::ITEMS, serde_json::to_string(&ctx.items)?);
                put(&mut m, keys::SHIPPING_ADDRESS, serde_json::to_string(&ctx.shipping_address)?);
                put(&mut m, keys::TAX, ctx.tax);
                put(&mut m, keys::SHIPPING, ctx.shipping);
                if let Some(a) = &ctx.affiliate {
                    put(&mut m, keys::AFFILIATE_CODE, &a.code);
                    put(&mut m, keys::AFFILIATE_CODE_ID, &a.code_id);
                    put(&mut m, keys::AFFILIATE_DISCOUNT, a.amount);
                    put(&mut m, keys::DISCOUNT_PERCENTAGE, a.percent.value());
                }
            }
            Self::Preorder(ctx) => {
                put(&mut m, keys::CART_SESSION, &ctx.cart_session);
                put_customer(&mut m, &ctx.customer);
                put(&mut m, keys::PREORDER_ID, ctx.preorder_id);
                put(&mut m, keys::CAMPAIGN_ID, &ctx.campaign_id);
                put(&mut m, keys::CAMPAIGN_NAME, &ctx.campaign_name);
                put(&mut m, keys::DISCOUNT_PERCENTAGE, ctx.discount_percentage.value());
                put(&mut m, keys::PREORDER_DATE, ctx.preorder_date.to_rfc3339());
                put(&mut m, keys::ESTIMATED_DELIVERY, &ctx.estimated_delivery);
            }
        }
        Ok(m)
    }

    pub fn from_metadata(m: &Metadata) -> Result<Self, MetadataError> {
        match required(m, keys::ORDER_TYPE)? {
            REGULAR => {
                let items: Vec<LineItem> = json(m, keys::ITEMS)?;
                let affiliate = match m.get(keys::AFFILIATE_CODE) {
                    None => None,
                    Some(code) => Some(AffiliateDiscount {
                        code_id: required(m, keys::AFFILIATE_CODE_ID)?.to_string(),
                        code: code.clone(),
                        percent: percentage(m, keys::DISCOUNT_PERCENTAGE)?,
                        subtotal: items.iter().map(|i| i.total).sum(),
                        amount: money(m, keys::AFFILIATE_DISCOUNT)?,
                    }),
                };
                Ok(Self::Regular(RegularCheckoutContext {
                    cart_session: required(m, keys::CART_SESSION)?.to_string(),
                    customer: customer(m)?,
                    channel: parsed(m, keys::CHANNEL)?,
                    items,
                    shipping_address: json(m, keys::SHIPPING_ADDRESS)?,
                    tax: money(m, keys::TAX)?,
                    shipping: money(m, keys::SHIPPING)?,
                    affiliate,
                }))
            }
            PREORDER => Ok(Self::Preorder(PreorderCheckoutContext {
                cart_session: required(m, keys::CART_SESSION)?.to_string(),
                customer: customer(m)?,
                preorder_id: parsed(m, keys::PREORDER_ID)?,
                campaign_id: CampaignId::new(required(m, keys::CAMPAIGN_ID)?),
                campaign_name: required(m, keys::CAMPAIGN_NAME)?.to_string(),
                discount_percentage: percentage(m, keys::DISCOUNT_PERCENTAGE)?,
                preorder_date: parsed(m, keys::PREORDER_DATE)?,
                estimated_delivery: required(m, keys::ESTIMATED_DELIVERY)?.to_string(),
            })),
            other => Err(MetadataError::Invalid { key: keys::ORDER_TYPE, reason: format!("unknown order type {other}") }),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Why a paid session could not be turned into a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnreadableMetadata,
    /// Stock ran out between checkout start and payment.
    OutOfStock,
    /// The preorder was cancelled or refunded before the payment arrived.
    PaymentClosed,
    /// Storage or lookup failures; completing the session again may succeed.
    Other,
}

impl IssueKind {
    fn of(e: &CheckoutError) -> Self {
        match e {
            CheckoutError::Metadata(_) => Self::UnreadableMetadata,
            CheckoutError::Inventory(InventoryError::InsufficientStock { .. }) => Self::OutOfStock,
            CheckoutError::Preorder(PreorderError::PaymentClosed(_)) => Self::PaymentClosed,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnreadableMetadata => "unreadable_metadata",
            Self::OutOfStock => "out_of_stock",
            Self::PaymentClosed => "payment_closed",
            Self::Other => "other",
        }
    }

    /// No retry can produce a record for this payment, so the charge has to be returned.
    pub fn refund_required(self) -> bool { matches!(self, Self::OutOfStock | Self::PaymentClosed) }
}

/// A paid session that could not be turned into an order. Needs manual follow-up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationIssue {
    pub session_id: String,
    pub order_type: Option<String>,
    pub kind: IssueKind,
    pub reason: String,
    pub metadata: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct PreorderCheckout {
    pub preorder_id: PreorderId,
    pub session: CheckoutSession,
}

#[derive(Clone, Debug)]
pub enum CheckoutOutcome {
    Regular(Order),
    Preorder(Preorder),
    /// The provider has not confirmed payment; nothing was changed.
    NotPaid { session_id: String },
}

pub struct CheckoutService {
    carts: Arc<dyn KeyValueStore>,
    discounts: Arc<DiscountEngine>,
    inventory: Arc<dyn InventoryStore>,
    orders: Arc<dyn OrderRepository>,
    preorders: Arc<dyn PreorderRepository>,
    payments: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventPublisher>,
    journal: Arc<dyn ReconciliationJournal>,
    config: CheckoutConfig,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        carts: Arc<dyn KeyValueStore>, discounts: Arc<DiscountEngine>, inventory: Arc<dyn InventoryStore>,
        orders: Arc<dyn OrderRepository>, preorders: Arc<dyn PreorderRepository>, payments: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventPublisher>, journal: Arc<dyn ReconciliationJournal>, config: CheckoutConfig,
    ) -> Self {
        Self { carts, discounts, inventory, orders, preorders, payments, events, journal, config }
    }

    pub fn config(&self) -> &CheckoutConfig { &self.config }

    /// Freezes the regular cart and opens a payment session. No order exists until payment succeeds.
    pub async fn start_regular_checkout(
        &self, cart_session: &str, customer: Customer, shipping_address: Address, affiliate_code: Option<&str>,
    ) -> Result<CheckoutSession, CheckoutError> {
        let session = CartSession::load(self.carts.clone(), cart_session)?;
        let cart = session.regular();
        if cart.is_empty() {
            return Err(CartError::Empty(CartKind::Regular).into());
        }
        let channel = customer.channel();
        if let Some(line) = cart.items().iter().find(|l| l.channel != channel) {
            return Err(CheckoutError::ChannelMismatch { product_id: line.product_id.clone(), expected: channel });
        }
        if let Some(line) = cart.items().iter().find(|l| !l.unit_price.is_positive()) {
            return Err(PricingError::Unavailable { product_id: line.product_id.clone(), channel }.into());
        }

        let affiliate = match affiliate_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.discounts.apply_affiliate_code(code, cart).await?),
            None => None,
        };

        let items: Vec<LineItem> = cart.items().iter()
            .map(|l| LineItem::new(l.product_id.clone(), l.variant_id.clone(), l.name.clone(), l.quantity, l.unit_price))
            .collect();
        for (variant_id, qty) in reservations(&items) {
            let available = self.inventory.get_available(&variant_id, channel).await?;
            if available < qty {
                return Err(InventoryError::InsufficientStock { variant_id, channel, available, requested: qty }.into());
            }
        }

        let taxable = cart.subtotal().saturating_sub(affiliate.as_ref().map(|a| a.amount).unwrap_or(Money::ZERO));
        let ctx = RegularCheckoutContext {
            cart_session: cart_session.to_string(),
            customer,
            channel,
            items,
            shipping_address,
            tax: self.config.tax_rate.portion_of(taxable),
            shipping: self.config.flat_shipping,
            affiliate,
        };
        let request = CheckoutRequest::for_regular(&ctx, &self.config)?;
        let checkout = self.payments.create_session(&request).await?;
        tracing::info!(session_id = %checkout.session_id, cart_session, amount = %request.amount_total(), "regular checkout started");
        Ok(checkout)
    }

    /// Creates the pending draft preorder first, then opens a payment session for it.
    pub async fn start_preorder_checkout(
        &self, cart_session: &str, customer: Customer, shipping_address: Address,
    ) -> Result<PreorderCheckout, CheckoutError> {
        let session = CartSession::load(self.carts.clone(), cart_session)?;
        let cart = session.preorder();
        if cart.is_empty() {
            return Err(CartError::Empty(CartKind::Preorder).into());
        }
        let campaign_id = cart.campaign_id().ok_or(DiscountError::CampaignInactive)?;
        let Some(campaign) = self.discounts.running_campaign(campaign_id).await? else {
            tracing::info!(cart_session, %campaign_id, "preorder cart belongs to a campaign that is no longer running");
            return Err(DiscountError::CampaignInactive.into());
        };

        let mut preorder = Preorder::draft(DraftPreorder {
            customer: customer.clone(),
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            items: cart.items().iter().map(PreorderItem::from).collect(),
            preorder_date: campaign.preorder_date,
            estimated_delivery: campaign.expected_delivery.clone(),
            shipping_address,
        }, Utc::now())?;
        self.preorders.insert(&preorder).await?;

        let ctx = PreorderCheckoutContext {
            cart_session: cart_session.to_string(),
            customer,
            preorder_id: preorder.id(),
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            discount_percentage: campaign.discount_percentage,
            preorder_date: campaign.preorder_date,
            estimated_delivery: campaign.expected_delivery.clone(),
        };
        let request = CheckoutRequest::for_preorder(&preorder, &ctx, &self.config)?;
        let checkout = self.payments.create_session(&request).await?;
        preorder.attach_checkout_session(&checkout.session_id);
        self.preorders.update(&mut preorder).await?;
        tracing::info!(preorder_id = %preorder.id(), session_id = %checkout.session_id, "preorder checkout started");
        Ok(PreorderCheckout { preorder_id: preorder.id(), session: checkout })
    }

    /// Success callback / webhook entry point. Safe to call more than once per session.
    pub async fn complete_checkout(&self, session_id: &str) -> Result<CheckoutOutcome, CheckoutError> {
        let payment = self.payments.retrieve_session(session_id).await?;
        if payment.state != PaymentState::Paid {
            tracing::info!(session_id, state = ?payment.state, "checkout session not paid; leaving records untouched");
            return Ok(CheckoutOutcome::NotPaid { session_id: session_id.to_string() });
        }
        let context = match CheckoutContext::from_metadata(&payment.metadata) {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.reconciliation_failure(&payment, None, IssueKind::UnreadableMetadata, e.to_string()).await),
        };
        let order_type = context.order_type();
        let result = match context {
            CheckoutContext::Preorder(ctx) => self.reconcile_preorder(session_id, ctx).await.map(CheckoutOutcome::Preorder),
            CheckoutContext::Regular(ctx) => self.reconcile_regular(session_id, ctx).await.map(CheckoutOutcome::Regular),
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.reconciliation_failure(&payment, Some(order_type), IssueKind::of(&e), e.to_string()).await),
        }
    }

    /// Operator override: records a preorder as paid without a provider confirmation.
    pub async fn confirm_preorder_payment(&self, preorder_id: PreorderId, note: &str) -> Result<Preorder, CheckoutError> {
        let (preorder, changed) = self.settle_preorder(preorder_id, None).await?;
        if changed {
            tracing::info!(%preorder_id, note, "preorder payment confirmed manually");
            self.publish(DomainEvent::PreorderPaid { preorder_id, checkout_session_id: None }).await;
        }
        Ok(preorder)
    }

    async fn reconcile_preorder(&self, session_id: &str, ctx: PreorderCheckoutContext) -> Result<Preorder, CheckoutError> {
        let (preorder, changed) = self.settle_preorder(ctx.preorder_id, Some(session_id)).await?;
        if changed {
            tracing::info!(preorder_id = %preorder.id(), session_id, "preorder paid");
            self.publish(DomainEvent::PreorderPaid { preorder_id: preorder.id(), checkout_session_id: Some(session_id.to_string()) }).await;
        }
        self.clear_cart(&ctx.cart_session, CartKind::Preorder);
        Ok(preorder)
    }

    /// Marks the preorder paid on top of whatever else was written to it meanwhile.
    /// The flag is `false` when it was already paid.
    async fn settle_preorder(&self, id: PreorderId, session_id: Option<&str>) -> Result<(Preorder, bool), CheckoutError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut preorder = self.preorders.find(id).await?.ok_or_else(|| CheckoutError::NotFound(format!("preorder {id}")))?;
            if !preorder.mark_paid(Utc::now())? {
                return Ok((preorder, false));
            }
            if let Some(session_id) = session_id.filter(|_| preorder.checkout_session_id().is_none()) {
                preorder.attach_checkout_session(session_id);
            }
            match self.preorders.update(&mut preorder).await {
                Ok(()) => return Ok((preorder, true)),
                Err(StorageError::Stale(reason)) if attempt < WRITE_ATTEMPTS => {
                    tracing::debug!(preorder_id = %id, attempt, %reason, "preorder changed underneath; reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn reconcile_regular(&self, session_id: &str, ctx: RegularCheckoutContext) -> Result<Order, CheckoutError> {
        if let Some(existing) = self.orders.find_by_checkout_session(session_id).await? {
            tracing::debug!(order_id = %existing.id(), session_id, "session already reconciled");
            return Ok(existing);
        }
        let mut order = Order::place(NewOrder {
            customer: ctx.customer.clone(),
            brand_id: None,
            channel: ctx.channel,
            items: ctx.items.clone(),
            tax: ctx.tax,
            shipping: ctx.shipping,
            discount: ctx.affiliate.as_ref().map(|a| a.amount),
            shipping_address: ctx.shipping_address.clone(),
            affiliate_code: ctx.affiliate.as_ref().map(|a| a.code.clone()),
            checkout_session_id: Some(session_id.to_string()),
        }, Utc::now())?;

        let wanted = reservations(order.items());
        let mut held: Vec<(VariantId, u32)> = Vec::with_capacity(wanted.len());
        for (variant_id, qty) in wanted {
            if let Err(e) = self.inventory.reserve_stock(&variant_id, ctx.channel, qty).await {
                self.release_all(&held, ctx.channel).await;
                return Err(e.into());
            }
            held.push((variant_id, qty));
        }
        order.mark_stock_reserved(!held.is_empty());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.orders.insert(&order).await {
                Ok(()) => break,
                Err(StorageError::Conflict(key)) if key == unique::ORDER_NUMBER && attempt < WRITE_ATTEMPTS => {
                    tracing::warn!(order_number = order.order_number(), session_id, "order number taken; drawing another");
                    order.renumber();
                }
                Err(e) => {
                    self.release_all(&held, ctx.channel).await;
                    // A concurrent callback for the same session got there first.
                    if matches!(&e, StorageError::Conflict(key) if key == unique::CHECKOUT_SESSION) {
                        if let Some(existing) = self.orders.find_by_checkout_session(session_id).await? {
                            return Ok(existing);
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        tracing::info!(order_id = %order.id(), order_number = order.order_number(), session_id, "order placed from paid checkout");

        if let Some(affiliate) = &ctx.affiliate {
            if let Err(e) = self.discounts.redeem(affiliate).await {
                tracing::warn!(code = %affiliate.code, error = %e, "affiliate redemption not counted");
            }
        }
        self.publish(DomainEvent::OrderPlaced {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            total: order.total_amount().total,
        }).await;
        if let Some(entry) = order.timeline().last() {
            self.publish(DomainEvent::StatusChanged(StatusChanged {
                kind: RecordKind::Order,
                order_id: order.id().to_string(),
                status: entry.status.as_str().to_string(),
                description: entry.description.clone(),
                timestamp: entry.timestamp,
            })).await;
        }
        self.clear_cart(&ctx.cart_session, CartKind::Regular);
        Ok(order)
    }

    async fn release_all(&self, held: &[(VariantId, u32)], channel: Channel) {
        for (variant_id, qty) in held {
            if let Err(e) = self.inventory.release_stock(variant_id, channel, *qty).await {
                tracing::error!(%variant_id, %channel, qty, error = %e, "failed to release reservation");
            }
        }
    }

    fn clear_cart(&self, cart_session: &str, kind: CartKind) {
        let cleared = CartSession::load(self.carts.clone(), cart_session).and_then(|mut s| s.clear(kind));
        if let Err(e) = cleared {
            tracing::warn!(cart_session, %kind, error = %e, "could not clear cart after checkout");
        }
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(&event).await {
            tracing::warn!(event = event.name(), error = %e, "event publish failed");
        }
    }

    async fn reconciliation_failure(
        &self, payment: &PaymentSession, order_type: Option<&str>, kind: IssueKind, reason: String,
    ) -> CheckoutError {
        tracing::error!(
            session_id = %payment.session_id, order_type, kind = kind.as_str(), amount = %payment.amount_total, %reason,
            "paid checkout could not be reconciled"
        );
        let issue = ReconciliationIssue {
            session_id: payment.session_id.clone(),
            order_type: order_type.map(str::to_string),
            kind,
            reason: reason.clone(),
            metadata: payment.metadata.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.journal.record(&issue).await {
            tracing::error!(session_id = %payment.session_id, error = %e, "reconciliation journal unavailable");
        }
        if kind.refund_required() {
            self.publish(DomainEvent::RefundRequired {
                session_id: payment.session_id.clone(),
                amount: payment.amount_total,
                reason: reason.clone(),
            }).await;
        }
        CheckoutError::ReconciliationFailure { session_id: payment.session_id.clone(), reason }
    }
}

/// Units per variant. Lines without a variant (legacy products) are not stock-tracked.
pub(crate) fn reservations(items: &[LineItem]) -> Vec<(VariantId, u32)> {
    let mut totals: HashMap<&VariantId, u32> = HashMap::new();
    let mut order: Vec<&VariantId> = vec![];
    for item in items {
        if let Some(v) = &item.variant_id {
            let entry = totals.entry(v).or_insert_with(|| { order.push(v); 0 });
            *entry += item.quantity;
        }
    }
    order.into_iter().map(|v| (v.clone(), totals[v])).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Discount(#[from] DiscountError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Preorder(#[from] PreorderError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("product {product_id} was priced for another channel than {expected}")]
    ChannelMismatch { product_id: ProductId, expected: Channel },
    #[error("payment for session {session_id} succeeded but the order could not be recorded: {reason}")]
    ReconciliationFailure { session_id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn consumer() -> Customer {
        Customer { id: CustomerId::new("u-1"), email: "mina@example.com".into(), name: Some("Mina".into()), kind: BuyerKind::Consumer }
    }

    fn regular_ctx() -> RegularCheckoutContext {
        RegularCheckoutContext {
            cart_session: "sess-1".into(),
            customer: consumer(),
            channel: Channel::B2c,
            items: vec![
                LineItem::new(ProductId::new("p1"), Some(VariantId::new("v1")), "Toner", 2, Money::new(dec!(40))),
                LineItem::new(ProductId::new("p2"), None, "Sheet Mask", 5, Money::new(dec!(10))),
            ],
            shipping_address: Address { name: "Mina".into(), city: "Seoul".into(), country: "KR".into(), ..Default::default() },
            tax: Money::new(dec!(11.70)),
            shipping: Money::new(dec!(4)),
            affiliate: Some(AffiliateDiscount {
                code_id: "aff-1".into(), code: "DEMO10".into(), percent: Percentage::from_whole(10).unwrap(),
                subtotal: Money::new(dec!(130)), amount: Money::new(dec!(13)),
            }),
        }
    }

    #[test]
    fn test_regular_context_survives_metadata() {
        let ctx = CheckoutContext::Regular(regular_ctx());
        let m = ctx.to_metadata().unwrap();
        assert_eq!(m[keys::ORDER_TYPE], "regular");
        assert_eq!(m[keys::AFFILIATE_CODE], "DEMO10");
        assert!(m.values().all(|v| !v.is_empty()));
        assert_eq!(CheckoutContext::from_metadata(&m).unwrap(), ctx);
    }

    #[test]
    fn test_preorder_context_survives_metadata() {
        let ctx = CheckoutContext::Preorder(PreorderCheckoutContext {
            cart_session: "sess-2".into(),
            customer: consumer(),
            preorder_id: PreorderId::generate(),
            campaign_id: CampaignId::new("spring"),
            campaign_name: "Spring Glow".into(),
            discount_percentage: Percentage::from_whole(15).unwrap(),
            preorder_date: "2026-11-01T00:00:00Z".parse().unwrap(),
            estimated_delivery: "2-3 weeks".into(),
        });
        let m = ctx.to_metadata().unwrap();
        assert_eq!(m[keys::DISCOUNT_PERCENTAGE], "15");
        assert!(!m.contains_key(keys::AFFILIATE_CODE));
        assert_eq!(CheckoutContext::from_metadata(&m).unwrap(), ctx);
    }

    #[test]
    fn test_bad_metadata_reported_by_key() {
        let mut m = CheckoutContext::Regular(regular_ctx()).to_metadata().unwrap();
        m.remove(keys::ITEMS);
        assert!(matches!(CheckoutContext::from_metadata(&m), Err(MetadataError::Missing("items"))));

        let mut m = CheckoutContext::Regular(regular_ctx()).to_metadata().unwrap();
        m.insert(keys::DISCOUNT_PERCENTAGE.into(), "140".into());
        assert!(matches!(CheckoutContext::from_metadata(&m), Err(MetadataError::Invalid { key: "discountPercentage", .. })));

        let mut m = Metadata::new();
        m.insert(keys::ORDER_TYPE.into(), "gift".into());
        assert!(matches!(CheckoutContext::from_metadata(&m), Err(MetadataError::Invalid { key: "orderType", .. })));
    }

    #[test]
    fn test_regular_request_charges_discounted_total() {
        let request = CheckoutRequest::for_regular(&regular_ctx(), &CheckoutConfig::default()).unwrap();
        assert_eq!(request.line_items.len(), 4);
        assert_eq!(request.discount, Some(Money::new(dec!(13))));
        // 130 - 13 + 11.70 + 4
        assert_eq!(request.amount_total(), Money::new(dec!(132.70)));
    }

    #[test]
    fn test_reservations_merge_same_variant() {
        let items = vec![
            LineItem::new(ProductId::new("p1"), Some(VariantId::new("v1")), "a", 2, Money::new(dec!(1))),
            LineItem::new(ProductId::new("p1"), Some(VariantId::new("v1")), "a", 3, Money::new(dec!(1))),
            LineItem::new(ProductId::new("p2"), None, "b", 1, Money::new(dec!(1))),
        ];
        assert_eq!(reservations(&items), vec![(VariantId::new("v1"), 5)]);
    }
}
