//! Request and response bodies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::domain::aggregates::campaign::PreorderCampaign;
use crate::domain::aggregates::cart::{PreorderLine, RegularLine};
use crate::domain::aggregates::cart_session::CartSession;
use crate::domain::aggregates::lifecycle::LifecycleStatus;
use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::aggregates::preorder::{Preorder, PreorderStatus};
use crate::domain::services::checkout::CheckoutOutcome;
use crate::domain::services::permissions::Role;
use crate::domain::services::presentation::{status_label, status_tone, StatusTone};
use crate::domain::value_objects::{Address, BuyerKind, CampaignId, Channel, Customer, CustomerId, Money, PreorderId, ProductId};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddRegularItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Defaults to retail.
    #[serde(default)]
    pub channel: Option<Channel>,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddPreorderItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

/// Zero or negative removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: BuyerKind,
}

impl From<CustomerInput> for Customer {
    fn from(c: CustomerInput) -> Self {
        Customer { id: CustomerId::new(c.id), email: c.email, name: c.name, kind: c.kind }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub street1: String,
    #[serde(default)]
    pub street2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub zip: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<AddressInput> for Address {
    fn from(a: AddressInput) -> Self {
        Address {
            name: a.name,
            street1: a.street1,
            street2: a.street2,
            city: a.city,
            state: a.state,
            zip: a.zip,
            country: a.country.to_ascii_uppercase(),
            phone: a.phone,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartCheckoutRequest {
    #[validate(length(min = 1))]
    pub cart_session: String,
    #[validate]
    pub customer: CustomerInput,
    #[validate]
    pub shipping_address: AddressInput,
    /// Regular checkout only.
    #[serde(default)]
    pub affiliate_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteCheckoutRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
}

/// Query string of the provider's success redirect.
#[derive(Debug, Deserialize)]
pub struct CompleteCheckoutQuery {
    pub session_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateQuoteRequest {
    #[validate(length(min = 1))]
    pub cart_session: String,
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    #[validate(length(min = 1))]
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceParams {
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub variant_id: Option<String>,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub product_id: ProductId,
    pub channel: Channel,
    pub price: Money,
    pub purchasable: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegularCartView {
    pub items: Vec<RegularLine>,
    pub item_count: u32,
    pub line_count: usize,
    pub subtotal: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderCartView {
    pub items: Vec<PreorderLine>,
    pub campaign_id: Option<CampaignId>,
    pub item_count: u32,
    pub original_total: Money,
    pub subtotal: Money,
    pub savings: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartsResponse {
    pub session: String,
    pub regular: RegularCartView,
    pub preorder: PreorderCartView,
}

impl From<&CartSession> for CartsResponse {
    fn from(s: &CartSession) -> Self {
        let (regular, preorder) = (s.regular(), s.preorder());
        Self {
            session: s.session_key().to_string(),
            regular: RegularCartView {
                items: regular.items().to_vec(),
                item_count: regular.item_count(),
                line_count: regular.line_count(),
                subtotal: regular.subtotal(),
            },
            preorder: PreorderCartView {
                items: preorder.items().to_vec(),
                campaign_id: preorder.campaign_id().cloned(),
                item_count: preorder.item_count(),
                original_total: preorder.original_total(),
                subtotal: preorder.subtotal(),
                savings: preorder.savings(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveCampaignResponse {
    pub campaign: Option<PreorderCampaign>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStartedResponse {
    pub session_id: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preorder_id: Option<PreorderId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub status_label: &'static str,
    pub status_tone: StatusTone,
    pub next_statuses: Vec<OrderStatus>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let status = order.status();
        Self { status_label: status_label(status), status_tone: status_tone(status), next_statuses: status.next_statuses(), order }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreorderView {
    #[serde(flatten)]
    pub preorder: Preorder,
    pub status_label: &'static str,
    pub status_tone: StatusTone,
    pub payment_label: &'static str,
    pub next_statuses: Vec<PreorderStatus>,
}

impl From<Preorder> for PreorderView {
    fn from(preorder: Preorder) -> Self {
        let status = preorder.status();
        Self {
            status_label: status_label(status),
            status_tone: status_tone(status),
            payment_label: status_label(preorder.payment_status()),
            next_statuses: status.next_statuses(),
            preorder,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionResponse {
    Order { order: OrderView },
    Preorder { preorder: PreorderView },
    NotPaid {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl From<CheckoutOutcome> for CompletionResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome {
            CheckoutOutcome::Regular(order) => Self::Order { order: order.into() },
            CheckoutOutcome::Preorder(preorder) => Self::Preorder { preorder: preorder.into() },
            CheckoutOutcome::NotPaid { session_id } => Self::NotPaid { session_id },
        }
    }
}
