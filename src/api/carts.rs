//! Cart endpoints. Cart state is keyed by an opaque session string chosen by the client.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::dto::*;
use crate::api::AppState;
use crate::domain::aggregates::cart::{CartKind, RegularLine};
use crate::domain::aggregates::cart_session::CartSession;
use crate::domain::aggregates::product::Product;
use crate::domain::services::pricing::{purchasable_price, resolve, PriceQuery};
use crate::domain::value_objects::{Channel, LineId, ProductId, VariantId};
use crate::{MarketplaceError, Result};

async fn load_product(s: &AppState, id: &ProductId) -> Result<Product> {
    s.backends.catalog.find_product(id).await?.ok_or_else(|| MarketplaceError::NotFound(format!("product {id}")))
}

fn session(s: &AppState, key: &str) -> Result<CartSession> {
    Ok(CartSession::load(s.backends.carts.clone(), key)?)
}

pub async fn get_price(
    State(s): State<AppState>, Path(product_id): Path<String>, Query(p): Query<PriceParams>,
) -> Result<Json<PriceResponse>> {
    let product = load_product(&s, &ProductId::new(product_id)).await?;
    let channel = p.channel.unwrap_or(Channel::B2c);
    let variant_id = p.variant_id.map(VariantId::new);
    let price = resolve(&PriceQuery::for_variant(&product, variant_id.as_ref(), channel));
    Ok(Json(PriceResponse { product_id: product.id.clone(), channel, price, purchasable: price.is_positive() && product.is_purchasable() }))
}

pub async fn get_carts(State(s): State<AppState>, Path(key): Path<String>) -> Result<Json<CartsResponse>> {
    Ok(Json(CartsResponse::from(&session(&s, &key)?)))
}

pub async fn add_regular(
    State(s): State<AppState>, Path(key): Path<String>, Json(r): Json<AddRegularItemRequest>,
) -> Result<(StatusCode, Json<CartsResponse>)> {
    r.validate()?;
    let product = load_product(&s, &ProductId::new(r.product_id)).await?;
    if !product.is_purchasable() {
        return Err(MarketplaceError::InvalidRequest(format!("product {} is not for sale", product.id)));
    }
    let variant_id = r.variant_id.map(VariantId::new);
    if let Some(v) = &variant_id {
        if product.variant(v).is_none() {
            return Err(MarketplaceError::NotFound(format!("variant {v} of product {}", product.id)));
        }
    }
    let channel = r.channel.unwrap_or(Channel::B2c);
    let query = PriceQuery::for_variant(&product, variant_id.as_ref(), channel);
    let unit_price = purchasable_price(&query)?;
    let name = match query.variant {
        Some(v) if product.variants.len() > 1 && !v.name.is_empty() => format!("{} - {}", product.name, v.name),
        _ => product.name.clone(),
    };
    let line = RegularLine::new(
        product.id.clone(), query.variant.map(|v| v.id.clone()), name, r.options, channel, r.quantity, unit_price,
    );

    let mut cart = session(&s, &key)?;
    cart.add_regular(line)?;
    Ok((StatusCode::CREATED, Json(CartsResponse::from(&cart))))
}

pub async fn update_regular(
    State(s): State<AppState>, Path((key, line_id)): Path<(String, String)>, Json(r): Json<UpdateQuantityRequest>,
) -> Result<Json<CartsResponse>> {
    let mut cart = session(&s, &key)?;
    cart.update_regular(&LineId::new(line_id), r.quantity)?;
    Ok(Json(CartsResponse::from(&cart)))
}

pub async fn remove_regular(
    State(s): State<AppState>, Path((key, line_id)): Path<(String, String)>,
) -> Result<Json<CartsResponse>> {
    let mut cart = session(&s, &key)?;
    cart.remove_regular(&LineId::new(line_id))?;
    Ok(Json(CartsResponse::from(&cart)))
}

pub async fn clear_regular(State(s): State<AppState>, Path(key): Path<String>) -> Result<StatusCode> {
    session(&s, &key)?.clear(CartKind::Regular)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Quotes the running campaign and freezes the quote into the line.
pub async fn add_preorder(
    State(s): State<AppState>, Path(key): Path<String>, Json(r): Json<AddPreorderItemRequest>,
) -> Result<(StatusCode, Json<CartsResponse>)> {
    r.validate()?;
    let product = load_product(&s, &ProductId::new(r.product_id)).await?;
    let quote = s.discounts.preorder_quote(&product).await?;
    let mut cart = session(&s, &key)?;
    cart.add_preorder(quote.into_line(r.quantity))?;
    Ok((StatusCode::CREATED, Json(CartsResponse::from(&cart))))
}

pub async fn update_preorder(
    State(s): State<AppState>, Path((key, product_id)): Path<(String, String)>, Json(r): Json<UpdateQuantityRequest>,
) -> Result<Json<CartsResponse>> {
    let mut cart = session(&s, &key)?;
    cart.update_preorder(&ProductId::new(product_id), r.quantity)?;
    Ok(Json(CartsResponse::from(&cart)))
}

pub async fn remove_preorder(
    State(s): State<AppState>, Path((key, product_id)): Path<(String, String)>,
) -> Result<Json<CartsResponse>> {
    let mut cart = session(&s, &key)?;
    cart.remove_preorder(&ProductId::new(product_id))?;
    Ok(Json(CartsResponse::from(&cart)))
}

pub async fn clear_preorder(State(s): State<AppState>, Path(key): Path<String>) -> Result<StatusCode> {
    session(&s, &key)?.clear(CartKind::Preorder)?;
    Ok(StatusCode::NO_CONTENT)
}
