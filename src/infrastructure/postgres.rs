//! PostgreSQL adapters.
//!
//! Aggregates are stored as JSONB documents next to the few columns that queries
//! filter on. Stock reservation and affiliate redemption are single conditional
//! `UPDATE`s, so concurrent checkouts cannot oversell or over-redeem. Orders and
//! preorders carry a `version` column and are only overwritten at the version they
//! were read at.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::aggregates::affiliate::AffiliateCode;
use crate::domain::aggregates::campaign::PreorderCampaign;
use crate::domain::aggregates::inventory::{InventoryError, Shortfall};
use crate::domain::aggregates::lifecycle::LifecycleStatus;
use crate::domain::aggregates::order::Order;
use crate::domain::aggregates::preorder::Preorder;
use crate::domain::aggregates::product::Product;
use crate::domain::services::checkout::ReconciliationIssue;
use crate::domain::value_objects::{CampaignId, Channel, OrderId, PreorderId, ProductId, VariantId};
use crate::ports::*;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self { Self { db } }

    pub fn pool(&self) -> &PgPool { &self.db }
}

fn inventory_err(e: sqlx::Error) -> InventoryError { InventoryError::Storage(e.to_string()) }

#[async_trait]
impl ProductCatalog for PgStore {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StorageError> {
        let row: Option<(Json<Product>,)> = sqlx::query_as("SELECT doc FROM products WHERE id = $1")
            .bind(id.as_str()).fetch_optional(&self.db).await?;
        Ok(row.map(|(Json(p),)| p))
    }
}

#[async_trait]
impl CampaignRepository for PgStore {
    async fn fetch_active(&self) -> Result<Option<PreorderCampaign>, StorageError> {
        let row: Option<(Json<PreorderCampaign>,)> = sqlx::query_as(
            "SELECT doc FROM preorder_campaigns WHERE status = 'active' ORDER BY updated_at DESC LIMIT 1",
        ).fetch_optional(&self.db).await?;
        Ok(row.map(|(Json(c),)| c))
    }

    async fn find(&self, id: &CampaignId) -> Result<Option<PreorderCampaign>, StorageError> {
        let row: Option<(Json<PreorderCampaign>,)> = sqlx::query_as("SELECT doc FROM preorder_campaigns WHERE id = $1")
            .bind(id.as_str()).fetch_optional(&self.db).await?;
        Ok(row.map(|(Json(c),)| c))
    }
}

#[async_trait]
impl AffiliateCodeRepository for PgStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<AffiliateCode>, StorageError> {
        let row: Option<(Json<AffiliateCode>, i32)> = sqlx::query_as(
            "SELECT doc, usage_count FROM affiliate_codes WHERE LOWER(code) = LOWER($1)",
        ).bind(code.trim()).fetch_optional(&self.db).await?;
        // The column is authoritative for usage; the document may lag behind it.
        Ok(row.map(|(Json(mut c), used)| {
            c.usage_count = u32::try_from(used).unwrap_or(0);
            c
        }))
    }

    async fn redeem(&self, code_id: &str) -> Result<bool, StorageError> {
        let done = sqlx::query(
            "UPDATE affiliate_codes SET usage_count = usage_count + 1 \
             WHERE id = $1 AND (max_usage IS NULL OR usage_count < max_usage)",
        ).bind(code_id).execute(&self.db).await?;
        Ok(done.rows_affected() == 1)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn get_available(&self, variant_id: &VariantId, channel: Channel) -> Result<u32, InventoryError> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT GREATEST(stock - reserved, 0) FROM inventory WHERE variant_id = $1 AND channel = $2",
        ).bind(variant_id.as_str()).bind(channel.as_str()).fetch_optional(&self.db).await.map_err(inventory_err)?;
        row.map(|(n,)| u32::try_from(n).unwrap_or(0))
            .ok_or_else(|| InventoryError::UnknownVariant(variant_id.clone(), channel))
    }

    async fn reserve_stock(&self, variant_id: &VariantId, channel: Channel, qty: u32) -> Result<(), InventoryError> {
        if qty == 0 {
            let available = self.get_available(variant_id, channel).await?;
            return Err(InventoryError::shortfall(variant_id, channel, Shortfall { available, requested: 0 }));
        }
        let qty_i = i32::try_from(qty).map_err(|_| InventoryError::Storage(format!("quantity {qty} out of range")))?;
        let done = sqlx::query(
            "UPDATE inventory SET reserved = reserved + $3 \
             WHERE variant_id = $1 AND channel = $2 AND stock - reserved >= $3",
        ).bind(variant_id.as_str()).bind(channel.as_str()).bind(qty_i).execute(&self.db).await.map_err(inventory_err)?;
        if done.rows_affected() == 1 {
            return Ok(());
        }
        let available = self.get_available(variant_id, channel).await?;
        Err(InventoryError::shortfall(variant_id, channel, Shortfall { available, requested: qty }))
    }

    async fn release_stock(&self, variant_id: &VariantId, channel: Channel, qty: u32) -> Result<(), InventoryError> {
        let qty_i = i32::try_from(qty).map_err(|_| InventoryError::Storage(format!("quantity {qty} out of range")))?;
        let done = sqlx::query(
            "UPDATE inventory SET reserved = GREATEST(reserved - $3, 0) WHERE variant_id = $1 AND channel = $2",
        ).bind(variant_id.as_str()).bind(channel.as_str()).bind(qty_i).execute(&self.db).await.map_err(inventory_err)?;
        if done.rows_affected() == 0 {
            return Err(InventoryError::UnknownVariant(variant_id.clone(), channel));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, status, checkout_session_id, doc, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id().as_uuid()).bind(order.order_number()).bind(order.status().as_str())
        .bind(order.checkout_session_id()).bind(Json(order)).bind(i64::from(order.version()))
        .bind(order.created_at()).bind(order.updated_at())
        .execute(&self.db).await?;
        Ok(())
    }

    async fn update(&self, order: &mut Order) -> Result<(), StorageError> {
        let read_at = order.version();
        // The document must already carry the version it is stored under.
        order.set_version(read_at + 1);
        let done = sqlx::query(
            "UPDATE orders SET status = $2, doc = $3, updated_at = $4, version = $5 WHERE id = $1 AND version = $6",
        )
        .bind(order.id().as_uuid()).bind(order.status().as_str()).bind(Json(&*order)).bind(order.updated_at())
        .bind(i64::from(read_at + 1)).bind(i64::from(read_at))
        .execute(&self.db).await;
        match done {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => {
                order.set_version(read_at);
                Err(StorageError::Stale(format!("order {} at version {read_at}", order.id())))
            }
            Err(e) => {
                order.set_version(read_at);
                Err(e.into())
            }
        }
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StorageError> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders WHERE id = $1")
            .bind(id.as_uuid()).fetch_optional(&self.db).await?;
        Ok(row.map(|(Json(o),)| o))
    }

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, StorageError> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders WHERE checkout_session_id = $1")
            .bind(session_id).fetch_optional(&self.db).await?;
        Ok(row.map(|(Json(o),)| o))
    }
}

#[async_trait]
impl PreorderRepository for PgStore {
    async fn insert(&self, preorder: &Preorder) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO preorders (id, preorder_number, status, payment_status, checkout_session_id, doc, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
        )
        .bind(preorder.id().as_uuid()).bind(preorder.preorder_number()).bind(preorder.status().as_str())
        .bind(preorder.payment_status().as_str()).bind(preorder.checkout_session_id()).bind(Json(preorder))
        .bind(i64::from(preorder.version())).bind(preorder.created_at())
        .execute(&self.db).await?;
        Ok(())
    }

    async fn update(&self, preorder: &mut Preorder) -> Result<(), StorageError> {
        let read_at = preorder.version();
        preorder.set_version(read_at + 1);
        let done = sqlx::query(
            "UPDATE preorders SET status = $2, payment_status = $3, checkout_session_id = $4, doc = $5, \
             version = $6, updated_at = NOW() WHERE id = $1 AND version = $7",
        )
        .bind(preorder.id().as_uuid()).bind(preorder.status().as_str()).bind(preorder.payment_status().as_str())
        .bind(preorder.checkout_session_id()).bind(Json(&*preorder))
        .bind(i64::from(read_at + 1)).bind(i64::from(read_at))
        .execute(&self.db).await;
        match done {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => {
                preorder.set_version(read_at);
                Err(StorageError::Stale(format!("preorder {} at version {read_at}", preorder.id())))
            }
            Err(e) => {
                preorder.set_version(read_at);
                Err(e.into())
            }
        }
    }

    async fn find(&self, id: PreorderId) -> Result<Option<Preorder>, StorageError> {
        let row: Option<(Json<Preorder>,)> = sqlx::query_as("SELECT doc FROM preorders WHERE id = $1")
            .bind(id.as_uuid()).fetch_optional(&self.db).await?;
        Ok(row.map(|(Json(p),)| p))
    }
}

#[async_trait]
impl ReconciliationJournal for PgStore {
    async fn record(&self, issue: &ReconciliationIssue) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO reconciliation_issues (session_id, order_type, kind, reason, metadata, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&issue.session_id).bind(issue.order_type.as_deref()).bind(issue.kind.as_str()).bind(&issue.reason)
        .bind(Json(&issue.metadata)).bind(issue.recorded_at)
        .execute(&self.db).await?;
        Ok(())
    }
}
