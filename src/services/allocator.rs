//! Batch creation and per-storage quantity movements.
//!
//! Every movement locks the batch row before the batch-storage row and keeps
//! `product_batches.current_quantity` equal to the sum of its storage rows.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Alias, Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    Set,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    batch_storage::{self, Entity as BatchStorage},
    product_batch::{self, Entity as ProductBatch},
};
use crate::errors::ServiceError;
use crate::services::reference::ReferenceLookup;

/// Derives a batch SKU: `{product}-{supplier}{DDMMYY}`, upper-cased.
///
/// The product part is the first three alphanumerics of the product name,
/// the supplier part the initial of every word of the supplier name. Two
/// receipts of the same product from the same supplier on the same day
/// share a SKU; batches are told apart by id.
pub fn generate_sku(product_name: &str, supplier_name: &str, received_on: NaiveDate) -> String {
    let product: String = product_name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(3)
        .collect();
    let supplier: String = supplier_name
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .collect();

    format!("{}-{}{}", product, supplier, received_on.format("%d%m%y")).to_uppercase()
}

/// Batch and storage row as they stand after a movement.
#[derive(Debug, Clone)]
pub struct Movement {
    pub batch: product_batch::Model,
    pub slot: batch_storage::Model,
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub sku: String,
    pub product_id: Uuid,
    pub purchase_order_id: Uuid,
    pub purchase_order_detail_id: Uuid,
    pub initial_quantity: Decimal,
    pub price: Decimal,
}

/// Creates an empty batch; its quantity arrives through [`deposit`].
pub async fn create_batch(
    txn: &DatabaseTransaction,
    batch: NewBatch,
) -> Result<product_batch::Model, ServiceError> {
    let now = Utc::now();
    let model = product_batch::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(batch.sku),
        product_id: Set(batch.product_id),
        purchase_order_id: Set(batch.purchase_order_id),
        purchase_order_detail_id: Set(batch.purchase_order_detail_id),
        initial_quantity: Set(batch.initial_quantity),
        current_quantity: Set(Decimal::ZERO),
        price: Set(batch.price),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    debug!(batch_id = %model.id, sku = %model.sku, "Created product batch");
    Ok(model)
}

pub async fn lock_batch(
    txn: &DatabaseTransaction,
    batch_id: Uuid,
) -> Result<product_batch::Model, ServiceError> {
    ProductBatch::find_by_id(batch_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Batch", batch_id))
}

pub async fn lock_slot(
    txn: &DatabaseTransaction,
    batch_id: Uuid,
    storage_id: Uuid,
) -> Result<Option<batch_storage::Model>, ServiceError> {
    Ok(BatchStorage::find()
        .filter(batch_storage::Column::BatchId.eq(batch_id))
        .filter(batch_storage::Column::StorageId.eq(storage_id))
        .lock_exclusive()
        .one(txn)
        .await?)
}

/// Finds a batch-storage row by its own id, without locking it.
pub async fn find_slot(
    txn: &DatabaseTransaction,
    batch_storage_id: Uuid,
) -> Result<batch_storage::Model, ServiceError> {
    BatchStorage::find_by_id(batch_storage_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Batch storage", batch_storage_id))
}

/// Adds `quantity` of a batch to a storage, creating the row on first use.
pub async fn deposit(
    txn: &DatabaseTransaction,
    batch_id: Uuid,
    storage_id: Uuid,
    quantity: Decimal,
) -> Result<Movement, ServiceError> {
    ensure_positive(quantity)?;
    ReferenceLookup::storage_in(txn, storage_id).await?;
    let batch = lock_batch(txn, batch_id).await?;

    let now = Utc::now();
    let row = batch_storage::ActiveModel {
        id: Set(Uuid::new_v4()),
        batch_id: Set(batch_id),
        storage_id: Set(storage_id),
        quantity: Set(quantity),
        created_at: Set(now),
        updated_at: Set(now),
    };
    BatchStorage::insert(row)
        .on_conflict(
            OnConflict::columns([
                batch_storage::Column::BatchId,
                batch_storage::Column::StorageId,
            ])
            .value(
                batch_storage::Column::Quantity,
                Expr::col((BatchStorage, batch_storage::Column::Quantity)).add(Expr::col((
                    Alias::new("excluded"),
                    batch_storage::Column::Quantity,
                ))),
            )
            .update_column(batch_storage::Column::UpdatedAt)
            .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;

    let slot = lock_slot(txn, batch_id, storage_id).await?.ok_or_else(|| {
        ServiceError::InternalError(format!(
            "batch storage {}/{} missing after upsert",
            batch_id, storage_id
        ))
    })?;
    let batch = set_batch_quantity(txn, batch, quantity).await?;

    Ok(Movement { batch, slot })
}

/// Takes `quantity` of a batch out of a storage.
pub async fn withdraw(
    txn: &DatabaseTransaction,
    batch_id: Uuid,
    storage_id: Uuid,
    quantity: Decimal,
) -> Result<Movement, ServiceError> {
    ensure_positive(quantity)?;
    let batch = lock_batch(txn, batch_id).await?;
    let slot = lock_slot(txn, batch_id, storage_id).await?.ok_or_else(|| {
        ServiceError::InsufficientStock(format!(
            "batch {} holds nothing in storage {}",
            batch.sku, storage_id
        ))
    })?;

    if slot.quantity < quantity || batch.current_quantity < quantity {
        return Err(ServiceError::InsufficientStock(format!(
            "batch {} has {} in storage {}, {} requested",
            batch.sku, slot.quantity, storage_id, quantity
        )));
    }

    let remaining = slot.quantity - quantity;
    let mut active: batch_storage::ActiveModel = slot.into();
    active.quantity = Set(remaining);
    active.updated_at = Set(Utc::now());
    let slot = active.update(txn).await?;

    let batch = set_batch_quantity(txn, batch, -quantity).await?;
    Ok(Movement { batch, slot })
}

/// Moves quantity between two storages of one batch; the batch total is unchanged.
pub async fn transfer(
    txn: &DatabaseTransaction,
    batch_id: Uuid,
    from_storage_id: Uuid,
    to_storage_id: Uuid,
    quantity: Decimal,
) -> Result<(Movement, Movement), ServiceError> {
    if from_storage_id == to_storage_id {
        return Err(ServiceError::ValidationError(
            "source and target storage must differ".to_string(),
        ));
    }
    let taken = withdraw(txn, batch_id, from_storage_id, quantity).await?;
    let placed = deposit(txn, batch_id, to_storage_id, quantity).await?;
    Ok((taken, placed))
}

async fn set_batch_quantity(
    txn: &DatabaseTransaction,
    batch: product_batch::Model,
    delta: Decimal,
) -> Result<product_batch::Model, ServiceError> {
    let next = batch.current_quantity + delta;
    if next < Decimal::ZERO {
        return Err(ServiceError::InsufficientStock(format!(
            "batch {} would drop to {}",
            batch.sku, next
        )));
    }
    let mut active: product_batch::ActiveModel = batch.into();
    active.current_quantity = Set(next);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

fn ensure_positive(quantity: Decimal) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}
