use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::commands::stock::TransferStockCommand;
use crate::db::{self, DbPool};
use crate::entities::{
    batch_storage::{self, Entity as BatchStorage},
    inventory_log::{self, InventoryAction},
    product_batch::{self, Entity as ProductBatch},
};
use crate::errors::ServiceError;
use crate::services::allocator;
use crate::services::inventory_ledger::{InventoryEntry, InventoryLedger};
use crate::services::reference::ReferenceLookup;

/// A batch together with every storage row it occupies.
#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    pub batch: product_batch::Model,
    pub storages: Vec<batch_storage::Model>,
}

/// One batch held in a storage.
#[derive(Debug, Clone, Serialize)]
pub struct StorageHolding {
    pub slot: batch_storage::Model,
    pub batch: product_batch::Model,
}

/// Result of comparing a batch's running total with its storage rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchBalance {
    pub batch_id: Uuid,
    pub sku: String,
    pub current_quantity: Decimal,
    pub stored_quantity: Decimal,
    pub consistent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub batch: product_batch::Model,
    pub from: batch_storage::Model,
    pub to: batch_storage::Model,
    pub entry: inventory_log::Model,
}

/// Batch and storage reads plus stock transfers between storages.
#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DbPool>,
}

impl StockService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get_batch(&self, batch_id: Uuid) -> Result<BatchView, ServiceError> {
        let db = self.db_pool.as_ref();
        let batch = ProductBatch::find_by_id(batch_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Batch", batch_id))?;
        let mut views = attach_storages_in(db, vec![batch]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError(format!("batch {} lost its view", batch_id)))
    }

    #[instrument(skip(self))]
    pub async fn batches_for_product(&self, product_id: Uuid) -> Result<Vec<BatchView>, ServiceError> {
        let db = self.db_pool.as_ref();
        ReferenceLookup::product_in(db, product_id).await?;
        let batches = ProductBatch::find()
            .filter(product_batch::Column::ProductId.eq(product_id))
            .order_by_asc(product_batch::Column::CreatedAt)
            .all(db)
            .await?;
        attach_storages_in(db, batches).await
    }

    /// Batches with a positive quantity in one storage.
    #[instrument(skip(self))]
    pub async fn storage_contents(&self, storage_id: Uuid) -> Result<Vec<StorageHolding>, ServiceError> {
        let db = self.db_pool.as_ref();
        ReferenceLookup::storage_in(db, storage_id).await?;
        let rows = BatchStorage::find()
            .filter(batch_storage::Column::StorageId.eq(storage_id))
            .filter(batch_storage::Column::Quantity.gt(Decimal::ZERO))
            .order_by_asc(batch_storage::Column::CreatedAt)
            .find_also_related(ProductBatch)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(slot, batch)| batch.map(|batch| StorageHolding { slot, batch }))
            .collect())
    }

    /// Compares `current_quantity` with the sum of the batch's storage rows.
    #[instrument(skip(self))]
    pub async fn verify_batch(&self, batch_id: Uuid) -> Result<BatchBalance, ServiceError> {
        let view = self.get_batch(batch_id).await?;
        let stored: Decimal = view.storages.iter().map(|s| s.quantity).sum();
        let balance = BatchBalance {
            batch_id,
            sku: view.batch.sku.clone(),
            current_quantity: view.batch.current_quantity,
            stored_quantity: stored,
            consistent: view.batch.current_quantity == stored,
        };
        if !balance.consistent {
            warn!(
                batch_id = %batch_id,
                current = %balance.current_quantity,
                stored = %balance.stored_quantity,
                "Batch quantity does not match its storages"
            );
        }
        Ok(balance)
    }

    #[instrument(skip(self, command), fields(batch_id = %command.batch_id))]
    pub async fn transfer_stock(
        &self,
        actor_id: Uuid,
        command: TransferStockCommand,
    ) -> Result<TransferOutcome, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::transfer_stock_in(&txn, actor_id, command).await;
        let outcome = db::finish(txn, "stock.transfer", started, outcome).await?;

        counter!("trade_ledger.stock.transfers", 1);
        info!(
            batch_id = %outcome.batch.id,
            from = %outcome.from.storage_id,
            to = %outcome.to.storage_id,
            "Stock transferred"
        );
        Ok(outcome)
    }

    async fn transfer_stock_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        command: TransferStockCommand,
    ) -> Result<TransferOutcome, ServiceError> {
        ReferenceLookup::storage_in(txn, command.from_storage_id).await?;
        let (taken, placed) = allocator::transfer(
            txn,
            command.batch_id,
            command.from_storage_id,
            command.to_storage_id,
            command.quantity,
        )
        .await?;

        let mut entry = InventoryEntry::new(
            InventoryAction::Transfer,
            command.batch_id,
            command.from_storage_id,
            command.quantity,
        )
        .to_storage(command.to_storage_id);
        if let Some(description) = command.description {
            entry = entry.describe(description);
        }
        let entry = InventoryLedger::record_in(txn, actor_id, entry).await?;

        Ok(TransferOutcome {
            batch: placed.batch,
            from: taken.slot,
            to: placed.slot,
            entry,
        })
    }
}

/// Loads the storage rows of `batches` in one query, keeping batch order.
pub async fn attach_storages_in<C: ConnectionTrait>(
    conn: &C,
    batches: Vec<product_batch::Model>,
) -> Result<Vec<BatchView>, ServiceError> {
    if batches.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = batches.iter().map(|b| b.id).collect();
    let rows = BatchStorage::find()
        .filter(batch_storage::Column::BatchId.is_in(ids))
        .order_by_asc(batch_storage::Column::CreatedAt)
        .all(conn)
        .await?;

    let mut by_batch: HashMap<Uuid, Vec<batch_storage::Model>> = HashMap::new();
    for row in rows {
        by_batch.entry(row.batch_id).or_default().push(row);
    }

    Ok(batches
        .into_iter()
        .map(|batch| {
            let storages = by_batch.remove(&batch.id).unwrap_or_default();
            BatchView { batch, storages }
        })
        .collect())
}
