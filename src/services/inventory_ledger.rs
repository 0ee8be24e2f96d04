use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::inventory_log::{self, Entity as InventoryLog, InventoryAction};
use crate::errors::ServiceError;
use crate::services::OrderRef;

/// One stock movement about to be appended.
#[derive(Debug, Clone)]
pub struct InventoryEntry {
    pub batch_id: Uuid,
    pub storage_id: Uuid,
    pub target_storage_id: Option<Uuid>,
    pub action: InventoryAction,
    pub quantity: Decimal,
    pub order: Option<OrderRef>,
    pub description: Option<String>,
}

impl InventoryEntry {
    pub fn new(action: InventoryAction, batch_id: Uuid, storage_id: Uuid, quantity: Decimal) -> Self {
        Self {
            batch_id,
            storage_id,
            target_storage_id: None,
            action,
            quantity,
            order: None,
            description: None,
        }
    }

    pub fn for_order(mut self, order: OrderRef) -> Self {
        self.order = Some(order);
        self
    }

    pub fn to_storage(mut self, target_storage_id: Uuid) -> Self {
        self.target_storage_id = Some(target_storage_id);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Append-only record of stock movements. Rows are inserted inside the
/// caller's transaction and never updated or deleted.
#[derive(Clone)]
pub struct InventoryLedger {
    db_pool: Arc<DbPool>,
}

impl InventoryLedger {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn record_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        entry: InventoryEntry,
    ) -> Result<inventory_log::Model, ServiceError> {
        let row = inventory_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            batch_id: Set(entry.batch_id),
            storage_id: Set(entry.storage_id),
            target_storage_id: Set(entry.target_storage_id),
            actor_id: Set(actor_id),
            purchase_order_id: Set(entry.order.and_then(|o| o.purchase_order_id())),
            sales_order_id: Set(entry.order.and_then(|o| o.sales_order_id())),
            action: Set(entry.action),
            quantity: Set(entry.quantity),
            description: Set(entry.description),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;

        counter!("trade_ledger.inventory_log.appended", 1, "action" => row.action.to_value());
        debug!(
            batch_id = %row.batch_id,
            storage_id = %row.storage_id,
            action = ?row.action,
            quantity = %row.quantity,
            "Inventory movement recorded"
        );
        Ok(row)
    }

    /// Movements of one batch, newest first.
    #[instrument(skip(self))]
    pub async fn entries_for_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<inventory_log::Model>, ServiceError> {
        Ok(InventoryLog::find()
            .filter(inventory_log::Column::BatchId.eq(batch_id))
            .order_by_desc(inventory_log::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await?)
    }

    /// Movements caused by one purchase or sales order, newest first.
    #[instrument(skip(self))]
    pub async fn entries_for_order(
        &self,
        order: OrderRef,
    ) -> Result<Vec<inventory_log::Model>, ServiceError> {
        let query = match order {
            OrderRef::Purchase(id) => {
                InventoryLog::find().filter(inventory_log::Column::PurchaseOrderId.eq(id))
            }
            OrderRef::Sales(id) => {
                InventoryLog::find().filter(inventory_log::Column::SalesOrderId.eq(id))
            }
        };
        Ok(query
            .order_by_desc(inventory_log::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await?)
    }
}
