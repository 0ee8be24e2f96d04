use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::commands::purchase_orders::{
    CompletePurchaseOrderCommand, CreatePurchaseOrderCommand, CreatePurchaseReturnCommand,
    PurchaseOrderFilter, PurchaseOrderLineInput, ReceivedItem, UpdatePurchaseOrderItemCommand,
};
use crate::commands::{CancelCommand, DocumentKey};
use crate::db::{self, DbPool};
use crate::entities::{
    financial_ledger::FinancialKind,
    inventory_log::InventoryAction,
    product_batch::{self, Entity as ProductBatch},
    purchase_order::{self, Entity as PurchaseOrder, PurchaseOrderStatus},
    purchase_order_detail::{self, Entity as PurchaseOrderDetail},
    purchase_order_return::{self, Entity as PurchaseOrderReturn, PurchaseReturnStatus},
    purchase_order_return_batch::{self, Entity as PurchaseOrderReturnBatch},
};
use crate::errors::ServiceError;
use crate::services::allocator::{self, NewBatch};
use crate::services::financial_ledger::FinancialLedger;
use crate::services::inventory_ledger::{InventoryEntry, InventoryLedger};
use crate::services::lifecycle::PurchaseOrderAction;
use crate::services::reference::ReferenceLookup;
use crate::services::reversal;
use crate::services::serial::{DocumentPrefix, SerialGenerator};
use crate::services::stock::{attach_storages_in, BatchView};
use crate::services::{OrderRef, Page, PageLimits};

/// A purchase order with everything hanging off it.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderView {
    pub order: purchase_order::Model,
    pub lines: Vec<purchase_order_detail::Model>,
    pub batches: Vec<BatchView>,
    pub returns: Vec<PurchaseReturnView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReturnView {
    pub record: purchase_order_return::Model,
    pub batches: Vec<purchase_order_return_batch::Model>,
}

/// Purchase order workflow: ordering, receiving into batches, and returns.
///
/// Each mutating operation runs in one transaction. The order header is
/// read with a row lock before anything else, which serializes competing
/// transitions of the same order.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    serials: SerialGenerator,
    limits: PageLimits,
}

impl PurchaseOrderService {
    pub fn new(db_pool: Arc<DbPool>, serials: SerialGenerator, limits: PageLimits) -> Self {
        Self {
            db_pool,
            serials,
            limits,
        }
    }

    #[instrument(skip(self, command), fields(supplier_id = %command.supplier_id, lines = command.lines.len()))]
    pub async fn create(
        &self,
        actor_id: Uuid,
        command: CreatePurchaseOrderCommand,
    ) -> Result<PurchaseOrderView, ServiceError> {
        command.check()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = self.create_in(&txn, actor_id, command).await;
        let view = db::finish(txn, "purchase_order.create", started, outcome).await?;

        counter!("trade_ledger.purchase_orders.created", 1);
        info!(
            order_id = %view.order.id,
            serial = %view.order.serial_number,
            total = %view.order.total_amount,
            "Purchase order created"
        );
        Ok(view)
    }

    async fn create_in(
        &self,
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        command: CreatePurchaseOrderCommand,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let serial = self.serials.next_in(txn, DocumentPrefix::PurchaseOrder).await?;
        ReferenceLookup::supplier_in(txn, command.supplier_id).await?;

        let now = Utc::now();
        let order = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial),
            supplier_id: Set(command.supplier_id),
            order_date: Set(command.order_date),
            status: Set(PurchaseOrderStatus::Ordered),
            total_amount: Set(command.total_amount()),
            payment_method: Set(command.payment_method),
            payment_due_date: Set(command.payment_due_date),
            notes: Set(command.notes),
            created_by: Set(actor_id),
            checked_by: Set(None),
            checked_at: Set(None),
            completed_by: Set(None),
            completed_at: Set(None),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        for line in &command.lines {
            insert_line(txn, order.id, line).await?;
        }

        view_in(txn, order).await
    }

    /// Marks the order as reviewed. Repeated checks re-stamp the checker.
    #[instrument(skip(self))]
    pub async fn check(&self, actor_id: Uuid, key: DocumentKey) -> Result<purchase_order::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::check_in(&txn, actor_id, &key).await;
        let order = db::finish(txn, "purchase_order.check", started, outcome).await?;

        info!(order_id = %order.id, checked_by = %actor_id, "Purchase order checked");
        Ok(order)
    }

    async fn check_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
    ) -> Result<purchase_order::Model, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::Check)?;

        let now = Utc::now();
        let mut active: purchase_order::ActiveModel = order.into();
        active.checked_by = Set(Some(actor_id));
        active.checked_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(txn).await?)
    }

    /// Receives every line in full into new batches and books the purchase.
    #[instrument(skip(self, command))]
    pub async fn complete(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        command: CompletePurchaseOrderCommand,
    ) -> Result<PurchaseOrderView, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::complete_in(&txn, actor_id, &key, command).await;
        let view = db::finish(txn, "purchase_order.complete", started, outcome).await?;

        counter!("trade_ledger.purchase_orders.completed", 1);
        info!(
            order_id = %view.order.id,
            batches = view.batches.len(),
            "Purchase order received"
        );
        Ok(view)
    }

    async fn complete_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        command: CompletePurchaseOrderCommand,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::Complete)?;

        let lines = lines_in(txn, order.id).await?;
        let received = match_received_items(&lines, command.received_items)?;
        let supplier = ReferenceLookup::supplier_in(txn, order.supplier_id).await?;
        let received_on = Utc::now().date_naive();
        let order_ref = OrderRef::Purchase(order.id);

        for line in &lines {
            let item = received.get(&line.id).ok_or_else(|| {
                ServiceError::InternalError(format!("line {} lost its receipt", line.id))
            })?;
            let product = ReferenceLookup::product_in(txn, line.product_id).await?;
            let sku = allocator::generate_sku(&product.name, &supplier.name, received_on);

            let batch = allocator::create_batch(
                txn,
                NewBatch {
                    sku,
                    product_id: line.product_id,
                    purchase_order_id: order.id,
                    purchase_order_detail_id: line.id,
                    initial_quantity: line.quantity,
                    price: line.price,
                },
            )
            .await?;

            for allocation in &item.allocations {
                allocator::deposit(txn, batch.id, allocation.storage_id, allocation.quantity).await?;
                InventoryLedger::record_in(
                    txn,
                    actor_id,
                    InventoryEntry::new(
                        InventoryAction::Add,
                        batch.id,
                        allocation.storage_id,
                        allocation.quantity,
                    )
                    .for_order(order_ref)
                    .describe(format!("Received {} on {}", batch.sku, order.serial_number)),
                )
                .await?;
            }
        }

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::Purchase,
            order.total_amount,
            order_ref,
            format!("Purchase order {} received", order.serial_number),
        )
        .await?;

        let now = Utc::now();
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Completed);
        active.completed_by = Set(Some(actor_id));
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        let order = active.update(txn).await?;

        view_in(txn, order).await
    }

    #[instrument(skip(self, command))]
    pub async fn cancel(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        command: CancelCommand,
    ) -> Result<purchase_order::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_in(&txn, actor_id, &key, command).await;
        let order = db::finish(txn, "purchase_order.cancel", started, outcome).await?;

        counter!("trade_ledger.purchase_orders.cancelled", 1);
        info!(order_id = %order.id, "Purchase order cancelled");
        Ok(order)
    }

    async fn cancel_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        command: CancelCommand,
    ) -> Result<purchase_order::Model, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::Cancel)?;

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::PurchaseCancel,
            Decimal::ZERO,
            OrderRef::Purchase(order.id),
            format!("Purchase order {} cancelled", order.serial_number),
        )
        .await?;

        let now = Utc::now();
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Cancelled);
        active.cancelled_by = Set(Some(actor_id));
        active.cancelled_at = Set(Some(now));
        active.cancel_reason = Set(command.reason);
        active.updated_at = Set(now);
        Ok(active.update(txn).await?)
    }

    #[instrument(skip(self, line), fields(product_id = %line.product_id))]
    pub async fn add_item(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        line: PurchaseOrderLineInput,
    ) -> Result<PurchaseOrderView, ServiceError> {
        line.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::add_item_in(&txn, &key, line).await;
        let view = db::finish(txn, "purchase_order.add_item", started, outcome).await?;

        info!(order_id = %view.order.id, actor_id = %actor_id, "Purchase order line added");
        Ok(view)
    }

    async fn add_item_in(
        txn: &DatabaseTransaction,
        key: &DocumentKey,
        line: PurchaseOrderLineInput,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::EditItems)?;

        let added = insert_line(txn, order.id, &line).await?;
        let order = adjust_total(txn, order, added.line_total()).await?;
        view_in(txn, order).await
    }

    #[instrument(skip(self, command))]
    pub async fn update_item(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        detail_id: Uuid,
        command: UpdatePurchaseOrderItemCommand,
    ) -> Result<PurchaseOrderView, ServiceError> {
        command.validate()?;
        if command.quantity.is_none() && command.price.is_none() {
            return Err(ServiceError::ValidationError(
                "nothing to update: give a quantity or a price".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::update_item_in(&txn, &key, detail_id, command).await;
        let view = db::finish(txn, "purchase_order.update_item", started, outcome).await?;

        info!(order_id = %view.order.id, detail_id = %detail_id, actor_id = %actor_id, "Purchase order line updated");
        Ok(view)
    }

    async fn update_item_in(
        txn: &DatabaseTransaction,
        key: &DocumentKey,
        detail_id: Uuid,
        command: UpdatePurchaseOrderItemCommand,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::EditItems)?;

        let line = line_of(txn, order.id, detail_id).await?;
        let before = line.line_total();
        let mut active: purchase_order_detail::ActiveModel = line.clone().into();
        active.quantity = Set(command.quantity.unwrap_or(line.quantity));
        active.price = Set(command.price.unwrap_or(line.price));
        active.updated_at = Set(Utc::now());
        let line = active.update(txn).await?;

        let order = adjust_total(txn, order, line.line_total() - before).await?;
        view_in(txn, order).await
    }

    /// Removes a line; an order always keeps at least one.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        detail_id: Uuid,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::remove_item_in(&txn, &key, detail_id).await;
        let view = db::finish(txn, "purchase_order.remove_item", started, outcome).await?;

        info!(order_id = %view.order.id, detail_id = %detail_id, actor_id = %actor_id, "Purchase order line removed");
        Ok(view)
    }

    async fn remove_item_in(
        txn: &DatabaseTransaction,
        key: &DocumentKey,
        detail_id: Uuid,
    ) -> Result<PurchaseOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::EditItems)?;

        let line = line_of(txn, order.id, detail_id).await?;
        let remaining = PurchaseOrderDetail::find()
            .filter(purchase_order_detail::Column::PurchaseOrderId.eq(order.id))
            .count(txn)
            .await?;
        if remaining <= 1 {
            return Err(ServiceError::BusinessRule(format!(
                "cannot remove the last line of purchase order {}",
                order.serial_number
            )));
        }

        PurchaseOrderDetail::delete_by_id(line.id).exec(txn).await?;
        let order = adjust_total(txn, order, -line.line_total()).await?;
        view_in(txn, order).await
    }

    /// Sends part of a received line back to the supplier, taken from the
    /// given batch storages, and refunds its share of the order total.
    #[instrument(skip(self, command), fields(detail_id = %command.detail_id, quantity = %command.quantity))]
    pub async fn create_return(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        command: CreatePurchaseReturnCommand,
    ) -> Result<PurchaseReturnView, ServiceError> {
        command.validate()?;
        reversal::ensure_allocations_match(command.quantity, command.allocated_quantity())?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = self.create_return_in(&txn, actor_id, &key, command).await;
        let view = db::finish(txn, "purchase_order.create_return", started, outcome).await?;

        counter!("trade_ledger.purchase_returns.created", 1);
        info!(
            return_id = %view.record.id,
            serial = %view.record.serial_number,
            amount = %view.record.amount,
            "Purchase return recorded"
        );
        Ok(view)
    }

    async fn create_return_in(
        &self,
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        command: CreatePurchaseReturnCommand,
    ) -> Result<PurchaseReturnView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(PurchaseOrderAction::CreateReturn)?;

        let serial = self.serials.next_in(txn, DocumentPrefix::PurchaseReturn).await?;
        let lines = lines_in(txn, order.id).await?;
        let line = lines
            .iter()
            .find(|l| l.id == command.detail_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Purchase order line", command.detail_id))?;

        let active_returns = reversal::active_purchase_returns_in(txn, order.id).await?;
        let line_returned = reversal::returned_total(
            active_returns
                .iter()
                .filter(|r| r.purchase_order_detail_id == line.id)
                .map(|r| &r.quantity),
        );
        reversal::ensure_returnable(line.quantity, line_returned, command.quantity)?;

        let total_ordered: Decimal = lines.iter().map(|l| l.quantity).sum();
        let amount = reversal::proportional_amount(command.quantity, total_ordered, order.total_amount);

        let now = Utc::now();
        let record = purchase_order_return::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial),
            purchase_order_id: Set(order.id),
            purchase_order_detail_id: Set(line.id),
            quantity: Set(command.quantity),
            amount: Set(amount),
            reason: Set(command.reason),
            status: Set(PurchaseReturnStatus::Returned),
            created_by: Set(actor_id),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        // Fixed lock order across batches keeps concurrent returns deadlock-free.
        let mut allocations = command.allocations;
        allocations.sort_by_key(|a| (a.batch_id, a.storage_id));

        let order_ref = OrderRef::Purchase(order.id);
        let mut batches = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            let batch = allocator::lock_batch(txn, allocation.batch_id).await?;
            if batch.purchase_order_detail_id != line.id {
                return Err(ServiceError::BusinessRule(format!(
                    "batch {} was not received on this order line",
                    batch.sku
                )));
            }

            allocator::withdraw(txn, batch.id, allocation.storage_id, allocation.quantity).await?;
            InventoryLedger::record_in(
                txn,
                actor_id,
                InventoryEntry::new(
                    InventoryAction::Return,
                    batch.id,
                    allocation.storage_id,
                    allocation.quantity,
                )
                .for_order(order_ref)
                .describe(format!("Returned to supplier under {}", record.serial_number)),
            )
            .await?;

            let row = purchase_order_return_batch::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(record.id),
                batch_id: Set(batch.id),
                storage_id: Set(allocation.storage_id),
                quantity: Set(allocation.quantity),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
            batches.push(row);
        }

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::PurchaseReturn,
            -amount,
            order_ref,
            format!(
                "Return {} on purchase order {}",
                record.serial_number, order.serial_number
            ),
        )
        .await?;

        refresh_status(txn, order, &lines).await?;
        Ok(PurchaseReturnView { record, batches })
    }

    /// Puts returned goods back into the storages they left and reverses
    /// the refund.
    #[instrument(skip(self, command))]
    pub async fn cancel_return(
        &self,
        actor_id: Uuid,
        return_key: DocumentKey,
        command: CancelCommand,
    ) -> Result<PurchaseReturnView, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_return_in(&txn, actor_id, &return_key, command).await;
        let view = db::finish(txn, "purchase_order.cancel_return", started, outcome).await?;

        counter!("trade_ledger.purchase_returns.cancelled", 1);
        info!(return_id = %view.record.id, "Purchase return cancelled");
        Ok(view)
    }

    async fn cancel_return_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        return_key: &DocumentKey,
        command: CancelCommand,
    ) -> Result<PurchaseReturnView, ServiceError> {
        let unlocked = find_return(txn, return_key, false).await?;
        let order = lock_order(txn, &DocumentKey::Id(unlocked.purchase_order_id)).await?;
        order.status.ensure(PurchaseOrderAction::CancelReturn)?;

        let record = find_return(txn, &DocumentKey::Id(unlocked.id), true).await?;
        if record.status != PurchaseReturnStatus::Returned {
            return Err(ServiceError::invalid_transition(
                "purchase return",
                record.status.to_value(),
                "cancel",
            ));
        }

        let mut batches = return_batches_in(txn, record.id).await?;
        batches.sort_by_key(|b| (b.batch_id, b.storage_id));

        let order_ref = OrderRef::Purchase(order.id);
        for row in &batches {
            allocator::deposit(txn, row.batch_id, row.storage_id, row.quantity).await?;
            InventoryLedger::record_in(
                txn,
                actor_id,
                InventoryEntry::new(
                    InventoryAction::ReturnCancel,
                    row.batch_id,
                    row.storage_id,
                    row.quantity,
                )
                .for_order(order_ref)
                .describe(format!("Return {} cancelled", record.serial_number)),
            )
            .await?;
        }

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::PurchaseReturnCancel,
            record.amount,
            order_ref,
            format!(
                "Return {} on purchase order {} cancelled",
                record.serial_number, order.serial_number
            ),
        )
        .await?;

        let now = Utc::now();
        let mut active: purchase_order_return::ActiveModel = record.into();
        active.status = Set(PurchaseReturnStatus::Cancelled);
        active.cancelled_by = Set(Some(actor_id));
        active.cancelled_at = Set(Some(now));
        active.cancel_reason = Set(command.reason);
        active.updated_at = Set(now);
        let record = active.update(txn).await?;

        let lines = lines_in(txn, order.id).await?;
        refresh_status(txn, order, &lines).await?;
        Ok(PurchaseReturnView { record, batches })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: DocumentKey) -> Result<PurchaseOrderView, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = find_order(db, &key).await?;
        view_in(db, order).await
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: PurchaseOrderFilter,
    ) -> Result<Page<purchase_order::Model>, ServiceError> {
        let (page, per_page) = self.limits.resolve(filter.page_request());

        let mut query = PurchaseOrder::find();
        if let Some(status) = filter.status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(purchase_order::Column::SupplierId.eq(supplier_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(purchase_order::Column::OrderDate.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(purchase_order::Column::OrderDate.lte(to));
        }

        let paginator = query
            .order_by_desc(purchase_order::Column::CreatedAt)
            .paginate(self.db_pool.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        debug!(page, per_page, total, "Listed purchase orders");
        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_returns(&self, key: DocumentKey) -> Result<Vec<PurchaseReturnView>, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = find_order(db, &key).await?;
        returns_in(db, order.id).await
    }

    #[instrument(skip(self))]
    pub async fn get_return(&self, key: DocumentKey) -> Result<PurchaseReturnView, ServiceError> {
        let db = self.db_pool.as_ref();
        let record = find_return(db, &key, false).await?;
        let batches = return_batches_in(db, record.id).await?;
        Ok(PurchaseReturnView { record, batches })
    }
}

fn order_query(key: &DocumentKey) -> sea_orm::Select<PurchaseOrder> {
    match key {
        DocumentKey::Id(id) => PurchaseOrder::find_by_id(*id),
        DocumentKey::Serial(serial) => {
            PurchaseOrder::find().filter(purchase_order::Column::SerialNumber.eq(serial.as_str()))
        }
    }
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    key: &DocumentKey,
) -> Result<purchase_order::Model, ServiceError> {
    order_query(key)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", key))
}

async fn lock_order(
    txn: &DatabaseTransaction,
    key: &DocumentKey,
) -> Result<purchase_order::Model, ServiceError> {
    order_query(key)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", key))
}

async fn find_return<C: ConnectionTrait>(
    conn: &C,
    key: &DocumentKey,
    lock: bool,
) -> Result<purchase_order_return::Model, ServiceError> {
    let mut query = match key {
        DocumentKey::Id(id) => PurchaseOrderReturn::find_by_id(*id),
        DocumentKey::Serial(serial) => PurchaseOrderReturn::find()
            .filter(purchase_order_return::Column::SerialNumber.eq(serial.as_str())),
    };
    if lock {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase return", key))
}

async fn lines_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<purchase_order_detail::Model>, ServiceError> {
    Ok(PurchaseOrderDetail::find()
        .filter(purchase_order_detail::Column::PurchaseOrderId.eq(order_id))
        .order_by_asc(purchase_order_detail::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn line_of(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    detail_id: Uuid,
) -> Result<purchase_order_detail::Model, ServiceError> {
    PurchaseOrderDetail::find_by_id(detail_id)
        .filter(purchase_order_detail::Column::PurchaseOrderId.eq(order_id))
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order line", detail_id))
}

async fn insert_line(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    line: &PurchaseOrderLineInput,
) -> Result<purchase_order_detail::Model, ServiceError> {
    ReferenceLookup::product_in(txn, line.product_id).await?;
    let now = Utc::now();
    Ok(purchase_order_detail::ActiveModel {
        id: Set(Uuid::new_v4()),
        purchase_order_id: Set(order_id),
        product_id: Set(line.product_id),
        quantity: Set(line.quantity),
        price: Set(line.price),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?)
}

/// Moves the header total by `delta` instead of re-summing every line.
async fn adjust_total(
    txn: &DatabaseTransaction,
    order: purchase_order::Model,
    delta: Decimal,
) -> Result<purchase_order::Model, ServiceError> {
    let total = order.total_amount + delta;
    let mut active: purchase_order::ActiveModel = order.into();
    active.total_amount = Set(total);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

/// Every line must be received, in full, exactly once.
fn match_received_items(
    lines: &[purchase_order_detail::Model],
    items: Vec<ReceivedItem>,
) -> Result<HashMap<Uuid, ReceivedItem>, ServiceError> {
    let known: HashSet<Uuid> = lines.iter().map(|l| l.id).collect();
    let mut received = HashMap::with_capacity(items.len());
    for item in items {
        if !known.contains(&item.detail_id) {
            return Err(ServiceError::not_found("Purchase order line", item.detail_id));
        }
        if received.contains_key(&item.detail_id) {
            return Err(ServiceError::BusinessRule(format!(
                "line {} is received more than once",
                item.detail_id
            )));
        }
        received.insert(item.detail_id, item);
    }

    for line in lines {
        let quantity = received
            .get(&line.id)
            .map(ReceivedItem::received_quantity)
            .unwrap_or(Decimal::ZERO);
        if quantity != line.quantity {
            return Err(ServiceError::BusinessRule(format!(
                "line {} ordered {} but {} was allocated",
                line.id, line.quantity, quantity
            )));
        }
    }
    Ok(received)
}

async fn refresh_status(
    txn: &DatabaseTransaction,
    order: purchase_order::Model,
    lines: &[purchase_order_detail::Model],
) -> Result<purchase_order::Model, ServiceError> {
    let ordered: Decimal = lines.iter().map(|l| l.quantity).sum();
    let active = reversal::active_purchase_returns_in(txn, order.id).await?;
    let returned = reversal::returned_total(active.iter().map(|r| &r.quantity));
    let status = reversal::purchase_status_after_returns(ordered, returned);

    if status == order.status {
        return Ok(order);
    }
    debug!(order_id = %order.id, from = %order.status, to = %status, "Purchase order status recomputed");
    let mut active: purchase_order::ActiveModel = order.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

async fn return_batches_in<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
) -> Result<Vec<purchase_order_return_batch::Model>, ServiceError> {
    Ok(PurchaseOrderReturnBatch::find()
        .filter(purchase_order_return_batch::Column::ReturnId.eq(return_id))
        .order_by_asc(purchase_order_return_batch::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn returns_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<PurchaseReturnView>, ServiceError> {
    let records = PurchaseOrderReturn::find()
        .filter(purchase_order_return::Column::PurchaseOrderId.eq(order_id))
        .order_by_asc(purchase_order_return::Column::CreatedAt)
        .all(conn)
        .await?;

    let mut views = Vec::with_capacity(records.len());
    for record in records {
        let batches = return_batches_in(conn, record.id).await?;
        views.push(PurchaseReturnView { record, batches });
    }
    Ok(views)
}

async fn view_in<C: ConnectionTrait>(
    conn: &C,
    order: purchase_order::Model,
) -> Result<PurchaseOrderView, ServiceError> {
    let lines = lines_in(conn, order.id).await?;
    let batches = ProductBatch::find()
        .filter(product_batch::Column::PurchaseOrderId.eq(order.id))
        .order_by_asc(product_batch::Column::CreatedAt)
        .all(conn)
        .await?;
    let batches = attach_storages_in(conn, batches).await?;
    let returns = returns_in(conn, order.id).await?;

    Ok(PurchaseOrderView {
        order,
        lines,
        batches,
        returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::StorageAllocation;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal) -> purchase_order_detail::Model {
        let now = Utc::now();
        purchase_order_detail::Model {
            id: Uuid::new_v4(),
            purchase_order_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            quantity,
            price: dec!(100),
            created_at: now,
            updated_at: now,
        }
    }

    fn received(detail_id: Uuid, quantities: &[Decimal]) -> ReceivedItem {
        ReceivedItem {
            detail_id,
            allocations: quantities
                .iter()
                .map(|q| StorageAllocation {
                    storage_id: Uuid::new_v4(),
                    quantity: *q,
                })
                .collect(),
        }
    }

    #[test]
    fn full_receipt_split_across_storages_is_accepted() {
        let lines = vec![line(dec!(10))];
        let items = vec![received(lines[0].id, &[dec!(6), dec!(4)])];
        let matched = match_received_items(&lines, items).unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn short_receipt_is_rejected() {
        let lines = vec![line(dec!(10))];
        let items = vec![received(lines[0].id, &[dec!(9)])];
        assert_matches!(
            match_received_items(&lines, items),
            Err(ServiceError::BusinessRule(_))
        );
    }

    #[test]
    fn missing_line_is_rejected() {
        let lines = vec![line(dec!(10)), line(dec!(5))];
        let items = vec![received(lines[0].id, &[dec!(10)])];
        assert_matches!(
            match_received_items(&lines, items),
            Err(ServiceError::BusinessRule(_))
        );
    }

    #[test]
    fn foreign_line_is_not_found() {
        let lines = vec![line(dec!(10))];
        let items = vec![received(Uuid::new_v4(), &[dec!(10)])];
        assert_matches!(
            match_received_items(&lines, items),
            Err(ServiceError::NotFound(_))
        );
    }
}
