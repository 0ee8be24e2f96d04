use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
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

use crate::commands::sales_orders::{
    CreateDeliveryNoteCommand, CreateInvoiceCommand, CreateSalesOrderCommand,
    ReturnSalesItemsCommand, SalesOrderFilter, SalesOrderLineInput, UpdateSalesOrderItemCommand,
};
use crate::commands::{CancelCommand, DocumentKey};
use crate::db::{self, DbPool};
use crate::entities::{
    batch_storage,
    delivery_note::{self, Entity as DeliveryNote},
    financial_ledger::FinancialKind,
    inventory_log::InventoryAction,
    sales_invoice::{self, Entity as SalesInvoice},
    sales_order::{self, Entity as SalesOrder, SalesOrderStatus},
    sales_order_detail::{self, Entity as SalesOrderDetail},
    sales_order_return::{self, Entity as SalesOrderReturn, ReturnSource, SalesReturnStatus},
    sales_order_return_batch::{self, Entity as SalesOrderReturnBatch},
    DocumentStatus,
};
use crate::errors::ServiceError;
use crate::services::allocator;
use crate::services::financial_ledger::FinancialLedger;
use crate::services::inventory_ledger::{InventoryEntry, InventoryLedger};
use crate::services::lifecycle::SalesOrderAction;
use crate::services::reference::ReferenceLookup;
use crate::services::reversal;
use crate::services::serial::{DocumentPrefix, SerialGenerator};
use crate::services::{OrderRef, Page, PageLimits};

/// A sales order with its lines, its active documents and its returns.
#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderView {
    pub order: sales_order::Model,
    pub lines: Vec<sales_order_detail::Model>,
    pub invoice: Option<sales_invoice::Model>,
    pub delivery_note: Option<delivery_note::Model>,
    pub returns: Vec<SalesReturnView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesReturnView {
    pub record: sales_order_return::Model,
    pub batches: Vec<sales_order_return_batch::Model>,
}

/// Sales order workflow.
///
/// Stock leaves its batch storage as soon as a line is written, so an order
/// in status `order` already holds the goods it sells. Invoices and delivery
/// notes move the order forward; cancelling them moves it back one stage.
#[derive(Clone)]
pub struct SalesOrderService {
    db_pool: Arc<DbPool>,
    serials: SerialGenerator,
    limits: PageLimits,
}

impl SalesOrderService {
    pub fn new(db_pool: Arc<DbPool>, serials: SerialGenerator, limits: PageLimits) -> Self {
        Self {
            db_pool,
            serials,
            limits,
        }
    }

    #[instrument(skip(self, command), fields(customer_id = %command.customer_id, lines = command.lines.len()))]
    pub async fn create(
        &self,
        actor_id: Uuid,
        command: CreateSalesOrderCommand,
    ) -> Result<SalesOrderView, ServiceError> {
        command.check()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = self.create_in(&txn, actor_id, command).await;
        let view = db::finish(txn, "sales_order.create", started, outcome).await?;

        counter!("trade_ledger.sales_orders.created", 1);
        info!(
            order_id = %view.order.id,
            serial = %view.order.serial_number,
            status = %view.order.status,
            "Sales order created"
        );
        Ok(view)
    }

    async fn create_in(
        &self,
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        command: CreateSalesOrderCommand,
    ) -> Result<SalesOrderView, ServiceError> {
        let serial = self.serials.next_in(txn, DocumentPrefix::SalesOrder).await?;
        let invoice_serial = if command.create_invoice {
            Some(self.serials.next_in(txn, DocumentPrefix::SalesInvoice).await?)
        } else {
            None
        };
        ReferenceLookup::customer_in(txn, command.customer_id).await?;

        // Batch rows are locked in (batch, storage) order, as every other stock path does.
        let mut lines = Vec::with_capacity(command.lines.len());
        for line in &command.lines {
            lines.push((allocator::find_slot(txn, line.batch_storage_id).await?, line));
        }
        lines.sort_by_key(|(slot, _)| (slot.batch_id, slot.storage_id));

        let now = Utc::now();
        let order = sales_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial),
            customer_id: Set(command.customer_id),
            order_date: Set(command.order_date),
            status: Set(SalesOrderStatus::Order),
            total_amount: Set(command.total_amount()),
            payment_method: Set(command.payment_method),
            payment_due_date: Set(command.payment_due_date),
            notes: Set(command.notes),
            created_by: Set(actor_id),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        for (slot, line) in &lines {
            sell_line(txn, actor_id, &order, slot, line).await?;
        }

        let order = match invoice_serial {
            Some(invoice_serial) => {
                Self::create_invoice_in(txn, actor_id, order, invoice_serial, command.order_date)
                    .await?
                    .0
            }
            None => order,
        };

        view_in(txn, order).await
    }

    #[instrument(skip(self, line), fields(batch_storage_id = %line.batch_storage_id))]
    pub async fn add_item(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        line: SalesOrderLineInput,
    ) -> Result<SalesOrderView, ServiceError> {
        line.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::add_item_in(&txn, actor_id, &key, line).await;
        let view = db::finish(txn, "sales_order.add_item", started, outcome).await?;

        info!(order_id = %view.order.id, "Sales order line added");
        Ok(view)
    }

    async fn add_item_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        line: SalesOrderLineInput,
    ) -> Result<SalesOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(SalesOrderAction::EditItems)?;

        let slot = allocator::find_slot(txn, line.batch_storage_id).await?;
        let added = sell_line(txn, actor_id, &order, &slot, &line).await?;
        let order = adjust_total(txn, order, added.line_total()).await?;
        view_in(txn, order).await
    }

    /// Changes quantity or price of a line; quantity changes move stock at once.
    #[instrument(skip(self, command))]
    pub async fn update_item(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        detail_id: Uuid,
        command: UpdateSalesOrderItemCommand,
    ) -> Result<SalesOrderView, ServiceError> {
        command.validate()?;
        if command.quantity.is_none() && command.price.is_none() {
            return Err(ServiceError::ValidationError(
                "nothing to update: give a quantity or a price".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::update_item_in(&txn, actor_id, &key, detail_id, command).await;
        let view = db::finish(txn, "sales_order.update_item", started, outcome).await?;

        info!(order_id = %view.order.id, detail_id = %detail_id, "Sales order line updated");
        Ok(view)
    }

    async fn update_item_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        detail_id: Uuid,
        command: UpdateSalesOrderItemCommand,
    ) -> Result<SalesOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(SalesOrderAction::EditItems)?;

        let line = line_of(txn, order.id, detail_id).await?;
        let quantity = command.quantity.unwrap_or(line.quantity);
        let order_ref = OrderRef::Sales(order.id);
        let delta = quantity - line.quantity;

        if delta > Decimal::ZERO {
            allocator::withdraw(txn, line.batch_id, line.storage_id, delta).await?;
            InventoryLedger::record_in(
                txn,
                actor_id,
                InventoryEntry::new(InventoryAction::Remove, line.batch_id, line.storage_id, delta)
                    .for_order(order_ref)
                    .describe(format!("Line increased on {}", order.serial_number)),
            )
            .await?;
        } else if delta < Decimal::ZERO {
            let restored = -delta;
            allocator::deposit(txn, line.batch_id, line.storage_id, restored).await?;
            InventoryLedger::record_in(
                txn,
                actor_id,
                InventoryEntry::new(InventoryAction::Add, line.batch_id, line.storage_id, restored)
                    .for_order(order_ref)
                    .describe(format!("Line decreased on {}", order.serial_number)),
            )
            .await?;
        }

        let before = line.line_total();
        let mut active: sales_order_detail::ActiveModel = line.clone().into();
        active.quantity = Set(quantity);
        active.price = Set(command.price.unwrap_or(line.price));
        active.updated_at = Set(Utc::now());
        let line = active.update(txn).await?;

        let order = adjust_total(txn, order, line.line_total() - before).await?;
        view_in(txn, order).await
    }

    /// Removes a line and puts its stock back; an order always keeps one line.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        detail_id: Uuid,
    ) -> Result<SalesOrderView, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::remove_item_in(&txn, actor_id, &key, detail_id).await;
        let view = db::finish(txn, "sales_order.remove_item", started, outcome).await?;

        info!(order_id = %view.order.id, detail_id = %detail_id, "Sales order line removed");
        Ok(view)
    }

    async fn remove_item_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        detail_id: Uuid,
    ) -> Result<SalesOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(SalesOrderAction::EditItems)?;

        let line = line_of(txn, order.id, detail_id).await?;
        let remaining = SalesOrderDetail::find()
            .filter(sales_order_detail::Column::SalesOrderId.eq(order.id))
            .count(txn)
            .await?;
        if remaining <= 1 {
            return Err(ServiceError::BusinessRule(format!(
                "cannot remove the last line of sales order {}",
                order.serial_number
            )));
        }

        restock_line(txn, actor_id, &order, &line, "Line removed from").await?;
        SalesOrderDetail::delete_by_id(line.id).exec(txn).await?;
        let order = adjust_total(txn, order, -line.line_total()).await?;
        view_in(txn, order).await
    }

    /// Cancels an order that has not been invoiced, restoring all its stock.
    #[instrument(skip(self, command))]
    pub async fn cancel(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        command: CancelCommand,
    ) -> Result<SalesOrderView, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_in(&txn, actor_id, &key, command).await;
        let view = db::finish(txn, "sales_order.cancel", started, outcome).await?;

        counter!("trade_ledger.sales_orders.cancelled", 1);
        info!(order_id = %view.order.id, "Sales order cancelled");
        Ok(view)
    }

    async fn cancel_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        command: CancelCommand,
    ) -> Result<SalesOrderView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(SalesOrderAction::Cancel)?;

        let mut lines = lines_in(txn, order.id).await?;
        lines.sort_by_key(|l| (l.batch_id, l.storage_id));
        for line in &lines {
            restock_line(txn, actor_id, &order, line, "Cancelled").await?;
        }

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::SaleCancel,
            Decimal::ZERO,
            OrderRef::Sales(order.id),
            format!("Sales order {} cancelled", order.serial_number),
        )
        .await?;

        let now = Utc::now();
        let mut active: sales_order::ActiveModel = order.into();
        active.status = Set(SalesOrderStatus::Cancel);
        active.cancelled_by = Set(Some(actor_id));
        active.cancelled_at = Set(Some(now));
        active.cancel_reason = Set(command.reason);
        active.updated_at = Set(now);
        let order = active.update(txn).await?;

        view_in(txn, order).await
    }

    #[instrument(skip(self, command))]
    pub async fn create_invoice(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        command: CreateInvoiceCommand,
    ) -> Result<sales_invoice::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = async {
            let order = lock_order(&txn, &key).await?;
            let serial = self.serials.next_in(&txn, DocumentPrefix::SalesInvoice).await?;
            let invoice_date = command
                .invoice_date
                .unwrap_or_else(|| Utc::now().date_naive());
            Self::create_invoice_in(&txn, actor_id, order, serial, invoice_date)
                .await
                .map(|(_, invoice)| invoice)
        }
        .await;
        let invoice = db::finish(txn, "sales_order.create_invoice", started, outcome).await?;

        counter!("trade_ledger.sales_invoices.created", 1);
        info!(
            invoice_id = %invoice.id,
            serial = %invoice.serial_number,
            amount = %invoice.amount,
            "Sales invoice issued"
        );
        Ok(invoice)
    }

    /// Issues the invoice inside an open transaction; the caller holds the
    /// order row and has already drawn the `SI` serial.
    pub async fn create_invoice_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        order: sales_order::Model,
        serial: String,
        invoice_date: NaiveDate,
    ) -> Result<(sales_order::Model, sales_invoice::Model), ServiceError> {
        order.status.ensure(SalesOrderAction::CreateInvoice)?;
        if active_invoice_in(txn, order.id).await?.is_some() {
            return Err(ServiceError::BusinessRule(format!(
                "sales order {} already has an active invoice",
                order.serial_number
            )));
        }

        let invoice = sales_invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial),
            sales_order_id: Set(order.id),
            invoice_date: Set(invoice_date),
            amount: Set(order.total_amount),
            status: Set(DocumentStatus::Active),
            created_by: Set(actor_id),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::Sale,
            invoice.amount,
            OrderRef::Sales(order.id),
            format!(
                "Invoice {} for sales order {}",
                invoice.serial_number, order.serial_number
            ),
        )
        .await?;

        let order = set_status(txn, order, SalesOrderStatus::Invoice).await?;
        Ok((order, invoice))
    }

    #[instrument(skip(self, command))]
    pub async fn cancel_invoice(
        &self,
        actor_id: Uuid,
        invoice_key: DocumentKey,
        command: CancelCommand,
    ) -> Result<sales_invoice::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_invoice_in(&txn, actor_id, &invoice_key, command).await;
        let invoice = db::finish(txn, "sales_order.cancel_invoice", started, outcome).await?;

        counter!("trade_ledger.sales_invoices.cancelled", 1);
        info!(invoice_id = %invoice.id, "Sales invoice cancelled");
        Ok(invoice)
    }

    async fn cancel_invoice_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        invoice_key: &DocumentKey,
        command: CancelCommand,
    ) -> Result<sales_invoice::Model, ServiceError> {
        let unlocked = find_invoice(txn, invoice_key).await?;
        let order = lock_order(txn, &DocumentKey::Id(unlocked.sales_order_id)).await?;
        order.status.ensure(SalesOrderAction::CancelInvoice)?;

        let invoice = find_invoice(txn, &DocumentKey::Id(unlocked.id)).await?;
        if invoice.status != DocumentStatus::Active {
            return Err(ServiceError::invalid_transition(
                "sales invoice",
                invoice.status.to_value(),
                "cancel",
            ));
        }
        if active_delivery_note_in(txn, order.id).await?.is_some() {
            return Err(ServiceError::BusinessRule(format!(
                "invoice {} has an active delivery note",
                invoice.serial_number
            )));
        }
        if !reversal::active_sales_returns_in(txn, order.id).await?.is_empty() {
            return Err(ServiceError::BusinessRule(format!(
                "invoice {} has active returns",
                invoice.serial_number
            )));
        }

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::SaleCancel,
            -invoice.amount,
            OrderRef::Sales(order.id),
            format!("Invoice {} cancelled", invoice.serial_number),
        )
        .await?;

        let now = Utc::now();
        let mut active: sales_invoice::ActiveModel = invoice.into();
        active.status = Set(DocumentStatus::Cancelled);
        active.cancelled_by = Set(Some(actor_id));
        active.cancelled_at = Set(Some(now));
        active.cancel_reason = Set(command.reason);
        let invoice = active.update(txn).await?;

        set_status(txn, order, SalesOrderStatus::Order).await?;
        Ok(invoice)
    }

    /// Issues a delivery note against an active invoice.
    #[instrument(skip(self, command))]
    pub async fn create_delivery_note(
        &self,
        actor_id: Uuid,
        invoice_key: DocumentKey,
        command: CreateDeliveryNoteCommand,
    ) -> Result<delivery_note::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = self
            .create_delivery_note_in(&txn, actor_id, &invoice_key, command)
            .await;
        let note = db::finish(txn, "sales_order.create_delivery_note", started, outcome).await?;

        counter!("trade_ledger.delivery_notes.created", 1);
        info!(delivery_note_id = %note.id, serial = %note.serial_number, "Delivery note issued");
        Ok(note)
    }

    async fn create_delivery_note_in(
        &self,
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        invoice_key: &DocumentKey,
        command: CreateDeliveryNoteCommand,
    ) -> Result<delivery_note::Model, ServiceError> {
        let unlocked = find_invoice(txn, invoice_key).await?;
        let order = lock_order(txn, &DocumentKey::Id(unlocked.sales_order_id)).await?;
        order.status.ensure(SalesOrderAction::CreateDeliveryNote)?;

        let invoice = find_invoice(txn, &DocumentKey::Id(unlocked.id)).await?;
        if invoice.status != DocumentStatus::Active {
            return Err(ServiceError::BusinessRule(format!(
                "invoice {} is cancelled",
                invoice.serial_number
            )));
        }
        if active_delivery_note_in(txn, order.id).await?.is_some() {
            return Err(ServiceError::BusinessRule(format!(
                "sales order {} already has an active delivery note",
                order.serial_number
            )));
        }

        let serial = self.serials.next_in(txn, DocumentPrefix::DeliveryNote).await?;
        let note = delivery_note::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial),
            sales_order_id: Set(order.id),
            sales_invoice_id: Set(invoice.id),
            delivery_date: Set(command
                .delivery_date
                .unwrap_or_else(|| Utc::now().date_naive())),
            recipient: Set(command.recipient),
            address: Set(command.address),
            status: Set(DocumentStatus::Active),
            created_by: Set(actor_id),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;

        set_status(txn, order, SalesOrderStatus::Delivery).await?;
        Ok(note)
    }

    #[instrument(skip(self, command))]
    pub async fn cancel_delivery_note(
        &self,
        actor_id: Uuid,
        note_key: DocumentKey,
        command: CancelCommand,
    ) -> Result<delivery_note::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_delivery_note_in(&txn, actor_id, &note_key, command).await;
        let note = db::finish(txn, "sales_order.cancel_delivery_note", started, outcome).await?;

        counter!("trade_ledger.delivery_notes.cancelled", 1);
        info!(delivery_note_id = %note.id, "Delivery note cancelled");
        Ok(note)
    }

    async fn cancel_delivery_note_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        note_key: &DocumentKey,
        command: CancelCommand,
    ) -> Result<delivery_note::Model, ServiceError> {
        let unlocked = find_delivery_note(txn, note_key).await?;
        let order = lock_order(txn, &DocumentKey::Id(unlocked.sales_order_id)).await?;
        order.status.ensure(SalesOrderAction::CancelDeliveryNote)?;

        let note = find_delivery_note(txn, &DocumentKey::Id(unlocked.id)).await?;
        if note.status != DocumentStatus::Active {
            return Err(ServiceError::invalid_transition(
                "delivery note",
                note.status.to_value(),
                "cancel",
            ));
        }
        if !reversal::active_sales_returns_in(txn, order.id).await?.is_empty() {
            return Err(ServiceError::BusinessRule(format!(
                "delivery note {} has active returns",
                note.serial_number
            )));
        }

        let now = Utc::now();
        let mut active: delivery_note::ActiveModel = note.into();
        active.status = Set(DocumentStatus::Cancelled);
        active.cancelled_by = Set(Some(actor_id));
        active.cancelled_at = Set(Some(now));
        active.cancel_reason = Set(command.reason);
        let note = active.update(txn).await?;

        set_status(txn, order, SalesOrderStatus::Invoice).await?;
        Ok(note)
    }

    /// Takes goods back from the customer into the given storages and
    /// credits `quantity × line price`.
    #[instrument(skip(self, command), fields(detail_id = %command.detail_id, quantity = %command.quantity))]
    pub async fn return_items(
        &self,
        actor_id: Uuid,
        key: DocumentKey,
        command: ReturnSalesItemsCommand,
    ) -> Result<SalesReturnView, ServiceError> {
        command.validate()?;
        reversal::ensure_allocations_match(command.quantity, command.allocated_quantity())?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = self.return_items_in(&txn, actor_id, &key, command).await;
        let view = db::finish(txn, "sales_order.return_items", started, outcome).await?;

        counter!("trade_ledger.sales_returns.created", 1);
        info!(
            return_id = %view.record.id,
            serial = %view.record.serial_number,
            source = ?view.record.source,
            "Sales return recorded"
        );
        Ok(view)
    }

    async fn return_items_in(
        &self,
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        key: &DocumentKey,
        command: ReturnSalesItemsCommand,
    ) -> Result<SalesReturnView, ServiceError> {
        let order = lock_order(txn, key).await?;
        order.status.ensure(SalesOrderAction::ReturnItems)?;

        let serial = self.serials.next_in(txn, DocumentPrefix::SalesReturn).await?;
        let line = line_of(txn, order.id, command.detail_id).await?;

        let active_returns = reversal::active_sales_returns_in(txn, order.id).await?;
        let line_returned = reversal::returned_total(
            active_returns
                .iter()
                .filter(|r| r.sales_order_detail_id == line.id)
                .map(|r| &r.quantity),
        );
        reversal::ensure_returnable(line.quantity, line_returned, command.quantity)?;

        let invoice = active_invoice_in(txn, order.id).await?;
        let note = active_delivery_note_in(txn, order.id).await?;
        let source = match (&note, &invoice) {
            (Some(_), _) => ReturnSource::DeliveryNote,
            (None, Some(_)) => ReturnSource::Invoice,
            (None, None) => {
                return Err(ServiceError::BusinessRule(format!(
                    "sales order {} has no active invoice to return against",
                    order.serial_number
                )))
            }
        };

        let amount = command.quantity * line.price;
        let now = Utc::now();
        let record = sales_order_return::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial),
            sales_order_id: Set(order.id),
            sales_order_detail_id: Set(line.id),
            source: Set(source),
            sales_invoice_id: Set(invoice.as_ref().map(|i| i.id)),
            delivery_note_id: Set(note.as_ref().map(|n| n.id)),
            quantity: Set(command.quantity),
            amount: Set(amount),
            reason: Set(command.reason),
            status: Set(SalesReturnStatus::Completed),
            created_by: Set(actor_id),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        let mut allocations = command.allocations;
        allocations.sort_by_key(|a| a.storage_id);

        let order_ref = OrderRef::Sales(order.id);
        let mut batches = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            allocator::deposit(txn, line.batch_id, allocation.storage_id, allocation.quantity).await?;
            InventoryLedger::record_in(
                txn,
                actor_id,
                InventoryEntry::new(
                    InventoryAction::Add,
                    line.batch_id,
                    allocation.storage_id,
                    allocation.quantity,
                )
                .for_order(order_ref)
                .describe(format!("Customer return {}", record.serial_number)),
            )
            .await?;

            let row = sales_order_return_batch::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(record.id),
                batch_id: Set(line.batch_id),
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
            FinancialKind::SaleReturn,
            -amount,
            order_ref,
            format!(
                "Return {} on sales order {}",
                record.serial_number, order.serial_number
            ),
        )
        .await?;

        refresh_status(txn, order).await?;
        Ok(SalesReturnView { record, batches })
    }

    /// Takes returned goods out of stock again and reverses the credit.
    #[instrument(skip(self, command))]
    pub async fn cancel_return(
        &self,
        actor_id: Uuid,
        return_key: DocumentKey,
        command: CancelCommand,
    ) -> Result<SalesReturnView, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_return_in(&txn, actor_id, &return_key, command).await;
        let view = db::finish(txn, "sales_order.cancel_return", started, outcome).await?;

        counter!("trade_ledger.sales_returns.cancelled", 1);
        info!(return_id = %view.record.id, "Sales return cancelled");
        Ok(view)
    }

    async fn cancel_return_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        return_key: &DocumentKey,
        command: CancelCommand,
    ) -> Result<SalesReturnView, ServiceError> {
        let unlocked = find_return(txn, return_key, false).await?;
        let order = lock_order(txn, &DocumentKey::Id(unlocked.sales_order_id)).await?;
        order.status.ensure(SalesOrderAction::CancelReturn)?;

        let record = find_return(txn, &DocumentKey::Id(unlocked.id), true).await?;
        if record.status != SalesReturnStatus::Completed {
            return Err(ServiceError::invalid_transition(
                "sales return",
                record.status.to_value(),
                "cancel",
            ));
        }

        let mut batches = return_batches_in(txn, record.id).await?;
        batches.sort_by_key(|b| (b.batch_id, b.storage_id));

        let order_ref = OrderRef::Sales(order.id);
        for row in &batches {
            allocator::withdraw(txn, row.batch_id, row.storage_id, row.quantity).await?;
            InventoryLedger::record_in(
                txn,
                actor_id,
                InventoryEntry::new(
                    InventoryAction::Remove,
                    row.batch_id,
                    row.storage_id,
                    row.quantity,
                )
                .for_order(order_ref)
                .describe(format!("Customer return {} cancelled", record.serial_number)),
            )
            .await?;
        }

        FinancialLedger::record_in(
            txn,
            actor_id,
            FinancialKind::SaleReturnCancel,
            record.amount,
            order_ref,
            format!(
                "Return {} on sales order {} cancelled",
                record.serial_number, order.serial_number
            ),
        )
        .await?;

        let now = Utc::now();
        let mut active: sales_order_return::ActiveModel = record.into();
        active.status = Set(SalesReturnStatus::Cancelled);
        active.cancelled_by = Set(Some(actor_id));
        active.cancelled_at = Set(Some(now));
        active.cancel_reason = Set(command.reason);
        active.updated_at = Set(now);
        let record = active.update(txn).await?;

        refresh_status(txn, order).await?;
        Ok(SalesReturnView { record, batches })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: DocumentKey) -> Result<SalesOrderView, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = find_order(db, &key).await?;
        view_in(db, order).await
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: SalesOrderFilter) -> Result<Page<sales_order::Model>, ServiceError> {
        let (page, per_page) = self.limits.resolve(filter.page_request());

        let mut query = SalesOrder::find();
        if let Some(status) = filter.status {
            query = query.filter(sales_order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(sales_order::Column::CustomerId.eq(customer_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(sales_order::Column::OrderDate.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(sales_order::Column::OrderDate.lte(to));
        }

        let paginator = query
            .order_by_desc(sales_order::Column::CreatedAt)
            .paginate(self.db_pool.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        debug!(page, per_page, total, "Listed sales orders");
        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_returns(&self, key: DocumentKey) -> Result<Vec<SalesReturnView>, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = find_order(db, &key).await?;
        returns_in(db, order.id).await
    }

    #[instrument(skip(self))]
    pub async fn get_return(&self, key: DocumentKey) -> Result<SalesReturnView, ServiceError> {
        let db = self.db_pool.as_ref();
        let record = find_return(db, &key, false).await?;
        let batches = return_batches_in(db, record.id).await?;
        Ok(SalesReturnView { record, batches })
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, key: DocumentKey) -> Result<sales_invoice::Model, ServiceError> {
        find_invoice(self.db_pool.as_ref(), &key).await
    }

    #[instrument(skip(self))]
    pub async fn get_delivery_note(&self, key: DocumentKey) -> Result<delivery_note::Model, ServiceError> {
        find_delivery_note(self.db_pool.as_ref(), &key).await
    }
}

/// Takes the line's quantity out of its batch storage and writes the line.
async fn sell_line(
    txn: &DatabaseTransaction,
    actor_id: Uuid,
    order: &sales_order::Model,
    slot: &batch_storage::Model,
    line: &SalesOrderLineInput,
) -> Result<sales_order_detail::Model, ServiceError> {
    let movement = allocator::withdraw(txn, slot.batch_id, slot.storage_id, line.quantity).await?;

    let now = Utc::now();
    let detail = sales_order_detail::ActiveModel {
        id: Set(Uuid::new_v4()),
        sales_order_id: Set(order.id),
        batch_storage_id: Set(slot.id),
        batch_id: Set(slot.batch_id),
        storage_id: Set(slot.storage_id),
        product_id: Set(movement.batch.product_id),
        quantity: Set(line.quantity),
        price: Set(line.price),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    InventoryLedger::record_in(
        txn,
        actor_id,
        InventoryEntry::new(
            InventoryAction::Remove,
            slot.batch_id,
            slot.storage_id,
            line.quantity,
        )
        .for_order(OrderRef::Sales(order.id))
        .describe(format!("Sold {} on {}", movement.batch.sku, order.serial_number)),
    )
    .await?;

    Ok(detail)
}

/// Puts a line's full quantity back where it was taken from.
async fn restock_line(
    txn: &DatabaseTransaction,
    actor_id: Uuid,
    order: &sales_order::Model,
    line: &sales_order_detail::Model,
    why: &str,
) -> Result<(), ServiceError> {
    allocator::deposit(txn, line.batch_id, line.storage_id, line.quantity).await?;
    InventoryLedger::record_in(
        txn,
        actor_id,
        InventoryEntry::new(
            InventoryAction::Add,
            line.batch_id,
            line.storage_id,
            line.quantity,
        )
        .for_order(OrderRef::Sales(order.id))
        .describe(format!("{} {}", why, order.serial_number)),
    )
    .await?;
    Ok(())
}

fn order_query(key: &DocumentKey) -> sea_orm::Select<SalesOrder> {
    match key {
        DocumentKey::Id(id) => SalesOrder::find_by_id(*id),
        DocumentKey::Serial(serial) => {
            SalesOrder::find().filter(sales_order::Column::SerialNumber.eq(serial.as_str()))
        }
    }
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    key: &DocumentKey,
) -> Result<sales_order::Model, ServiceError> {
    order_query(key)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Sales order", key))
}

async fn lock_order(
    txn: &DatabaseTransaction,
    key: &DocumentKey,
) -> Result<sales_order::Model, ServiceError> {
    order_query(key)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Sales order", key))
}

async fn find_invoice<C: ConnectionTrait>(
    conn: &C,
    key: &DocumentKey,
) -> Result<sales_invoice::Model, ServiceError> {
    let query = match key {
        DocumentKey::Id(id) => SalesInvoice::find_by_id(*id),
        DocumentKey::Serial(serial) => {
            SalesInvoice::find().filter(sales_invoice::Column::SerialNumber.eq(serial.as_str()))
        }
    };
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Sales invoice", key))
}

async fn find_delivery_note<C: ConnectionTrait>(
    conn: &C,
    key: &DocumentKey,
) -> Result<delivery_note::Model, ServiceError> {
    let query = match key {
        DocumentKey::Id(id) => DeliveryNote::find_by_id(*id),
        DocumentKey::Serial(serial) => {
            DeliveryNote::find().filter(delivery_note::Column::SerialNumber.eq(serial.as_str()))
        }
    };
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Delivery note", key))
}

async fn find_return<C: ConnectionTrait>(
    conn: &C,
    key: &DocumentKey,
    lock: bool,
) -> Result<sales_order_return::Model, ServiceError> {
    let mut query = match key {
        DocumentKey::Id(id) => SalesOrderReturn::find_by_id(*id),
        DocumentKey::Serial(serial) => SalesOrderReturn::find()
            .filter(sales_order_return::Column::SerialNumber.eq(serial.as_str())),
    };
    if lock {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Sales return", key))
}

async fn active_invoice_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<sales_invoice::Model>, ServiceError> {
    Ok(SalesInvoice::find()
        .filter(sales_invoice::Column::SalesOrderId.eq(order_id))
        .filter(sales_invoice::Column::Status.eq(DocumentStatus::Active))
        .one(conn)
        .await?)
}

async fn active_delivery_note_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<delivery_note::Model>, ServiceError> {
    Ok(DeliveryNote::find()
        .filter(delivery_note::Column::SalesOrderId.eq(order_id))
        .filter(delivery_note::Column::Status.eq(DocumentStatus::Active))
        .one(conn)
        .await?)
}

async fn lines_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<sales_order_detail::Model>, ServiceError> {
    Ok(SalesOrderDetail::find()
        .filter(sales_order_detail::Column::SalesOrderId.eq(order_id))
        .order_by_asc(sales_order_detail::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn line_of(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    detail_id: Uuid,
) -> Result<sales_order_detail::Model, ServiceError> {
    SalesOrderDetail::find_by_id(detail_id)
        .filter(sales_order_detail::Column::SalesOrderId.eq(order_id))
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Sales order line", detail_id))
}

async fn adjust_total(
    txn: &DatabaseTransaction,
    order: sales_order::Model,
    delta: Decimal,
) -> Result<sales_order::Model, ServiceError> {
    let total = order.total_amount + delta;
    let mut active: sales_order::ActiveModel = order.into();
    active.total_amount = Set(total);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

async fn set_status(
    txn: &DatabaseTransaction,
    order: sales_order::Model,
    status: SalesOrderStatus,
) -> Result<sales_order::Model, ServiceError> {
    debug!(order_id = %order.id, from = %order.status, to = %status, "Sales order status changed");
    let mut active: sales_order::ActiveModel = order.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

async fn refresh_status(
    txn: &DatabaseTransaction,
    order: sales_order::Model,
) -> Result<sales_order::Model, ServiceError> {
    let lines = lines_in(txn, order.id).await?;
    let ordered: Decimal = lines.iter().map(|l| l.quantity).sum();
    let active = reversal::active_sales_returns_in(txn, order.id).await?;
    let returned = reversal::returned_total(active.iter().map(|r| &r.quantity));
    let has_note = active_delivery_note_in(txn, order.id).await?.is_some();
    let has_invoice = active_invoice_in(txn, order.id).await?.is_some();

    let status = reversal::sales_status_after_returns(ordered, returned, has_note, has_invoice);
    if status == order.status {
        return Ok(order);
    }
    set_status(txn, order, status).await
}

async fn return_batches_in<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
) -> Result<Vec<sales_order_return_batch::Model>, ServiceError> {
    Ok(SalesOrderReturnBatch::find()
        .filter(sales_order_return_batch::Column::ReturnId.eq(return_id))
        .order_by_asc(sales_order_return_batch::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn returns_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<SalesReturnView>, ServiceError> {
    let records = SalesOrderReturn::find()
        .filter(sales_order_return::Column::SalesOrderId.eq(order_id))
        .order_by_asc(sales_order_return::Column::CreatedAt)
        .all(conn)
        .await?;

    let mut views = Vec::with_capacity(records.len());
    for record in records {
        let batches = return_batches_in(conn, record.id).await?;
        views.push(SalesReturnView { record, batches });
    }
    Ok(views)
}

async fn view_in<C: ConnectionTrait>(
    conn: &C,
    order: sales_order::Model,
) -> Result<SalesOrderView, ServiceError> {
    let lines = lines_in(conn, order.id).await?;
    let invoice = active_invoice_in(conn, order.id).await?;
    let delivery_note = active_delivery_note_in(conn, order.id).await?;
    let returns = returns_in(conn, order.id).await?;

    Ok(SalesOrderView {
        order,
        lines,
        invoice,
        delivery_note,
        returns,
    })
}
