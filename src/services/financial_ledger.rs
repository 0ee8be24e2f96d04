use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::commands::ledger::RecordManualEntryCommand;
use crate::commands::CancelCommand;
use crate::db::{self, DbPool};
use crate::entities::financial_ledger::{
    self, Entity as FinancialLedgerEntry, FinancialKind, LedgerDirection,
};
use crate::entities::{purchase_order, sales_order};
use crate::errors::ServiceError;
use crate::services::OrderRef;

/// Net amount booked under one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindTotal {
    pub kind: FinancialKind,
    pub entries: u64,
    pub total: Decimal,
}

/// Append-only record of money movements.
///
/// Workflow effects go through [`FinancialLedger::record_in`] and are flagged
/// `is_system`. Manual entries are the only ones a user may reverse, and a
/// reversal is itself a new `manual_cancel` row pointing at the original.
#[derive(Clone)]
pub struct FinancialLedger {
    db_pool: Arc<DbPool>,
}

impl FinancialLedger {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Appends a system entry inside the caller's transaction.
    pub async fn record_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        kind: FinancialKind,
        amount: Decimal,
        order: OrderRef,
        description: impl Into<String>,
    ) -> Result<financial_ledger::Model, ServiceError> {
        append(
            txn,
            NewEntry {
                actor_id,
                kind,
                amount,
                purchase_order_id: order.purchase_order_id(),
                sales_order_id: order.sales_order_id(),
                reverses_entry_id: None,
                description: Some(description.into()),
                is_system: true,
            },
        )
        .await
    }

    #[instrument(skip(self, command), fields(amount = %command.amount))]
    pub async fn record_manual(
        &self,
        actor_id: Uuid,
        command: RecordManualEntryCommand,
    ) -> Result<financial_ledger::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::record_manual_in(&txn, actor_id, command).await;
        let entry = db::finish(txn, "ledger.record_manual", started, outcome).await?;

        info!(entry_id = %entry.id, "Manual ledger entry recorded");
        Ok(entry)
    }

    async fn record_manual_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        command: RecordManualEntryCommand,
    ) -> Result<financial_ledger::Model, ServiceError> {
        if let Some(id) = command.purchase_order_id {
            purchase_order::Entity::find_by_id(id)
                .one(txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Purchase order", id))?;
        }
        if let Some(id) = command.sales_order_id {
            sales_order::Entity::find_by_id(id)
                .one(txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Sales order", id))?;
        }

        append(
            txn,
            NewEntry {
                actor_id,
                kind: FinancialKind::Manual,
                amount: command.amount,
                purchase_order_id: command.purchase_order_id,
                sales_order_id: command.sales_order_id,
                reverses_entry_id: None,
                description: Some(command.description),
                is_system: false,
            },
        )
        .await
    }

    /// Reverses a manual entry by appending its opposite.
    #[instrument(skip(self, command))]
    pub async fn cancel_manual(
        &self,
        actor_id: Uuid,
        entry_id: Uuid,
        command: CancelCommand,
    ) -> Result<financial_ledger::Model, ServiceError> {
        command.validate()?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let started = Instant::now();
        let outcome = Self::cancel_manual_in(&txn, actor_id, entry_id, command).await;
        let reversal = db::finish(txn, "ledger.cancel_manual", started, outcome).await?;

        info!(entry_id = %entry_id, reversal_id = %reversal.id, "Manual ledger entry cancelled");
        Ok(reversal)
    }

    async fn cancel_manual_in(
        txn: &DatabaseTransaction,
        actor_id: Uuid,
        entry_id: Uuid,
        command: CancelCommand,
    ) -> Result<financial_ledger::Model, ServiceError> {
        // The lock on the original serializes competing cancellations.
        let original = FinancialLedgerEntry::find_by_id(entry_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ledger entry", entry_id))?;

        if original.is_system {
            return Err(ServiceError::BusinessRule(format!(
                "ledger entry {} was recorded by the system and cannot be cancelled",
                entry_id
            )));
        }
        if original.kind != FinancialKind::Manual {
            return Err(ServiceError::BusinessRule(format!(
                "only manual entries can be cancelled, {} is {}",
                entry_id,
                original.kind.to_value()
            )));
        }

        let already = FinancialLedgerEntry::find()
            .filter(financial_ledger::Column::ReversesEntryId.eq(entry_id))
            .count(txn)
            .await?;
        if already > 0 {
            return Err(ServiceError::BusinessRule(format!(
                "ledger entry {} is already cancelled",
                entry_id
            )));
        }

        let description = match command.reason {
            Some(reason) => format!("Cancellation of manual entry: {}", reason),
            None => "Cancellation of manual entry".to_string(),
        };
        append(
            txn,
            NewEntry {
                actor_id,
                kind: FinancialKind::ManualCancel,
                amount: -original.amount,
                purchase_order_id: original.purchase_order_id,
                sales_order_id: original.sales_order_id,
                reverses_entry_id: Some(original.id),
                description: Some(description),
                is_system: false,
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_entry(&self, entry_id: Uuid) -> Result<financial_ledger::Model, ServiceError> {
        FinancialLedgerEntry::find_by_id(entry_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Ledger entry", entry_id))
    }

    /// Entries linked to one order, newest first.
    #[instrument(skip(self))]
    pub async fn entries_for_order(
        &self,
        order: OrderRef,
    ) -> Result<Vec<financial_ledger::Model>, ServiceError> {
        Ok(order_filter(order)
            .order_by_desc(financial_ledger::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await?)
    }

    /// Net amount per kind, optionally restricted to one order.
    #[instrument(skip(self))]
    pub async fn totals_by_kind(
        &self,
        order: Option<OrderRef>,
    ) -> Result<Vec<KindTotal>, ServiceError> {
        let query = match order {
            Some(order) => order_filter(order),
            None => FinancialLedgerEntry::find(),
        };
        let rows: Vec<(FinancialKind, i64, Option<Decimal>)> = query
            .select_only()
            .column(financial_ledger::Column::Kind)
            .column_as(Expr::col(financial_ledger::Column::Id).count(), "entries")
            .column_as(Expr::col(financial_ledger::Column::Amount).sum(), "total")
            .group_by(financial_ledger::Column::Kind)
            .order_by_asc(financial_ledger::Column::Kind)
            .into_tuple()
            .all(self.db_pool.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(kind, entries, total)| KindTotal {
                kind,
                entries: u64::try_from(entries).unwrap_or_default(),
                total: total.unwrap_or_default(),
            })
            .collect())
    }
}

struct NewEntry {
    actor_id: Uuid,
    kind: FinancialKind,
    amount: Decimal,
    purchase_order_id: Option<Uuid>,
    sales_order_id: Option<Uuid>,
    reverses_entry_id: Option<Uuid>,
    description: Option<String>,
    is_system: bool,
}

async fn append(
    txn: &DatabaseTransaction,
    entry: NewEntry,
) -> Result<financial_ledger::Model, ServiceError> {
    let row = financial_ledger::ActiveModel {
        id: Set(Uuid::new_v4()),
        actor_id: Set(entry.actor_id),
        kind: Set(entry.kind),
        direction: Set(LedgerDirection::of(entry.amount)),
        amount: Set(entry.amount),
        purchase_order_id: Set(entry.purchase_order_id),
        sales_order_id: Set(entry.sales_order_id),
        reverses_entry_id: Set(entry.reverses_entry_id),
        description: Set(entry.description),
        is_system: Set(entry.is_system),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    counter!("trade_ledger.financial_ledger.appended", 1, "kind" => row.kind.to_value());
    debug!(entry_id = %row.id, kind = ?row.kind, amount = %row.amount, "Financial entry recorded");
    Ok(row)
}

fn order_filter(order: OrderRef) -> sea_orm::Select<FinancialLedgerEntry> {
    match order {
        OrderRef::Purchase(id) => {
            FinancialLedgerEntry::find().filter(financial_ledger::Column::PurchaseOrderId.eq(id))
        }
        OrderRef::Sales(id) => {
            FinancialLedgerEntry::find().filter(financial_ledger::Column::SalesOrderId.eq(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn direction_follows_sign() {
        assert_eq!(LedgerDirection::of(dec!(-400)), LedgerDirection::Credit);
        assert_eq!(LedgerDirection::of(dec!(1000)), LedgerDirection::Debit);
        assert_eq!(LedgerDirection::of(Decimal::ZERO), LedgerDirection::Debit);
        assert_eq!(LedgerDirection::of(-Decimal::ZERO), LedgerDirection::Debit);
    }
}
