use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Immutable record of one money movement.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "financial_ledger")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub actor_id: Uuid,
    pub kind: FinancialKind,
    pub direction: LedgerDirection,
    /// Signed; negative amounts are credits.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
    /// The entry this one compensates, for manual cancellations.
    pub reverses_entry_id: Option<Uuid>,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum FinancialKind {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "purchase_return")]
    PurchaseReturn,
    #[sea_orm(string_value = "purchase_cancel")]
    PurchaseCancel,
    #[sea_orm(string_value = "purchase_return_cancel")]
    PurchaseReturnCancel,
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "sale_return")]
    SaleReturn,
    #[sea_orm(string_value = "sale_cancel")]
    SaleCancel,
    #[sea_orm(string_value = "sale_return_cancel")]
    SaleReturnCancel,
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "manual_cancel")]
    ManualCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum LedgerDirection {
    #[sea_orm(string_value = "debit")]
    Debit,
    #[sea_orm(string_value = "credit")]
    Credit,
}

impl LedgerDirection {
    pub fn of(amount: Decimal) -> Self {
        if amount.is_sign_negative() && !amount.is_zero() {
            LedgerDirection::Credit
        } else {
            LedgerDirection::Debit
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
