use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment terms shared by purchase and sales orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    /// Deferred payment; a due date is mandatory.
    #[sea_orm(string_value = "credit")]
    Credit,
}

impl PaymentMethod {
    pub fn requires_due_date(&self) -> bool {
        matches!(self, PaymentMethod::Credit)
    }
}

/// Status of derived documents (invoices, delivery notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}
