use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ensure_payment_terms, positive_decimal, PageRequest, StorageAllocation};
use crate::entities::sales_order::SalesOrderStatus;
use crate::entities::PaymentMethod;
use crate::errors::ServiceError;

/// A sold quantity taken from one specific batch-storage row.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SalesOrderLineInput {
    pub batch_storage_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
    #[validate(custom = "positive_decimal")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSalesOrderCommand {
    pub customer_id: Uuid,
    pub order_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payment_due_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "a sales order needs at least one line"))]
    #[validate]
    pub lines: Vec<SalesOrderLineInput>,
    /// Issue the invoice in the same transaction.
    #[serde(default)]
    pub create_invoice: bool,
}

impl CreateSalesOrderCommand {
    pub fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        ensure_payment_terms(self.payment_method, self.payment_due_date)
    }

    pub fn total_amount(&self) -> Decimal {
        self.lines.iter().map(|l| l.quantity * l.price).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateSalesOrderItemCommand {
    #[validate(custom = "positive_decimal")]
    pub quantity: Option<Decimal>,
    #[validate(custom = "positive_decimal")]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceCommand {
    pub invoice_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateDeliveryNoteCommand {
    pub delivery_date: Option<NaiveDate>,
    #[validate(length(max = 255))]
    pub recipient: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReturnSalesItemsCommand {
    pub detail_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
    /// Storages the goods are put back into, all for the line's batch.
    #[validate(length(min = 1))]
    #[validate]
    pub allocations: Vec<StorageAllocation>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

impl ReturnSalesItemsCommand {
    pub fn allocated_quantity(&self) -> Decimal {
        super::sum_allocations(self.allocations.iter().map(|a| &a.quantity))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesOrderFilter {
    pub status: Option<SalesOrderStatus>,
    pub customer_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl SalesOrderFilter {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}
