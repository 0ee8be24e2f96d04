use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ensure_payment_terms, positive_decimal, PageRequest, StorageAllocation};
use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::entities::PaymentMethod;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderLineInput {
    pub product_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
    #[validate(custom = "positive_decimal")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderCommand {
    pub supplier_id: Uuid,
    pub order_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payment_due_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "a purchase order needs at least one line"))]
    #[validate]
    pub lines: Vec<PurchaseOrderLineInput>,
}

impl CreatePurchaseOrderCommand {
    pub fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        ensure_payment_terms(self.payment_method, self.payment_due_date)
    }

    pub fn total_amount(&self) -> Decimal {
        self.lines.iter().map(|l| l.quantity * l.price).sum()
    }
}

/// Where the goods of one order line were put away.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceivedItem {
    pub detail_id: Uuid,
    #[validate(length(min = 1, message = "a received line needs at least one storage"))]
    #[validate]
    pub allocations: Vec<StorageAllocation>,
}

impl ReceivedItem {
    pub fn received_quantity(&self) -> Decimal {
        super::sum_allocations(self.allocations.iter().map(|a| &a.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompletePurchaseOrderCommand {
    #[validate(length(min = 1))]
    #[validate]
    pub received_items: Vec<ReceivedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdatePurchaseOrderItemCommand {
    #[validate(custom = "positive_decimal")]
    pub quantity: Option<Decimal>,
    #[validate(custom = "positive_decimal")]
    pub price: Option<Decimal>,
}

/// Quantity taken back out of one batch at one storage.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchAllocation {
    pub batch_id: Uuid,
    pub storage_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseReturnCommand {
    pub detail_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
    #[validate(length(min = 1))]
    #[validate]
    pub allocations: Vec<BatchAllocation>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

impl CreatePurchaseReturnCommand {
    pub fn allocated_quantity(&self) -> Decimal {
        super::sum_allocations(self.allocations.iter().map(|a| &a.quantity))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PurchaseOrderFilter {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}
