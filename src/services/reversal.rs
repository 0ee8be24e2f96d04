//! Return accounting shared by the purchase and sales workflows.
//!
//! The arithmetic is pure; the `*_in` helpers read active return totals
//! through the caller's transaction.

use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::entities::purchase_order_return::{self, PurchaseReturnStatus};
use crate::entities::sales_order::SalesOrderStatus;
use crate::entities::sales_order_return::{self, SalesReturnStatus};
use crate::errors::ServiceError;

/// Remaining quantity below this counts as fully returned.
pub const RETURN_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Money is kept to four decimal places, matching the column scale.
const MONEY_SCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnProgress {
    None,
    Partial,
    Full,
}

pub fn progress(ordered: Decimal, returned: Decimal) -> ReturnProgress {
    if returned <= Decimal::ZERO {
        ReturnProgress::None
    } else if ordered - returned < RETURN_EPSILON {
        ReturnProgress::Full
    } else {
        ReturnProgress::Partial
    }
}

/// A line can give back at most what it was ordered with.
pub fn ensure_returnable(
    line_quantity: Decimal,
    already_returned: Decimal,
    requested: Decimal,
) -> Result<(), ServiceError> {
    let remaining = line_quantity - already_returned;
    if requested > remaining {
        return Err(ServiceError::BusinessRule(format!(
            "return of {} exceeds the {} still returnable on this line",
            requested, remaining
        )));
    }
    Ok(())
}

pub fn ensure_allocations_match(requested: Decimal, allocated: Decimal) -> Result<(), ServiceError> {
    if requested != allocated {
        return Err(ServiceError::BusinessRule(format!(
            "allocations total {} but {} was requested",
            allocated, requested
        )));
    }
    Ok(())
}

/// Share of `order_total` that `quantity` represents across the whole order.
pub fn proportional_amount(
    quantity: Decimal,
    total_ordered: Decimal,
    order_total: Decimal,
) -> Decimal {
    if total_ordered.is_zero() {
        return Decimal::ZERO;
    }
    (quantity / total_ordered * order_total)
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn purchase_status_after_returns(ordered: Decimal, returned: Decimal) -> PurchaseOrderStatus {
    match progress(ordered, returned) {
        ReturnProgress::Full => PurchaseOrderStatus::Returned,
        ReturnProgress::Partial => PurchaseOrderStatus::PartiallyReturned,
        ReturnProgress::None => PurchaseOrderStatus::Completed,
    }
}

/// With no active returns left, a sales order falls back to the furthest
/// downstream document that is still active.
pub fn sales_status_after_returns(
    ordered: Decimal,
    returned: Decimal,
    has_delivery_note: bool,
    has_invoice: bool,
) -> SalesOrderStatus {
    match progress(ordered, returned) {
        ReturnProgress::Full => SalesOrderStatus::Returned,
        ReturnProgress::Partial => SalesOrderStatus::PartiallyReturned,
        ReturnProgress::None if has_delivery_note => SalesOrderStatus::Delivery,
        ReturnProgress::None if has_invoice => SalesOrderStatus::Invoice,
        ReturnProgress::None => SalesOrderStatus::Order,
    }
}

pub async fn active_purchase_returns_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<purchase_order_return::Model>, ServiceError> {
    Ok(purchase_order_return::Entity::find()
        .filter(purchase_order_return::Column::PurchaseOrderId.eq(order_id))
        .filter(purchase_order_return::Column::Status.eq(PurchaseReturnStatus::Returned))
        .all(conn)
        .await?)
}

pub async fn active_sales_returns_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<sales_order_return::Model>, ServiceError> {
    Ok(sales_order_return::Entity::find()
        .filter(sales_order_return::Column::SalesOrderId.eq(order_id))
        .filter(sales_order_return::Column::Status.eq(SalesReturnStatus::Completed))
        .all(conn)
        .await?)
}

pub fn returned_total<'a, I>(quantities: I) -> Decimal
where
    I: IntoIterator<Item = &'a Decimal>,
{
    quantities.into_iter().copied().sum()
}
