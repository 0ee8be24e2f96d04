use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use tracing::debug;

use crate::entities::serial_counter::{self, Entity as SerialCounter};
use crate::errors::ServiceError;

/// Two-letter prefixes of every numbered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentPrefix {
    PurchaseOrder,
    SalesOrder,
    SalesInvoice,
    DeliveryNote,
    PurchaseReturn,
    SalesReturn,
}

impl DocumentPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "PO",
            Self::SalesOrder => "SO",
            Self::SalesInvoice => "SI",
            Self::DeliveryNote => "DN",
            Self::PurchaseReturn => "PR",
            Self::SalesReturn => "SR",
        }
    }
}

/// Issues human-readable document numbers such as `PO000123`.
///
/// The counter row is bumped with a single `UPDATE ... SET last_value =
/// last_value + 1` inside the caller's transaction. The row lock that update
/// takes serializes concurrent issuers of the same prefix until the caller
/// commits or rolls back; a rollback leaves a gap, never a duplicate.
#[derive(Debug, Clone, Copy)]
pub struct SerialGenerator {
    width: usize,
}

impl SerialGenerator {
    pub fn new(width: u32) -> Self {
        Self {
            width: width as usize,
        }
    }

    pub fn format(&self, prefix: DocumentPrefix, value: i64) -> String {
        format!("{}{:0width$}", prefix.as_str(), value, width = self.width)
    }

    /// Must be the first write of the caller's transaction.
    pub async fn next_in<C>(&self, conn: &C, prefix: DocumentPrefix) -> Result<String, ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let bumped = SerialCounter::update_many()
            .col_expr(
                serial_counter::Column::LastValue,
                Expr::col(serial_counter::Column::LastValue).add(1),
            )
            .col_expr(serial_counter::Column::UpdatedAt, Expr::value(now))
            .filter(serial_counter::Column::Prefix.eq(prefix.as_str()))
            .exec(conn)
            .await?;

        if bumped.rows_affected == 0 {
            serial_counter::ActiveModel {
                prefix: Set(prefix.as_str().to_string()),
                last_value: Set(1),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?;
        }

        let value: i64 = SerialCounter::find_by_id(prefix.as_str().to_string())
            .select_only()
            .column(serial_counter::Column::LastValue)
            .into_tuple()
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "serial counter {} vanished inside its transaction",
                    prefix.as_str()
                ))
            })?;

        let serial = self.format(prefix, value);
        debug!(serial = %serial, "Issued serial number");
        Ok(serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_configured_width() {
        let serials = SerialGenerator::new(6);
        assert_eq!(serials.format(DocumentPrefix::PurchaseOrder, 123), "PO000123");
        assert_eq!(serials.format(DocumentPrefix::DeliveryNote, 1), "DN000001");
    }

    #[test]
    fn overflowing_width_keeps_all_digits() {
        let serials = SerialGenerator::new(3);
        assert_eq!(serials.format(DocumentPrefix::SalesOrder, 12345), "SO12345");
    }
}
