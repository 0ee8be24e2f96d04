use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A user-entered financial entry; the only kind a user may later cancel.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordManualEntryCommand {
    #[validate(custom = "non_zero")]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
}

fn non_zero(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_zero() {
        let mut err = ValidationError::new("non_zero");
        err.message = Some("amount must not be zero".into());
        Err(err)
    } else {
        Ok(())
    }
}
