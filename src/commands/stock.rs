use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::positive_decimal;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferStockCommand {
    pub batch_id: Uuid,
    pub from_storage_id: Uuid,
    pub to_storage_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}
