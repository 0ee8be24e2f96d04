//! Validated inputs for every mutating ledger operation.
//!
//! Commands are checked with [`Validate`] before a transaction is opened, so
//! malformed requests never reach the datastore.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::PaymentMethod;
use crate::errors::ServiceError;

pub mod ledger;
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock;

/// A document is addressable by its internal id or its serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKey {
    Id(Uuid),
    Serial(String),
}

impl FromStr for DocumentKey {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ServiceError::ValidationError(
                "document key must not be empty".to_string(),
            ));
        }
        Ok(match Uuid::parse_str(raw) {
            Ok(id) => DocumentKey::Id(id),
            Err(_) => DocumentKey::Serial(raw.to_ascii_uppercase()),
        })
    }
}

impl From<Uuid> for DocumentKey {
    fn from(id: Uuid) -> Self {
        DocumentKey::Id(id)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Id(id) => write!(f, "{}", id),
            DocumentKey::Serial(serial) => f.write_str(serial),
        }
    }
}

/// Shared payload for every cancel operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CancelCommand {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Quantity placed into (or taken from) one storage.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageAllocation {
    pub storage_id: Uuid,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
}

/// Page request shared by list operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageRequest {
    /// One-based page number.
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }
}

pub(crate) fn positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("positive");
        err.message = Some("must be greater than zero".into());
        Err(err)
    }
}

/// Credit terms need a due date; other methods must not carry one silently.
pub(crate) fn ensure_payment_terms(
    method: PaymentMethod,
    due_date: Option<chrono::NaiveDate>,
) -> Result<(), ServiceError> {
    if method.requires_due_date() && due_date.is_none() {
        return Err(ServiceError::ValidationError(
            "payment_due_date is required for credit payment terms".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn sum_allocations<'a>(
    quantities: impl IntoIterator<Item = &'a Decimal>,
) -> Decimal {
    quantities.into_iter().copied().sum()
}
