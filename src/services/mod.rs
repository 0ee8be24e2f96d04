// Building blocks shared by the workflows
pub mod allocator;
pub mod financial_ledger;
pub mod inventory_ledger;
pub mod lifecycle;
pub mod reference;
pub mod reversal;
pub mod serial;

// Workflows and read paths
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commands::PageRequest;
use crate::config::AppConfig;

/// The order a ledger row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum OrderRef {
    Purchase(Uuid),
    Sales(Uuid),
}

impl OrderRef {
    pub fn purchase_order_id(&self) -> Option<Uuid> {
        match self {
            OrderRef::Purchase(id) => Some(*id),
            OrderRef::Sales(_) => None,
        }
    }

    pub fn sales_order_id(&self) -> Option<Uuid> {
        match self {
            OrderRef::Sales(id) => Some(*id),
            OrderRef::Purchase(_) => None,
        }
    }
}

/// Page size bounds handed to every list operation.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_size: u64,
    pub max_size: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 100,
        }
    }
}

impl From<&AppConfig> for PageLimits {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_size: cfg.api_default_page_size,
            max_size: cfg.api_max_page_size,
        }
    }
}

impl PageLimits {
    /// One-based page and a per-page size clamped to `1..=max_size`.
    pub fn resolve(&self, request: PageRequest) -> (u64, u64) {
        let per_page = request
            .per_page
            .unwrap_or(self.default_size)
            .clamp(1, self.max_size.max(1));
        (request.page(), per_page)
    }
}

/// One page of a list result.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let limits = PageLimits::default();
        assert_eq!(limits.resolve(PageRequest::default()), (1, 20));
        assert_eq!(
            limits.resolve(PageRequest {
                page: Some(0),
                per_page: Some(1_000)
            }),
            (1, 100)
        );
        assert_eq!(
            limits.resolve(PageRequest {
                page: Some(3),
                per_page: Some(0)
            }),
            (3, 1)
        );
    }
}
