//! sea-orm entities backing the order-fulfillment ledger.

pub mod batch_storage;
pub mod customer;
pub mod delivery_note;
pub mod financial_ledger;
pub mod inventory_log;
pub mod product;
pub mod product_batch;
pub mod purchase_order;
pub mod purchase_order_detail;
pub mod purchase_order_return;
pub mod purchase_order_return_batch;
pub mod sales_invoice;
pub mod sales_order;
pub mod sales_order_detail;
pub mod sales_order_return;
pub mod sales_order_return_batch;
pub mod serial_counter;
pub mod shared;
pub mod storage;
pub mod supplier;

pub use shared::{DocumentStatus, PaymentMethod};
