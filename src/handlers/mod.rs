pub mod common;
pub mod health;
pub mod ledger;
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock;

use axum::Router;

use crate::AppState;

/// Every versioned endpoint, mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/purchase-orders", purchase_orders::purchase_order_routes())
        .nest("/purchase-returns", purchase_orders::purchase_return_routes())
        .nest("/sales-orders", sales_orders::sales_order_routes())
        .nest("/invoices", sales_orders::invoice_routes())
        .nest("/delivery-notes", sales_orders::delivery_note_routes())
        .nest("/sales-returns", sales_orders::sales_return_routes())
        .nest("/stock", stock::stock_routes())
        .nest("/ledger", ledger::ledger_routes())
}
