//! Trade ledger library
//!
//! Purchase and sales order workflows over a batch/storage inventory, with an
//! append-only inventory log and financial ledger recording every movement.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::services::{
    financial_ledger::FinancialLedger, inventory_ledger::InventoryLedger,
    purchase_orders::PurchaseOrderService, sales_orders::SalesOrderService, serial::SerialGenerator,
    stock::StockService, PageLimits,
};

pub use crate::handlers::api_v1_routes;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub sales_orders: Arc<SalesOrderService>,
    pub stock: Arc<StockService>,
    pub inventory_ledger: Arc<InventoryLedger>,
    pub financial_ledger: Arc<FinancialLedger>,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: AppConfig) -> Self {
        let serials = SerialGenerator::new(config.serial_width);
        let limits = PageLimits::from(&config);
        Self {
            purchase_orders: Arc::new(PurchaseOrderService::new(db.clone(), serials, limits)),
            sales_orders: Arc::new(SalesOrderService::new(db.clone(), serials, limits)),
            stock: Arc::new(StockService::new(db.clone())),
            inventory_ledger: Arc::new(InventoryLedger::new(db.clone())),
            financial_ledger: Arc::new(FinancialLedger::new(db.clone())),
            db,
            config,
        }
    }
}

/// The full HTTP application: health probes plus the v1 API.
pub fn app_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(|| async { "trade-ledger up" }))
        .nest("/health", handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .layer(middleware::http_trace_layer())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}
