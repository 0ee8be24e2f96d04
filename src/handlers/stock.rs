use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response, Actor};
use crate::commands::stock::TransferStockCommand;
use crate::errors::ServiceError;
use crate::AppState;

/// Batch, storage and transfer endpoints
pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/batches/:batch_id", get(get_batch))
        .route("/batches/:batch_id/verify", get(verify_batch))
        .route("/batches/:batch_id/movements", get(batch_movements))
        .route("/products/:product_id/batches", get(product_batches))
        .route("/storages/:storage_id/contents", get(storage_contents))
        .route("/transfers", post(transfer_stock))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.stock.get_batch(batch_id).await?))
}

async fn verify_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.stock.verify_batch(batch_id).await?))
}

async fn batch_movements(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let entries = state.inventory_ledger.entries_for_batch(batch_id).await?;
    Ok(success_response(entries))
}

async fn product_batches(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.stock.batches_for_product(product_id).await?,
    ))
}

async fn storage_contents(
    State(state): State<AppState>,
    Path(storage_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.stock.storage_contents(storage_id).await?,
    ))
}

async fn transfer_stock(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Json(payload): Json<TransferStockCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.stock.transfer_stock(actor_id, payload).await?;
    Ok(created_response(outcome))
}
