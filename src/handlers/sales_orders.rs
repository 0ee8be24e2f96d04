use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use super::common::{created_response, document_key, success_response, Actor, PaginatedResponse};
use crate::commands::sales_orders::{
    CreateDeliveryNoteCommand, CreateInvoiceCommand, CreateSalesOrderCommand,
    ReturnSalesItemsCommand, SalesOrderFilter, SalesOrderLineInput, UpdateSalesOrderItemCommand,
};
use crate::commands::CancelCommand;
use crate::errors::ServiceError;
use crate::AppState;

/// Creates the router for sales order endpoints
pub fn sales_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_sales_order).get(list_sales_orders))
        .route("/:key", get(get_sales_order))
        .route("/:key/cancel", post(cancel_sales_order))
        .route("/:key/items", post(add_sales_order_item))
        .route(
            "/:key/items/:detail_id",
            put(update_sales_order_item).delete(remove_sales_order_item),
        )
        .route("/:key/invoice", post(create_invoice))
        .route("/:key/returns", post(return_items).get(list_sales_returns))
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/:key", get(get_invoice))
        .route("/:key/cancel", post(cancel_invoice))
        .route("/:key/delivery-note", post(create_delivery_note))
}

pub fn delivery_note_routes() -> Router<AppState> {
    Router::new()
        .route("/:key", get(get_delivery_note))
        .route("/:key/cancel", post(cancel_delivery_note))
}

pub fn sales_return_routes() -> Router<AppState> {
    Router::new()
        .route("/:key", get(get_sales_return))
        .route("/:key/cancel", post(cancel_sales_return))
}

async fn create_sales_order(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Json(payload): Json<CreateSalesOrderCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.sales_orders.create(actor_id, payload).await?;
    Ok(created_response(view))
}

async fn list_sales_orders(
    State(state): State<AppState>,
    Query(filter): Query<SalesOrderFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.sales_orders.list(filter).await?;
    Ok(success_response(PaginatedResponse::from(page)))
}

async fn get_sales_order(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.sales_orders.get(document_key(&key)?).await?;
    Ok(success_response(view))
}

async fn cancel_sales_order(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let view = state
        .sales_orders
        .cancel(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(view))
}

async fn add_sales_order_item(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    Json(payload): Json<SalesOrderLineInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .sales_orders
        .add_item(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(created_response(view))
}

async fn update_sales_order_item(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path((key, detail_id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdateSalesOrderItemCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .sales_orders
        .update_item(actor_id, document_key(&key)?, detail_id, payload)
        .await?;
    Ok(success_response(view))
}

async fn remove_sales_order_item(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path((key, detail_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .sales_orders
        .remove_item(actor_id, document_key(&key)?, detail_id)
        .await?;
    Ok(success_response(view))
}

async fn create_invoice(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CreateInvoiceCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let invoice = state
        .sales_orders
        .create_invoice(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(created_response(invoice))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let invoice = state.sales_orders.get_invoice(document_key(&key)?).await?;
    Ok(success_response(invoice))
}

async fn cancel_invoice(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let invoice = state
        .sales_orders
        .cancel_invoice(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(invoice))
}

async fn create_delivery_note(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CreateDeliveryNoteCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let note = state
        .sales_orders
        .create_delivery_note(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(created_response(note))
}

async fn get_delivery_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let note = state
        .sales_orders
        .get_delivery_note(document_key(&key)?)
        .await?;
    Ok(success_response(note))
}

async fn cancel_delivery_note(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let note = state
        .sales_orders
        .cancel_delivery_note(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(note))
}

async fn return_items(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    Json(payload): Json<ReturnSalesItemsCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .sales_orders
        .return_items(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(created_response(view))
}

async fn list_sales_returns(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let returns = state.sales_orders.list_returns(document_key(&key)?).await?;
    Ok(success_response(returns))
}

async fn get_sales_return(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.sales_orders.get_return(document_key(&key)?).await?;
    Ok(success_response(view))
}

async fn cancel_sales_return(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let view = state
        .sales_orders
        .cancel_return(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(view))
}
