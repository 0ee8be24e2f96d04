use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use super::common::{created_response, document_key, success_response, Actor, PaginatedResponse};
use crate::commands::purchase_orders::{
    CompletePurchaseOrderCommand, CreatePurchaseOrderCommand, CreatePurchaseReturnCommand,
    PurchaseOrderFilter, PurchaseOrderLineInput, UpdatePurchaseOrderItemCommand,
};
use crate::commands::CancelCommand;
use crate::errors::ServiceError;
use crate::AppState;

/// Creates the router for purchase order endpoints
pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_purchase_order).get(list_purchase_orders))
        .route("/:key", get(get_purchase_order))
        .route("/:key/check", post(check_purchase_order))
        .route("/:key/complete", post(complete_purchase_order))
        .route("/:key/cancel", post(cancel_purchase_order))
        .route("/:key/items", post(add_purchase_order_item))
        .route(
            "/:key/items/:detail_id",
            put(update_purchase_order_item).delete(remove_purchase_order_item),
        )
        .route(
            "/:key/returns",
            post(create_purchase_return).get(list_purchase_returns),
        )
}

/// Routes addressing a purchase return by its own key
pub fn purchase_return_routes() -> Router<AppState> {
    Router::new()
        .route("/:key", get(get_purchase_return))
        .route("/:key/cancel", post(cancel_purchase_return))
}

async fn create_purchase_order(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Json(payload): Json<CreatePurchaseOrderCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.purchase_orders.create(actor_id, payload).await?;
    Ok(created_response(view))
}

async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(filter): Query<PurchaseOrderFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.purchase_orders.list(filter).await?;
    Ok(success_response(PaginatedResponse::from(page)))
}

async fn get_purchase_order(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.purchase_orders.get(document_key(&key)?).await?;
    Ok(success_response(view))
}

async fn check_purchase_order(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .purchase_orders
        .check(actor_id, document_key(&key)?)
        .await?;
    Ok(success_response(order))
}

async fn complete_purchase_order(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    Json(payload): Json<CompletePurchaseOrderCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .purchase_orders
        .complete(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(view))
}

async fn cancel_purchase_order(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let order = state
        .purchase_orders
        .cancel(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(order))
}

async fn add_purchase_order_item(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    Json(payload): Json<PurchaseOrderLineInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .purchase_orders
        .add_item(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(created_response(view))
}

async fn update_purchase_order_item(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path((key, detail_id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdatePurchaseOrderItemCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .purchase_orders
        .update_item(actor_id, document_key(&key)?, detail_id, payload)
        .await?;
    Ok(success_response(view))
}

async fn remove_purchase_order_item(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path((key, detail_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .purchase_orders
        .remove_item(actor_id, document_key(&key)?, detail_id)
        .await?;
    Ok(success_response(view))
}

async fn create_purchase_return(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    Json(payload): Json<CreatePurchaseReturnCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .purchase_orders
        .create_return(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(created_response(view))
}

async fn list_purchase_returns(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let returns = state
        .purchase_orders
        .list_returns(document_key(&key)?)
        .await?;
    Ok(success_response(returns))
}

async fn get_purchase_return(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.purchase_orders.get_return(document_key(&key)?).await?;
    Ok(success_response(view))
}

async fn cancel_purchase_return(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(key): Path<String>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let view = state
        .purchase_orders
        .cancel_return(actor_id, document_key(&key)?, payload)
        .await?;
    Ok(success_response(view))
}
