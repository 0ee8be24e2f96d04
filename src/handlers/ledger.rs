use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{created_response, success_response, Actor};
use crate::commands::ledger::RecordManualEntryCommand;
use crate::commands::CancelCommand;
use crate::entities::{financial_ledger, inventory_log};
use crate::errors::ServiceError;
use crate::services::OrderRef;
use crate::AppState;

/// Both ledgers' rows for one order.
#[derive(Debug, Serialize)]
pub struct OrderLedger {
    pub order: OrderRef,
    pub financial: Vec<financial_ledger::Model>,
    pub inventory: Vec<inventory_log::Model>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TotalsQuery {
    pub purchase_order_id: Option<Uuid>,
    pub sales_order_id: Option<Uuid>,
}

impl TotalsQuery {
    fn order(&self) -> Result<Option<OrderRef>, ServiceError> {
        match (self.purchase_order_id, self.sales_order_id) {
            (Some(_), Some(_)) => Err(ServiceError::BadRequest(
                "filter by purchase_order_id or sales_order_id, not both".to_string(),
            )),
            (Some(id), None) => Ok(Some(OrderRef::Purchase(id))),
            (None, Some(id)) => Ok(Some(OrderRef::Sales(id))),
            (None, None) => Ok(None),
        }
    }
}

/// Financial ledger endpoints
pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/entries", post(record_manual_entry))
        .route("/entries/:entry_id", get(get_entry))
        .route("/entries/:entry_id/cancel", post(cancel_manual_entry))
        .route("/totals", get(totals_by_kind))
        .route("/purchase-orders/:order_id", get(purchase_order_ledger))
        .route("/sales-orders/:order_id", get(sales_order_ledger))
}

async fn record_manual_entry(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Json(payload): Json<RecordManualEntryCommand>,
) -> Result<impl IntoResponse, ServiceError> {
    let entry = state.financial_ledger.record_manual(actor_id, payload).await?;
    Ok(created_response(entry))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.financial_ledger.get_entry(entry_id).await?,
    ))
}

async fn cancel_manual_entry(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(entry_id): Path<Uuid>,
    payload: Option<Json<CancelCommand>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    let reversal = state
        .financial_ledger
        .cancel_manual(actor_id, entry_id, payload)
        .await?;
    Ok(created_response(reversal))
}

async fn totals_by_kind(
    State(state): State<AppState>,
    Query(query): Query<TotalsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let totals = state.financial_ledger.totals_by_kind(query.order()?).await?;
    Ok(success_response(totals))
}

async fn purchase_order_ledger(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        order_ledger(&state, OrderRef::Purchase(order_id)).await?,
    ))
}

async fn sales_order_ledger(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        order_ledger(&state, OrderRef::Sales(order_id)).await?,
    ))
}

async fn order_ledger(state: &AppState, order: OrderRef) -> Result<OrderLedger, ServiceError> {
    let financial = state.financial_ledger.entries_for_order(order).await?;
    let inventory = state.inventory_ledger.entries_for_order(order).await?;
    Ok(OrderLedger {
        order,
        financial,
        inventory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_query_accepts_one_order_at_most() {
        let id = Uuid::new_v4();
        let both = TotalsQuery {
            purchase_order_id: Some(id),
            sales_order_id: Some(id),
        };
        assert!(both.order().is_err());

        let sales = TotalsQuery {
            sales_order_id: Some(id),
            ..Default::default()
        };
        assert_eq!(sales.order().unwrap(), Some(OrderRef::Sales(id)));
        assert_eq!(TotalsQuery::default().order().unwrap(), None);
    }
}
