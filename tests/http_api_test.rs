mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use test_case::test_case;

use common::TestApp;

fn purchase_body(app: &TestApp) -> Value {
    json!({
        "supplier_id": app.supplier.id,
        "order_date": "2024-03-05",
        "payment_method": "cash",
        "lines": [
            { "product_id": app.product.id, "quantity": "10", "price": "100" }
        ]
    })
}

#[tokio::test]
async fn purchase_order_lifecycle_over_http() {
    let app = TestApp::new().await;

    let (status, created) = app
        .request(Method::POST, "/api/v1/purchase-orders", Some(purchase_body(&app)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["order"]["serial_number"], "PO000001");
    assert_eq!(created["order"]["status"], "ordered");
    let detail_id = created["lines"][0]["id"].clone();

    // Serial keys are case-insensitive.
    let (status, fetched) = app.request(Method::GET, "/api/v1/purchase-orders/po000001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order"]["id"], created["order"]["id"]);

    let complete = json!({
        "received_items": [{
            "detail_id": detail_id,
            "allocations": [{ "storage_id": app.warehouse.id, "quantity": "10" }]
        }]
    });
    let (status, completed) = app
        .request(Method::POST, "/api/v1/purchase-orders/PO000001/complete", Some(complete.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["order"]["status"], "completed");
    assert_eq!(completed["batches"].as_array().map(Vec::len), Some(1));

    let (status, error) = app
        .request(Method::POST, "/api/v1/purchase-orders/PO000001/complete", Some(complete))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["current_status"], "completed");

    let (status, error) = app
        .request(Method::POST, "/api/v1/purchase-orders/PO000001/cancel", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["message"].is_string());

    let order_id = created["order"]["id"].as_str().map(str::to_owned).unwrap_or_default();
    let (status, ledger) = app
        .request(Method::GET, &format!("/api/v1/ledger/purchase-orders/{}", order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["financial"].as_array().map(Vec::len), Some(1));
    assert_eq!(ledger["inventory"].as_array().map(Vec::len), Some(1));
}

#[test_case(None ; "missing header")]
#[test_case(Some("not-a-uuid") ; "malformed header")]
#[tokio::test]
async fn mutations_require_an_actor(actor: Option<&str>) {
    let app = TestApp::new().await;
    let body = purchase_body(&app);

    let (status, error) = app
        .request_as(actor, Method::POST, "/api/v1/purchase-orders", Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "Bad Request");
    assert_eq!(app.state.purchase_orders.list(Default::default()).await.unwrap().total, 0);
}

#[tokio::test]
async fn unknown_documents_are_not_found() {
    let app = TestApp::new().await;

    for uri in [
        "/api/v1/purchase-orders/PO999999",
        "/api/v1/sales-orders/SO000001",
        "/api/v1/invoices/SI000001",
        "/api/v1/ledger/entries/8f14e45f-ceea-4e7a-9c8d-111111111111",
    ] {
        let (status, _) = app.request(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let app = TestApp::new().await;

    let mut body = purchase_body(&app);
    body["payment_method"] = json!("credit");
    let (status, _) = app.request(Method::POST, "/api/v1/purchase-orders", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let view = app.stocked(dec!(2), dec!(5)).await;
    let slot = view.batches[0].storages[0].id;
    let oversell = json!({
        "customer_id": app.customer.id,
        "order_date": "2024-03-05",
        "payment_method": "cash",
        "lines": [{ "batch_storage_id": slot, "quantity": "3", "price": "9" }]
    });
    let (status, _) = app.request(Method::POST, "/api/v1/sales-orders", Some(oversell)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn list_responses_are_paginated() {
    let app = TestApp::new().await;
    for _ in 0..3 {
        let (status, _) = app
            .request(Method::POST, "/api/v1/purchase-orders", Some(purchase_body(&app)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app
        .request(Method::GET, "/api/v1/purchase-orders?page=2&per_page=2", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["pagination"]["page"], 2);
    assert_eq!(page["pagination"]["per_page"], 2);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn manual_ledger_entries_over_http() {
    let app = TestApp::new().await;

    let (status, entry) = app
        .request(
            Method::POST,
            "/api/v1/ledger/entries",
            Some(json!({ "amount": "-15", "description": "Bank fee" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["kind"], "manual");
    assert_eq!(entry["direction"], "credit");

    let id = entry["id"].as_str().map(str::to_owned).unwrap_or_default();
    let uri = format!("/api/v1/ledger/entries/{}/cancel", id);
    let (status, reversal) = app.request(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reversal["reverses_entry_id"], entry["id"]);

    let (status, _) = app.request(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/ledger/totals?purchase_order_id={}&sales_order_id={}",
                app.actor, app.actor
            ),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoints_report_up() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");

    let (status, body) = app.request(Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
}
