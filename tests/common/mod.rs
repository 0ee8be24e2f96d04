#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use trade_ledger::{
    commands::{
        purchase_orders::{
            CompletePurchaseOrderCommand, CreatePurchaseOrderCommand, PurchaseOrderLineInput,
            ReceivedItem,
        },
        sales_orders::{CreateSalesOrderCommand, SalesOrderLineInput},
        StorageAllocation,
    },
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        batch_storage, customer, financial_ledger, inventory_log, product, product_batch, storage,
        supplier, PaymentMethod,
    },
    handlers::common::ACTOR_HEADER,
    services::{purchase_orders::PurchaseOrderView, sales_orders::SalesOrderView},
    AppState,
};

/// Application state over a fresh in-memory SQLite database with seeded
/// reference data.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    pub actor: Uuid,
    pub supplier: supplier::Model,
    pub customer: customer::Model,
    pub product: product::Model,
    pub warehouse: storage::Model,
    pub shop: storage::Model,
}

impl TestApp {
    pub async fn new() -> Self {
        // One connection: every `:memory:` connection is its own database.
        let db_cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            acquire_timeout: Duration::from_secs(5),
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool).await.expect("migrations failed");

        let now = Utc::now();
        let supplier = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Green Coffee Traders".to_string()),
            phone: Set(None),
            address: Set(None),
            created_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&pool)
        .await
        .expect("seed supplier");
        let customer = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Corner Cafe".to_string()),
            phone: Set(None),
            address: Set(Some("1 Main Street".to_string())),
            created_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&pool)
        .await
        .expect("seed customer");
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Arabica Beans".to_string()),
            category: Set(Some("coffee".to_string())),
            unit: Set(Some("kg".to_string())),
            created_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&pool)
        .await
        .expect("seed product");
        let warehouse = seed_storage(&pool, "Main Warehouse").await;
        let shop = seed_storage(&pool, "Shop Floor").await;

        let config = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        let state = AppState::new(Arc::new(pool), config);
        let router = trade_ledger::app_router(state.clone(), CorsLayer::permissive());

        Self {
            state,
            router,
            actor: Uuid::new_v4(),
            supplier,
            customer,
            product,
            warehouse,
            shop,
        }
    }

    pub fn order_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).expect("valid date")
    }

    pub fn purchase_command(&self, quantity: Decimal, price: Decimal) -> CreatePurchaseOrderCommand {
        CreatePurchaseOrderCommand {
            supplier_id: self.supplier.id,
            order_date: Self::order_date(),
            payment_method: PaymentMethod::Cash,
            payment_due_date: None,
            notes: None,
            lines: vec![PurchaseOrderLineInput {
                product_id: self.product.id,
                quantity,
                price,
            }],
        }
    }

    /// Receives every line of `order` in full into `storage_id`.
    pub fn receive_all(order: &PurchaseOrderView, storage_id: Uuid) -> CompletePurchaseOrderCommand {
        CompletePurchaseOrderCommand {
            received_items: order
                .lines
                .iter()
                .map(|line| ReceivedItem {
                    detail_id: line.id,
                    allocations: vec![StorageAllocation {
                        storage_id,
                        quantity: line.quantity,
                    }],
                })
                .collect(),
        }
    }

    /// A completed purchase order whose single batch sits in the warehouse.
    pub async fn stocked(&self, quantity: Decimal, price: Decimal) -> PurchaseOrderView {
        let po = &self.state.purchase_orders;
        let created = po
            .create(self.actor, self.purchase_command(quantity, price))
            .await
            .expect("create purchase order");
        po.complete(
            self.actor,
            created.order.id.into(),
            Self::receive_all(&created, self.warehouse.id),
        )
        .await
        .expect("complete purchase order")
    }

    pub fn sales_command(&self, batch_storage_id: Uuid, quantity: Decimal, price: Decimal) -> CreateSalesOrderCommand {
        CreateSalesOrderCommand {
            customer_id: self.customer.id,
            order_date: Self::order_date(),
            payment_method: PaymentMethod::Transfer,
            payment_due_date: None,
            notes: None,
            lines: vec![SalesOrderLineInput {
                batch_storage_id,
                quantity,
                price,
            }],
            create_invoice: false,
        }
    }

    pub async fn sell(&self, batch_storage_id: Uuid, quantity: Decimal, price: Decimal) -> SalesOrderView {
        self.state
            .sales_orders
            .create(self.actor, self.sales_command(batch_storage_id, quantity, price))
            .await
            .expect("create sales order")
    }

    pub async fn batch(&self, batch_id: Uuid) -> product_batch::Model {
        product_batch::Entity::find_by_id(batch_id)
            .one(self.state.db.as_ref())
            .await
            .expect("query batch")
            .expect("batch exists")
    }

    pub async fn slot_quantity(&self, batch_id: Uuid, storage_id: Uuid) -> Decimal {
        batch_storage::Entity::find()
            .filter(batch_storage::Column::BatchId.eq(batch_id))
            .filter(batch_storage::Column::StorageId.eq(storage_id))
            .one(self.state.db.as_ref())
            .await
            .expect("query batch storage")
            .map(|slot| slot.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Asserts the batch total equals the sum of its storage rows and neither is negative.
    pub async fn assert_conserved(&self, batch_id: Uuid) {
        let balance = self
            .state
            .stock
            .verify_batch(batch_id)
            .await
            .expect("verify batch");
        assert!(balance.consistent, "batch out of balance: {:?}", balance);
        assert!(balance.current_quantity >= Decimal::ZERO);
        let view = self.state.stock.get_batch(batch_id).await.expect("batch view");
        assert!(view.storages.iter().all(|s| s.quantity >= Decimal::ZERO));
    }

    pub async fn inventory_rows(&self) -> u64 {
        inventory_log::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count inventory log")
    }

    pub async fn financial_rows(&self) -> u64 {
        financial_ledger::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count financial ledger")
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let actor = self.actor.to_string();
        self.request_as(Some(&actor), method, uri, body).await
    }

    /// Sends a request carrying `actor` verbatim in the actor header, or no header at all.
    pub async fn request_as(
        &self,
        actor: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

async fn seed_storage(pool: &db::DbPool, name: &str) -> storage::Model {
    storage::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        location: Set(None),
        created_at: Set(Utc::now()),
        deleted_at: Set(None),
    }
    .insert(pool)
    .await
    .expect("seed storage")
}
