#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::Value;
use stockroom_api::{
    build_router,
    config::AppConfig,
    db,
    events::{self, EventSender},
    models::{FulfillmentStatus, LineItem, Order, PurchaseOrder, SalesOrder},
    repositories::{InMemoryOrderRepository, OrderRepository, SeaOrmOrderRepository},
    services::{
        DbInventoryLedger, FulfillmentService, InMemoryInventoryLedger, StockLevel,
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).expect("valid date")
}

pub fn purchase_order(reference: &str, quantities: &[i32]) -> PurchaseOrder {
    PurchaseOrder::new(
        reference,
        date(6, 1),
        quantities
            .iter()
            .map(|q| LineItem::new(Uuid::new_v4(), *q, dec!(4.00)))
            .collect(),
    )
    .expect("valid purchase order")
}

pub fn sales_order(reference: &str, quantities: &[i32]) -> SalesOrder {
    SalesOrder::new(
        reference,
        date(6, 1),
        quantities
            .iter()
            .map(|q| LineItem::new(Uuid::new_v4(), *q, dec!(12.50)))
            .collect(),
    )
    .expect("valid sales order")
}

/// Gives every product on `order` plenty of stock so sales shipments succeed.
pub fn stock_products<S: FulfillmentStatus>(ledger: &InMemoryInventoryLedger, order: &Order<S>) {
    for item in order.line_items() {
        ledger
            .set_level(
                item.product_id,
                StockLevel {
                    on_hand: 1_000,
                    reserved: item.ordered_quantity,
                    incoming: 0,
                },
            )
            .expect("seed stock");
    }
}

/// A service over in-memory collaborators, seeded with `order`.
pub async fn in_memory_service<S: FulfillmentStatus>(
    order: &Order<S>,
) -> (
    FulfillmentService<S>,
    InMemoryOrderRepository<S>,
    InMemoryInventoryLedger,
) {
    let repo = InMemoryOrderRepository::new();
    repo.insert(order).await.expect("insert order");
    let ledger = InMemoryInventoryLedger::new();
    stock_products(&ledger, order);
    let service = FulfillmentService::new(Arc::new(repo.clone()), Arc::new(ledger.clone()));
    (service, repo, ledger)
}

/// A migrated sqlite database in a temporary directory.
pub struct TestDb {
    pub db: Arc<db::DbPool>,
    pub url: String,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("stockroom.db").display());
        let pool = db::establish_connection(&url)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        Self {
            db: Arc::new(pool),
            url,
            _dir: dir,
        }
    }

    pub fn purchase_orders(&self) -> SeaOrmOrderRepository<stockroom_api::models::PurchaseOrderStatus> {
        SeaOrmOrderRepository::new(self.db.clone())
    }

    pub fn sales_orders(&self) -> SeaOrmOrderRepository<stockroom_api::models::SalesOrderStatus> {
        SeaOrmOrderRepository::new(self.db.clone())
    }

    pub fn ledger(&self) -> DbInventoryLedger {
        DbInventoryLedger::new(self.db.clone())
    }
}

/// Helper harness for driving the full router against a sqlite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub test_db: TestDb,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let test_db = TestDb::new().await;

        let mut cfg = AppConfig::new(
            test_db.url.clone(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.api_max_page_size = 5;
        cfg.api_default_page_size = 2;

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state =
            AppState::with_database(test_db.db.clone(), cfg, Some(EventSender::new(event_tx)));
        let router = build_router(state.clone());

        Self {
            router,
            state,
            test_db,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).expect("request")).await;

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Sends a raw request through the full middleware stack.
    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn put(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, body).await
    }
}
