//! Stockroom API Library
//!
//! Partial-fulfillment reconciliation for purchase and sales orders, the
//! order list query controller, and the REST surface over both.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod queries;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, middleware, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

use crate::{
    events::EventSender,
    models::{PurchaseOrderStatus, SalesOrderStatus},
    repositories::SeaOrmOrderRepository,
    services::{DbInventoryLedger, PurchaseFulfillmentService, SalesFulfillmentService},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub purchase_orders: PurchaseFulfillmentService,
    pub sales_orders: SalesFulfillmentService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        purchase_orders: PurchaseFulfillmentService,
        sales_orders: SalesFulfillmentService,
    ) -> Self {
        Self {
            db,
            config,
            purchase_orders,
            sales_orders,
        }
    }

    /// Wires both fulfillment services to the database order store and
    /// inventory ledger. Order saves and their ledger writes share one
    /// transaction.
    pub fn with_database(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        let ledger = Arc::new(DbInventoryLedger::new(db.clone()));

        let purchase_repo =
            SeaOrmOrderRepository::<PurchaseOrderStatus>::new(db.clone()).with_inventory_ledger();
        let sales_repo =
            SeaOrmOrderRepository::<SalesOrderStatus>::new(db.clone()).with_inventory_ledger();

        let mut purchase_orders = PurchaseFulfillmentService::new(Arc::new(purchase_repo), ledger.clone())
        .with_max_attempts(config.fulfillment_max_attempts);
        let mut sales_orders = SalesFulfillmentService::new(Arc::new(sales_repo), ledger)
        .with_max_attempts(config.fulfillment_max_attempts);

        if let Some(sender) = event_sender {
            purchase_orders = purchase_orders.with_event_sender(sender.clone());
            sales_orders = sales_orders.with_event_sender(sender);
        }

        Self::new(db, config, purchase_orders, sales_orders)
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    /// Zero-based.
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest(
            "/purchase-orders",
            handlers::purchase_orders::purchase_order_routes(),
        )
        .nest("/sales-orders", handlers::sales_orders::sales_order_routes())
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// The complete application: API, health, OpenAPI document and the HTTP
/// middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let db = state.db.clone();

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .nest("/health", health::health_routes(db))
        .merge(openapi::openapi_routes())
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::models::*;
    pub use crate::queries::*;
    pub use crate::repositories::{OrderRepository, Page};
    pub use crate::services::*;
}
