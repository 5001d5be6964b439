use super::common::{order_page, success_response, today, ListOrdersParams, OrderResponse};
use crate::{
    commands::{
        purchaseorders::{
            CancelPurchaseOrderCommand, ReceivePurchaseOrderCommand, ReceivePurchaseOrderRequest,
        },
        Command,
    },
    errors::ApiError,
    handlers::AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, put},
    Router,
};
use tracing::info;
use uuid::Uuid;

/// List purchase orders
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(ListOrdersParams),
    responses(
        (status = 200, description = "Purchase orders listed", body = crate::ApiResponse<crate::PaginatedResponse<OrderResponse>>),
        (status = 400, description = "Invalid list parameters", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(params): Query<ListOrdersParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let request = params.resolve()?;
    let per_page = params.per_page(&state.config)?;
    let today = today();
    let window = state.config.urgent_window_days;

    let page = state
        .purchase_orders
        .list_orders(&request, today, window, per_page)
        .await?;

    Ok(success_response(order_page(page, today, window)))
}

/// Get a purchase order by ID
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order fetched", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state.purchase_orders.get_order(po_id).await?;
    Ok(success_response(OrderResponse::from_order(
        &order,
        today(),
        state.config.urgent_window_days,
    )))
}

/// Record received quantities against a purchase order
#[utoipa::path(
    put,
    path = "/api/v1/purchase-orders/{id}/receive",
    request_body = ReceivePurchaseOrderRequest,
    params(
        ("id" = Uuid, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Receipt recorded", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid quantities or unknown line item", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is terminal or was modified concurrently", body = crate::errors::ErrorResponse),
        (status = 422, description = "Quantity exceeds what remains", body = crate::errors::ErrorResponse),
        (status = 502, description = "Inventory update failed; nothing was recorded", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<Uuid>,
    Json(payload): Json<ReceivePurchaseOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let command = ReceivePurchaseOrderCommand::new(po_id, payload);
    let order = command.execute(&state.purchase_orders).await?;

    info!("Purchase order received: {}", po_id);

    Ok(success_response(OrderResponse::from_order(
        &order,
        today(),
        state.config.urgent_window_days,
    )))
}

/// Cancel a purchase order
#[utoipa::path(
    put,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order cancelled", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is already terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = CancelPurchaseOrderCommand { order_id: po_id }
        .execute(&state.purchase_orders)
        .await?;

    info!("Purchase order cancelled: {}", po_id);

    Ok(success_response(OrderResponse::from_order(
        &order,
        today(),
        state.config.urgent_window_days,
    )))
}

/// Creates the router for purchase order endpoints
pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchase_orders))
        .route("/:id", get(get_purchase_order))
        .route("/:id/receive", put(receive_purchase_order))
        .route("/:id/cancel", put(cancel_purchase_order))
}
