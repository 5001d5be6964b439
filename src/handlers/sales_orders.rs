use super::common::{order_page, success_response, today, ListOrdersParams, OrderResponse};
use crate::{
    commands::{
        salesorders::{
            AddSalesOrderItemsCommand, AddSalesOrderItemsRequest, CancelSalesOrderCommand,
            RemoveSalesOrderItemCommand, StockOutSalesOrderCommand, StockOutSalesOrderRequest,
        },
        Command,
    },
    errors::ApiError,
    handlers::AppState,
    models::SalesOrder,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{delete, get, patch, put},
    Router,
};
use tracing::info;
use uuid::Uuid;

fn respond(state: &AppState, order: &SalesOrder) -> Response {
    success_response(OrderResponse::from_order(
        order,
        today(),
        state.config.urgent_window_days,
    ))
}

/// List sales orders
#[utoipa::path(
    get,
    path = "/api/v1/sales-orders",
    params(ListOrdersParams),
    responses(
        (status = 200, description = "Sales orders listed", body = crate::ApiResponse<crate::PaginatedResponse<OrderResponse>>),
        (status = 400, description = "Invalid list parameters", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn list_sales_orders(
    State(state): State<AppState>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Response, ApiError> {
    let request = params.resolve()?;
    let per_page = params.per_page(&state.config)?;
    let today = today();
    let window = state.config.urgent_window_days;

    let page = state
        .sales_orders
        .list_orders(&request, today, window, per_page)
        .await?;

    Ok(success_response(order_page(page, today, window)))
}

/// Get a sales order by ID
#[utoipa::path(
    get,
    path = "/api/v1/sales-orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Sales order ID")
    ),
    responses(
        (status = 200, description = "Sales order fetched", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn get_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state.sales_orders.get_order(order_id).await?;
    Ok(respond(&state, &order))
}

/// Record shipped quantities against a sales order
#[utoipa::path(
    put,
    path = "/api/v1/sales-orders/{id}/stock-out",
    request_body = StockOutSalesOrderRequest,
    params(
        ("id" = Uuid, Path, description = "Sales order ID")
    ),
    responses(
        (status = 200, description = "Shipment recorded", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid quantities or unknown line item", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is terminal or was modified concurrently", body = crate::errors::ErrorResponse),
        (status = 422, description = "Quantity exceeds what remains", body = crate::errors::ErrorResponse),
        (status = 502, description = "Inventory update failed; nothing was recorded", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn stock_out_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<StockOutSalesOrderRequest>,
) -> Result<Response, ApiError> {
    let order = StockOutSalesOrderCommand::new(order_id, payload)
        .execute(&state.sales_orders)
        .await?;

    info!("Sales order stocked out: {}", order_id);
    Ok(respond(&state, &order))
}

/// Append line items to a sales order
#[utoipa::path(
    patch,
    path = "/api/v1/sales-orders/{id}/items",
    request_body = AddSalesOrderItemsRequest,
    params(
        ("id" = Uuid, Path, description = "Sales order ID")
    ),
    responses(
        (status = 200, description = "Line items added", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid items", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn add_sales_order_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AddSalesOrderItemsRequest>,
) -> Result<Response, ApiError> {
    let order = AddSalesOrderItemsCommand::new(order_id, payload)
        .execute(&state.sales_orders)
        .await?;

    info!("Sales order items added: {}", order_id);
    Ok(respond(&state, &order))
}

/// Remove a line item from a sales order
#[utoipa::path(
    delete,
    path = "/api/v1/sales-orders/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Sales order ID"),
        ("item_id" = Uuid, Path, description = "Line item ID")
    ),
    responses(
        (status = 200, description = "Line item removed", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown line item or item cannot be removed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn remove_sales_order_item(
    State(state): State<AppState>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let order = RemoveSalesOrderItemCommand {
        order_id,
        line_item_id: item_id,
    }
    .execute(&state.sales_orders)
    .await?;

    info!("Sales order item removed: {} from {}", item_id, order_id);
    Ok(respond(&state, &order))
}

/// Cancel a sales order
#[utoipa::path(
    put,
    path = "/api/v1/sales-orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Sales order ID")
    ),
    responses(
        (status = 200, description = "Sales order cancelled", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Sales order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is already terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-orders"
)]
pub async fn cancel_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = CancelSalesOrderCommand { order_id }
        .execute(&state.sales_orders)
        .await?;

    info!("Sales order cancelled: {}", order_id);
    Ok(respond(&state, &order))
}

/// Creates the router for sales order endpoints
pub fn sales_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sales_orders))
        .route("/:id", get(get_sales_order))
        .route("/:id/stock-out", put(stock_out_sales_order))
        .route("/:id/items", patch(add_sales_order_items))
        .route("/:id/items/:item_id", delete(remove_sales_order_item))
        .route("/:id/cancel", put(cancel_sales_order))
}
