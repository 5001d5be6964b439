use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockroom API",
        version = "1.0.0",
        description = r#"
# Stockroom API

Partial-fulfillment tracking for purchase and sales orders.

## Fulfillment

Receipts (purchase orders) and shipments (sales orders) are recorded as
per-line deltas. A delta may never exceed what remains on its line; the
order status moves to partially fulfilled, then fulfilled, as quantities
accumulate. Cancelled, fulfilled and failed orders accept no further changes.

## Errors

Every error body carries a stable `code`:

```json
{
  "error": "Unprocessable Entity",
  "code": "over_fulfillment",
  "message": "Quantity for line item ... cannot exceed remaining quantity (4)",
  "details": { "lineItemId": "...", "maxAllowed": 4 },
  "requestId": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints take a zero-based `page` and `perPage` (capped by the server).
Only one of `search`, `filterType`/`filterValue` and `view` applies, in that
order of precedence.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "purchase-orders", description = "Purchase order receipts"),
        (name = "sales-orders", description = "Sales order shipments and line items"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Purchase orders
        crate::handlers::purchase_orders::list_purchase_orders,
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::purchase_orders::receive_purchase_order,
        crate::handlers::purchase_orders::cancel_purchase_order,

        // Sales orders
        crate::handlers::sales_orders::list_sales_orders,
        crate::handlers::sales_orders::get_sales_order,
        crate::handlers::sales_orders::stock_out_sales_order,
        crate::handlers::sales_orders::add_sales_order_items,
        crate::handlers::sales_orders::remove_sales_order_item,
        crate::handlers::sales_orders::cancel_sales_order,

        crate::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::common::OrderResponse,
            crate::handlers::common::LineItemResponse,
            crate::commands::FulfillmentLineInput,
            crate::commands::purchaseorders::ReceivePurchaseOrderRequest,
            crate::commands::salesorders::StockOutSalesOrderRequest,
            crate::commands::salesorders::AddSalesOrderItemsRequest,
            crate::commands::salesorders::NewOrderItemInput,
            crate::models::OrderKind,
            crate::models::PurchaseOrderStatus,
            crate::models::SalesOrderStatus,
            crate::queries::FilterType,
            crate::queries::ViewMode,
            crate::health::HealthInfo,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_both_order_surfaces() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Stockroom API"));
        assert!(json.contains("/api/v1/purchase-orders/{id}/receive"));
        assert!(json.contains("/api/v1/sales-orders/{id}/items/{item_id}"));
        assert!(json.contains("over_fulfillment"));
    }
}
