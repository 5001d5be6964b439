use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    errors::ApiError,
    models::{FulfillmentStatus, LineItem, Order, OrderKind},
    queries::{FilterType, ListFilter, ListQueryState, ListRequest, ViewMode},
    repositories::Page,
    ApiResponse, PaginatedResponse,
};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Query string accepted by the order list endpoints.
///
/// A search wins over a filter, and a filter wins over a due-date view.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListOrdersParams {
    /// Free text matched against the reference and counterparty.
    pub search: Option<String>,
    pub filter_type: Option<FilterType>,
    pub filter_value: Option<String>,
    pub view: Option<ViewMode>,
    /// Zero-based page index.
    #[serde(default)]
    pub page: u64,
    pub per_page: Option<u64>,
}

impl ListOrdersParams {
    pub fn resolve(&self) -> Result<ListRequest, ApiError> {
        let filter = match (self.filter_type, self.filter_value.as_deref()) {
            (Some(filter_type), Some(value)) if !value.trim().is_empty() => {
                Some(ListFilter::new(filter_type, value.trim()))
            }
            (Some(_), _) => {
                return Err(ApiError::BadRequest(
                    "filterValue is required when filterType is set".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ApiError::BadRequest(
                    "filterType is required when filterValue is set".to_string(),
                ))
            }
            (None, None) => None,
        };

        Ok(ListQueryState::from_parts(
            self.search.clone(),
            filter,
            self.view.unwrap_or_default(),
            self.page,
        )
        .resolve())
    }

    /// Requested page size, clamped to the configured maximum.
    ///
    /// Rejects a page whose row offset (`page * per_page`) does not fit the
    /// signed 64-bit offset the store queries with.
    pub fn per_page(&self, config: &AppConfig) -> Result<u64, ApiError> {
        let per_page = self
            .per_page
            .unwrap_or(config.api_default_page_size)
            .clamp(1, config.api_max_page_size);
        match self.page.checked_mul(per_page) {
            Some(offset) if offset <= i64::MAX as u64 => Ok(per_page),
            _ => Err(ApiError::BadRequest(format!(
                "page {} is out of range",
                self.page
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub ordered_quantity: i32,
    pub fulfilled_quantity: i32,
    pub remaining_quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            ordered_quantity: item.ordered_quantity,
            fulfilled_quantity: item.fulfilled_quantity,
            remaining_quantity: item.remaining_quantity(),
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}

/// A purchase or sales order as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub kind: OrderKind,
    pub reference: String,
    pub counterparty: Option<String>,
    #[schema(example = "PARTIALLY_RECEIVED")]
    pub status: String,
    pub is_terminal: bool,
    pub order_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub last_fulfilled_on: Option<NaiveDate>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub overdue: bool,
    pub urgent: bool,
    pub total_ordered: i64,
    pub total_fulfilled: i64,
    pub total_remaining: i64,
    pub total_value: Decimal,
    pub line_items: Vec<LineItemResponse>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn from_order<S: FulfillmentStatus>(
        order: &Order<S>,
        today: NaiveDate,
        urgent_window_days: i64,
    ) -> Self {
        Self {
            id: order.id,
            kind: S::KIND,
            reference: order.reference.clone(),
            counterparty: order.counterparty.clone(),
            status: order.status().to_string(),
            is_terminal: order.is_terminal(),
            order_date: order.order_date,
            due_date: order.due_date,
            last_fulfilled_on: order.last_fulfilled_on,
            cancelled_at: order.cancelled_at(),
            overdue: order.is_overdue(today),
            urgent: order.is_urgent(today, urgent_window_days),
            total_ordered: order.total_ordered(),
            total_fulfilled: order.total_fulfilled(),
            total_remaining: order.total_remaining(),
            total_value: order.total_value(),
            line_items: order.line_items().iter().map(Into::into).collect(),
            version: order.version(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Maps a page of orders onto the list response envelope.
pub fn order_page<S: FulfillmentStatus>(
    page: Page<Order<S>>,
    today: NaiveDate,
    urgent_window_days: i64,
) -> PaginatedResponse<OrderResponse> {
    let total_pages = page.total_pages();
    let page = page.map(|order| OrderResponse::from_order(&order, today, urgent_window_days));
    PaginatedResponse {
        items: page.items,
        total: page.total,
        page: page.page,
        limit: page.per_page,
        total_pages,
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
