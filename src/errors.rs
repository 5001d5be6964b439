use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "code": "over_fulfillment",
    "message": "Quantity for line item 550e8400-e29b-41d4-a716-446655440000 cannot exceed remaining quantity (60)",
    "details": { "lineItemId": "550e8400-e29b-41d4-a716-446655440000", "maxAllowed": 60 },
    "requestId": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable error kind
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Data needed to render a precise message (e.g. the maximum allowed quantity)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Order {order_id} is {status} and can no longer be changed")]
    OrderTerminal { order_id: Uuid, status: String },

    #[error("Line item {line_item_id} does not belong to order {order_id}")]
    UnknownLineItem { order_id: Uuid, line_item_id: Uuid },

    #[error("Invalid quantity: {0}")]
    InvalidDelta(String),

    #[error("Quantity for line item {line_item_id} cannot exceed remaining quantity ({max_allowed})")]
    OverFulfillment { line_item_id: Uuid, max_allowed: i32 },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Collaborator failure: {0}")]
    CollaboratorFailure(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    pub fn order_not_found(order_id: Uuid) -> Self {
        ServiceError::NotFound(format!("Order {} not found", order_id))
    }

    /// Stable error kind callers can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "order_not_found",
            Self::OrderTerminal { .. } => "order_terminal",
            Self::UnknownLineItem { .. } => "unknown_line_item",
            Self::InvalidDelta(_) => "invalid_delta",
            Self::OverFulfillment { .. } => "over_fulfillment",
            Self::ConcurrentModification(_) => "concurrency_conflict",
            Self::CollaboratorFailure(_) => "collaborator_failure",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownLineItem { .. }
            | Self::InvalidDelta(_)
            | Self::ValidationError(_)
            | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::OrderTerminal { .. } | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::OverFulfillment { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::CollaboratorFailure(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::CollaboratorFailure(_) => {
                "Inventory adjustment failed; the order was not changed".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured data accompanying the message.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::OverFulfillment {
                line_item_id,
                max_allowed,
            } => Some(json!({ "lineItemId": line_item_id, "maxAllowed": max_allowed })),
            Self::UnknownLineItem {
                order_id,
                line_item_id,
            } => Some(json!({ "orderId": order_id, "lineItemId": line_item_id })),
            Self::OrderTerminal { order_id, status } => {
                Some(json!({ "orderId": order_id, "status": status }))
            }
            Self::ConcurrentModification(order_id) => Some(json!({ "orderId": order_id })),
            _ => None,
        }
    }

    /// Whether the whole operation may be retried after re-reading the order.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: String,
    details: Option<serde_json::Value>,
) -> Response {
    let body = ErrorResponse {
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        code: code.to_string(),
        message,
        details,
        request_id: current_request_id(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (status, Json(body)).into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        error_response(
            self.status_code(),
            self.code(),
            self.response_message(),
            self.details(),
        )
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::ServiceError(service_error) => service_error.into_response(),
            ApiError::ValidationError(msg) => {
                error_response(StatusCode::BAD_REQUEST, "validation_error", msg, None)
            }
            ApiError::BadRequest(msg) => {
                error_response(StatusCode::BAD_REQUEST, "bad_request", msg, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.code, "order_not_found");
    }

    #[tokio::test]
    async fn over_fulfillment_response_carries_maximum() {
        let line_item_id = Uuid::new_v4();
        let response = ServiceError::OverFulfillment {
            line_item_id,
            max_allowed: 60,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "over_fulfillment");
        let details = payload.details.expect("details");
        assert_eq!(details["maxAllowed"], 60);
        assert_eq!(details["lineItemId"], line_item_id.to_string());
        assert!(payload.message.contains("remaining quantity (60)"));
    }

    #[test]
    fn service_error_status_code_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::OrderTerminal {
                order_id: id,
                status: "RECEIVED".into()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::UnknownLineItem {
                order_id: id,
                line_item_id: id
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidDelta("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ConcurrentModification(id).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::CollaboratorFailure("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("lock poisoned".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::db_error("connection reset").response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("Order 1 not found".into()).response_message(),
            "Not found: Order 1 not found"
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(ServiceError::ConcurrentModification(Uuid::new_v4()).is_retryable());
        assert!(!ServiceError::InvalidDelta("x".into()).is_retryable());
        assert!(!ServiceError::CollaboratorFailure("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn api_validation_error_uses_validation_code() {
        let response =
            ApiError::ValidationError("quantity must be positive".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "validation_error");
    }
}
