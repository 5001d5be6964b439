use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    models::FulfillmentStatus,
    services::{FulfillmentLine, FulfillmentService},
};

/// Command trait for implementing the Command Pattern
///
/// A command carries one validated mutation request for a single order and
/// runs it through the fulfillment service for that order kind.
#[async_trait]
pub trait Command<S: FulfillmentStatus>: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    async fn execute(&self, service: &FulfillmentService<S>) -> Result<Self::Result, ServiceError>;
}

pub mod purchaseorders;
pub mod salesorders;

/// Quantity to receive or ship for one line item.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentLineInput {
    pub line_item_id: Uuid,
    /// Added to the line's fulfilled quantity. Zero is accepted as a no-op.
    pub quantity: i32,
}

impl From<&FulfillmentLineInput> for FulfillmentLine {
    fn from(input: &FulfillmentLineInput) -> Self {
        FulfillmentLine {
            line_item_id: input.line_item_id,
            quantity: input.quantity,
        }
    }
}
