use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::Command,
    errors::ServiceError,
    models::{SalesOrder, SalesOrderStatus},
    services::{NewLineItem, SalesFulfillmentService},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000))]
    pub quantity: i32,
    /// Defaults to zero when omitted.
    #[schema(value_type = Option<String>, example = "12.50")]
    pub unit_price: Option<Decimal>,
}

impl From<&NewOrderItemInput> for NewLineItem {
    fn from(input: &NewOrderItemInput) -> Self {
        NewLineItem {
            product_id: input.product_id,
            quantity: input.quantity,
            unit_price: input.unit_price.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Body of `PATCH /sales-orders/{id}/items`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddSalesOrderItemsRequest {
    #[validate(length(min = 1, max = 100))]
    pub order_items: Vec<NewOrderItemInput>,
}

#[derive(Debug, Clone)]
pub struct AddSalesOrderItemsCommand {
    pub order_id: Uuid,
    pub request: AddSalesOrderItemsRequest,
}

impl AddSalesOrderItemsCommand {
    pub fn new(order_id: Uuid, request: AddSalesOrderItemsRequest) -> Self {
        Self { order_id, request }
    }
}

#[async_trait]
impl Command<SalesOrderStatus> for AddSalesOrderItemsCommand {
    type Result = SalesOrder;

    #[instrument(skip(self, service), fields(order_id = %self.order_id))]
    async fn execute(&self, service: &SalesFulfillmentService) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;
        for item in &self.request.order_items {
            item.validate()?;
        }

        let items = self.request.order_items.iter().map(Into::into).collect();
        let order = service.add_line_items(self.order_id, items).await?;

        info!(
            sales_order_id = %self.order_id,
            line_items = order.line_items().len(),
            "Sales order items added"
        );
        Ok(order)
    }
}
