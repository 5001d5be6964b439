use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::{Command, FulfillmentLineInput},
    errors::ServiceError,
    models::{SalesOrder, SalesOrderStatus},
    services::{FulfillmentRequest, SalesFulfillmentService},
};

/// Body of `POST /sales-orders/{id}/stock-out`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockOutSalesOrderRequest {
    #[validate(length(max = 500))]
    #[serde(default)]
    pub items: Vec<FulfillmentLineInput>,
    pub actual_ship_date: Option<NaiveDate>,
}

impl From<&StockOutSalesOrderRequest> for FulfillmentRequest {
    fn from(request: &StockOutSalesOrderRequest) -> Self {
        let fulfillment = FulfillmentRequest::new(request.items.iter().map(Into::into).collect());
        match request.actual_ship_date {
            Some(date) => fulfillment.with_fulfilled_on(date),
            None => fulfillment,
        }
    }
}

/// Ships quantities against a sales order's line items.
#[derive(Debug, Clone)]
pub struct StockOutSalesOrderCommand {
    pub order_id: Uuid,
    pub request: StockOutSalesOrderRequest,
}

impl StockOutSalesOrderCommand {
    pub fn new(order_id: Uuid, request: StockOutSalesOrderRequest) -> Self {
        Self { order_id, request }
    }
}

#[async_trait]
impl Command<SalesOrderStatus> for StockOutSalesOrderCommand {
    type Result = SalesOrder;

    #[instrument(skip(self, service), fields(order_id = %self.order_id, lines = self.request.items.len()))]
    async fn execute(&self, service: &SalesFulfillmentService) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;

        let order = service
            .apply_fulfillment(self.order_id, (&self.request).into())
            .await?;

        info!(
            sales_order_id = %self.order_id,
            status = %order.status(),
            "Sales order stocked out"
        );
        Ok(order)
    }
}
