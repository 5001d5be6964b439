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
    models::{PurchaseOrder, PurchaseOrderStatus},
    services::{FulfillmentRequest, PurchaseFulfillmentService},
};

/// Body of `PUT /purchase-orders/{id}/receive`.
///
/// `receivedQuantity` is shorthand for a purchase order with a single line
/// item; orders with several lines must name them in `items`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceivePurchaseOrderRequest {
    #[schema(example = 40)]
    pub received_quantity: Option<i32>,
    #[validate(length(max = 500))]
    pub items: Option<Vec<FulfillmentLineInput>>,
    pub actual_arrival_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct ReceivePurchaseOrderCommand {
    pub order_id: Uuid,
    pub request: ReceivePurchaseOrderRequest,
}

impl ReceivePurchaseOrderCommand {
    pub fn new(order_id: Uuid, request: ReceivePurchaseOrderRequest) -> Self {
        Self { order_id, request }
    }

    async fn resolve(
        &self,
        service: &PurchaseFulfillmentService,
    ) -> Result<FulfillmentRequest, ServiceError> {
        let lines = match (&self.request.received_quantity, &self.request.items) {
            (Some(_), Some(_)) => {
                return Err(ServiceError::ValidationError(
                    "Provide either receivedQuantity or items, not both".to_string(),
                ))
            }
            (Some(quantity), None) => {
                let order = service.get_order(self.order_id).await?;
                let line_item_id = single_line_item(&order)?;
                return Ok(self.with_arrival(FulfillmentRequest::single(line_item_id, *quantity)));
            }
            (None, Some(items)) => items.iter().map(Into::into).collect(),
            (None, None) => Vec::new(),
        };
        Ok(self.with_arrival(FulfillmentRequest::new(lines)))
    }

    fn with_arrival(&self, request: FulfillmentRequest) -> FulfillmentRequest {
        match self.request.actual_arrival_date {
            Some(date) => request.with_fulfilled_on(date),
            None => request,
        }
    }
}

fn single_line_item(order: &PurchaseOrder) -> Result<Uuid, ServiceError> {
    match order.line_items() {
        [only] => Ok(only.id),
        items => Err(ServiceError::ValidationError(format!(
            "Purchase order {} has {} line items; list them in items",
            order.reference,
            items.len()
        ))),
    }
}

#[async_trait]
impl Command<PurchaseOrderStatus> for ReceivePurchaseOrderCommand {
    type Result = PurchaseOrder;

    #[instrument(skip(self, service), fields(order_id = %self.order_id))]
    async fn execute(
        &self,
        service: &PurchaseFulfillmentService,
    ) -> Result<Self::Result, ServiceError> {
        self.request.validate()?;

        let request = self.resolve(service).await?;
        let order = service.apply_fulfillment(self.order_id, request).await?;

        info!(
            purchase_order_id = %self.order_id,
            status = %order.status(),
            "Purchase order received"
        );
        Ok(order)
    }
}
