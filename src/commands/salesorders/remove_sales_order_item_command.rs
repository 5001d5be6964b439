use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    commands::Command,
    errors::ServiceError,
    models::{SalesOrder, SalesOrderStatus},
    services::SalesFulfillmentService,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveSalesOrderItemCommand {
    pub order_id: Uuid,
    pub line_item_id: Uuid,
}

#[async_trait]
impl Command<SalesOrderStatus> for RemoveSalesOrderItemCommand {
    type Result = SalesOrder;

    #[instrument(skip(self, service), fields(order_id = %self.order_id, line_item_id = %self.line_item_id))]
    async fn execute(&self, service: &SalesFulfillmentService) -> Result<Self::Result, ServiceError> {
        let order = service
            .remove_line_item(self.order_id, self.line_item_id)
            .await?;
        info!(
            sales_order_id = %self.order_id,
            line_item_id = %self.line_item_id,
            "Sales order item removed"
        );
        Ok(order)
    }
}
