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
pub struct CancelSalesOrderCommand {
    pub order_id: Uuid,
}

#[async_trait]
impl Command<SalesOrderStatus> for CancelSalesOrderCommand {
    type Result = SalesOrder;

    #[instrument(skip(self, service), fields(order_id = %self.order_id))]
    async fn execute(&self, service: &SalesFulfillmentService) -> Result<Self::Result, ServiceError> {
        let order = service.cancel_order(self.order_id).await?;
        info!(sales_order_id = %self.order_id, "Sales order cancelled");
        Ok(order)
    }
}
