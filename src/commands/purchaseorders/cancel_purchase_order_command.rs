use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    commands::Command,
    errors::ServiceError,
    models::{PurchaseOrder, PurchaseOrderStatus},
    services::PurchaseFulfillmentService,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelPurchaseOrderCommand {
    pub order_id: Uuid,
}

#[async_trait]
impl Command<PurchaseOrderStatus> for CancelPurchaseOrderCommand {
    type Result = PurchaseOrder;

    #[instrument(skip(self, service), fields(order_id = %self.order_id))]
    async fn execute(
        &self,
        service: &PurchaseFulfillmentService,
    ) -> Result<Self::Result, ServiceError> {
        let order = service.cancel_order(self.order_id).await?;
        info!(purchase_order_id = %self.order_id, "Purchase order cancelled");
        Ok(order)
    }
}
