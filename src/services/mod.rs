pub mod fulfillment;
pub mod inventory;
pub mod reconciliation;

pub use fulfillment::{FulfillmentService, PurchaseFulfillmentService, SalesFulfillmentService};
pub use inventory::{
    AdjustmentDirection, DbInventoryLedger, InMemoryInventoryLedger, InventoryAdjustment,
    InventoryCollaborator, StockLevel,
};
pub use reconciliation::{FulfillmentLine, FulfillmentRequest, NewLineItem, Reconciliation};
