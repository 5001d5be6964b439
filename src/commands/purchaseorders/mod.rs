pub mod cancel_purchase_order_command;
pub mod receive_purchase_order_command;

pub use cancel_purchase_order_command::CancelPurchaseOrderCommand;
pub use receive_purchase_order_command::{ReceivePurchaseOrderCommand, ReceivePurchaseOrderRequest};
