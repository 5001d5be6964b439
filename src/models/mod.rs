pub mod line_item;
pub mod order;
pub mod status;

pub use line_item::{LineItem, MAX_LINE_QUANTITY, MAX_UNIT_PRICE};
pub use order::{derive_status, Order, OrderParts, PurchaseOrder, SalesOrder};
pub use status::{FulfillmentStatus, OrderKind, PurchaseOrderStatus, SalesOrderStatus};
