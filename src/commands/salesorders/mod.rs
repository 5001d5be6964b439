pub mod add_sales_order_items_command;
pub mod cancel_sales_order_command;
pub mod remove_sales_order_item_command;
pub mod stock_out_sales_order_command;

pub use add_sales_order_items_command::{
    AddSalesOrderItemsCommand, AddSalesOrderItemsRequest, NewOrderItemInput,
};
pub use cancel_sales_order_command::CancelSalesOrderCommand;
pub use remove_sales_order_item_command::RemoveSalesOrderItemCommand;
pub use stock_out_sales_order_command::{StockOutSalesOrderCommand, StockOutSalesOrderRequest};
