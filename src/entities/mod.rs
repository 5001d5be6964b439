pub mod fulfillment_order;
pub mod inventory_adjustment;
pub mod inventory_level;
pub mod order_line_item;
