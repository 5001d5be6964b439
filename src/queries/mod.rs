pub mod list_controller;

pub use list_controller::{
    FilterType, ListFilter, ListQueryState, ListRequest, OrderListQuery, ViewMode,
};
