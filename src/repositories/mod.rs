use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{FulfillmentStatus, Order},
    queries::OrderListQuery,
    services::InventoryAdjustment,
};

pub mod in_memory;
pub mod order_repository;

pub use in_memory::InMemoryOrderRepository;
pub use order_repository::SeaOrmOrderRepository;

/// One page of a list result. `page` is zero-based.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            0
        } else {
            self.total.div_ceil(self.per_page)
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Row offset of a zero-based `page`.
///
/// Stores page with signed 64-bit offsets, so anything larger is rejected
/// up front.
pub(crate) fn row_offset(page: u64, per_page: u64) -> Result<u64, ServiceError> {
    page.checked_mul(per_page)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| ServiceError::ValidationError(format!("Page {} is out of range", page)))
}

/// Authoritative store for orders of one kind.
///
/// `save` is a compare-and-swap on the order's version: it only writes when
/// the stored version still equals `expected_version`, and returns the order
/// carrying its new version.
#[async_trait]
pub trait OrderRepository<S: FulfillmentStatus>: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order<S>>, ServiceError>;

    async fn insert(&self, order: &Order<S>) -> Result<Order<S>, ServiceError>;

    async fn save(&self, order: &Order<S>, expected_version: i32)
        -> Result<Order<S>, ServiceError>;

    /// Saves `order` and applies `adjustments` to the inventory ledger in one
    /// transaction, so either both land or neither does.
    ///
    /// Returns `Ok(None)` when the store does not own the ledger; callers then
    /// save and hand the adjustments to their inventory collaborator.
    async fn save_with_adjustments(
        &self,
        _order: &Order<S>,
        _expected_version: i32,
        _adjustments: &[InventoryAdjustment],
    ) -> Result<Option<Order<S>>, ServiceError> {
        Ok(None)
    }

    async fn list(
        &self,
        query: &OrderListQuery,
        page: u64,
        per_page: u64,
    ) -> Result<Page<Order<S>>, ServiceError>;
}
