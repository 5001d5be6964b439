use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::{row_offset, OrderRepository, Page};
use crate::{
    errors::ServiceError,
    models::{FulfillmentStatus, Order},
    queries::OrderListQuery,
};

/// Process-local order store.
pub struct InMemoryOrderRepository<S> {
    orders: Arc<DashMap<Uuid, Order<S>>>,
}

impl<S> Clone for InMemoryOrderRepository<S> {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
        }
    }
}

impl<S> Default for InMemoryOrderRepository<S> {
    fn default() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
        }
    }
}

impl<S: FulfillmentStatus> InMemoryOrderRepository<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl<S: FulfillmentStatus> OrderRepository<S> for InMemoryOrderRepository<S> {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order<S>>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, order: &Order<S>) -> Result<Order<S>, ServiceError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(ServiceError::ValidationError(format!(
                "Order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order.clone())
            }
        }
    }

    async fn save(
        &self,
        order: &Order<S>,
        expected_version: i32,
    ) -> Result<Order<S>, ServiceError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| ServiceError::order_not_found(order.id))?;
        if stored.version() != expected_version {
            return Err(ServiceError::ConcurrentModification(order.id));
        }
        let mut saved = order.clone();
        saved.set_version(expected_version + 1);
        *stored = saved.clone();
        Ok(saved)
    }

    async fn list(
        &self,
        query: &OrderListQuery,
        page: u64,
        per_page: u64,
    ) -> Result<Page<Order<S>>, ServiceError> {
        let mut matching: Vec<Order<S>> = self
            .orders
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        if query.orders_by_due_date() {
            matching.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        } else {
            matching.sort_by(|a, b| {
                b.order_date
                    .cmp(&a.order_date)
                    .then(b.created_at.cmp(&a.created_at))
                    .then(a.id.cmp(&b.id))
            });
        }

        let offset = row_offset(page, per_page)?;
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(per_page as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineItem, PurchaseOrder, PurchaseOrderStatus};
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn order(reference: &str, day: u32) -> PurchaseOrder {
        PurchaseOrder::new(
            reference,
            NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            vec![LineItem::new(Uuid::new_v4(), 10, dec!(1))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_bumps_version_and_rejects_stale_writers() {
        let repo = InMemoryOrderRepository::<PurchaseOrderStatus>::new();
        let inserted = repo.insert(&order("PO-1", 1)).await.unwrap();
        assert_eq!(inserted.version(), 0);

        let saved = repo.save(&inserted, 0).await.unwrap();
        assert_eq!(saved.version(), 1);

        assert_matches!(
            repo.save(&inserted, 0).await,
            Err(ServiceError::ConcurrentModification(id)) if id == inserted.id
        );
        assert_eq!(repo.find_by_id(inserted.id).await.unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let repo = InMemoryOrderRepository::<PurchaseOrderStatus>::new();
        for day in 1..=5 {
            repo.insert(&order(&format!("PO-{day}"), day)).await.unwrap();
        }

        let page = repo.list(&OrderListQuery::All, 1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages(), 3);
        let references: Vec<_> = page.items.iter().map(|o| o.reference.as_str()).collect();
        assert_eq!(references, vec!["PO-3", "PO-2"]);
    }

    #[tokio::test]
    async fn pages_past_the_row_offset_range_are_rejected() {
        let repo = InMemoryOrderRepository::<PurchaseOrderStatus>::new();
        repo.insert(&order("PO-1", 1)).await.unwrap();

        assert_matches!(
            repo.list(&OrderListQuery::All, u64::MAX, 10).await,
            Err(ServiceError::ValidationError(_))
        );
        let empty = repo.list(&OrderListQuery::All, 50, 10).await.unwrap();
        assert!(empty.items.is_empty());
    }

    #[tokio::test]
    async fn saving_an_unknown_order_is_not_found() {
        let repo = InMemoryOrderRepository::<PurchaseOrderStatus>::new();
        assert_matches!(
            repo.save(&order("PO-X", 1), 0).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
