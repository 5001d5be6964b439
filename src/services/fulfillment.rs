use chrono::NaiveDate;
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender, FulfilledLine},
    models::{FulfillmentStatus, Order, OrderKind, PurchaseOrderStatus, SalesOrderStatus},
    queries::ListRequest,
    repositories::{OrderRepository, Page},
    services::{
        inventory::{AdjustmentDirection, InventoryCollaborator},
        reconciliation::{self, FulfillmentRequest, NewLineItem, Reconciliation},
    },
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub type PurchaseFulfillmentService = FulfillmentService<PurchaseOrderStatus>;
pub type SalesFulfillmentService = FulfillmentService<SalesOrderStatus>;

/// Applies reconciliation results to the store and the inventory collaborator.
///
/// Mutations of one order are serialized in-process by a per-order lock and
/// guarded across processes by the repository's version check. A version
/// conflict re-reads the order and validates the request again from scratch.
/// When the repository cannot write the ledger in the order's transaction and
/// the inventory collaborator rejects the adjustments after the order was
/// saved, this operation's change is reverted before the error is returned.
pub struct FulfillmentService<S: FulfillmentStatus> {
    repository: Arc<dyn OrderRepository<S>>,
    inventory: Arc<dyn InventoryCollaborator>,
    event_sender: Option<EventSender>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    max_attempts: u32,
}

impl<S: FulfillmentStatus> Clone for FulfillmentService<S> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            inventory: Arc::clone(&self.inventory),
            event_sender: self.event_sender.clone(),
            locks: Arc::clone(&self.locks),
            max_attempts: self.max_attempts,
        }
    }
}

impl<S: FulfillmentStatus> FulfillmentService<S> {
    pub fn new(
        repository: Arc<dyn OrderRepository<S>>,
        inventory: Arc<dyn InventoryCollaborator>,
    ) -> Self {
        Self {
            repository,
            inventory,
            event_sender: None,
            locks: Arc::new(DashMap::new()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_event_sender(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn kind_label() -> &'static str {
        S::KIND.as_str()
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order<S>, ServiceError> {
        self.repository
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::order_not_found(order_id))
    }

    /// Runs the single store query `request` resolves to.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        request: &ListRequest,
        today: NaiveDate,
        urgent_window_days: i64,
        per_page: u64,
    ) -> Result<Page<Order<S>>, ServiceError> {
        let query = request.to_query::<S>(today, urgent_window_days)?;
        self.repository
            .list(&query, request.page(), per_page)
            .await
    }

    /// Receives (purchase) or ships (sales) quantities against line items.
    #[instrument(skip(self, request), fields(kind = Self::kind_label(), lines = request.lines.len()))]
    pub async fn apply_fulfillment(
        &self,
        order_id: Uuid,
        request: FulfillmentRequest,
    ) -> Result<Order<S>, ServiceError> {
        let outcome = self
            .mutate(order_id, "fulfillment", |order| {
                reconciliation::apply_fulfillment(order, &request)
            })
            .await?;

        counter!("stockroom_fulfillment.applied", 1, "kind" => Self::kind_label());
        info!(
            %order_id,
            status = %outcome.order.status(),
            fulfilled = outcome.order.total_fulfilled(),
            ordered = outcome.order.total_ordered(),
            "Fulfillment applied"
        );

        let lines = outcome
            .adjustments
            .iter()
            .filter(|a| a.direction == AdjustmentDirection::Consume)
            .map(|a| FulfilledLine {
                line_item_id: a.line_item_id,
                product_id: a.product_id,
                quantity: a.quantity,
            })
            .collect();
        let mut events = vec![Event::FulfillmentRecorded {
            kind: S::KIND,
            order_id,
            lines,
            fulfilled_on: request.fulfilled_on,
        }];
        events.extend(Self::status_event(&outcome));
        self.publish(events).await;

        Ok(outcome.order)
    }

    #[instrument(skip(self), fields(kind = Self::kind_label()))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order<S>, ServiceError> {
        let outcome = self
            .mutate(order_id, "cancel", reconciliation::cancel_order)
            .await?;

        counter!("stockroom_orders.cancelled", 1, "kind" => Self::kind_label());
        let released_quantity: i64 = outcome.adjustments.iter().map(|a| i64::from(a.quantity)).sum();
        info!(%order_id, released_quantity, "Order cancelled");

        let mut events = vec![Event::OrderCancelled {
            kind: S::KIND,
            order_id,
            released_quantity,
        }];
        events.extend(Self::status_event(&outcome));
        self.publish(events).await;

        Ok(outcome.order)
    }

    fn status_event(outcome: &Reconciliation<S>) -> Option<Event> {
        outcome.status_changed().then(|| Event::OrderStatusChanged {
            kind: S::KIND,
            order_id: outcome.order.id,
            old_status: outcome.previous_status.to_string(),
            new_status: outcome.order.status().to_string(),
        })
    }

    /// Events are best effort: the change is already committed.
    async fn publish(&self, events: Vec<Event>) {
        let Some(sender) = &self.event_sender else {
            return;
        };
        for event in events {
            let name = event.name();
            if let Err(e) = sender.send(event).await {
                warn!(event = name, error = %e, "Failed to publish event");
            }
        }
    }

    fn lock_for(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, order_id: Uuid, lock: Arc<Mutex<()>>) {
        // The map and `lock` hold one reference each; more means someone is waiting.
        self.locks
            .remove_if(&order_id, |_, entry| Arc::strong_count(entry) <= 2);
        drop(lock);
    }

    /// Number of orders with a live lock entry.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn mutate<F>(
        &self,
        order_id: Uuid,
        operation: &'static str,
        plan: F,
    ) -> Result<Reconciliation<S>, ServiceError>
    where
        F: Fn(&Order<S>) -> Result<Reconciliation<S>, ServiceError> + Send + Sync,
    {
        let lock = self.lock_for(order_id);
        let result = {
            let _guard = lock.lock().await;
            self.mutate_locked(order_id, operation, &plan).await
        };
        self.release_lock(order_id, lock);

        if let Err(e) = &result {
            counter!(
                "stockroom_fulfillment.rejected",
                1,
                "kind" => Self::kind_label(),
                "code" => e.code()
            );
        }
        result
    }

    async fn mutate_locked<F>(
        &self,
        order_id: Uuid,
        operation: &'static str,
        plan: &F,
    ) -> Result<Reconciliation<S>, ServiceError>
    where
        F: Fn(&Order<S>) -> Result<Reconciliation<S>, ServiceError> + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            let current = self.get_order(order_id).await?;
            let outcome = plan(&current)?;

            let saved = match self.commit(&current, &outcome, operation).await {
                Ok(saved) => saved,
                Err(e) if e.is_retryable() => {
                    counter!("stockroom_fulfillment.conflicts", 1, "kind" => Self::kind_label());
                    warn!(%order_id, attempt, operation, "Order changed concurrently; re-validating");
                    continue;
                }
                Err(e) => return Err(e),
            };

            return Ok(Reconciliation {
                order: saved,
                previous_status: outcome.previous_status,
                adjustments: outcome.adjustments,
            });
        }

        warn!(%order_id, attempts = self.max_attempts, operation, "Giving up after repeated conflicts");
        Err(ServiceError::ConcurrentModification(order_id))
    }

    /// Persists `outcome` over `current` together with its adjustments.
    ///
    /// Stores that own the ledger do both in one transaction. Otherwise the
    /// order is saved first and, if the collaborator rejects the batch, this
    /// operation's change is undone again.
    async fn commit(
        &self,
        current: &Order<S>,
        outcome: &Reconciliation<S>,
        operation: &'static str,
    ) -> Result<Order<S>, ServiceError> {
        if outcome.adjustments.is_empty() {
            return self.repository.save(&outcome.order, current.version()).await;
        }
        if let Some(saved) = self
            .repository
            .save_with_adjustments(&outcome.order, current.version(), &outcome.adjustments)
            .await?
        {
            return Ok(saved);
        }

        let saved = self.repository.save(&outcome.order, current.version()).await?;
        if let Err(e) = self
            .inventory
            .apply_adjustments(current.id, &outcome.adjustments)
            .await
        {
            self.roll_back(current, &saved, operation).await?;
            return Err(match e {
                ServiceError::CollaboratorFailure(_) => e,
                other => ServiceError::CollaboratorFailure(other.to_string()),
            });
        }
        Ok(saved)
    }

    /// Undoes the change from `previous` to `applied` after the collaborator
    /// rejected its adjustments.
    ///
    /// If another writer got in first, the order is re-read and only this
    /// operation's change is reverted on top of theirs. Failing that, the
    /// order keeps the change and the caller gets an internal error rather
    /// than a collaborator failure.
    async fn roll_back(
        &self,
        previous: &Order<S>,
        applied: &Order<S>,
        operation: &'static str,
    ) -> Result<(), ServiceError> {
        counter!("stockroom_fulfillment.rollbacks", 1, "kind" => Self::kind_label());
        let order_id = previous.id;
        let mut target = previous.clone();
        let mut expected_version = applied.version();

        let mut failure = ServiceError::ConcurrentModification(order_id);
        for attempt in 1..=self.max_attempts {
            match self.repository.save(&target, expected_version).await {
                Ok(_) => {
                    warn!(%order_id, operation, attempt, "Inventory adjustment failed; order restored");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    warn!(%order_id, operation, attempt, "Order moved on before it could be restored");
                    failure = e;
                    let reverted = self.get_order(order_id).await.and_then(|fresh| {
                        reconciliation::revert_change(&fresh, previous, applied)
                            .map(|order| (fresh.version(), order))
                    });
                    match reverted {
                        Ok((version, order)) => {
                            expected_version = version;
                            target = order;
                        }
                        Err(e) => {
                            failure = e;
                            break;
                        }
                    }
                }
                Err(e) => {
                    failure = e;
                    break;
                }
            }
        }

        counter!("stockroom_fulfillment.rollback_failures", 1, "kind" => Self::kind_label());
        error!(
            %order_id,
            operation,
            error = %failure,
            "Inventory adjustment failed and the order could not be restored"
        );
        Err(ServiceError::InternalError(format!(
            "Order {} was updated but its inventory adjustments failed and the change could not be undone: {}",
            order_id, failure
        )))
    }
}

impl FulfillmentService<SalesOrderStatus> {
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn add_line_items(
        &self,
        order_id: Uuid,
        items: Vec<NewLineItem>,
    ) -> Result<Order<SalesOrderStatus>, ServiceError> {
        let outcome = self
            .mutate(order_id, "add_items", |order| {
                reconciliation::add_line_items(order, &items)
            })
            .await?;

        let line_item_ids: Vec<Uuid> = outcome.adjustments.iter().map(|a| a.line_item_id).collect();
        info!(%order_id, added = line_item_ids.len(), "Line items added");

        let mut events = vec![Event::LineItemsAdded {
            order_id,
            line_item_ids,
        }];
        events.extend(Self::status_event(&outcome));
        self.publish(events).await;

        Ok(outcome.order)
    }

    #[instrument(skip(self))]
    pub async fn remove_line_item(
        &self,
        order_id: Uuid,
        line_item_id: Uuid,
    ) -> Result<Order<SalesOrderStatus>, ServiceError> {
        let outcome = self
            .mutate(order_id, "remove_item", |order| {
                reconciliation::remove_line_item(order, line_item_id)
            })
            .await?;

        info!(%order_id, %line_item_id, "Line item removed");

        let mut events = vec![Event::LineItemRemoved {
            order_id,
            line_item_id,
        }];
        events.extend(Self::status_event(&outcome));
        self.publish(events).await;

        Ok(outcome.order)
    }
}

impl<S: FulfillmentStatus> std::fmt::Debug for FulfillmentService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulfillmentService")
            .field("kind", &OrderKind::as_str(S::KIND))
            .field("max_attempts", &self.max_attempts)
            .field("active_locks", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{LineItem, PurchaseOrder, SalesOrder},
        repositories::InMemoryOrderRepository,
        services::inventory::{InMemoryInventoryLedger, MockInventoryCollaborator, StockLevel},
    };
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    async fn seeded_purchase(
        repo: &InMemoryOrderRepository<PurchaseOrderStatus>,
        ordered: i32,
    ) -> PurchaseOrder {
        let order = PurchaseOrder::new(
            "PO-2024-0100",
            date(),
            vec![LineItem::new(Uuid::new_v4(), ordered, dec!(2))],
        )
        .unwrap();
        repo.insert(&order).await.unwrap()
    }

    #[tokio::test]
    async fn fulfillment_persists_adjusts_inventory_and_publishes() {
        let repo = InMemoryOrderRepository::new();
        let ledger = InMemoryInventoryLedger::new();
        let order = seeded_purchase(&repo, 100).await;
        let line = order.line_items()[0].clone();
        ledger
            .set_level(
                line.product_id,
                StockLevel {
                    on_hand: 0,
                    reserved: 0,
                    incoming: 100,
                },
            )
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let service = FulfillmentService::new(Arc::new(repo.clone()), Arc::new(ledger.clone()))
            .with_event_sender(EventSender::new(tx));

        let updated = service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line.id, 40))
            .await
            .unwrap();
        assert_eq!(updated.status(), PurchaseOrderStatus::PartiallyReceived);
        assert_eq!(updated.version(), 1);

        let level = ledger.level(line.product_id).unwrap();
        assert_eq!(level.on_hand, 40);
        assert_eq!(level.incoming, 60);

        assert_matches!(rx.recv().await, Some(Event::FulfillmentRecorded { lines, .. }) if lines[0].quantity == 40);
        assert_matches!(
            rx.recv().await,
            Some(Event::OrderStatusChanged { new_status, .. }) if new_status == "PARTIALLY_RECEIVED"
        );
        assert_eq!(service.active_locks(), 0);
    }

    #[tokio::test]
    async fn collaborator_failure_restores_the_previous_order() {
        let repo = InMemoryOrderRepository::new();
        let order = seeded_purchase(&repo, 10).await;
        let line = order.line_items()[0].id;

        let mut inventory = MockInventoryCollaborator::new();
        inventory
            .expect_apply_adjustments()
            .times(1)
            .returning(|_, _| Err(ServiceError::CollaboratorFailure("ledger offline".into())));

        let service = FulfillmentService::new(Arc::new(repo.clone()), Arc::new(inventory));
        let result = service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line, 4))
            .await;
        assert_matches!(result, Err(ServiceError::CollaboratorFailure(_)));

        let stored = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.line_items()[0].fulfilled_quantity, 0);
        assert_eq!(stored.status(), PurchaseOrderStatus::AwaitingApproval);
    }

    #[tokio::test]
    async fn rejected_requests_do_not_touch_inventory() {
        let repo = InMemoryOrderRepository::new();
        let order = seeded_purchase(&repo, 10).await;
        let line = order.line_items()[0].id;

        let mut inventory = MockInventoryCollaborator::new();
        inventory.expect_apply_adjustments().never();

        let service = FulfillmentService::new(Arc::new(repo.clone()), Arc::new(inventory));
        let result = service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line, 11))
            .await;
        assert_matches!(result, Err(ServiceError::OverFulfillment { max_allowed: 10, .. }));
        assert_eq!(repo.find_by_id(order.id).await.unwrap().unwrap().version(), 0);
    }

    #[tokio::test]
    async fn missing_orders_are_not_found() {
        let service = PurchaseFulfillmentService::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryInventoryLedger::new()),
        );
        assert_matches!(
            service.cancel_order(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn sales_items_can_be_added_and_removed() {
        let repo = InMemoryOrderRepository::<SalesOrderStatus>::new();
        let order = SalesOrder::new(
            "SO-2024-0100",
            date(),
            vec![LineItem::new(Uuid::new_v4(), 2, dec!(5))],
        )
        .unwrap();
        let order = repo.insert(&order).await.unwrap();
        let ledger = InMemoryInventoryLedger::new();
        let service = SalesFulfillmentService::new(Arc::new(repo.clone()), Arc::new(ledger.clone()));

        let product = Uuid::new_v4();
        let updated = service
            .add_line_items(
                order.id,
                vec![NewLineItem {
                    product_id: product,
                    quantity: 3,
                    unit_price: dec!(7),
                }],
            )
            .await
            .unwrap();
        assert_eq!(updated.line_items().len(), 2);
        assert_eq!(ledger.level(product).unwrap().reserved, 3);

        let added = updated
            .line_items()
            .iter()
            .find(|i| i.product_id == product)
            .unwrap()
            .id;
        let trimmed = service.remove_line_item(order.id, added).await.unwrap();
        assert_eq!(trimmed.line_items().len(), 1);
        assert_eq!(ledger.level(product).unwrap().reserved, 0);
        assert_eq!(trimmed.version(), 2);
    }
}
