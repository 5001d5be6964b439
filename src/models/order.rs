use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use super::{
    line_item::LineItem,
    status::{FulfillmentStatus, PurchaseOrderStatus, SalesOrderStatus},
};
use crate::errors::ServiceError;

pub type PurchaseOrder = Order<PurchaseOrderStatus>;
pub type SalesOrder = Order<SalesOrderStatus>;

/// Derives an order's status from its line items.
///
/// A recorded cancellation always wins, an externally failed order stays
/// failed, and an order without progress keeps its current open status.
pub fn derive_status<S: FulfillmentStatus>(
    current: S,
    line_items: &[LineItem],
    cancelled: bool,
) -> S {
    if cancelled {
        return S::CANCELLED;
    }
    if current == S::FAILED || line_items.is_empty() {
        return current;
    }
    if line_items.iter().all(LineItem::is_fully_fulfilled) {
        S::FULFILLED
    } else if line_items.iter().any(LineItem::has_progress) {
        S::PARTIALLY_FULFILLED
    } else {
        current
    }
}

/// Every stored field of an order, used when loading from a store.
#[derive(Debug, Clone)]
pub struct OrderParts<S> {
    pub id: Uuid,
    pub reference: String,
    pub counterparty: Option<String>,
    pub status: S,
    pub order_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub last_fulfilled_on: Option<NaiveDate>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub line_items: Vec<LineItem>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchase or sales order and the line items it exclusively owns.
///
/// Status, line items and the concurrency version are private: they only
/// change through the reconciliation engine and the repositories.
#[derive(Debug, Clone, PartialEq)]
pub struct Order<S> {
    pub id: Uuid,
    pub reference: String,
    pub counterparty: Option<String>,
    status: S,
    pub order_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub last_fulfilled_on: Option<NaiveDate>,
    cancelled_at: Option<DateTime<Utc>>,
    line_items: Vec<LineItem>,
    version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<S: FulfillmentStatus> Order<S> {
    /// Builds a new order in its open status.
    pub fn new(
        reference: impl Into<String>,
        order_date: NaiveDate,
        line_items: Vec<LineItem>,
    ) -> Result<Self, ServiceError> {
        let now = Utc::now();
        let mut order = Self::restore(OrderParts {
            id: Uuid::new_v4(),
            reference: reference.into(),
            counterparty: None,
            status: S::OPEN,
            order_date,
            due_date: None,
            last_fulfilled_on: None,
            cancelled_at: None,
            line_items,
            version: 0,
            created_at: now,
            updated_at: now,
        })?;
        order.refresh_status();
        Ok(order)
    }

    /// Rebuilds an order from stored parts, checking quantity bounds.
    ///
    /// The stored status is kept as-is so externally set states such as
    /// `FAILED` survive a round trip.
    pub fn restore(parts: OrderParts<S>) -> Result<Self, ServiceError> {
        if parts.reference.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Order reference must not be empty".to_string(),
            ));
        }
        if parts.line_items.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Order {} must have at least one line item",
                parts.reference
            )));
        }

        let mut products = HashSet::new();
        for item in &parts.line_items {
            item.check_bounds().map_err(ServiceError::ValidationError)?;
            if !products.insert(item.product_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} appears more than once on order {}",
                    item.product_id, parts.reference
                )));
            }
        }

        Ok(Self {
            id: parts.id,
            reference: parts.reference,
            counterparty: parts.counterparty,
            status: parts.status,
            order_date: parts.order_date,
            due_date: parts.due_date,
            last_fulfilled_on: parts.last_fulfilled_on,
            cancelled_at: parts.cancelled_at,
            line_items: parts.line_items,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn status(&self) -> S {
        self.status
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn line_item(&self, line_item_id: Uuid) -> Option<&LineItem> {
        self.line_items.iter().find(|item| item.id == line_item_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Totals are widened to `i64` so many capped lines cannot overflow.
    pub fn total_ordered(&self) -> i64 {
        self.line_items.iter().map(|i| i64::from(i.ordered_quantity)).sum()
    }

    pub fn total_fulfilled(&self) -> i64 {
        self.line_items.iter().map(|i| i64::from(i.fulfilled_quantity)).sum()
    }

    pub fn total_remaining(&self) -> i64 {
        self.line_items
            .iter()
            .map(|i| i64::from(i.remaining_quantity()))
            .sum()
    }

    pub fn total_value(&self) -> Decimal {
        self.line_items.iter().map(LineItem::line_total).sum()
    }

    /// Overdue: due before `today` and still open.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_terminal() && self.due_date.is_some_and(|due| due < today)
    }

    /// Urgent: due within `window_days` from `today` (inclusive) and still open.
    pub fn is_urgent(&self, today: NaiveDate, window_days: i64) -> bool {
        !self.is_terminal()
            && self.due_date.is_some_and(|due| {
                let days_until_due = (due - today).num_days();
                (0..=window_days).contains(&days_until_due)
            })
    }

    /// The order's parts, e.g. for persisting.
    pub fn to_parts(&self) -> OrderParts<S> {
        OrderParts {
            id: self.id,
            reference: self.reference.clone(),
            counterparty: self.counterparty.clone(),
            status: self.status,
            order_date: self.order_date,
            due_date: self.due_date,
            last_fulfilled_on: self.last_fulfilled_on,
            cancelled_at: self.cancelled_at,
            line_items: self.line_items.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn add_fulfilled(&mut self, line_item_id: Uuid, quantity: i32) {
        if let Some(item) = self.line_items.iter_mut().find(|i| i.id == line_item_id) {
            item.fulfilled_quantity += quantity;
        }
    }

    pub(crate) fn push_line_item(&mut self, item: LineItem) {
        self.line_items.push(item);
    }

    pub(crate) fn take_line_item(&mut self, line_item_id: Uuid) -> Option<LineItem> {
        let index = self.line_items.iter().position(|i| i.id == line_item_id)?;
        Some(self.line_items.remove(index))
    }

    pub(crate) fn mark_cancelled(&mut self, at: DateTime<Utc>) {
        self.cancelled_at = Some(at);
    }

    pub(crate) fn refresh_status(&mut self) {
        self.status = derive_status(self.status, &self.line_items, self.cancelled_at.is_some());
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    pub(crate) fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}
