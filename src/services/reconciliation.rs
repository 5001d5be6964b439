//! Partial-fulfillment reconciliation.
//!
//! Every function here is pure: it validates a request against the order as
//! last read, and on success returns a modified copy together with the
//! inventory instructions the change implies. Nothing is persisted and the
//! input order is never touched, so a rejected request leaves no trace.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{
        FulfillmentStatus, LineItem, Order, OrderKind, SalesOrder, SalesOrderStatus,
        MAX_LINE_QUANTITY, MAX_UNIT_PRICE,
    },
    services::inventory::InventoryAdjustment,
};

/// Quantity to add to one line item's fulfilled total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentLine {
    pub line_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub lines: Vec<FulfillmentLine>,
    /// Actual arrival date (purchase) or ship date (sales).
    pub fulfilled_on: Option<NaiveDate>,
}

impl FulfillmentRequest {
    pub fn new(lines: Vec<FulfillmentLine>) -> Self {
        Self {
            lines,
            fulfilled_on: None,
        }
    }

    pub fn single(line_item_id: Uuid, quantity: i32) -> Self {
        Self::new(vec![FulfillmentLine {
            line_item_id,
            quantity,
        }])
    }

    pub fn with_fulfilled_on(mut self, date: NaiveDate) -> Self {
        self.fulfilled_on = Some(date);
        self
    }
}

/// A product to append to a sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Result of a successful engine call.
#[derive(Debug, Clone)]
pub struct Reconciliation<S> {
    pub order: Order<S>,
    pub previous_status: S,
    pub adjustments: Vec<InventoryAdjustment>,
}

impl<S: FulfillmentStatus> Reconciliation<S> {
    pub fn status_changed(&self) -> bool {
        self.order.status() != self.previous_status
    }
}

fn ensure_mutable<S: FulfillmentStatus>(order: &Order<S>) -> Result<(), ServiceError> {
    if order.is_terminal() {
        return Err(ServiceError::OrderTerminal {
            order_id: order.id,
            status: order.status().to_string(),
        });
    }
    Ok(())
}

/// Adds the requested quantities to the order's line items.
pub fn apply_fulfillment<S: FulfillmentStatus>(
    order: &Order<S>,
    request: &FulfillmentRequest,
) -> Result<Reconciliation<S>, ServiceError> {
    ensure_mutable(order)?;

    if request.lines.is_empty() {
        return Err(ServiceError::InvalidDelta(
            "At least one line item quantity is required".to_string(),
        ));
    }
    for line in &request.lines {
        if order.line_item(line.line_item_id).is_none() {
            return Err(ServiceError::UnknownLineItem {
                order_id: order.id,
                line_item_id: line.line_item_id,
            });
        }
    }

    let mut seen = HashSet::with_capacity(request.lines.len());
    for line in &request.lines {
        if line.quantity < 0 {
            return Err(ServiceError::InvalidDelta(format!(
                "Quantity for line item {} must not be negative",
                line.line_item_id
            )));
        }
        if !seen.insert(line.line_item_id) {
            return Err(ServiceError::InvalidDelta(format!(
                "Line item {} appears more than once in the request",
                line.line_item_id
            )));
        }
    }

    let mut targeted = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        let Some(item) = order.line_item(line.line_item_id) else {
            continue;
        };
        let remaining = item.remaining_quantity();
        if line.quantity > remaining {
            return Err(ServiceError::OverFulfillment {
                line_item_id: item.id,
                max_allowed: remaining,
            });
        }
        if line.quantity > 0 {
            targeted.push((item.id, item.product_id, line.quantity));
        }
    }

    if targeted.is_empty() {
        return Err(ServiceError::InvalidDelta(
            "At least one quantity must be greater than zero".to_string(),
        ));
    }

    let previous_status = order.status();
    let mut next = order.clone();
    let mut adjustments = Vec::with_capacity(targeted.len());
    for (line_item_id, product_id, quantity) in targeted {
        next.add_fulfilled(line_item_id, quantity);
        adjustments.push(InventoryAdjustment::consume(
            S::KIND,
            line_item_id,
            product_id,
            quantity,
        ));
    }
    if request.fulfilled_on.is_some() {
        next.last_fulfilled_on = request.fulfilled_on;
    }
    next.refresh_status();
    next.touch(Utc::now());

    Ok(Reconciliation {
        order: next,
        previous_status,
        adjustments,
    })
}

/// Cancels the order and releases whatever is still outstanding.
pub fn cancel_order<S: FulfillmentStatus>(
    order: &Order<S>,
) -> Result<Reconciliation<S>, ServiceError> {
    ensure_mutable(order)?;

    let adjustments = order
        .line_items()
        .iter()
        .filter(|item| item.remaining_quantity() > 0)
        .map(|item| {
            InventoryAdjustment::release(S::KIND, item.id, item.product_id, item.remaining_quantity())
        })
        .collect();

    let now = Utc::now();
    let mut next = order.clone();
    next.mark_cancelled(now);
    next.refresh_status();
    next.touch(now);

    Ok(Reconciliation {
        order: next,
        previous_status: order.status(),
        adjustments,
    })
}

/// Appends products to a sales order, reserving their quantities.
pub fn add_line_items(
    order: &SalesOrder,
    items: &[NewLineItem],
) -> Result<Reconciliation<SalesOrderStatus>, ServiceError> {
    ensure_mutable(order)?;

    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one order item is required".to_string(),
        ));
    }

    let mut products: HashSet<Uuid> = order.line_items().iter().map(|i| i.product_id).collect();
    for item in items {
        if item.quantity <= 0 || item.quantity > MAX_LINE_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be between 1 and {}",
                item.product_id, MAX_LINE_QUANTITY
            )));
        }
        if item.unit_price.is_sign_negative() || item.unit_price > MAX_UNIT_PRICE {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for product {} must be between 0 and {}",
                item.product_id, MAX_UNIT_PRICE
            )));
        }
        if !products.insert(item.product_id) {
            return Err(ServiceError::ValidationError(format!(
                "Product {} is already on order {}",
                item.product_id, order.reference
            )));
        }
    }

    let mut next = order.clone();
    let mut adjustments = Vec::with_capacity(items.len());
    for item in items {
        let line = LineItem::new(item.product_id, item.quantity, item.unit_price);
        adjustments.push(InventoryAdjustment::reserve(
            OrderKind::Sales,
            line.id,
            line.product_id,
            line.ordered_quantity,
        ));
        next.push_line_item(line);
    }
    next.refresh_status();
    next.touch(Utc::now());

    Ok(Reconciliation {
        order: next,
        previous_status: order.status(),
        adjustments,
    })
}

/// Removes a line item that has not been fulfilled at all.
pub fn remove_line_item(
    order: &SalesOrder,
    line_item_id: Uuid,
) -> Result<Reconciliation<SalesOrderStatus>, ServiceError> {
    ensure_mutable(order)?;

    let item = order
        .line_item(line_item_id)
        .ok_or(ServiceError::UnknownLineItem {
            order_id: order.id,
            line_item_id,
        })?;
    if item.has_progress() {
        return Err(ServiceError::InvalidOperation(format!(
            "Line item {} already has {} fulfilled and cannot be removed",
            line_item_id, item.fulfilled_quantity
        )));
    }
    if order.line_items().len() == 1 {
        return Err(ServiceError::InvalidOperation(format!(
            "Order {} must keep at least one line item",
            order.reference
        )));
    }

    let mut next = order.clone();
    let adjustments = next
        .take_line_item(line_item_id)
        .map(|removed| {
            vec![InventoryAdjustment::release(
                OrderKind::Sales,
                removed.id,
                removed.product_id,
                removed.ordered_quantity,
            )]
        })
        .unwrap_or_default();
    next.refresh_status();
    next.touch(Utc::now());

    Ok(Reconciliation {
        order: next,
        previous_status: order.status(),
        adjustments,
    })
}

/// Reverts the change that turned `previous` into `applied`, on top of
/// `fresh`, keeping anything another writer changed in between.
///
/// Fulfilled deltas are subtracted, added lines dropped, removed lines put
/// back, and a cancellation this change recorded is cleared. Fails when the
/// result is no longer a valid order.
pub fn revert_change<S: FulfillmentStatus>(
    fresh: &Order<S>,
    previous: &Order<S>,
    applied: &Order<S>,
) -> Result<Order<S>, ServiceError> {
    let mut parts = fresh.to_parts();

    parts.line_items.retain(|item| {
        previous.line_item(item.id).is_some() || applied.line_item(item.id).is_none()
    });
    for item in &mut parts.line_items {
        let pair = (previous.line_item(item.id), applied.line_item(item.id));
        if let (Some(before), Some(after)) = pair {
            item.fulfilled_quantity -= after.fulfilled_quantity - before.fulfilled_quantity;
        }
    }
    for item in previous.line_items() {
        let still_present = parts.line_items.iter().any(|i| i.id == item.id);
        if applied.line_item(item.id).is_none() && !still_present {
            parts.line_items.push(item.clone());
        }
    }

    if previous.cancelled_at().is_none() && parts.cancelled_at == applied.cancelled_at() {
        parts.cancelled_at = None;
    }
    if parts.last_fulfilled_on == applied.last_fulfilled_on {
        parts.last_fulfilled_on = previous.last_fulfilled_on;
    }
    if parts.status == applied.status() {
        parts.status = previous.status();
    }

    let mut order = Order::restore(parts)?;
    order.refresh_status();
    order.touch(Utc::now());
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{PurchaseOrder, PurchaseOrderStatus},
        services::inventory::AdjustmentDirection,
    };
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn po(ordered: i32, fulfilled: i32) -> PurchaseOrder {
        let mut item = LineItem::new(Uuid::new_v4(), ordered, dec!(4.25));
        item.fulfilled_quantity = fulfilled;
        PurchaseOrder::new(
            "PO-2024-0001",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            vec![item],
        )
        .unwrap()
    }

    fn so(quantities: &[i32]) -> SalesOrder {
        let items = quantities
            .iter()
            .map(|q| LineItem::new(Uuid::new_v4(), *q, dec!(10)))
            .collect();
        SalesOrder::new(
            "SO-2024-0001",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            items,
        )
        .unwrap()
    }

    #[test]
    fn receiving_in_two_steps_completes_the_purchase_order() {
        let order = po(100, 0);
        let line = order.line_items()[0].id;

        let first = apply_fulfillment(&order, &FulfillmentRequest::single(line, 40)).unwrap();
        assert_eq!(first.order.line_items()[0].fulfilled_quantity, 40);
        assert_eq!(first.order.status(), PurchaseOrderStatus::PartiallyReceived);
        assert!(first.status_changed());
        assert_eq!(first.adjustments.len(), 1);
        assert_eq!(first.adjustments[0].direction, AdjustmentDirection::Consume);
        assert_eq!(first.adjustments[0].quantity, 40);

        let second =
            apply_fulfillment(&first.order, &FulfillmentRequest::single(line, 60)).unwrap();
        assert_eq!(second.order.status(), PurchaseOrderStatus::Received);

        let third = apply_fulfillment(&second.order, &FulfillmentRequest::single(line, 1));
        assert_matches!(third, Err(ServiceError::OrderTerminal { .. }));
    }

    #[test]
    fn over_fulfillment_reports_the_remaining_maximum() {
        let order = po(100, 40);
        let line = order.line_items()[0].id;

        let result = apply_fulfillment(&order, &FulfillmentRequest::single(line, 61));
        assert_matches!(
            result,
            Err(ServiceError::OverFulfillment { line_item_id, max_allowed: 60 }) if line_item_id == line
        );
        assert_eq!(order.line_items()[0].fulfilled_quantity, 40);
    }

    #[test]
    fn zero_delta_lines_are_ignored_when_another_line_progresses() {
        let order = so(&[5, 3]);
        let (first, second) = (order.line_items()[0].id, order.line_items()[1].id);
        let request = FulfillmentRequest::new(vec![
            FulfillmentLine {
                line_item_id: first,
                quantity: 5,
            },
            FulfillmentLine {
                line_item_id: second,
                quantity: 0,
            },
        ]);

        let outcome = apply_fulfillment(&order, &request).unwrap();
        assert_eq!(outcome.order.line_item(first).unwrap().fulfilled_quantity, 5);
        assert_eq!(outcome.order.line_item(second).unwrap().fulfilled_quantity, 0);
        assert_eq!(outcome.order.status(), SalesOrderStatus::PartiallyApproved);
        assert_eq!(outcome.adjustments.len(), 1);
    }

    #[test]
    fn requests_without_positive_quantities_are_invalid() {
        let order = so(&[5]);
        let line = order.line_items()[0].id;
        assert_matches!(
            apply_fulfillment(&order, &FulfillmentRequest::single(line, 0)),
            Err(ServiceError::InvalidDelta(_))
        );
        assert_matches!(
            apply_fulfillment(&order, &FulfillmentRequest::default()),
            Err(ServiceError::InvalidDelta(_))
        );
        assert_matches!(
            apply_fulfillment(&order, &FulfillmentRequest::single(line, -2)),
            Err(ServiceError::InvalidDelta(_))
        );
    }

    #[test]
    fn duplicate_line_ids_in_one_request_are_invalid() {
        let order = so(&[5]);
        let line = order.line_items()[0].id;
        let request = FulfillmentRequest::new(vec![
            FulfillmentLine {
                line_item_id: line,
                quantity: 2,
            },
            FulfillmentLine {
                line_item_id: line,
                quantity: 2,
            },
        ]);
        assert_matches!(
            apply_fulfillment(&order, &request),
            Err(ServiceError::InvalidDelta(_))
        );
    }

    #[test]
    fn unknown_line_item_is_reported_before_quantity_checks() {
        let order = so(&[5]);
        let stranger = Uuid::new_v4();
        assert_matches!(
            apply_fulfillment(&order, &FulfillmentRequest::single(stranger, -1)),
            Err(ServiceError::UnknownLineItem { line_item_id, .. }) if line_item_id == stranger
        );
    }

    #[test]
    fn fulfilled_on_is_recorded_when_given() {
        let order = po(10, 0);
        let line = order.line_items()[0].id;
        let arrival = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let outcome = apply_fulfillment(
            &order,
            &FulfillmentRequest::single(line, 3).with_fulfilled_on(arrival),
        )
        .unwrap();
        assert_eq!(outcome.order.last_fulfilled_on, Some(arrival));
    }

    #[test]
    fn cancelling_releases_only_the_unfulfilled_remainder() {
        let order = po(100, 40);
        let outcome = cancel_order(&order).unwrap();

        assert_eq!(outcome.order.status(), PurchaseOrderStatus::Cancelled);
        assert!(outcome.order.cancelled_at().is_some());
        assert_eq!(outcome.order.line_items()[0].fulfilled_quantity, 40);
        assert_eq!(outcome.adjustments.len(), 1);
        assert_eq!(outcome.adjustments[0].direction, AdjustmentDirection::Release);
        assert_eq!(outcome.adjustments[0].quantity, 60);

        assert_matches!(
            cancel_order(&outcome.order),
            Err(ServiceError::OrderTerminal { .. })
        );
    }

    #[test]
    fn adding_items_reserves_and_rejects_duplicate_products() {
        let order = so(&[2]);
        let existing_product = order.line_items()[0].product_id;
        let new_product = Uuid::new_v4();

        let outcome = add_line_items(
            &order,
            &[NewLineItem {
                product_id: new_product,
                quantity: 4,
                unit_price: dec!(3),
            }],
        )
        .unwrap();
        assert_eq!(outcome.order.line_items().len(), 2);
        assert_eq!(outcome.adjustments[0].direction, AdjustmentDirection::Reserve);
        assert_eq!(outcome.adjustments[0].quantity, 4);

        let duplicate = add_line_items(
            &order,
            &[NewLineItem {
                product_id: existing_product,
                quantity: 1,
                unit_price: dec!(3),
            }],
        );
        assert_matches!(duplicate, Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn adding_items_caps_quantity_and_price() {
        let order = so(&[2]);
        let item = |quantity: i32, unit_price: Decimal| NewLineItem {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
        };

        assert_matches!(
            add_line_items(&order, &[item(2_000_000_000, dec!(1)), item(2_000_000_000, dec!(1))]),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            add_line_items(&order, &[item(1, MAX_UNIT_PRICE + dec!(0.01))]),
            Err(ServiceError::ValidationError(_))
        );

        let at_cap = add_line_items(&order, &[item(MAX_LINE_QUANTITY, MAX_UNIT_PRICE)]).unwrap();
        assert_eq!(
            at_cap.order.total_ordered(),
            i64::from(MAX_LINE_QUANTITY) + 2
        );
    }

    #[test]
    fn revert_undoes_only_this_change_on_top_of_a_later_one() {
        let order = so(&[10, 10]);
        let (first, second) = (order.line_items()[0].id, order.line_items()[1].id);

        let shipped_on = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let ours = apply_fulfillment(
            &order,
            &FulfillmentRequest::single(first, 4).with_fulfilled_on(shipped_on),
        )
        .unwrap()
        .order;
        let theirs = apply_fulfillment(&ours, &FulfillmentRequest::single(second, 3))
            .unwrap()
            .order;

        let reverted = revert_change(&theirs, &order, &ours).unwrap();
        assert_eq!(reverted.line_item(first).unwrap().fulfilled_quantity, 0);
        assert_eq!(reverted.line_item(second).unwrap().fulfilled_quantity, 3);
        assert_eq!(reverted.status(), SalesOrderStatus::PartiallyApproved);
    }

    #[test]
    fn revert_clears_a_cancellation_and_restores_lines() {
        let order = so(&[5, 2]);
        let cancelled = cancel_order(&order).unwrap().order;
        let reverted = revert_change(&cancelled, &order, &cancelled).unwrap();
        assert_eq!(reverted.cancelled_at(), None);
        assert_eq!(reverted.status(), order.status());

        let removed_id = order.line_items()[1].id;
        let trimmed = remove_line_item(&order, removed_id).unwrap().order;
        let restored = revert_change(&trimmed, &order, &trimmed).unwrap();
        assert!(restored.line_item(removed_id).is_some());

        let added = add_line_items(
            &order,
            &[NewLineItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: dec!(1),
            }],
        )
        .unwrap()
        .order;
        assert_eq!(
            revert_change(&added, &order, &added).unwrap().line_items().len(),
            2
        );
    }

    #[test]
    fn removing_items_requires_no_progress_and_keeps_one_item() {
        let order = so(&[2, 3]);
        let (first, second) = (order.line_items()[0].id, order.line_items()[1].id);

        let shipped = apply_fulfillment(&order, &FulfillmentRequest::single(first, 2))
            .unwrap()
            .order;
        assert_matches!(
            remove_line_item(&shipped, first),
            Err(ServiceError::InvalidOperation(_))
        );

        // Dropping the only open line leaves a fully shipped order.
        let outcome = remove_line_item(&shipped, second).unwrap();
        assert_eq!(outcome.order.status(), SalesOrderStatus::Completed);
        assert_eq!(outcome.adjustments[0].direction, AdjustmentDirection::Release);
        assert_eq!(outcome.adjustments[0].quantity, 3);

        let single = so(&[1]);
        let only = single.line_items()[0].id;
        assert_matches!(
            remove_line_item(&single, only),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            remove_line_item(&single, Uuid::new_v4()),
            Err(ServiceError::UnknownLineItem { .. })
        );
    }
}
