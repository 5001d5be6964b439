//! Property-based tests for the reconciliation engine.
//!
//! These tests use proptest to check the quantity and status invariants over
//! arbitrary sequences of receipts and shipments.

mod common;

use common::{purchase_order, sales_order};
use proptest::prelude::*;
use stockroom_api::{
    models::{derive_status, FulfillmentStatus, Order, PurchaseOrderStatus, SalesOrderStatus},
    queries::{FilterType, ListFilter, ListQueryState, ListRequest, ViewMode},
    services::{
        reconciliation::{apply_fulfillment, cancel_order},
        FulfillmentLine, FulfillmentRequest,
    },
};

// Strategies for generating test data
fn quantities_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(1i32..200, 1..6)
}

/// Each step picks a line (modulo the line count) and a signed delta.
fn steps_strategy() -> impl Strategy<Value = Vec<(usize, i32)>> {
    prop::collection::vec((0usize..6, -5i32..120), 0..30)
}

fn assert_invariants<S: FulfillmentStatus>(order: &Order<S>) -> Result<(), TestCaseError> {
    for item in order.line_items() {
        prop_assert!(item.fulfilled_quantity >= 0);
        prop_assert!(item.fulfilled_quantity <= item.ordered_quantity);
    }
    prop_assert_eq!(
        order.status(),
        derive_status(order.status(), order.line_items(), order.cancelled_at().is_some())
    );
    let all_done = order.line_items().iter().all(|item| item.is_fully_fulfilled());
    prop_assert_eq!(order.status() == S::FULFILLED, all_done);
    Ok(())
}

fn run_steps<S: FulfillmentStatus>(
    mut order: Order<S>,
    steps: &[(usize, i32)],
) -> Result<Order<S>, TestCaseError> {
    for (index, quantity) in steps {
        let lines = order.line_items();
        let line_item_id = lines[index % lines.len()].id;
        let request = FulfillmentRequest::single(line_item_id, *quantity);

        let before: Vec<i32> = lines.iter().map(|item| item.fulfilled_quantity).collect();
        match apply_fulfillment(&order, &request) {
            Ok(outcome) => {
                // Monotonic: nothing ever goes down.
                for (item, previous) in outcome.order.line_items().iter().zip(&before) {
                    prop_assert!(item.fulfilled_quantity >= *previous);
                }
                prop_assert!(outcome.adjustments.iter().all(|a| a.quantity > 0));
                order = outcome.order;
            }
            Err(_) => {
                // A rejected request must not have been applied anywhere.
                let after: Vec<i32> =
                    order.line_items().iter().map(|item| item.fulfilled_quantity).collect();
                prop_assert_eq!(&before, &after);
            }
        }
        assert_invariants(&order)?;
    }
    Ok(order)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn purchase_receipts_never_exceed_ordered(
        quantities in quantities_strategy(),
        steps in steps_strategy(),
    ) {
        let order = purchase_order("PO-PROP", &quantities);
        run_steps::<PurchaseOrderStatus>(order, &steps)?;
    }

    #[test]
    fn sales_shipments_never_exceed_ordered(
        quantities in quantities_strategy(),
        steps in steps_strategy(),
    ) {
        let order = sales_order("SO-PROP", &quantities);
        run_steps::<SalesOrderStatus>(order, &steps)?;
    }

    #[test]
    fn cancellation_releases_exactly_what_remains(
        quantities in quantities_strategy(),
        steps in steps_strategy(),
    ) {
        let order = run_steps::<PurchaseOrderStatus>(purchase_order("PO-CANCEL", &quantities), &steps)?;
        match cancel_order(&order) {
            Ok(outcome) => {
                let released: i64 = outcome.adjustments.iter().map(|a| i64::from(a.quantity)).sum();
                prop_assert_eq!(released, order.total_remaining());
                prop_assert_eq!(outcome.order.status(), PurchaseOrderStatus::Cancelled);
                prop_assert_eq!(outcome.order.total_fulfilled(), order.total_fulfilled());
            }
            Err(_) => prop_assert!(order.is_terminal()),
        }
    }

    #[test]
    fn exact_remaining_is_accepted_and_one_more_is_not(
        quantities in quantities_strategy(),
        received in 0i32..200,
    ) {
        let order = purchase_order("PO-EDGE", &quantities);
        let (line_item_id, ordered) = (order.line_items()[0].id, order.line_items()[0].ordered_quantity);
        let first = received.min(ordered - 1);
        let order = if first > 0 {
            apply_fulfillment(&order, &FulfillmentRequest::single(line_item_id, first)).unwrap().order
        } else {
            order
        };
        let item = order.line_items()[0].clone();
        let remaining = item.remaining_quantity();

        let over = apply_fulfillment(&order, &FulfillmentRequest::single(item.id, remaining + 1));
        let over_is_rejected = matches!(
            over,
            Err(stockroom_api::errors::ServiceError::OverFulfillment { max_allowed, .. }) if max_allowed == remaining
        );
        prop_assert!(over_is_rejected);

        let exact = apply_fulfillment(
            &order,
            &FulfillmentRequest::new(vec![FulfillmentLine { line_item_id: item.id, quantity: remaining }]),
        ).unwrap();
        prop_assert!(exact.order.line_item(item.id).unwrap().is_fully_fulfilled());
    }

    #[test]
    fn list_state_always_resolves_to_one_criterion(
        search in proptest::option::of("[a-z ]{0,8}"),
        filter in proptest::option::of("[a-z]{1,8}"),
        view in prop_oneof![Just(ViewMode::All), Just(ViewMode::Overdue), Just(ViewMode::Urgent)],
        page in 0u64..50,
    ) {
        let state = ListQueryState::from_parts(
            search.clone(),
            filter.clone().map(|value| ListFilter::new(FilterType::Counterparty, value)),
            view,
            page,
        );
        let request = state.resolve();
        prop_assert_eq!(request.page(), page);

        let has_search = search.map(|s| !s.trim().is_empty()).unwrap_or(false);
        match request {
            ListRequest::Search { .. } => prop_assert!(has_search),
            ListRequest::Filter { .. } => prop_assert!(!has_search && filter.is_some()),
            ListRequest::View { mode, .. } => {
                prop_assert!(!has_search && filter.is_none());
                prop_assert_eq!(mode, view);
            }
            ListRequest::Default { .. } => {
                prop_assert!(!has_search && filter.is_none() && view == ViewMode::All)
            }
        }
    }
}
