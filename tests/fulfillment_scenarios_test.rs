//! End-to-end reconciliation scenarios through the fulfillment service.

mod common;

use assert_matches::assert_matches;
use common::{in_memory_service, purchase_order, sales_order};
use rstest::rstest;
use stockroom_api::{
    errors::ServiceError,
    models::{PurchaseOrderStatus, SalesOrderStatus},
    repositories::OrderRepository,
    services::{AdjustmentDirection, FulfillmentLine, FulfillmentRequest},
};

#[tokio::test]
async fn scenario_a_receipts_accumulate_until_the_order_locks() {
    let order = purchase_order("PO-A", &[100]);
    let line = order.line_items()[0].id;
    let (service, _, _) = in_memory_service(&order).await;
    assert_eq!(order.status(), PurchaseOrderStatus::AwaitingApproval);

    let partial = service
        .apply_fulfillment(order.id, FulfillmentRequest::single(line, 40))
        .await
        .unwrap();
    assert_eq!(partial.line_items()[0].fulfilled_quantity, 40);
    assert_eq!(partial.status(), PurchaseOrderStatus::PartiallyReceived);

    let full = service
        .apply_fulfillment(order.id, FulfillmentRequest::single(line, 60))
        .await
        .unwrap();
    assert_eq!(full.line_items()[0].fulfilled_quantity, 100);
    assert_eq!(full.status(), PurchaseOrderStatus::Received);

    assert_matches!(
        service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line, 1))
            .await,
        Err(ServiceError::OrderTerminal { .. })
    );
}

#[tokio::test]
async fn scenario_b_over_receipt_reports_the_remaining_quantity() {
    let order = purchase_order("PO-B", &[100]);
    let line = order.line_items()[0].id;
    let (service, repo, ledger) = in_memory_service(&order).await;
    service
        .apply_fulfillment(order.id, FulfillmentRequest::single(line, 40))
        .await
        .unwrap();
    let journal_before = ledger.journal().unwrap().len();

    assert_matches!(
        service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line, 61))
            .await,
        Err(ServiceError::OverFulfillment { line_item_id, max_allowed: 60 }) if line_item_id == line
    );

    let stored = repo.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.line_items()[0].fulfilled_quantity, 40);
    assert_eq!(ledger.journal().unwrap().len(), journal_before);
}

#[tokio::test]
async fn scenario_c_zero_deltas_ride_along_with_a_positive_one() {
    let order = sales_order("SO-C", &[5, 3]);
    let (first, second) = (order.line_items()[0].id, order.line_items()[1].id);
    let (service, _, ledger) = in_memory_service(&order).await;

    let updated = service
        .apply_fulfillment(
            order.id,
            FulfillmentRequest::new(vec![
                FulfillmentLine {
                    line_item_id: first,
                    quantity: 5,
                },
                FulfillmentLine {
                    line_item_id: second,
                    quantity: 0,
                },
            ]),
        )
        .await
        .unwrap();

    assert!(updated.line_item(first).unwrap().is_fully_fulfilled());
    assert_eq!(updated.line_item(second).unwrap().fulfilled_quantity, 0);
    assert_eq!(updated.status(), SalesOrderStatus::PartiallyApproved);

    // Only the positive line produced an inventory instruction.
    let journal = ledger.journal().unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].adjustment.line_item_id, first);
}

#[tokio::test]
async fn scenario_d_cancellation_releases_only_the_unfulfilled_remainder() {
    let order = purchase_order("PO-D", &[100]);
    let line = order.line_items()[0].id;
    let (service, _, ledger) = in_memory_service(&order).await;
    service
        .apply_fulfillment(order.id, FulfillmentRequest::single(line, 40))
        .await
        .unwrap();

    let cancelled = service.cancel_order(order.id).await.unwrap();
    assert_eq!(cancelled.status(), PurchaseOrderStatus::Cancelled);
    assert!(cancelled.cancelled_at().is_some());
    assert_eq!(cancelled.line_items()[0].fulfilled_quantity, 40);

    let releases: Vec<_> = ledger
        .journal()
        .unwrap()
        .into_iter()
        .filter(|entry| entry.adjustment.direction == AdjustmentDirection::Release)
        .collect();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].adjustment.quantity, 60);
}

#[rstest]
#[case::negative(-1)]
#[case::zero_only(0)]
#[tokio::test]
async fn invalid_deltas_leave_the_order_untouched(#[case] quantity: i32) {
    let order = purchase_order("PO-INVALID", &[10]);
    let line = order.line_items()[0].id;
    let (service, repo, _) = in_memory_service(&order).await;

    assert_matches!(
        service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line, quantity))
            .await,
        Err(ServiceError::InvalidDelta(_))
    );
    assert_eq!(repo.find_by_id(order.id).await.unwrap().unwrap(), order);
}

#[rstest]
#[case::failed(PurchaseOrderStatus::Failed)]
#[case::cancelled(PurchaseOrderStatus::Cancelled)]
#[case::received(PurchaseOrderStatus::Received)]
#[tokio::test]
async fn terminal_orders_reject_every_mutation(#[case] status: PurchaseOrderStatus) {
    let order = purchase_order("PO-TERMINAL", &[10]);
    let mut parts = order.to_parts();
    parts.status = status;
    let order = stockroom_api::models::Order::restore(parts).unwrap();
    let line = order.line_items()[0].id;
    let (service, _, _) = in_memory_service(&order).await;

    assert_matches!(
        service
            .apply_fulfillment(order.id, FulfillmentRequest::single(line, 1))
            .await,
        Err(ServiceError::OrderTerminal { .. })
    );
    assert_matches!(
        service.cancel_order(order.id).await,
        Err(ServiceError::OrderTerminal { .. })
    );
}

#[tokio::test]
async fn unknown_line_items_are_reported_by_id() {
    let order = sales_order("SO-UNKNOWN", &[2]);
    let (service, _, _) = in_memory_service(&order).await;
    let stranger = uuid::Uuid::new_v4();

    assert_matches!(
        service
            .apply_fulfillment(order.id, FulfillmentRequest::single(stranger, 1))
            .await,
        Err(ServiceError::UnknownLineItem { line_item_id, .. }) if line_item_id == stranger
    );
}
