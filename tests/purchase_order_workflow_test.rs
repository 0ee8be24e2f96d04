mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::TestApp;
use trade_ledger::{
    commands::{
        purchase_orders::{
            BatchAllocation, CompletePurchaseOrderCommand, CreatePurchaseReturnCommand,
            PurchaseOrderFilter, PurchaseOrderLineInput, ReceivedItem,
            UpdatePurchaseOrderItemCommand,
        },
        CancelCommand, DocumentKey, StorageAllocation,
    },
    entities::{
        financial_ledger::{FinancialKind, LedgerDirection},
        inventory_log::InventoryAction,
        purchase_order::PurchaseOrderStatus,
        purchase_order_return::PurchaseReturnStatus,
        PaymentMethod,
    },
    errors::ServiceError,
    services::OrderRef,
};

fn return_command(
    detail_id: Uuid,
    batch_id: Uuid,
    storage_id: Uuid,
    quantity: Decimal,
) -> CreatePurchaseReturnCommand {
    CreatePurchaseReturnCommand {
        detail_id,
        quantity,
        allocations: vec![BatchAllocation {
            batch_id,
            storage_id,
            quantity,
        }],
        reason: Some("damaged".to_string()),
    }
}

#[tokio::test]
async fn create_computes_total_and_starts_ordered() {
    let app = TestApp::new().await;

    let view = app
        .state
        .purchase_orders
        .create(app.actor, app.purchase_command(dec!(10), dec!(100)))
        .await
        .unwrap();

    assert_eq!(view.order.total_amount, dec!(1000));
    assert_eq!(view.order.status, PurchaseOrderStatus::Ordered);
    assert_eq!(view.order.serial_number, "PO000001");
    assert_eq!(view.lines.len(), 1);
    assert!(view.batches.is_empty());
}

#[tokio::test]
async fn credit_terms_without_due_date_are_rejected_before_any_write() {
    let app = TestApp::new().await;
    let mut command = app.purchase_command(dec!(1), dec!(1));
    command.payment_method = PaymentMethod::Credit;

    let err = app
        .state
        .purchase_orders
        .create(app.actor, command)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // The serial counter was never touched.
    let view = app
        .state
        .purchase_orders
        .create(app.actor, app.purchase_command(dec!(1), dec!(1)))
        .await
        .unwrap();
    assert_eq!(view.order.serial_number, "PO000001");
}

#[tokio::test]
async fn unknown_supplier_is_not_found() {
    let app = TestApp::new().await;
    let mut command = app.purchase_command(dec!(1), dec!(1));
    command.supplier_id = Uuid::new_v4();

    let err = app
        .state
        .purchase_orders
        .create(app.actor, command)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(app.financial_rows().await, 0);
}

#[tokio::test]
async fn completing_creates_batch_and_books_purchase() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(10), dec!(100)).await;

    assert_eq!(view.order.status, PurchaseOrderStatus::Completed);
    assert_eq!(view.order.completed_by, Some(app.actor));
    assert_eq!(view.batches.len(), 1);

    let batch = &view.batches[0].batch;
    assert_eq!(batch.current_quantity, dec!(10));
    assert_eq!(batch.initial_quantity, dec!(10));
    assert!(batch.sku.starts_with("ARA-GCT"), "unexpected sku {}", batch.sku);
    assert_eq!(app.slot_quantity(batch.id, app.warehouse.id).await, dec!(10));
    app.assert_conserved(batch.id).await;

    let order = OrderRef::Purchase(view.order.id);
    let moves = app.state.inventory_ledger.entries_for_order(order).await.unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].action, InventoryAction::Add);
    assert_eq!(moves[0].quantity, dec!(10));

    let money = app.state.financial_ledger.entries_for_order(order).await.unwrap();
    assert_eq!(money.len(), 1);
    assert_eq!(money[0].kind, FinancialKind::Purchase);
    assert_eq!(money[0].amount, dec!(1000));
    assert_eq!(money[0].direction, LedgerDirection::Debit);
    assert!(money[0].is_system);
}

#[tokio::test]
async fn completion_can_split_a_line_across_storages() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    let created = po
        .create(app.actor, app.purchase_command(dec!(10), dec!(5)))
        .await
        .unwrap();

    let view = po
        .complete(
            app.actor,
            created.order.id.into(),
            CompletePurchaseOrderCommand {
                received_items: vec![ReceivedItem {
                    detail_id: created.lines[0].id,
                    allocations: vec![
                        StorageAllocation {
                            storage_id: app.warehouse.id,
                            quantity: dec!(7),
                        },
                        StorageAllocation {
                            storage_id: app.shop.id,
                            quantity: dec!(3),
                        },
                    ],
                }],
            },
        )
        .await
        .unwrap();

    let batch_id = view.batches[0].batch.id;
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(7));
    assert_eq!(app.slot_quantity(batch_id, app.shop.id).await, dec!(3));
    app.assert_conserved(batch_id).await;
    assert_eq!(app.inventory_rows().await, 2);
}

#[tokio::test]
async fn completion_with_short_allocation_rolls_back() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    let created = po
        .create(app.actor, app.purchase_command(dec!(10), dec!(5)))
        .await
        .unwrap();

    let err = po
        .complete(
            app.actor,
            created.order.id.into(),
            CompletePurchaseOrderCommand {
                received_items: vec![ReceivedItem {
                    detail_id: created.lines[0].id,
                    allocations: vec![StorageAllocation {
                        storage_id: app.warehouse.id,
                        quantity: dec!(9),
                    }],
                }],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BusinessRule(_));

    let view = po.get(created.order.id.into()).await.unwrap();
    assert_eq!(view.order.status, PurchaseOrderStatus::Ordered);
    assert!(view.batches.is_empty());
    assert_eq!(app.inventory_rows().await, 0);
    assert_eq!(app.financial_rows().await, 0);
}

#[tokio::test]
async fn completion_into_unknown_storage_rolls_back() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    let created = po
        .create(app.actor, app.purchase_command(dec!(2), dec!(5)))
        .await
        .unwrap();

    let err = po
        .complete(
            app.actor,
            created.order.id.into(),
            TestApp::receive_all(&created, Uuid::new_v4()),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(app.financial_rows().await, 0);
    assert_eq!(
        po.get(created.order.id.into()).await.unwrap().order.status,
        PurchaseOrderStatus::Ordered
    );
}

#[tokio::test]
async fn partial_then_full_return_and_cancel_of_last_return() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(10), dec!(100)).await;
    let po = &app.state.purchase_orders;
    let key: DocumentKey = view.order.id.into();
    let line_id = view.lines[0].id;
    let batch_id = view.batches[0].batch.id;

    let first = po
        .create_return(
            app.actor,
            key.clone(),
            return_command(line_id, batch_id, app.warehouse.id, dec!(4)),
        )
        .await
        .unwrap();
    assert_eq!(first.record.amount, dec!(400));
    assert_eq!(first.record.serial_number, "PR000001");
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(6));
    app.assert_conserved(batch_id).await;

    let order = OrderRef::Purchase(view.order.id);
    let money = app.state.financial_ledger.entries_for_order(order).await.unwrap();
    let refund = money
        .iter()
        .find(|e| e.kind == FinancialKind::PurchaseReturn)
        .unwrap();
    assert_eq!(refund.amount, dec!(-400));
    assert_eq!(refund.direction, LedgerDirection::Credit);
    assert_eq!(
        po.get(key.clone()).await.unwrap().order.status,
        PurchaseOrderStatus::PartiallyReturned
    );

    let last = po
        .create_return(
            app.actor,
            key.clone(),
            return_command(line_id, batch_id, app.warehouse.id, dec!(6)),
        )
        .await
        .unwrap();
    assert_eq!(
        po.get(key.clone()).await.unwrap().order.status,
        PurchaseOrderStatus::Returned
    );
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(0));

    let cancelled = po
        .cancel_return(
            app.actor,
            DocumentKey::Serial(last.record.serial_number.clone()),
            CancelCommand::default(),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.record.status, PurchaseReturnStatus::Cancelled);
    assert_eq!(
        po.get(key.clone()).await.unwrap().order.status,
        PurchaseOrderStatus::PartiallyReturned
    );
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(6));
    app.assert_conserved(batch_id).await;

    let moves = app.state.inventory_ledger.entries_for_batch(batch_id).await.unwrap();
    assert_eq!(moves[0].action, InventoryAction::ReturnCancel);
    let totals = app
        .state
        .financial_ledger
        .totals_by_kind(Some(order))
        .await
        .unwrap();
    let net: Decimal = totals.iter().map(|t| t.total).sum();
    assert_eq!(net, dec!(600));
}

#[tokio::test]
async fn cancelling_a_return_twice_is_an_invalid_transition() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(10), dec!(100)).await;
    let po = &app.state.purchase_orders;
    let batch_id = view.batches[0].batch.id;

    let ret = po
        .create_return(
            app.actor,
            view.order.id.into(),
            return_command(view.lines[0].id, batch_id, app.warehouse.id, dec!(2)),
        )
        .await
        .unwrap();
    // A second return keeps the order in a cancellable status.
    po.create_return(
        app.actor,
        view.order.id.into(),
        return_command(view.lines[0].id, batch_id, app.warehouse.id, dec!(1)),
    )
    .await
    .unwrap();

    po.cancel_return(app.actor, ret.record.id.into(), CancelCommand::default())
        .await
        .unwrap();
    let before = app.financial_rows().await;
    let err = po
        .cancel_return(app.actor, ret.record.id.into(), CancelCommand::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    assert_eq!(app.financial_rows().await, before);
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(9));
}

#[tokio::test]
async fn return_beyond_line_quantity_is_refused() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(5), dec!(10)).await;
    let po = &app.state.purchase_orders;
    let batch_id = view.batches[0].batch.id;

    po.create_return(
        app.actor,
        view.order.id.into(),
        return_command(view.lines[0].id, batch_id, app.warehouse.id, dec!(3)),
    )
    .await
    .unwrap();

    let rows_before = (app.inventory_rows().await, app.financial_rows().await);
    let err = po
        .create_return(
            app.actor,
            view.order.id.into(),
            return_command(view.lines[0].id, batch_id, app.warehouse.id, dec!(3)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BusinessRule(_));
    assert_eq!(
        (app.inventory_rows().await, app.financial_rows().await),
        rows_before
    );
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(2));
}

#[tokio::test]
async fn return_allocations_must_match_requested_quantity() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(5), dec!(10)).await;

    let mut command = return_command(
        view.lines[0].id,
        view.batches[0].batch.id,
        app.warehouse.id,
        dec!(2),
    );
    command.quantity = dec!(3);

    let err = app
        .state
        .purchase_orders
        .create_return(app.actor, view.order.id.into(), command)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BusinessRule(_));
}

#[tokio::test]
async fn return_of_stock_already_sold_is_insufficient() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(5), dec!(10)).await;
    let slot_id = view.batches[0].storages[0].id;
    app.sell(slot_id, dec!(4), dec!(20)).await;

    let err = app
        .state
        .purchase_orders
        .create_return(
            app.actor,
            view.order.id.into(),
            return_command(view.lines[0].id, view.batches[0].batch.id, app.warehouse.id, dec!(3)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    app.assert_conserved(view.batches[0].batch.id).await;
}

#[tokio::test]
async fn returns_are_refused_before_completion() {
    let app = TestApp::new().await;
    let created = app
        .state
        .purchase_orders
        .create(app.actor, app.purchase_command(dec!(5), dec!(10)))
        .await
        .unwrap();

    let err = app
        .state
        .purchase_orders
        .create_return(
            app.actor,
            created.order.id.into(),
            return_command(created.lines[0].id, Uuid::new_v4(), app.warehouse.id, dec!(1)),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { current, .. } if current == "ordered"
    );
}

#[tokio::test]
async fn cancel_books_zero_entry_and_blocks_later_completion() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    let created = po
        .create(app.actor, app.purchase_command(dec!(5), dec!(10)))
        .await
        .unwrap();

    let cancelled = po
        .cancel(
            app.actor,
            DocumentKey::Serial(created.order.serial_number.clone()),
            CancelCommand {
                reason: Some("supplier out of stock".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("supplier out of stock"));

    let money = app
        .state
        .financial_ledger
        .entries_for_order(OrderRef::Purchase(created.order.id))
        .await
        .unwrap();
    assert_eq!(money.len(), 1);
    assert_eq!(money[0].kind, FinancialKind::PurchaseCancel);
    assert_eq!(money[0].amount, dec!(0));

    let err = po
        .complete(
            app.actor,
            created.order.id.into(),
            TestApp::receive_all(&created, app.warehouse.id),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    assert_eq!(app.financial_rows().await, 1);
    assert_eq!(app.inventory_rows().await, 0);
}

#[tokio::test]
async fn completed_order_cannot_be_cancelled_or_edited() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(5), dec!(10)).await;
    let po = &app.state.purchase_orders;
    let rows = (app.inventory_rows().await, app.financial_rows().await);

    assert_matches!(
        po.cancel(app.actor, view.order.id.into(), CancelCommand::default())
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_matches!(
        po.add_item(
            app.actor,
            view.order.id.into(),
            PurchaseOrderLineInput {
                product_id: app.product.id,
                quantity: dec!(1),
                price: dec!(1),
            },
        )
        .await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_eq!(
        (app.inventory_rows().await, app.financial_rows().await),
        rows
    );
}

#[tokio::test]
async fn item_edits_keep_total_in_step() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    let created = po
        .create(app.actor, app.purchase_command(dec!(10), dec!(100)))
        .await
        .unwrap();
    let key: DocumentKey = created.order.id.into();

    let added = po
        .add_item(
            app.actor,
            key.clone(),
            PurchaseOrderLineInput {
                product_id: app.product.id,
                quantity: dec!(2),
                price: dec!(50),
            },
        )
        .await
        .unwrap();
    assert_eq!(added.order.total_amount, dec!(1100));
    assert_eq!(added.lines.len(), 2);

    let first = created.lines[0].id;
    let updated = po
        .update_item(
            app.actor,
            key.clone(),
            first,
            UpdatePurchaseOrderItemCommand {
                quantity: Some(dec!(4)),
                price: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.order.total_amount, dec!(500));

    let err = po
        .update_item(
            app.actor,
            key.clone(),
            first,
            UpdatePurchaseOrderItemCommand {
                quantity: None,
                price: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let removed = po.remove_item(app.actor, key.clone(), first).await.unwrap();
    assert_eq!(removed.order.total_amount, dec!(100));
    assert_eq!(removed.lines.len(), 1);

    let last = removed.lines[0].id;
    assert_matches!(
        po.remove_item(app.actor, key, last).await,
        Err(ServiceError::BusinessRule(_))
    );
}

#[tokio::test]
async fn check_restamps_the_checker() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    let created = po
        .create(app.actor, app.purchase_command(dec!(1), dec!(1)))
        .await
        .unwrap();

    let first = po.check(app.actor, created.order.id.into()).await.unwrap();
    assert_eq!(first.checked_by, Some(app.actor));

    let other = Uuid::new_v4();
    let second = po.check(other, created.order.id.into()).await.unwrap();
    assert_eq!(second.checked_by, Some(other));
    assert_eq!(second.status, PurchaseOrderStatus::Ordered);
}

#[tokio::test]
async fn list_filters_by_status_and_paginates() {
    let app = TestApp::new().await;
    let po = &app.state.purchase_orders;
    for _ in 0..3 {
        po.create(app.actor, app.purchase_command(dec!(1), dec!(1)))
            .await
            .unwrap();
    }
    app.stocked(dec!(1), dec!(1)).await;

    let ordered = po
        .list(PurchaseOrderFilter {
            status: Some(PurchaseOrderStatus::Ordered),
            per_page: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ordered.total, 3);
    assert_eq!(ordered.items.len(), 2);
    assert!(ordered
        .items
        .iter()
        .all(|o| o.status == PurchaseOrderStatus::Ordered));

    let completed = po
        .list(PurchaseOrderFilter {
            status: Some(PurchaseOrderStatus::Completed),
            supplier_id: Some(app.supplier.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.total, 1);
}

#[tokio::test]
async fn lookup_by_serial_matches_lookup_by_id() {
    let app = TestApp::new().await;
    let view = app.stocked(dec!(3), dec!(7)).await;

    let by_serial = app
        .state
        .purchase_orders
        .get("po000001".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(by_serial.order.id, view.order.id);
    assert_eq!(by_serial.batches.len(), 1);

    assert_matches!(
        app.state
            .purchase_orders
            .get(DocumentKey::Serial("PO999999".into()))
            .await,
        Err(ServiceError::NotFound(_))
    );
}
