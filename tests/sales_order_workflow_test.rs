mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::TestApp;
use trade_ledger::{
    commands::{
        sales_orders::{
            CreateDeliveryNoteCommand, CreateInvoiceCommand, ReturnSalesItemsCommand,
            SalesOrderFilter, SalesOrderLineInput, UpdateSalesOrderItemCommand,
        },
        CancelCommand, DocumentKey, StorageAllocation,
    },
    entities::{
        financial_ledger::FinancialKind,
        inventory_log::{self, InventoryAction},
        sales_order::SalesOrderStatus,
        sales_order_return::{ReturnSource, SalesReturnStatus},
        DocumentStatus,
    },
    errors::ServiceError,
    services::OrderRef,
};

/// A warehouse slot holding `quantity` units of a fresh batch.
async fn stocked_slot(app: &TestApp, quantity: Decimal) -> (Uuid, Uuid) {
    let view = app.stocked(quantity, dec!(10)).await;
    let batch = &view.batches[0];
    (batch.batch.id, batch.storages[0].id)
}

fn return_command(detail_id: Uuid, storage_id: Uuid, quantity: Decimal) -> ReturnSalesItemsCommand {
    ReturnSalesItemsCommand {
        detail_id,
        quantity,
        allocations: vec![StorageAllocation {
            storage_id,
            quantity,
        }],
        reason: None,
    }
}

#[tokio::test]
async fn stock_leaves_the_slot_at_order_creation() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(6)).await;

    let order = app.sell(slot_id, dec!(3), dec!(25)).await;

    assert_eq!(order.order.status, SalesOrderStatus::Order);
    assert_eq!(order.order.total_amount, dec!(75));
    assert_eq!(order.order.serial_number, "SO000001");
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(3));
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(3));
    app.assert_conserved(batch_id).await;
    assert!(order.invoice.is_none());

    let moves = app
        .state
        .inventory_ledger
        .entries_for_order(OrderRef::Sales(order.order.id))
        .await
        .unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].action, InventoryAction::Remove);
    assert_eq!(moves[0].quantity, dec!(3));
}

#[tokio::test]
async fn cancelling_an_open_order_restores_stock() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(6)).await;
    let order = app.sell(slot_id, dec!(3), dec!(25)).await;

    let cancelled = app
        .state
        .sales_orders
        .cancel(app.actor, order.order.id.into(), CancelCommand::default())
        .await
        .unwrap();

    assert_eq!(cancelled.order.status, SalesOrderStatus::Cancel);
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(6));
    app.assert_conserved(batch_id).await;

    let money = app
        .state
        .financial_ledger
        .entries_for_order(OrderRef::Sales(order.order.id))
        .await
        .unwrap();
    assert_eq!(money.len(), 1);
    assert_eq!(money[0].kind, FinancialKind::SaleCancel);
    assert_eq!(money[0].amount, dec!(0));
}

#[tokio::test]
async fn overselling_fails_and_writes_nothing() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(2)).await;
    let rows = (app.inventory_rows().await, app.financial_rows().await);

    let err = app
        .state
        .sales_orders
        .create(app.actor, app.sales_command(slot_id, dec!(3), dec!(25)))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(2));
    assert_eq!(
        (app.inventory_rows().await, app.financial_rows().await),
        rows
    );
    let page = app
        .state
        .sales_orders
        .list(SalesOrderFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn unknown_slot_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .sales_orders
        .create(app.actor, app.sales_command(Uuid::new_v4(), dec!(1), dec!(1)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn inline_invoice_shares_the_order_transaction() {
    let app = TestApp::new().await;
    let (_, slot_id) = stocked_slot(&app, dec!(5)).await;
    let mut command = app.sales_command(slot_id, dec!(2), dec!(30));
    command.create_invoice = true;

    let view = app.state.sales_orders.create(app.actor, command).await.unwrap();

    assert_eq!(view.order.status, SalesOrderStatus::Invoice);
    let invoice = view.invoice.expect("invoice issued");
    assert_eq!(invoice.amount, dec!(60));
    assert_eq!(invoice.serial_number, "SI000001");
    assert_eq!(invoice.invoice_date, TestApp::order_date());

    let money = app
        .state
        .financial_ledger
        .entries_for_order(OrderRef::Sales(view.order.id))
        .await
        .unwrap();
    assert_eq!(money.len(), 1);
    assert_eq!(money[0].kind, FinancialKind::Sale);
    assert_eq!(money[0].amount, dec!(60));
}

#[tokio::test]
async fn failed_inline_invoice_consumes_no_serials() {
    let app = TestApp::new().await;
    let (_, slot_id) = stocked_slot(&app, dec!(2)).await;

    let mut oversold = app.sales_command(slot_id, dec!(3), dec!(30));
    oversold.create_invoice = true;
    assert_matches!(
        app.state.sales_orders.create(app.actor, oversold).await,
        Err(ServiceError::InsufficientStock(_))
    );

    let mut command = app.sales_command(slot_id, dec!(2), dec!(30));
    command.create_invoice = true;
    let view = app.state.sales_orders.create(app.actor, command).await.unwrap();
    assert_eq!(view.order.serial_number, "SO000001");
    assert_eq!(view.invoice.map(|i| i.serial_number), Some("SI000001".to_string()));
}

#[tokio::test]
async fn multi_batch_orders_take_stock_in_batch_order() {
    let app = TestApp::new().await;
    let (first_batch, first_slot) = stocked_slot(&app, dec!(5)).await;
    let (second_batch, second_slot) = stocked_slot(&app, dec!(5)).await;

    // Lines arrive highest batch first.
    let mut slots = vec![(first_batch, first_slot), (second_batch, second_slot)];
    slots.sort_by_key(|(batch, _)| std::cmp::Reverse(*batch));
    let mut command = app.sales_command(slots[0].1, dec!(1), dec!(10));
    command.lines.push(SalesOrderLineInput {
        batch_storage_id: slots[1].1,
        quantity: dec!(2),
        price: dec!(10),
    });

    let view = app.state.sales_orders.create(app.actor, command).await.unwrap();
    assert_eq!(view.lines.len(), 2);
    assert_eq!(view.order.total_amount, dec!(30));
    assert_eq!(app.slot_quantity(slots[0].0, app.warehouse.id).await, dec!(4));
    assert_eq!(app.slot_quantity(slots[1].0, app.warehouse.id).await, dec!(3));

    let removed: Vec<Uuid> = inventory_log::Entity::find()
        .filter(inventory_log::Column::SalesOrderId.eq(view.order.id))
        .all(app.state.db.as_ref())
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.batch_id)
        .collect();
    let mut ascending = removed.clone();
    ascending.sort();
    assert_eq!(removed, ascending);
    app.assert_conserved(first_batch).await;
    app.assert_conserved(second_batch).await;
}

#[tokio::test]
async fn invoice_delivery_and_their_cancellation_walk_the_status_back() {
    let app = TestApp::new().await;
    let (_, slot_id) = stocked_slot(&app, dec!(5)).await;
    let order = app.sell(slot_id, dec!(2), dec!(30)).await;
    let so = &app.state.sales_orders;
    let key: DocumentKey = order.order.id.into();

    let invoice = so
        .create_invoice(app.actor, key.clone(), CreateInvoiceCommand::default())
        .await
        .unwrap();
    assert_eq!(so.get(key.clone()).await.unwrap().order.status, SalesOrderStatus::Invoice);

    // A second invoice is refused by the lifecycle table.
    assert_matches!(
        so.create_invoice(app.actor, key.clone(), CreateInvoiceCommand::default())
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );

    let note = so
        .create_delivery_note(
            app.actor,
            DocumentKey::Serial(invoice.serial_number.clone()),
            CreateDeliveryNoteCommand {
                recipient: Some("Front desk".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(note.serial_number, "DN000001");
    assert_eq!(note.sales_invoice_id, invoice.id);
    assert_eq!(so.get(key.clone()).await.unwrap().order.status, SalesOrderStatus::Delivery);

    // The invoice cannot go while its delivery note is active.
    assert_matches!(
        so.cancel_invoice(app.actor, invoice.id.into(), CancelCommand::default())
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );

    let note = so
        .cancel_delivery_note(app.actor, note.id.into(), CancelCommand::default())
        .await
        .unwrap();
    assert_eq!(note.status, DocumentStatus::Cancelled);
    assert_eq!(so.get(key.clone()).await.unwrap().order.status, SalesOrderStatus::Invoice);

    let invoice = so
        .cancel_invoice(app.actor, invoice.id.into(), CancelCommand::default())
        .await
        .unwrap();
    assert_eq!(invoice.status, DocumentStatus::Cancelled);

    let view = so.get(key.clone()).await.unwrap();
    assert_eq!(view.order.status, SalesOrderStatus::Order);
    assert!(view.invoice.is_none());
    assert!(view.delivery_note.is_none());

    let totals = app
        .state
        .financial_ledger
        .totals_by_kind(Some(OrderRef::Sales(order.order.id)))
        .await
        .unwrap();
    let net: Decimal = totals.iter().map(|t| t.total).sum();
    assert_eq!(net, dec!(0));

    // Back in `order`, a fresh invoice may be issued.
    let again = so
        .create_invoice(app.actor, key, CreateInvoiceCommand::default())
        .await
        .unwrap();
    assert_eq!(again.serial_number, "SI000002");
}

#[tokio::test]
async fn returns_restock_and_refund_then_cancel_reverses_them() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(10)).await;
    let mut command = app.sales_command(slot_id, dec!(4), dec!(15));
    command.create_invoice = true;
    let so = &app.state.sales_orders;
    let order = so.create(app.actor, command).await.unwrap();
    let key: DocumentKey = order.order.id.into();
    let line = order.lines[0].id;
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(6));

    let partial = so
        .return_items(app.actor, key.clone(), return_command(line, app.shop.id, dec!(1)))
        .await
        .unwrap();
    assert_eq!(partial.record.source, ReturnSource::Invoice);
    assert_eq!(partial.record.amount, dec!(15));
    assert_eq!(partial.record.serial_number, "SR000001");
    assert_eq!(app.slot_quantity(batch_id, app.shop.id).await, dec!(1));
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(7));
    app.assert_conserved(batch_id).await;
    assert_eq!(
        so.get(key.clone()).await.unwrap().order.status,
        SalesOrderStatus::PartiallyReturned
    );

    let rest = so
        .return_items(app.actor, key.clone(), return_command(line, app.warehouse.id, dec!(3)))
        .await
        .unwrap();
    assert_eq!(so.get(key.clone()).await.unwrap().order.status, SalesOrderStatus::Returned);

    assert_matches!(
        so.return_items(app.actor, key.clone(), return_command(line, app.warehouse.id, dec!(1)))
            .await,
        Err(ServiceError::BusinessRule(_))
    );

    so.cancel_return(app.actor, rest.record.id.into(), CancelCommand::default())
        .await
        .unwrap();
    so.cancel_return(
        app.actor,
        DocumentKey::Serial(partial.record.serial_number.clone()),
        CancelCommand::default(),
    )
    .await
    .unwrap();

    let view = so.get(key).await.unwrap();
    assert_eq!(view.order.status, SalesOrderStatus::Invoice);
    assert!(view
        .returns
        .iter()
        .all(|r| r.record.status == SalesReturnStatus::Cancelled));
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(6));
    assert_eq!(app.slot_quantity(batch_id, app.shop.id).await, dec!(0));
    app.assert_conserved(batch_id).await;

    let totals = app
        .state
        .financial_ledger
        .totals_by_kind(Some(OrderRef::Sales(order.order.id)))
        .await
        .unwrap();
    let net: Decimal = totals.iter().map(|t| t.total).sum();
    assert_eq!(net, dec!(60));
}

#[tokio::test]
async fn returns_after_delivery_reference_the_note() {
    let app = TestApp::new().await;
    let (_, slot_id) = stocked_slot(&app, dec!(5)).await;
    let mut command = app.sales_command(slot_id, dec!(2), dec!(10));
    command.create_invoice = true;
    let so = &app.state.sales_orders;
    let order = so.create(app.actor, command).await.unwrap();
    let invoice = order.invoice.clone().unwrap();
    let note = so
        .create_delivery_note(app.actor, invoice.id.into(), CreateDeliveryNoteCommand::default())
        .await
        .unwrap();

    let ret = so
        .return_items(
            app.actor,
            order.order.id.into(),
            return_command(order.lines[0].id, app.warehouse.id, dec!(1)),
        )
        .await
        .unwrap();
    assert_eq!(ret.record.source, ReturnSource::DeliveryNote);
    assert_eq!(ret.record.delivery_note_id, Some(note.id));

    // Active returns pin the delivery note in place.
    assert_matches!(
        so.cancel_delivery_note(app.actor, note.id.into(), CancelCommand::default())
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );

    so.cancel_return(app.actor, ret.record.id.into(), CancelCommand::default())
        .await
        .unwrap();
    assert_eq!(
        so.get(order.order.id.into()).await.unwrap().order.status,
        SalesOrderStatus::Delivery
    );
}

#[tokio::test]
async fn returns_need_an_invoice() {
    let app = TestApp::new().await;
    let (_, slot_id) = stocked_slot(&app, dec!(5)).await;
    let order = app.sell(slot_id, dec!(2), dec!(10)).await;

    let err = app
        .state
        .sales_orders
        .return_items(
            app.actor,
            order.order.id.into(),
            return_command(order.lines[0].id, app.warehouse.id, dec!(1)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn return_allocations_must_add_up_to_the_quantity() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(6)).await;
    let mut command = app.sales_command(slot_id, dec!(3), dec!(20));
    command.create_invoice = true;
    let so = &app.state.sales_orders;
    let order = so.create(app.actor, command).await.unwrap();
    let rows = (app.inventory_rows().await, app.financial_rows().await);

    let mut short = return_command(order.lines[0].id, app.shop.id, dec!(2));
    short.allocations[0].quantity = dec!(1);
    let err = so
        .return_items(app.actor, order.order.id.into(), short)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BusinessRule(_));

    assert_eq!(
        (app.inventory_rows().await, app.financial_rows().await),
        rows
    );
    assert_eq!(app.slot_quantity(batch_id, app.shop.id).await, dec!(0));
    assert_eq!(app.batch(batch_id).await.current_quantity, dec!(3));
    assert!(so.list_returns(order.order.id.into()).await.unwrap().is_empty());
    assert_eq!(
        so.get(order.order.id.into()).await.unwrap().order.status,
        SalesOrderStatus::Invoice
    );

    // No serial was spent on the refused return.
    let ret = so
        .return_items(
            app.actor,
            order.order.id.into(),
            return_command(order.lines[0].id, app.shop.id, dec!(2)),
        )
        .await
        .unwrap();
    assert_eq!(ret.record.serial_number, "SR000001");
}

#[tokio::test]
async fn item_edits_move_stock_immediately() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(10)).await;
    let order = app.sell(slot_id, dec!(2), dec!(5)).await;
    let so = &app.state.sales_orders;
    let key: DocumentKey = order.order.id.into();
    let first = order.lines[0].id;

    let grown = so
        .update_item(
            app.actor,
            key.clone(),
            first,
            UpdateSalesOrderItemCommand {
                quantity: Some(dec!(5)),
                price: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(grown.order.total_amount, dec!(25));
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(5));

    let shrunk = so
        .update_item(
            app.actor,
            key.clone(),
            first,
            UpdateSalesOrderItemCommand {
                quantity: Some(dec!(1)),
                price: Some(dec!(8)),
            },
        )
        .await
        .unwrap();
    assert_eq!(shrunk.order.total_amount, dec!(8));
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(9));

    let added = so
        .add_item(
            app.actor,
            key.clone(),
            SalesOrderLineInput {
                batch_storage_id: slot_id,
                quantity: dec!(4),
                price: dec!(2),
            },
        )
        .await
        .unwrap();
    assert_eq!(added.order.total_amount, dec!(16));
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(5));

    assert_matches!(
        so.update_item(
            app.actor,
            key.clone(),
            first,
            UpdateSalesOrderItemCommand {
                quantity: Some(dec!(100)),
                price: None,
            },
        )
        .await,
        Err(ServiceError::InsufficientStock(_))
    );

    let removed = so.remove_item(app.actor, key.clone(), first).await.unwrap();
    assert_eq!(removed.lines.len(), 1);
    assert_eq!(removed.order.total_amount, dec!(8));
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(6));
    app.assert_conserved(batch_id).await;

    let last = removed.lines[0].id;
    assert_matches!(
        so.remove_item(app.actor, key, last).await,
        Err(ServiceError::BusinessRule(_))
    );
}

#[tokio::test]
async fn invoiced_orders_refuse_item_edits_and_cancel() {
    let app = TestApp::new().await;
    let (batch_id, slot_id) = stocked_slot(&app, dec!(5)).await;
    let mut command = app.sales_command(slot_id, dec!(2), dec!(10));
    command.create_invoice = true;
    let so = &app.state.sales_orders;
    let order = so.create(app.actor, command).await.unwrap();
    let rows = (app.inventory_rows().await, app.financial_rows().await);

    assert_matches!(
        so.cancel(app.actor, order.order.id.into(), CancelCommand::default())
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_matches!(
        so.remove_item(app.actor, order.order.id.into(), order.lines[0].id)
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_eq!(
        (app.inventory_rows().await, app.financial_rows().await),
        rows
    );
    assert_eq!(app.slot_quantity(batch_id, app.warehouse.id).await, dec!(3));
}

#[tokio::test]
async fn list_and_lookups() {
    let app = TestApp::new().await;
    let (_, slot_id) = stocked_slot(&app, dec!(10)).await;
    let so = &app.state.sales_orders;
    app.sell(slot_id, dec!(1), dec!(1)).await;
    let mut command = app.sales_command(slot_id, dec!(1), dec!(1));
    command.create_invoice = true;
    let invoiced = so.create(app.actor, command).await.unwrap();

    let page = so
        .list(SalesOrderFilter {
            status: Some(SalesOrderStatus::Invoice),
            customer_id: Some(app.customer.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, invoiced.order.id);

    let invoice = so.get_invoice("si000001".parse().unwrap()).await.unwrap();
    assert_eq!(invoice.sales_order_id, invoiced.order.id);

    let by_serial = so
        .get(DocumentKey::Serial(invoiced.order.serial_number.clone()))
        .await
        .unwrap();
    assert_eq!(by_serial.order.id, invoiced.order.id);
    assert!(so.list_returns(invoiced.order.id.into()).await.unwrap().is_empty());
}
