use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use order_reconciler::domain::order::{
    CreateOrderRequest, ErrorKind, OrderError, OrderItemRequest, OrderLifecycleManager,
    OrderStatus, OrderView, UpdateOrderRequest,
};
use order_reconciler::metrics::Metrics;
use order_reconciler::reporting::{ReportConfig, ReportGenerator};
use order_reconciler::storage::{MemoryStore, TransactionScope};

type Manager = OrderLifecycleManager<MemoryStore, MemoryStore>;

fn price(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn setup() -> (Arc<MemoryStore>, Manager) {
    let store = Arc::new(
        MemoryStore::new()
            .with_client(1, "Grace Hopper")
            .with_product(10, "Keyboard", price(4999))
            .with_product(11, "Mouse", price(1999))
            .with_product(12, "Monitor", price(18900)),
    );
    let manager = OrderLifecycleManager::new(
        store.clone(),
        store.clone(),
        Arc::new(Metrics::default()),
    );
    (store, manager)
}

fn create_request(items: Vec<OrderItemRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        order_date: Some(Utc::now() - Duration::minutes(5)),
        total_value: price(10000),
        status: None,
        client_id: Some(1),
        items,
    }
}

/// The stored items of `view` echoed back unchanged.
fn same_items(view: &OrderView) -> Vec<OrderItemRequest> {
    view.items
        .iter()
        .map(|item| {
            OrderItemRequest::existing(item.id, item.product_id, item.quantity, item.unitary_price)
        })
        .collect()
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn test_sync_with_current_items_is_a_noop() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 1, price(4999)),
            OrderItemRequest::new(11, 2, price(1999)),
        ]))
        .await
        .unwrap();

    let writes_before = store.write_count();
    let mut tx = store.begin().await.unwrap();
    let outcome = manager
        .items()
        .sync(&mut tx, order.id, &same_items(&order))
        .await
        .unwrap();
    store.commit(tx).await.unwrap();

    assert!(outcome.is_noop());
    assert_eq!(outcome.unchanged.len(), 2);
    assert_eq!(store.write_count(), writes_before);

    let again = manager.get(order.id).await.unwrap();
    assert_eq!(again.items, order.items);
}

#[tokio::test]
async fn test_update_reconciles_to_desired_items() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 1, price(4999)),
            OrderItemRequest::new(11, 2, price(1999)),
        ]))
        .await
        .unwrap();
    let keyboard = &order.items[0];
    let mouse = &order.items[1];

    manager
        .update(
            order.id,
            UpdateOrderRequest {
                items: vec![
                    OrderItemRequest::existing(keyboard.id, 10, 3, price(4500)),
                    OrderItemRequest::new(12, 1, price(18900)),
                ],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updated = manager.get(order.id).await.unwrap();
    assert_eq!(updated.items.len(), 2);

    let kept = updated.items.iter().find(|item| item.id == keyboard.id).unwrap();
    assert_eq!(kept.quantity, 3);
    assert_eq!(kept.unitary_price, price(4500));

    let added = updated.items.iter().find(|item| item.id != keyboard.id).unwrap();
    assert_eq!(added.product_id, 12);
    assert_eq!(added.product_name, "Monitor");

    assert!(updated.items.iter().all(|item| item.id != mouse.id));
    let dropped = store.item_row(mouse.id).await.unwrap();
    assert!(!dropped.is_active());
    assert!(dropped.state.deleted_at().is_some());
}

#[tokio::test]
async fn test_unknown_item_id_fails_closed() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![OrderItemRequest::new(10, 1, price(4999))]))
        .await
        .unwrap();
    let rollbacks_before = store.rollback_count();

    let err = manager
        .update(
            order.id,
            UpdateOrderRequest {
                status: Some(OrderStatus::Delivered),
                items: vec![
                    OrderItemRequest::new(11, 1, price(1999)),
                    OrderItemRequest::existing(999, 10, 1, price(4999)),
                ],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::ItemNotFound(999)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.rollback_count(), rollbacks_before + 1);

    let unchanged = manager.get(order.id).await.unwrap();
    assert_eq!(unchanged.status, OrderStatus::Pending);
    assert_eq!(unchanged.items, order.items);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_delete_cancels_order_and_items() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 1, price(4999)),
            OrderItemRequest::new(11, 1, price(1999)),
        ]))
        .await
        .unwrap();

    manager.delete(order.id).await.unwrap();

    let row = store.order_row(order.id).await.unwrap();
    assert!(!row.is_active());
    assert_eq!(row.status, OrderStatus::Canceled);
    assert!(row.state.deleted_at().is_some());

    for item in &order.items {
        let row = store.item_row(item.id).await.unwrap();
        assert!(!row.is_active());
    }

    let err = manager.get(order.id).await.unwrap_err();
    assert!(matches!(err, OrderError::OrderNotFound(id) if id == order.id));

    let page = manager.list(Default::default()).await.unwrap();
    assert_eq!(page.total_count, 0);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_invalid_create_writes_nothing() {
    let (store, manager) = setup();

    let err = manager
        .create(CreateOrderRequest {
            order_date: Some(Utc::now() + Duration::days(2)),
            total_value: Decimal::ZERO,
            status: None,
            client_id: Some(1),
            items: vec![],
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    let messages = err.messages();
    assert!(messages.iter().any(|m| m.contains("future")));
    assert!(messages.iter().any(|m| m.contains("total value")));
    assert!(messages.iter().any(|m| m.contains("at least one item")));

    assert_eq!(store.write_count(), 0);
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn test_create_ignores_line_ids_when_validating() {
    let (store, manager) = setup();

    let err = manager
        .create(create_request(vec![OrderItemRequest::existing(5, 0, 1, price(100))]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(err.messages(), ["item 1: product id must be greater than zero"]);
    assert_eq!(store.write_count(), 0);
    assert_eq!(store.rollback_count(), 0);

    let order = manager
        .create(create_request(vec![
            OrderItemRequest::existing(7, 10, 1, price(4999)),
            OrderItemRequest::existing(7, 11, 1, price(1999)),
        ]))
        .await
        .unwrap();
    assert_eq!(order.items.len(), 2);
    assert_ne!(order.items[0].id, order.items[1].id);
}

#[tokio::test]
async fn test_canceled_status_cannot_be_requested() {
    let (store, manager) = setup();
    let mut request = create_request(vec![OrderItemRequest::new(10, 1, price(4999))]);
    request.status = Some(OrderStatus::Canceled);

    let err = manager.create(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(store.write_count(), 0);

    let order = manager
        .create(create_request(vec![OrderItemRequest::new(10, 1, price(4999))]))
        .await
        .unwrap();
    let err = manager
        .update(
            order.id,
            UpdateOrderRequest {
                status: Some(OrderStatus::Canceled),
                items: same_items(&order),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(manager.get(order.id).await.unwrap().status, OrderStatus::Pending);
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn test_create_rolls_back_when_a_later_item_fails() {
    let (store, manager) = setup();

    let err = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 1, price(4999)),
            OrderItemRequest::new(404, 1, price(100)),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::ProductNotFound(404)));
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.rollback_count(), 1);
    assert_eq!(store.commit_count(), 0);

    let page = manager.list(Default::default()).await.unwrap();
    assert!(page.items.is_empty());
}

// ============================================================================
// Report
// ============================================================================

#[tokio::test]
async fn test_report_empty_store_yields_no_bytes() {
    let (store, _) = setup();
    let reports = ReportGenerator::new(store, Arc::new(Metrics::default()), ReportConfig::default());

    assert!(reports.generate_csv().await.is_empty());
}

#[tokio::test]
async fn test_report_sums_item_quantities() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 2, price(4999)),
            OrderItemRequest::new(11, 1, price(1999)),
        ]))
        .await
        .unwrap();

    let reports = ReportGenerator::new(store, Arc::new(Metrics::default()), ReportConfig::default());
    let csv = String::from_utf8(reports.generate_csv().await).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "Order Number,Client Name,Order Date,Status,Total Items,Total Value"
    );

    let fields: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(fields[0], order.id.to_string());
    assert_eq!(fields[1], "Grace Hopper");
    assert_eq!(fields[3], "Pending");
    assert_eq!(fields[4], "3");
    assert_eq!(fields[5], "100.00");
}

#[tokio::test]
async fn test_report_skips_items_trimmed_from_live_order() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 2, price(4999)),
            OrderItemRequest::new(11, 5, price(1999)),
        ]))
        .await
        .unwrap();

    let kept = &order.items[0];
    manager
        .update(
            order.id,
            UpdateOrderRequest {
                items: vec![OrderItemRequest::existing(kept.id, 10, 2, price(4999))],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reports = ReportGenerator::new(store, Arc::new(Metrics::default()), ReportConfig::default());
    let csv = String::from_utf8(reports.generate_csv().await).unwrap();
    let row: Vec<&str> = csv.lines().nth(1).unwrap().split(',').collect();

    let live: i32 = manager
        .get(order.id)
        .await
        .unwrap()
        .items
        .iter()
        .map(|item| item.quantity)
        .sum();
    assert_eq!(live, 2);
    assert_eq!(row[4], "2");
}

#[tokio::test]
async fn test_report_keeps_items_of_canceled_order() {
    let (store, manager) = setup();
    let order = manager
        .create(create_request(vec![
            OrderItemRequest::new(10, 2, price(4999)),
            OrderItemRequest::new(11, 5, price(1999)),
        ]))
        .await
        .unwrap();

    // Trim one line first, then cancel: only the line removed by the
    // cancellation still counts.
    let kept = &order.items[1];
    manager
        .update(
            order.id,
            UpdateOrderRequest {
                items: vec![OrderItemRequest::existing(kept.id, 11, 5, price(1999))],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    manager.delete(order.id).await.unwrap();

    let reports = ReportGenerator::new(store, Arc::new(Metrics::default()), ReportConfig::default());
    let csv = String::from_utf8(reports.generate_csv().await).unwrap();
    let row: Vec<&str> = csv.lines().nth(1).unwrap().split(',').collect();

    assert_eq!(row[3], "Canceled");
    assert_eq!(row[4], "5");
}
