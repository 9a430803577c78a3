use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{
    OrderItemRepository, OrderReportSource, OrderRepository, ProductCatalog, ProductSummary,
    StorageError, TransactionScope,
};
use crate::domain::order::{Order, OrderItem, OrderQuery, RecordState};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Process-local implementation of every storage capability.
//
// A transaction takes a snapshot of the committed tables at `begin`, reads
// and writes that snapshot, and records each written row in a journal.
// `commit` replays the journal onto the committed tables row by row (last
// writer wins per row); `rollback` drops it.
//
// Ids come from store-wide sequences, so ids handed out inside a rolled back
// transaction are never reused.
//
// ============================================================================

/// Operation at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    Commit,
    InsertOrder,
    UpdateOrder,
    SoftDeleteOrder,
    InsertItem,
    UpdateItem,
    SoftDeleteItem,
    ReportOrders,
    ProductLookup,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: BTreeMap<i64, Order>,
    items: BTreeMap<i64, OrderItem>,
}

#[derive(Debug, Clone)]
enum RowWrite {
    Order(Order),
    Item(OrderItem),
}

#[derive(Debug)]
pub struct MemoryTx {
    id: u64,
    view: Tables,
    journal: Vec<RowWrite>,
}

impl MemoryTx {
    fn write_order(&mut self, order: Order) {
        self.view.orders.insert(order.id, order.clone());
        self.journal.push(RowWrite::Order(order));
    }

    fn write_item(&mut self, item: OrderItem) {
        self.view.items.insert(item.id, item.clone());
        self.journal.push(RowWrite::Item(item));
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    products: Mutex<HashMap<i64, ProductSummary>>,
    clients: Mutex<HashMap<i64, String>>,
    fail_point: Mutex<Option<FailPoint>>,
    next_order_id: AtomicI64,
    next_item_id: AtomicI64,
    next_tx_id: AtomicU64,
    writes: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, id: i64, name: &str, price: Decimal) -> Self {
        self.products.get_mut().insert(
            id,
            ProductSummary {
                name: name.to_string(),
                price,
            },
        );
        self
    }

    pub fn with_client(mut self, id: i64, name: &str) -> Self {
        self.clients.get_mut().insert(id, name.to_string());
        self
    }

    /// Make the next call at `point` fail once with a backend error.
    pub async fn fail_on(&self, point: FailPoint) {
        *self.fail_point.lock().await = Some(point);
    }

    /// Number of row writes (insert, update, soft delete) issued so far,
    /// committed or not.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Committed order row by id, whether active or not.
    pub async fn order_row(&self, id: i64) -> Option<Order> {
        self.tables.lock().await.orders.get(&id).cloned()
    }

    /// Committed item row by id, whether active or not.
    pub async fn item_row(&self, id: i64) -> Option<OrderItem> {
        self.tables.lock().await.items.get(&id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    async fn trip(&self, point: FailPoint) -> Result<(), StorageError> {
        let mut armed = self.fail_point.lock().await;
        if *armed == Some(point) {
            *armed = None;
            return Err(StorageError::Backend(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionScope for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StorageError> {
        self.trip(FailPoint::Begin).await?;
        let view = self.tables.lock().await.clone();
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(tx_id = id, "Memory transaction started");
        Ok(MemoryTx {
            id,
            view,
            journal: Vec::new(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), StorageError> {
        self.trip(FailPoint::Commit).await?;
        let mut tables = self.tables.lock().await;
        let writes = tx.journal.len();
        for write in tx.journal {
            match write {
                RowWrite::Order(order) => {
                    tables.orders.insert(order.id, order);
                }
                RowWrite::Item(item) => {
                    tables.items.insert(item.id, item);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(tx_id = tx.id, writes, "Memory transaction committed");
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), StorageError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            tx_id = tx.id,
            discarded = tx.journal.len(),
            "Memory transaction rolled back"
        );
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_order(&self, tx: &mut MemoryTx, id: i64) -> Result<Option<Order>, StorageError> {
        Ok(tx
            .view
            .orders
            .get(&id)
            .filter(|order| order.is_active())
            .cloned())
    }

    async fn page_orders(
        &self,
        tx: &mut MemoryTx,
        query: &OrderQuery,
    ) -> Result<(Vec<Order>, u64), StorageError> {
        let mut matching: Vec<&Order> = tx
            .view
            .orders
            .values()
            .filter(|order| order.is_active())
            .filter(|order| query.status.map_or(true, |status| order.status == status))
            .filter(|order| query.client_id.map_or(true, |client| order.client_id == client))
            .collect();
        matching.sort_by_key(|order| (order.order_date, order.id));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn insert_order(&self, tx: &mut MemoryTx, order: &Order) -> Result<i64, StorageError> {
        self.count_write();
        self.trip(FailPoint::InsertOrder).await?;
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
        tx.write_order(Order { id, ..order.clone() });
        Ok(id)
    }

    async fn update_order(&self, tx: &mut MemoryTx, order: &Order) -> Result<(), StorageError> {
        self.count_write();
        self.trip(FailPoint::UpdateOrder).await?;
        if !tx.view.orders.contains_key(&order.id) {
            return Err(StorageError::Backend(format!("order {} does not exist", order.id)));
        }
        tx.write_order(order.clone());
        Ok(())
    }

    async fn soft_delete_order(
        &self,
        tx: &mut MemoryTx,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.count_write();
        self.trip(FailPoint::SoftDeleteOrder).await?;
        let mut order = tx
            .view
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::Backend(format!("order {id} does not exist")))?;
        order.state = RecordState::Deleted { at };
        tx.write_order(order);
        Ok(())
    }

    async fn report_orders(
        &self,
        tx: &mut MemoryTx,
        include_inactive: bool,
    ) -> Result<Vec<OrderReportSource>, StorageError> {
        self.trip(FailPoint::ReportOrders).await?;
        let clients = self.clients.lock().await;

        let mut items_by_order: HashMap<i64, Vec<&OrderItem>> = HashMap::new();
        for item in tx.view.items.values() {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(tx
            .view
            .orders
            .values()
            .filter(|order| include_inactive || order.is_active())
            .map(|order| OrderReportSource {
                order: order.clone(),
                client_name: clients.get(&order.client_id).cloned(),
                items: items_by_order
                    .get(&order.id)
                    .into_iter()
                    .flatten()
                    .filter(|item| order.reports_item(item))
                    .map(|item| (*item).clone())
                    .collect(),
            })
            .collect())
    }
}

#[async_trait]
impl OrderItemRepository for MemoryStore {
    async fn find_item(&self, tx: &mut MemoryTx, id: i64) -> Result<Option<OrderItem>, StorageError> {
        Ok(tx.view.items.get(&id).filter(|item| item.is_active()).cloned())
    }

    async fn items_for_order(
        &self,
        tx: &mut MemoryTx,
        order_id: i64,
    ) -> Result<Vec<OrderItem>, StorageError> {
        Ok(tx
            .view
            .items
            .values()
            .filter(|item| item.order_id == order_id && item.is_active())
            .cloned()
            .collect())
    }

    async fn insert_item(&self, tx: &mut MemoryTx, item: &OrderItem) -> Result<i64, StorageError> {
        self.count_write();
        self.trip(FailPoint::InsertItem).await?;
        let id = self.next_item_id.fetch_add(1, Ordering::SeqCst) + 1;
        tx.write_item(OrderItem { id, ..item.clone() });
        Ok(id)
    }

    async fn update_item(&self, tx: &mut MemoryTx, item: &OrderItem) -> Result<(), StorageError> {
        self.count_write();
        self.trip(FailPoint::UpdateItem).await?;
        if !tx.view.items.contains_key(&item.id) {
            return Err(StorageError::Backend(format!("order item {} does not exist", item.id)));
        }
        tx.write_item(item.clone());
        Ok(())
    }

    async fn soft_delete_item(
        &self,
        tx: &mut MemoryTx,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.count_write();
        self.trip(FailPoint::SoftDeleteItem).await?;
        let mut item = tx
            .view
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::Backend(format!("order item {id} does not exist")))?;
        item.state = RecordState::Deleted { at };
        tx.write_item(item);
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn product(&self, id: i64) -> Result<Option<ProductSummary>, StorageError> {
        self.trip(FailPoint::ProductLookup).await?;
        Ok(self.products.lock().await.get(&id).cloned())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use chrono::Duration;

    fn order(client_id: i64, hours_ago: i64) -> Order {
        let now = Utc::now();
        Order {
            id: 0,
            order_date: now - Duration::hours(hours_ago),
            total_value: Decimal::new(1000, 2),
            status: OrderStatus::Pending,
            client_id,
            created_at: now,
            state: RecordState::Active,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = store.insert_order(&mut tx, &order(1, 1)).await.unwrap();

        assert!(store.order_row(id).await.is_none());
        store.commit(tx).await.unwrap();
        assert_eq!(store.order_row(id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = store.insert_order(&mut tx, &order(1, 1)).await.unwrap();
        assert!(store.find_order(&mut tx, id).await.unwrap().is_some());

        store.rollback(tx).await.unwrap();

        assert!(store.order_row(id).await.is_none());
        assert_eq!(store.rollback_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_page_orders_sorted_by_date_and_filtered() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let newest = store.insert_order(&mut tx, &order(1, 1)).await.unwrap();
        let oldest = store.insert_order(&mut tx, &order(2, 30)).await.unwrap();
        let middle = store.insert_order(&mut tx, &order(1, 10)).await.unwrap();
        store.soft_delete_order(&mut tx, newest, Utc::now()).await.unwrap();

        let (page, total) = store.page_orders(&mut tx, &OrderQuery::page(1, 10)).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![oldest, middle]);

        let query = OrderQuery::page(1, 10).with_client(1);
        let (page, total) = store.page_orders(&mut tx, &query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].id, middle);

        let (page, total) = store.page_orders(&mut tx, &OrderQuery::page(2, 1)).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page[0].id, middle);
    }

    #[tokio::test]
    async fn test_fail_point_fires_once() {
        let store = MemoryStore::new();
        store.fail_on(FailPoint::InsertOrder).await;

        let mut tx = store.begin().await.unwrap();
        assert!(store.insert_order(&mut tx, &order(1, 1)).await.is_err());
        assert!(store.insert_order(&mut tx, &order(1, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_product_lookup() {
        let store = MemoryStore::new().with_product(3, "Stapler", Decimal::new(899, 2));

        let product = store.product(3).await.unwrap().unwrap();
        assert_eq!(product.name, "Stapler");
        assert!(store.product(4).await.unwrap().is_none());
    }
}
