// ============================================================================
// Storage Capabilities - What the order core consumes
// ============================================================================
//
// The order core never talks to a database directly. It is generic over:
// - TransactionScope: begin / commit / rollback, yielding an owned scope
// - OrderRepository / OrderItemRepository: row access inside a scope
// - ProductCatalog: product name and price lookup
//
// Every repository call takes the scope explicitly, so concurrent requests
// each carry their own unit of work.
//
// ============================================================================

mod memory;

pub use memory::{FailPoint, MemoryStore, MemoryTx};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::order::{Order, OrderItem, OrderQuery};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

/// Scope type of a store.
pub type Tx<S> = <S as TransactionScope>::Tx;

/// Unit-of-work boundary.
///
/// `rollback` consumes the scope, so rolling back something that was never
/// begun cannot be expressed.
#[async_trait]
pub trait TransactionScope: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StorageError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StorageError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StorageError>;
}

/// Order row plus what the report needs alongside it.
#[derive(Debug, Clone)]
pub struct OrderReportSource {
    pub order: Order,
    pub client_name: Option<String>,
    pub items: Vec<OrderItem>,
}

#[async_trait]
pub trait OrderRepository: TransactionScope {
    /// Active order by id.
    async fn find_order(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Order>, StorageError>;

    /// Active orders matching the query's filters, ordered by order date then
    /// id, along with the total number of matches.
    async fn page_orders(
        &self,
        tx: &mut Self::Tx,
        query: &OrderQuery,
    ) -> Result<(Vec<Order>, u64), StorageError>;

    /// Persist a new order and return its assigned id.
    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<i64, StorageError>;

    async fn update_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<(), StorageError>;

    async fn soft_delete_order(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Every order with its client name and all of its items, ordered by id.
    /// Inactive orders and items are included only when asked for.
    async fn report_orders(
        &self,
        tx: &mut Self::Tx,
        include_inactive: bool,
    ) -> Result<Vec<OrderReportSource>, StorageError>;
}

#[async_trait]
pub trait OrderItemRepository: TransactionScope {
    /// Active item by id.
    async fn find_item(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<OrderItem>, StorageError>;

    /// Active items of an order, ordered by id.
    async fn items_for_order(
        &self,
        tx: &mut Self::Tx,
        order_id: i64,
    ) -> Result<Vec<OrderItem>, StorageError>;

    async fn insert_item(&self, tx: &mut Self::Tx, item: &OrderItem) -> Result<i64, StorageError>;

    async fn update_item(&self, tx: &mut Self::Tx, item: &OrderItem) -> Result<(), StorageError>;

    async fn soft_delete_item(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductSummary {
    pub name: String,
    pub price: Decimal,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, id: i64) -> Result<Option<ProductSummary>, StorageError>;
}
