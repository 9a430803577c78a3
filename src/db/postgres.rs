use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::domain::order::{Order, OrderItem, OrderQuery, OrderStatus, RecordState};
use crate::storage::{
    OrderItemRepository, OrderReportSource, OrderRepository, ProductCatalog, ProductSummary,
    StorageError, TransactionScope,
};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Soft-delete state lives in two columns (`is_active`, `deleted_at`) kept in
// step by a CHECK constraint; rows are mapped to `RecordState` on read.
//
// ============================================================================

const SCHEMA: &str = include_str!("schema.sql");

const ORDER_COLUMNS: &str =
    "id, order_date, total_value, status, client_id, created_at, is_active, deleted_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unitary_price, \
     created_at, is_active, deleted_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Create the order tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("Order schema ensured");
        Ok(())
    }

    pub async fn upsert_client(&self, id: i64, name: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO clients (id, name) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_product(
        &self,
        id: i64,
        name: &str,
        price: Decimal,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO products (id, name, price) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, price = EXCLUDED.price",
        )
        .bind(id)
        .bind(name)
        .bind(price)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, StorageError> {
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Order {
        id: row.try_get("id")?,
        order_date: row.try_get("order_date")?,
        total_value: row.try_get("total_value")?,
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StorageError::CorruptRow {
                table: "orders",
                reason: e.to_string(),
            })?,
        client_id: row.try_get("client_id")?,
        created_at,
        state: RecordState::from_columns(
            row.try_get("is_active")?,
            row.try_get("deleted_at")?,
            created_at,
        ),
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StorageError> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        unitary_price: row.try_get("unitary_price")?,
        created_at,
        state: RecordState::from_columns(
            row.try_get("is_active")?,
            row.try_get("deleted_at")?,
            created_at,
        ),
    })
}

fn ensure_affected(affected: u64, table: &str, id: i64) -> Result<(), StorageError> {
    if affected == 0 {
        return Err(StorageError::Backend(format!("{table} row {id} does not exist")));
    }
    Ok(())
}

#[async_trait]
impl TransactionScope for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StorageError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StorageError> {
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn find_order(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Order>, StorageError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND is_active");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn page_orders(
        &self,
        tx: &mut Self::Tx,
        query: &OrderQuery,
    ) -> Result<(Vec<Order>, u64), StorageError> {
        const FILTER: &str = "WHERE is_active \
             AND ($1::TEXT IS NULL OR status = $1) \
             AND ($2::BIGINT IS NULL OR client_id = $2)";

        let status = query.status.map(|status| status.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {FILTER}"))
            .bind(status)
            .bind(query.client_id)
            .fetch_one(&mut **tx)
            .await?;

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders {FILTER} \
             ORDER BY order_date ASC, id ASC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(query.client_id)
            .bind(i64::from(query.page_size))
            .bind(query.offset() as i64)
            .fetch_all(&mut **tx)
            .await?;

        let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((orders, total.max(0) as u64))
    }

    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<i64, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (order_date, total_value, status, client_id, created_at, is_active, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(order.order_date)
        .bind(order.total_value)
        .bind(order.status.as_str())
        .bind(order.client_id)
        .bind(order.created_at)
        .bind(order.state.is_active())
        .bind(order.state.deleted_at())
        .fetch_one(&mut **tx)
        .await?;

        tracing::debug!(order_id = id, "Inserted order row");
        Ok(id)
    }

    async fn update_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET order_date = $2, total_value = $3, status = $4, client_id = $5,
                is_active = $6, deleted_at = $7
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.order_date)
        .bind(order.total_value)
        .bind(order.status.as_str())
        .bind(order.client_id)
        .bind(order.state.is_active())
        .bind(order.state.deleted_at())
        .execute(&mut **tx)
        .await?;

        ensure_affected(result.rows_affected(), "orders", order.id)
    }

    async fn soft_delete_order(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result =
            sqlx::query("UPDATE orders SET is_active = FALSE, deleted_at = $2 WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&mut **tx)
                .await?;

        ensure_affected(result.rows_affected(), "orders", id)
    }

    async fn report_orders(
        &self,
        tx: &mut Self::Tx,
        include_inactive: bool,
    ) -> Result<Vec<OrderReportSource>, StorageError> {
        let order_rows = sqlx::query(
            r#"
            SELECT o.id, o.order_date, o.total_value, o.status, o.client_id, o.created_at,
                   o.is_active, o.deleted_at, c.name AS client_name
            FROM orders o
            LEFT JOIN clients c ON c.id = o.client_id
            WHERE $1 OR o.is_active
            ORDER BY o.id
            "#,
        )
        .bind(include_inactive)
        .fetch_all(&mut **tx)
        .await?;

        let item_sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items \
             WHERE order_id IN (SELECT id FROM orders WHERE $1 OR is_active) \
             ORDER BY id"
        );
        let item_rows = sqlx::query(&item_sql)
            .bind(include_inactive)
            .fetch_all(&mut **tx)
            .await?;

        let mut items_by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let item = item_from_row(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        order_rows
            .iter()
            .map(|row| -> Result<OrderReportSource, StorageError> {
                let order = order_from_row(row)?;
                let mut items = items_by_order.remove(&order.id).unwrap_or_default();
                items.retain(|item| order.reports_item(item));
                Ok(OrderReportSource {
                    client_name: row.try_get("client_name")?,
                    items,
                    order,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderItemRepository for PgStore {
    async fn find_item(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<OrderItem>, StorageError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1 AND is_active");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn items_for_order(
        &self,
        tx: &mut Self::Tx,
        order_id: i64,
    ) -> Result<Vec<OrderItem>, StorageError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 AND is_active ORDER BY id"
        );
        let rows = sqlx::query(&sql).bind(order_id).fetch_all(&mut **tx).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn insert_item(&self, tx: &mut Self::Tx, item: &OrderItem) -> Result<i64, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_items (
                order_id, product_id, product_name, quantity, unitary_price,
                created_at, is_active, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unitary_price)
        .bind(item.created_at)
        .bind(item.state.is_active())
        .bind(item.state.deleted_at())
        .fetch_one(&mut **tx)
        .await?;

        tracing::debug!(item_id = id, order_id = item.order_id, "Inserted order item row");
        Ok(id)
    }

    async fn update_item(&self, tx: &mut Self::Tx, item: &OrderItem) -> Result<(), StorageError> {
        let result =
            sqlx::query("UPDATE order_items SET quantity = $2, unitary_price = $3 WHERE id = $1")
                .bind(item.id)
                .bind(item.quantity)
                .bind(item.unitary_price)
                .execute(&mut **tx)
                .await?;

        ensure_affected(result.rows_affected(), "order_items", item.id)
    }

    async fn soft_delete_item(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result =
            sqlx::query("UPDATE order_items SET is_active = FALSE, deleted_at = $2 WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&mut **tx)
                .await?;

        ensure_affected(result.rows_affected(), "order_items", id)
    }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn product(&self, id: i64) -> Result<Option<ProductSummary>, StorageError> {
        let row = sqlx::query("SELECT name, price FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<ProductSummary, StorageError> {
            Ok(ProductSummary {
                name: row.try_get("name")?,
                price: row.try_get("price")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_all_tables() {
        for table in ["clients", "products", "orders", "order_items"] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn test_ensure_affected() {
        assert!(ensure_affected(1, "orders", 1).is_ok());
        assert!(matches!(
            ensure_affected(0, "orders", 9),
            Err(StorageError::Backend(_))
        ));
    }

    // Queries against a live database are exercised by running the binary
    // with DATABASE_URL set.
}
