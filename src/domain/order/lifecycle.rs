use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::metrics::Metrics;
use crate::storage::{OrderItemRepository, OrderRepository, ProductCatalog, Tx};

use super::aggregate::{validate_lines, Order};
use super::commands::{
    CreateOrderRequest, OrderItemRequest, OrderQuery, UpdateOrderRequest, DEFAULT_PAGE_SIZE,
};
use super::errors::OrderError;
use super::reconciler::OrderItemReconciler;
use super::views::{OrderView, PagedResult};

// ============================================================================
// Order Lifecycle Manager
// ============================================================================
//
// Entry point for every order mutation:
//
//   begin -> header write -> item writes (reconciler) -> commit
//                 \______________ any error ______________/-> rollback
//
// Create validates the whole request before a transaction is even opened.
// Update and delete validate after loading the stored order but still before
// their first write.
//
// ============================================================================

/// Paging bounds applied to every listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PagingLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 100,
        }
    }
}

pub struct OrderLifecycleManager<S, P> {
    store: Arc<S>,
    items: OrderItemReconciler<S, P>,
    metrics: Arc<Metrics>,
    paging: PagingLimits,
}

impl<S, P> OrderLifecycleManager<S, P>
where
    S: OrderRepository + OrderItemRepository,
    P: ProductCatalog,
{
    pub fn new(store: Arc<S>, catalog: Arc<P>, metrics: Arc<Metrics>) -> Self {
        Self {
            items: OrderItemReconciler::new(store.clone(), catalog, metrics.clone()),
            store,
            metrics,
            paging: PagingLimits::default(),
        }
    }

    pub fn with_paging(mut self, paging: PagingLimits) -> Self {
        self.paging = paging;
        self
    }

    /// Line item operations, for callers that manage their own scope.
    pub fn items(&self) -> &OrderItemReconciler<S, P> {
        &self.items
    }

    pub async fn list(&self, query: OrderQuery) -> Result<PagedResult<OrderView>, OrderError> {
        let started = Instant::now();
        let query = query.normalized(self.paging.default_page_size, self.paging.max_page_size);

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(err) => return self.finish("list", started, Err(err.into())),
        };
        let result = match self.list_in(&mut tx, &query).await {
            Ok(page) => self.store.commit(tx).await.map(|_| page).map_err(OrderError::from),
            Err(err) => Err(self.abort(tx, "list", err).await),
        };
        self.finish("list", started, result)
    }

    pub async fn get(&self, id: i64) -> Result<OrderView, OrderError> {
        let started = Instant::now();

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(err) => return self.finish("get", started, Err(err.into())),
        };
        let result = match self.get_in(&mut tx, id).await {
            Ok(view) => self.store.commit(tx).await.map(|_| view).map_err(OrderError::from),
            Err(err) => Err(self.abort(tx, "get", err).await),
        };
        self.finish("get", started, result)
    }

    pub async fn create(&self, request: CreateOrderRequest) -> Result<OrderView, OrderError> {
        let started = Instant::now();

        let order = match Order::from_request(&request, Utc::now()) {
            Ok(order) => order,
            Err(errors) => {
                tracing::warn!(
                    client_id = ?request.client_id,
                    errors = %errors,
                    "Order rejected by validation"
                );
                return self.finish("create", started, Err(errors.into()));
            }
        };

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(err) => return self.finish("create", started, Err(err.into())),
        };
        let result = match self.create_in(&mut tx, order, &request.items).await {
            Ok(view) => self.store.commit(tx).await.map(|_| view).map_err(OrderError::from),
            Err(err) => Err(self.abort(tx, "create", err).await),
        };

        if let Ok(view) = &result {
            tracing::info!(
                order_id = view.id,
                client_id = view.client_id,
                item_count = view.items.len(),
                "✅ Order created"
            );
        }
        self.finish("create", started, result)
    }

    pub async fn update(&self, id: i64, request: UpdateOrderRequest) -> Result<(), OrderError> {
        let started = Instant::now();

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(err) => return self.finish("update", started, Err(err.into())),
        };
        let result = match self.update_in(&mut tx, id, &request).await {
            Ok(()) => self.store.commit(tx).await.map_err(OrderError::from),
            Err(err) => Err(self.abort(tx, "update", err).await),
        };

        if result.is_ok() {
            tracing::info!(order_id = id, item_count = request.items.len(), "✅ Order updated");
        }
        self.finish("update", started, result)
    }

    /// Cancel the order: soft-delete its items, mark it `Canceled`, then
    /// soft-delete the order itself, all in one transaction.
    pub async fn delete(&self, id: i64) -> Result<(), OrderError> {
        let started = Instant::now();

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(err) => return self.finish("delete", started, Err(err.into())),
        };
        let result = match self.delete_in(&mut tx, id).await {
            Ok(()) => self.store.commit(tx).await.map_err(OrderError::from),
            Err(err) => Err(self.abort(tx, "delete", err).await),
        };

        if result.is_ok() {
            tracing::info!(order_id = id, "✅ Order canceled");
        }
        self.finish("delete", started, result)
    }

    // ------------------------------------------------------------------------
    // Scoped bodies
    // ------------------------------------------------------------------------

    async fn list_in(
        &self,
        tx: &mut Tx<S>,
        query: &OrderQuery,
    ) -> Result<PagedResult<OrderView>, OrderError> {
        let (orders, total) = self.store.page_orders(tx, query).await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in &orders {
            let items = self.items.list_by_order(tx, order.id).await?;
            views.push(OrderView::new(order, items));
        }

        Ok(PagedResult::new(views, query.page_number, query.page_size, total))
    }

    async fn get_in(&self, tx: &mut Tx<S>, id: i64) -> Result<OrderView, OrderError> {
        let order = self.load(tx, id).await?;
        let items = self.items.list_by_order(tx, id).await?;
        Ok(OrderView::new(&order, items))
    }

    async fn create_in(
        &self,
        tx: &mut Tx<S>,
        mut order: Order,
        lines: &[OrderItemRequest],
    ) -> Result<OrderView, OrderError> {
        order.id = self.store.insert_order(tx, &order).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            items.push(self.items.create(tx, &line.as_new_for(order.id)).await?);
        }

        Ok(OrderView::new(&order, items))
    }

    async fn update_in(
        &self,
        tx: &mut Tx<S>,
        id: i64,
        request: &UpdateOrderRequest,
    ) -> Result<(), OrderError> {
        let mut order = self.load(tx, id).await?;
        order.merge(request);

        let mut errors = order.header_errors(Utc::now());
        errors.extend(validate_lines(&request.items));
        errors.into_result()?;

        self.store.update_order(tx, &order).await?;
        let outcome = self.items.sync(tx, id, &request.items).await?;
        tracing::debug!(
            order_id = id,
            item_mutations = outcome.mutation_count(),
            "Order header and items written"
        );
        Ok(())
    }

    async fn delete_in(&self, tx: &mut Tx<S>, id: i64) -> Result<(), OrderError> {
        let mut order = self.load(tx, id).await?;
        let now = Utc::now();

        // Items share the order's deletion time so reports can tell them
        // apart from lines trimmed earlier by a sync.
        for item in self.store.items_for_order(tx, id).await? {
            self.items.delete_at(tx, item.id, now).await?;
        }

        order.cancel();
        self.store.update_order(tx, &order).await?;
        self.store.soft_delete_order(tx, id, now).await?;
        Ok(())
    }

    async fn load(&self, tx: &mut Tx<S>, id: i64) -> Result<Order, OrderError> {
        self.store
            .find_order(tx, id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    /// Roll back `tx` and hand back the error that caused it. A failing
    /// rollback is logged; the original error still wins.
    async fn abort(&self, tx: Tx<S>, operation: &'static str, err: OrderError) -> OrderError {
        self.metrics.record_rollback(operation);
        if let Err(rollback_err) = self.store.rollback(tx).await {
            tracing::error!(
                operation,
                error = %rollback_err,
                "Rollback failed"
            );
        }
        tracing::warn!(operation, error = %err, "Transaction rolled back");
        err
    }

    fn finish<T>(
        &self,
        operation: &'static str,
        started: Instant,
        result: Result<T, OrderError>,
    ) -> Result<T, OrderError> {
        self.metrics
            .record_operation(operation, started.elapsed().as_secs_f64(), result.is_ok());
        result
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
