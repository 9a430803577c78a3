use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::metrics::Metrics;
use crate::storage::{OrderItemRepository, ProductCatalog, Tx};

use super::aggregate::OrderItem;
use super::commands::OrderItemRequest;
use super::errors::{OrderError, ValidationErrors};
use super::views::OrderItemView;

// ============================================================================
// Order Item Reconciler
// ============================================================================
//
// CRUD for line items plus `sync`, which drives the persisted item set of one
// order to a caller-supplied desired list:
//
//   persisted ids not requested  -> soft delete
//   requested id != 0            -> update quantity / price
//   requested id == 0            -> create
//
// Every call runs inside the caller's transaction scope and never commits or
// rolls back on its own.
//
// ============================================================================

/// Ids touched by one `sync` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: Vec<i64>,
    pub updated: Vec<i64>,
    pub deleted: Vec<i64>,
    pub unchanged: Vec<i64>,
}

impl SyncOutcome {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Item-level diff between the persisted set and a desired list, before any
/// product lookups.
#[derive(Debug, Default)]
struct ItemDiff {
    deletes: Vec<i64>,
    updates: Vec<OrderItem>,
    unchanged: Vec<i64>,
    creates: Vec<OrderItem>,
}

/// Match `desired` against `current` by id.
///
/// Fails without side effects when an id is unknown, repeated, or would leave
/// an item invalid.
fn diff_items(
    order_id: i64,
    current: &HashMap<i64, OrderItem>,
    desired: &[OrderItemRequest],
) -> Result<ItemDiff, OrderError> {
    let (to_update, to_create): (Vec<&OrderItemRequest>, Vec<&OrderItemRequest>) =
        desired.iter().partition(|request| !request.is_new());

    let mut requested = HashSet::with_capacity(to_update.len());
    let mut errors = ValidationErrors::new();
    for request in &to_update {
        if !requested.insert(request.id) {
            errors.push(format!("item id {} appears more than once", request.id));
        }
    }
    errors.into_result()?;

    if let Some(missing) = to_update.iter().find(|request| !current.contains_key(&request.id)) {
        return Err(OrderError::ItemNotFound(missing.id));
    }

    let now = Utc::now();
    let mut diff = ItemDiff::default();
    let mut errors = ValidationErrors::new();

    let mut stale: Vec<i64> = current
        .keys()
        .copied()
        .filter(|id| !requested.contains(id))
        .collect();
    stale.sort_unstable();
    diff.deletes = stale;

    for request in to_update {
        let mut item = current[&request.id].clone();
        if item.matches(request) {
            diff.unchanged.push(item.id);
            continue;
        }
        item.apply(request);
        if let Err(invalid) = item.validate() {
            errors.extend_prefixed(&format!("item {}", item.id), invalid);
        }
        diff.updates.push(item);
    }

    for (position, request) in to_create.into_iter().enumerate() {
        let mut item = OrderItem::draft(request, now);
        item.order_id = order_id;
        if let Err(invalid) = item.validate() {
            errors.extend_prefixed(&format!("new item {}", position + 1), invalid);
        }
        diff.creates.push(item);
    }

    errors.into_result()?;
    Ok(diff)
}

pub struct OrderItemReconciler<S, P> {
    store: Arc<S>,
    catalog: Arc<P>,
    metrics: Arc<Metrics>,
}

impl<S, P> OrderItemReconciler<S, P>
where
    S: OrderItemRepository,
    P: ProductCatalog,
{
    pub fn new(store: Arc<S>, catalog: Arc<P>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            catalog,
            metrics,
        }
    }

    /// Active items of an order, each with its product name.
    pub async fn list_by_order(
        &self,
        tx: &mut Tx<S>,
        order_id: i64,
    ) -> Result<Vec<OrderItemView>, OrderError> {
        let items = self.store.items_for_order(tx, order_id).await?;
        Ok(items.iter().map(OrderItemView::from).collect())
    }

    pub async fn create(
        &self,
        tx: &mut Tx<S>,
        request: &OrderItemRequest,
    ) -> Result<OrderItemView, OrderError> {
        let item = OrderItem::draft(request, Utc::now());
        item.validate()?;
        let item = self.resolve_product(item).await?;
        self.insert(tx, item).await
    }

    pub async fn update(
        &self,
        tx: &mut Tx<S>,
        id: i64,
        request: &OrderItemRequest,
    ) -> Result<(), OrderError> {
        let mut item = self
            .store
            .find_item(tx, id)
            .await?
            .ok_or(OrderError::ItemNotFound(id))?;

        item.apply(request);
        item.validate()?;

        self.store.update_item(tx, &item).await?;
        self.metrics.record_item_mutation("updated");

        tracing::debug!(
            item_id = id,
            order_id = item.order_id,
            quantity = item.quantity,
            "Order item updated"
        );
        Ok(())
    }

    pub async fn delete(&self, tx: &mut Tx<S>, id: i64) -> Result<(), OrderError> {
        self.delete_at(tx, id, Utc::now()).await
    }

    /// `delete` with an explicit deletion time.
    pub async fn delete_at(
        &self,
        tx: &mut Tx<S>,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.store.find_item(tx, id).await?.is_none() {
            return Err(OrderError::ItemNotFound(id));
        }

        self.store.soft_delete_item(tx, id, at).await?;
        self.metrics.record_item_mutation("deleted");

        tracing::debug!(item_id = id, "Order item soft-deleted");
        Ok(())
    }

    /// Reconcile the order's active items with `desired`.
    ///
    /// All matching, validation and product lookups finish before the first
    /// write, so a failed sync leaves the items as they were.
    pub async fn sync(
        &self,
        tx: &mut Tx<S>,
        order_id: i64,
        desired: &[OrderItemRequest],
    ) -> Result<SyncOutcome, OrderError> {
        let current: HashMap<i64, OrderItem> = self
            .store
            .items_for_order(tx, order_id)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let diff = diff_items(order_id, &current, desired)?;

        let mut creates = Vec::with_capacity(diff.creates.len());
        for item in diff.creates {
            creates.push(self.resolve_product(item).await?);
        }

        let now = Utc::now();
        let mut outcome = SyncOutcome {
            unchanged: diff.unchanged,
            ..Default::default()
        };

        for id in diff.deletes {
            self.store.soft_delete_item(tx, id, now).await?;
            self.metrics.record_item_mutation("deleted");
            outcome.deleted.push(id);
        }

        for item in diff.updates {
            self.store.update_item(tx, &item).await?;
            self.metrics.record_item_mutation("updated");
            outcome.updated.push(item.id);
        }

        for item in creates {
            let view = self.insert(tx, item).await?;
            outcome.created.push(view.id);
        }

        tracing::info!(
            order_id = order_id,
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            unchanged = outcome.unchanged.len(),
            "🔄 Reconciled order items"
        );

        Ok(outcome)
    }

    async fn resolve_product(&self, mut item: OrderItem) -> Result<OrderItem, OrderError> {
        let product = self
            .catalog
            .product(item.product_id)
            .await?
            .ok_or(OrderError::ProductNotFound(item.product_id))?;
        item.product_name = product.name;
        Ok(item)
    }

    async fn insert(&self, tx: &mut Tx<S>, mut item: OrderItem) -> Result<OrderItemView, OrderError> {
        item.id = self.store.insert_item(tx, &item).await?;
        self.metrics.record_item_mutation("created");

        tracing::debug!(
            item_id = item.id,
            order_id = item.order_id,
            product_id = item.product_id,
            "Order item created"
        );
        Ok(OrderItemView::from(&item))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
