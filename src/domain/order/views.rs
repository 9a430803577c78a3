use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregate::{Order, OrderItem};
use super::value_objects::OrderStatus;

// ============================================================================
// Order Views - Response shapes handed to the HTTP layer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unitary_price: Decimal,
    pub subtotal: Decimal,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unitary_price: item.unitary_price,
            subtotal: item.subtotal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: i64,
    pub order_date: DateTime<Utc>,
    pub total_value: Decimal,
    pub status: OrderStatus,
    pub client_id: i64,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    pub fn new(order: &Order, items: Vec<OrderItemView>) -> Self {
        Self {
            id: order.id,
            order_date: order.order_date,
            total_value: order.total_value,
            status: order.status,
            client_id: order.client_id,
            items,
        }
    }
}

/// One page of results plus enough to render paging controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, page_number: u32, page_size: u32, total_count: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(u64::from(page_size))
        };
        Self {
            items,
            page_number,
            page_size,
            total_count,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page_number) < self.total_pages
    }
}
