use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::ValidationErrors;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Requests - Represent caller intent
// ============================================================================

/// One requested line item.
///
/// `id == 0` means "create"; any other id references an existing item of the
/// order being reconciled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unitary_price: Decimal,
}

impl OrderItemRequest {
    pub fn new(product_id: i64, quantity: i32, unitary_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unitary_price,
            ..Default::default()
        }
    }

    pub fn existing(id: i64, product_id: i64, quantity: i32, unitary_price: Decimal) -> Self {
        Self {
            id,
            product_id,
            quantity,
            unitary_price,
            ..Default::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    /// The same line as a new item of `order_id`. Create requests carry no
    /// existing items, so any id they send is dropped.
    pub fn as_new_for(&self, order_id: i64) -> Self {
        Self {
            id: 0,
            order_id,
            ..self.clone()
        }
    }

    /// Rules a requested line must satisfy on its own. The product only
    /// matters for new lines, since existing lines keep theirs.
    pub fn line_errors(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.is_new() {
            errors.check(self.product_id > 0, "product id must be greater than zero");
        }
        errors.check(self.quantity > 0, "quantity must be greater than zero");
        errors.check(
            self.unitary_price > Decimal::ZERO,
            "unitary price must be greater than zero",
        );
        errors
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_date: Option<DateTime<Utc>>,
    pub total_value: Decimal,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    pub client_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

/// Header fields left as `None` keep their stored value; `items` is always the
/// complete desired item list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_value: Option<Decimal>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

pub const DEFAULT_PAGE_NUMBER: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

fn default_page_number() -> u32 {
    DEFAULT_PAGE_NUMBER
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Paging and filtering for order listings. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub client_id: Option<i64>,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self::page(DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE)
    }
}

impl OrderQuery {
    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            status: None,
            client_id: None,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_client(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Replace out-of-range paging values: page 0 becomes 1, size 0 becomes
    /// `default_size`, and sizes above `max_size` are capped.
    pub fn normalized(mut self, default_size: u32, max_size: u32) -> Self {
        self.page_number = self.page_number.max(1);
        if self.page_size == 0 {
            self.page_size = default_size;
        }
        self.page_size = self.page_size.min(max_size.max(1));
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page_number.saturating_sub(1)) * u64::from(self.page_size)
    }
}
