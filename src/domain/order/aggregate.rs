use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::commands::{CreateOrderRequest, OrderItemRequest, UpdateOrderRequest};
use super::errors::ValidationErrors;
use super::value_objects::{OrderStatus, RecordState};

// ============================================================================
// Order Aggregate - Order header and its owned line items
// ============================================================================

/// Order header. `id` is 0 until the store assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_date: DateTime<Utc>,
    pub total_value: Decimal,
    pub status: OrderStatus,
    pub client_id: i64,
    pub created_at: DateTime<Utc>,
    pub state: RecordState,
}

impl Order {
    /// Build an unsaved order from a create request, checking the header and
    /// every requested line.
    pub fn from_request(
        request: &CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(request.order_date.is_some(), "order date is required");

        let order = Self {
            id: 0,
            order_date: request.order_date.unwrap_or(now),
            total_value: request.total_value,
            status: request.status.unwrap_or_default(),
            client_id: request.client_id.unwrap_or_default(),
            created_at: now,
            state: RecordState::Active,
        };

        match request.client_id {
            Some(_) => errors.extend(order.header_errors(now)),
            None => {
                errors.push("client is required");
                errors.extend(order.field_errors(now));
            }
        }

        let lines: Vec<OrderItemRequest> =
            request.items.iter().map(|line| line.as_new_for(0)).collect();
        errors.extend(validate_lines(&lines));

        errors.into_result().map(|_| order)
    }

    /// Overlay the header fields present in `request`.
    pub fn merge(&mut self, request: &UpdateOrderRequest) {
        if let Some(order_date) = request.order_date {
            self.order_date = order_date;
        }
        if let Some(total_value) = request.total_value {
            self.total_value = total_value;
        }
        if let Some(status) = request.status {
            self.status = status;
        }
        if let Some(client_id) = request.client_id {
            self.client_id = client_id;
        }
    }

    /// Header rules: date not in the future, positive total, positive
    /// client, and no caller-assigned `Canceled` status.
    pub fn header_errors(&self, now: DateTime<Utc>) -> ValidationErrors {
        let mut errors = self.field_errors(now);
        errors.check(self.client_id > 0, "client id must be greater than zero");
        errors
    }

    fn field_errors(&self, now: DateTime<Utc>) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        errors.check(self.order_date <= now, "order date cannot be in the future");
        errors.check(
            self.total_value > Decimal::ZERO,
            "total value must be greater than zero",
        );
        errors.check(
            self.status != OrderStatus::Canceled,
            "status Canceled can only be set by deleting the order",
        );
        errors
    }

    /// Whether `item` belongs in this order's reported item totals: active
    /// items, plus the items removed together with the order itself.
    pub fn reports_item(&self, item: &OrderItem) -> bool {
        item.order_id == self.id
            && (item.is_active()
                || (self.state.deleted_at().is_some()
                    && item.state.deleted_at() == self.state.deleted_at()))
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn cancel(&mut self) {
        self.status = OrderStatus::Canceled;
    }
}

/// Non-empty list, each line valid, no id requested twice.
pub fn validate_lines(items: &[OrderItemRequest]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.check(!items.is_empty(), "order must contain at least one item");

    let mut seen = std::collections::HashSet::new();
    for (position, item) in items.iter().enumerate() {
        errors.extend_prefixed(&format!("item {}", position + 1), item.line_errors());
        if !item.is_new() && !seen.insert(item.id) {
            errors.push(format!("item id {} appears more than once", item.id));
        }
    }
    errors
}

/// Line item owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unitary_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub state: RecordState,
}

impl OrderItem {
    /// Unsaved item built from a request; the product name is filled in once
    /// the product has been resolved.
    pub fn draft(request: &OrderItemRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            order_id: request.order_id,
            product_id: request.product_id,
            product_name: String::new(),
            quantity: request.quantity,
            unitary_price: request.unitary_price,
            created_at: now,
            state: RecordState::Active,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unitary_price
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.quantity > 0, "quantity must be greater than zero");
        errors.check(
            self.unitary_price > Decimal::ZERO,
            "unitary price must be greater than zero",
        );
        errors.check(self.order_id > 0, "order id must be greater than zero");
        errors.check(self.product_id > 0, "product id must be greater than zero");
        errors.into_result()
    }

    /// Only quantity and price are taken; order and product stay put.
    pub fn apply(&mut self, request: &OrderItemRequest) {
        self.quantity = request.quantity;
        self.unitary_price = request.unitary_price;
    }

    pub fn matches(&self, request: &OrderItemRequest) -> bool {
        self.quantity == request.quantity && self.unitary_price == request.unitary_price
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
