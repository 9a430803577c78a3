use std::fmt;

use crate::storage::StorageError;

// ============================================================================
// Order Errors
// ============================================================================

/// Coarse classification the HTTP layer maps onto a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    StorageFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Order item not found: {0}")]
    ItemNotFound(i64),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::OrderNotFound(_)
            | OrderError::ItemNotFound(_)
            | OrderError::ProductNotFound(_) => ErrorKind::NotFound,
            OrderError::Validation(_) => ErrorKind::ValidationFailed,
            OrderError::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Messages carried by a validation failure, empty for every other kind.
    pub fn messages(&self) -> &[String] {
        match self {
            OrderError::Validation(errors) => errors.messages(),
            _ => &[],
        }
    }
}

impl From<ValidationErrors> for OrderError {
    fn from(errors: ValidationErrors) -> Self {
        OrderError::Validation(errors)
    }
}

/// Every rule violation found while checking an entity.
///
/// Checks push into this instead of returning early, so a caller sees all
/// problems with a request at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    messages: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record `message` when `ok` is false.
    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.push(message);
        }
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.messages.extend(other.messages);
    }

    pub fn extend_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        self.messages
            .extend(other.messages.into_iter().map(|m| format!("{prefix}: {m}")));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collect_all_messages() {
        let mut errors = ValidationErrors::new();
        errors.check(false, "quantity must be greater than zero");
        errors.check(true, "never recorded");
        errors.check(false, "unitary price must be greater than zero");

        assert_eq!(errors.messages().len(), 2);
        assert_eq!(
            errors.to_string(),
            "quantity must be greater than zero; unitary price must be greater than zero"
        );
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_prefixed_extension() {
        let mut inner = ValidationErrors::new();
        inner.push("product id must be greater than zero");

        let mut outer = ValidationErrors::new();
        outer.extend_prefixed("item 2", inner);

        assert_eq!(outer.messages(), ["item 2: product id must be greater than zero"]);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(OrderError::OrderNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(OrderError::ProductNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(
            OrderError::from(ValidationErrors::new()).kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            OrderError::from(StorageError::Backend("disk full".into())).kind(),
            ErrorKind::StorageFailure
        );
    }
}
