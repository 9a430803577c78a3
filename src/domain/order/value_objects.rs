use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

/// Order lifecycle status.
///
/// `Pending`, `Processing` and `Delivered` are assigned by callers. `Canceled`
/// is set by order deletion; create and update requests asking for it fail
/// validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Processing" => Ok(OrderStatus::Processing),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Canceled" => Ok(OrderStatus::Canceled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Soft-delete state of a persisted row.
///
/// A row is either live or was deleted at a known instant; there is no way to
/// be inactive without a deletion timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl RecordState {
    pub fn is_active(&self) -> bool {
        matches!(self, RecordState::Active)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RecordState::Active => None,
            RecordState::Deleted { at } => Some(*at),
        }
    }

    /// Rebuild from the `is_active` / `deleted_at` column pair.
    ///
    /// An inactive row without a timestamp is treated as deleted at
    /// `fallback`.
    pub fn from_columns(
        is_active: bool,
        deleted_at: Option<DateTime<Utc>>,
        fallback: DateTime<Utc>,
    ) -> Self {
        if is_active {
            RecordState::Active
        } else {
            RecordState::Deleted {
                at: deleted_at.unwrap_or(fallback),
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_text_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Delivered,
            OrderStatus::Canceled,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "Shipped".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.0, "Shipped");
    }

    #[test]
    fn test_record_state_deleted_carries_timestamp() {
        let at = Utc::now();
        let state = RecordState::Deleted { at };

        assert!(!state.is_active());
        assert_eq!(state.deleted_at(), Some(at));
        assert!(RecordState::Active.deleted_at().is_none());
    }

    #[test]
    fn test_record_state_from_columns() {
        let now = Utc::now();

        assert_eq!(RecordState::from_columns(true, Some(now), now), RecordState::Active);
        assert_eq!(
            RecordState::from_columns(false, None, now),
            RecordState::Deleted { at: now }
        );
    }
}
