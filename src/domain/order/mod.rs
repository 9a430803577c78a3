// ============================================================================
// Order Domain - Order Aggregate and Item Reconciliation
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderStatus, RecordState)
// - Commands (create/update requests, list queries)
// - Errors (OrderError, ValidationErrors)
// - Aggregate (Order header and OrderItem lines)
// - Views (read models returned to callers)
// - Reconciler (item CRUD and desired-state sync)
// - Lifecycle (transactional order operations)
//
// Persistence is reached only through the traits in `crate::storage`.
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod views;
pub mod reconciler;
pub mod lifecycle;

// Re-export for convenience
pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use views::*;
pub use reconciler::{OrderItemReconciler, SyncOutcome};
pub use lifecycle::{OrderLifecycleManager, PagingLimits};
