// ============================================================================
// Database Adapters
// ============================================================================
//
// Postgres implementation of the storage capabilities in `crate::storage`.
//
// ============================================================================

mod postgres;

pub use postgres::PgStore;
