// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with value objects, commands,
// errors, the aggregate itself and the services that persist it.
//
// ============================================================================

pub mod order;
