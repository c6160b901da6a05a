//! Authoritative mutation queue.

/// Mutation store, validation and status transitions.
pub mod store;
