//! Interactive polygon drawing for area tasks.

/// Drawing state machine and its published snapshots.
pub mod polygon;
