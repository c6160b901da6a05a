//! Upload of queued mutations to the remote document store.

pub mod remote;
pub mod translator;
pub mod wire;
pub mod worker;
