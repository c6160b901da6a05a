//! Offline-first mutation queue for field data collection, with upload to a
//! remote document store and an interactive polygon drawing model.
//!
//! # Examples
//!
//! Queue-level usage with [`core::store::MutationStore`]:
//! ```
//! use chrono::Utc;
//! use fieldsync::{
//!     core::store::MutationStore,
//!     geometry::{Coordinates, Geometry, Point},
//!     mutation::{LocationOfInterestMutation, Mutation, MutationMeta},
//!     types::{MutationType, SyncStatus},
//! };
//!
//! let mut store = MutationStore::in_memory();
//! let id = store
//!     .create(Mutation::LocationOfInterest(LocationOfInterestMutation {
//!         meta: MutationMeta::new(MutationType::Create, "survey", "loi", "user", Utc::now()),
//!         job_id: "job".to_string(),
//!         custom_id: None,
//!         caption: None,
//!         geometry: Some(Geometry::Point(Point::new(Coordinates::new(1.0, 2.0)))),
//!     }))
//!     .expect("create");
//! store.mark_in_progress(id).expect("claim");
//! store.mark_failed(id, "offline", true).expect("fail");
//! assert_eq!(store.get(id).expect("get").map(|m| m.sync_status()), Some(SyncStatus::Failed));
//! assert_eq!(store.pending_count("survey").expect("count"), 1);
//! ```
//!
//! Runtime usage with SQLite and a sync worker:
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldsync::{
//!     config::FieldSyncConfig,
//!     core::store::MutationStore,
//!     model::User,
//!     persist::sqlite::SqliteLocalStore,
//!     runtime::handle::spawn_mutation_store,
//!     sync::{remote::MemoryRemoteStore, worker::SyncWorker},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cfg = FieldSyncConfig::default();
//! let local = SqliteLocalStore::open("mutations.db").expect("open sqlite");
//! let store = MutationStore::open(Box::new(local)).expect("open store");
//! let handle = spawn_mutation_store(store, cfg.runtime.clone());
//!
//! let user = User {
//!     id: "user".to_string(),
//!     display_name: "Surveyor".to_string(),
//!     photo_url: String::new(),
//! };
//! let mut worker = SyncWorker::new(handle.clone(), Arc::new(MemoryRemoteStore::new()), user, cfg.sync);
//! let (_cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
//! let report = worker.run_pass("survey", &mut cancel_rx).await.expect("sync pass");
//! println!("{report:?}");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Top-level configuration.
pub mod config;
/// Authoritative mutation queue and its status transitions.
pub mod core;
/// Polygon drawing state machine.
pub mod drawing;
/// Geometry value types.
pub mod geometry;
/// Subscriber setup for `tracing`.
pub mod logging;
/// Domain entities: users, jobs, LOIs, submissions.
pub mod model;
/// Pending edits and their payload envelope.
pub mod mutation;
/// Local persistence abstraction with SQLite and in-memory backends.
pub mod persist;
/// Edit entry points and remote collection loading.
pub mod repository;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Remote schema, translation and the upload worker.
pub mod sync;
/// Shared ids and status enums.
pub mod types;
