//! State store engine
//!
//! This crate implements the store's operations on top of a storage
//! [`Backend`](statestore_storage::Backend):
//! - [`Engine`]: lifecycle, capability flags
//! - CRUD and bulk operations with etag concurrency (`crud`)
//! - [`Engine::multi`]: atomic heterogeneous batches
//! - [`Engine::cleanup_expired`] and the [`CleanupScheduler`]
//! - [`Query`]: filter/sort/paginate translation
//! - [`StoreConfig`]: option parsing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
mod crud;
pub mod engine;
pub mod query;
mod transaction;

pub use cleanup::{CleanupOutcome, CleanupScheduler, LAST_CLEANUP_KEY};
pub use config::{parse_cleanup_interval, StoreConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_TIMEOUT};
pub use engine::Engine;
pub use query::{
    Filter, Pagination, Query, QueryItem, QueryResponse, SortOrder, Sorting,
};
