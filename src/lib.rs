//! # statestore
//!
//! A versioned key-value state store on top of SQLite.
//!
//! Every record carries an etag that changes on each write, so callers can
//! choose between last-write-wins and first-write-wins (conditional) updates.
//! Heterogeneous batches commit atomically, records can expire, and a
//! background timer sweeps expired rows without redundant scans across
//! processes sharing one database.
//!
//! ## Quick Start
//!
//! ```
//! use statestore::prelude::*;
//! use std::time::Duration;
//!
//! let store = StateStore::ephemeral().unwrap();
//! let ctx = OpContext::with_timeout(Duration::from_secs(5));
//!
//! // Last-write-wins
//! let etag = store.set(&ctx, &SetRequest::new("cart:7", json!({"items": 2}))).unwrap();
//!
//! // First-write-wins: only succeeds if nobody wrote in between
//! store
//!     .set(&ctx, &SetRequest::new("cart:7", json!({"items": 3})).with_etag(etag))
//!     .unwrap();
//!
//! // Atomic batch
//! store
//!     .multi(&ctx, &[
//!         SetRequest::new("a", 1i64).into(),
//!         DeleteRequest::new("cart:7").into(),
//!     ])
//!     .unwrap();
//!
//! store.close().unwrap();
//! ```
//!
//! ## Layers
//!
//! - [`statestore_core`]: errors, values, etags, clock, operation context
//! - [`statestore_storage`]: backend traits, read-only guard, SQLite backend
//! - [`statestore_engine`]: CRUD, transactions, queries, cleanup

#![warn(missing_docs)]

mod store;

pub mod prelude;

// Main entry points
pub use store::{StateStore, StateStoreBuilder};

// Core types
pub use statestore_core::{
    BackingStoreError, BulkGetItem, CancelToken, Clock, DeleteRequest, ETag, Error, Expiry,
    Feature, GetRequest, ManualClock, OpContext, Result, SetRequest, StateItem, StateValue,
    SystemClock, TransactionalOperation, READ_ONLY_MESSAGE,
};

// Engine
pub use statestore_engine::{
    CleanupOutcome, Engine, Filter, Pagination, Query, QueryItem, QueryResponse, SortOrder,
    Sorting, StoreConfig, LAST_CLEANUP_KEY,
};

// Storage
pub use statestore_storage::{Backend, BackendTx, SqliteBackend, SqliteOptions};

// Member crates, for lower-level access
pub use statestore_core;
pub use statestore_engine;
pub use statestore_storage;
