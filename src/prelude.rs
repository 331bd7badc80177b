//! Convenient imports for statestore.
//!
//! ```
//! use statestore::prelude::*;
//!
//! let store = StateStore::ephemeral().unwrap();
//! store.set(&OpContext::background(), &SetRequest::new("k", "v")).unwrap();
//! ```

// Main entry point
pub use crate::store::{StateStore, StateStoreBuilder};

// Error handling
pub use statestore_core::{Error, Result};

// Requests and responses
pub use statestore_core::{
    BulkGetItem, DeleteRequest, ETag, Expiry, GetRequest, SetRequest, StateItem, StateValue,
    TransactionalOperation,
};

// Deadlines, cancellation, time
pub use statestore_core::{CancelToken, Clock, ManualClock, OpContext, SystemClock};

// Engine
pub use statestore_engine::{
    CleanupOutcome, Engine, Filter, Query, QueryResponse, SortOrder, StoreConfig,
};

// Re-export serde_json for convenience
pub use serde_json::json;
