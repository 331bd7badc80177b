//! Core types for statestore
//!
//! This crate defines the vocabulary shared by the storage and engine layers:
//! - [`Error`]: the error taxonomy
//! - [`StateValue`] and the record [`codec`]
//! - [`ETag`]: per-write version tokens
//! - [`Clock`]: injectable time source
//! - [`OpContext`]: per-operation deadline and cancellation
//! - Request/response types in [`types`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod codec;
pub mod context;
pub mod error;
pub mod etag;
pub mod types;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::EncodedValue;
pub use context::{CancelToken, OpContext};
pub use error::{BackingStoreError, Error, Result, READ_ONLY_MESSAGE};
pub use etag::ETag;
pub use types::{
    BulkGetItem, DeleteRequest, Expiry, Feature, GetRequest, SetRequest, StateItem,
    TransactionalOperation,
};
pub use value::StateValue;
