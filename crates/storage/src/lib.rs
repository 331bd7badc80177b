//! Storage layer for statestore
//!
//! This crate sits between the engine and the relational database:
//! - [`Backend`] / [`BackendTx`]: typed statements, transactions, migrations
//! - [`ModeGuard`]: refuses writes on read-only stores
//! - [`SqliteBackend`]: pooled SQLite implementation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod guard;
pub mod sqlite;

pub use backend::{
    Backend, BackendTx, Outcome, Predicate, QuerySpec, RecordRow, RecordWrite, Scalar, SortKey,
    Statement, TxMode,
};
pub use guard::ModeGuard;
pub use sqlite::{SqliteBackend, SqliteOptions};
