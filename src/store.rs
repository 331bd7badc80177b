//! Main entry point for statestore.
//!
//! This module provides [`StateStore`], a cheaply clonable handle over the
//! [`Engine`], and [`StateStoreBuilder`] for assembling one from options,
//! a custom clock or a custom backend.

use statestore_core::{Clock, Error, Result, SystemClock};
use statestore_engine::{Engine, StoreConfig};
use statestore_storage::{Backend, SqliteBackend};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The state store.
///
/// Dereferences to [`Engine`], so every operation is available directly:
///
/// ```
/// use statestore::prelude::*;
///
/// let store = StateStore::builder()
///     .connection(":memory:")
///     .cleanup_interval(None)
///     .open()
///     .unwrap();
/// let ctx = OpContext::background();
///
/// store.set(&ctx, &SetRequest::new("order:1", json!({"status": "new"}))).unwrap();
/// let item = store.get(&ctx, &GetRequest::new("order:1")).unwrap();
/// assert_eq!(item.value, StateValue::from(json!({"status": "new"})));
///
/// store.close().unwrap();
/// ```
#[derive(Clone)]
pub struct StateStore {
    engine: Arc<Engine>,
}

impl StateStore {
    /// Open a store from a parsed configuration
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::builder().config(config).open()
    }

    /// Open a store from a facade's property map
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        Self::builder().properties(props.clone()).open()
    }

    /// Open a private in-memory store without a cleanup timer.
    ///
    /// Useful for tests; all data is lost when the store is dropped.
    pub fn ephemeral() -> Result<Self> {
        Self::builder()
            .connection(":memory:")
            .cleanup_interval(None)
            .open()
    }

    /// Create a builder
    pub fn builder() -> StateStoreBuilder {
        StateStoreBuilder::new()
    }

    /// The shared engine
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

impl Deref for StateStore {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("engine", &self.engine)
            .finish()
    }
}

/// Builder for a [`StateStore`].
///
/// Options come from, in order of precedence: an explicit
/// [`StoreConfig`], a property map, then individual setters applied on top.
///
/// ```
/// use statestore::prelude::*;
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::at_millis(0));
/// let store = StateStore::builder()
///     .connection(":memory:")
///     .cleanup_interval(None)
///     .clock(clock)
///     .open()
///     .unwrap();
/// assert!(!store.is_read_only());
/// ```
#[derive(Default)]
pub struct StateStoreBuilder {
    config: Option<StoreConfig>,
    properties: Option<HashMap<String, String>>,
    connection: Option<String>,
    read_only: Option<bool>,
    cleanup_interval: Option<Option<Duration>>,
    clock: Option<Arc<dyn Clock>>,
    backend: Option<Arc<dyn Backend>>,
}

impl StateStoreBuilder {
    /// Create a new builder with no options set
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fully parsed configuration
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Parse options from a property map at open time
    pub fn properties(mut self, props: HashMap<String, String>) -> Self {
        self.properties = Some(props);
        self
    }

    /// Set the connection string
    pub fn connection(mut self, connection_string: impl Into<String>) -> Self {
        self.connection = Some(connection_string.into());
        self
    }

    /// Open read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// Set or disable the cleanup timer
    pub fn cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Use a custom time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an already-open backend instead of opening SQLite
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    fn resolve_config(&mut self) -> Result<StoreConfig> {
        let mut config = match (self.config.take(), self.properties.take()) {
            (Some(config), _) => config,
            (None, Some(props)) => StoreConfig::from_properties(&props)?,
            (None, None) => {
                let connection = self.connection.take().ok_or_else(|| {
                    Error::InvalidConfig("no connection string configured".into())
                })?;
                StoreConfig::new(connection)
            }
        };
        if let Some(connection) = self.connection.take() {
            config.connection_string = connection;
        }
        if let Some(read_only) = self.read_only {
            config.read_only = read_only;
        }
        if let Some(interval) = self.cleanup_interval {
            config.cleanup_interval = interval;
        }
        config.validate()?;
        Ok(config)
    }

    /// Open the store
    pub fn open(mut self) -> Result<StateStore> {
        let config = self.resolve_config()?;
        let clock = self.clock.take().unwrap_or_else(|| Arc::new(SystemClock));
        let backend: Arc<dyn Backend> = match self.backend.take() {
            Some(backend) => backend,
            None => Arc::new(SqliteBackend::open(&config.sqlite_options())?),
        };

        let engine = Engine::with_backend(config, backend, clock)?;
        info!(
            read_only = engine.is_read_only(),
            cleanup = engine.is_cleanup_scheduled(),
            "state store opened"
        );
        Ok(StateStore {
            engine: Arc::new(engine),
        })
    }
}
