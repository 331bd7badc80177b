//! Store configuration
//!
//! Options arrive either as a flat property map (the shape a component
//! facade hands over) or as a TOML document. Keys are matched
//! case-insensitively.
//!
//! | Key | Default |
//! |---|---|
//! | `connectionString` / `connection` | required |
//! | `readOnly` | `false` |
//! | `tableName` | `state` |
//! | `metadataTableName` | `metadata` |
//! | `cleanupIntervalInSeconds` | `3600`; `<= 0` disables the timer |
//! | `timeoutInSeconds` | `20` |
//! | `busyTimeoutMs` | `2000` |
//! | `maxConnections` | `4` (`1` for `:memory:`) |
//! | `filterExpiredOnRead` | `false` |

use statestore_core::{Error, Result};
use statestore_storage::sqlite::{
    validate_identifier, SqliteOptions, DEFAULT_BUSY_TIMEOUT, DEFAULT_METADATA_TABLE_NAME,
    DEFAULT_TABLE_NAME,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Cleanup interval used when none is configured
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Per-operation timeout used when the caller sets no deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `:memory:`, a file path, or a `file:` URI
    pub connection_string: String,
    /// Refuse every write
    pub read_only: bool,
    /// Records table
    pub table_name: String,
    /// Bookkeeping table
    pub metadata_table_name: String,
    /// Cleanup timer period; `None` disables the timer
    pub cleanup_interval: Option<Duration>,
    /// Default operation timeout
    pub timeout: Duration,
    /// SQLite busy timeout
    pub busy_timeout: Duration,
    /// Pool size; `None` picks a default
    pub max_connections: Option<usize>,
    /// Hide rows whose expiration has passed but which are not yet swept
    pub filter_expired_on_read: bool,
}

impl StoreConfig {
    /// Defaults for everything but the connection string
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            read_only: false,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            metadata_table_name: DEFAULT_METADATA_TABLE_NAME.to_string(),
            cleanup_interval: Some(DEFAULT_CLEANUP_INTERVAL),
            timeout: DEFAULT_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_connections: None,
            filter_expired_on_read: false,
        }
    }

    /// An in-memory store
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Set read-only mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the records table
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Set the bookkeeping table
    pub fn metadata_table_name(mut self, name: impl Into<String>) -> Self {
        self.metadata_table_name = name.into();
        self
    }

    /// Set or disable the cleanup timer
    pub fn cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the default operation timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Hide expired-but-unswept rows from reads
    pub fn filter_expired_on_read(mut self, filter: bool) -> Self {
        self.filter_expired_on_read = filter;
        self
    }

    /// Parse from a property map.
    ///
    /// Unknown keys are ignored so a facade can pass its whole metadata map.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let props: HashMap<String, &str> = props
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        let get = |key: &str| props.get(&key.to_ascii_lowercase()).copied();

        let connection_string = get("connectionString")
            .or_else(|| get("connection"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidConfig("missing connectionString".into()))?;

        let mut config = Self::new(connection_string);
        if let Some(raw) = get("readOnly") {
            config.read_only = parse_bool("readOnly", raw)?;
        }
        if let Some(raw) = get("tableName") {
            config.table_name = raw.trim().to_string();
        }
        if let Some(raw) = get("metadataTableName") {
            config.metadata_table_name = raw.trim().to_string();
        }
        config.cleanup_interval = parse_cleanup_interval(get("cleanupIntervalInSeconds"))?;
        if let Some(raw) = get("timeoutInSeconds") {
            let secs: u64 = parse_number("timeoutInSeconds", raw)?;
            if secs == 0 {
                return Err(Error::InvalidConfig(
                    "timeoutInSeconds must be positive".into(),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("busyTimeoutMs") {
            config.busy_timeout = Duration::from_millis(parse_number("busyTimeoutMs", raw)?);
        }
        if let Some(raw) = get("maxConnections") {
            let n: usize = parse_number("maxConnections", raw)?;
            if n == 0 {
                return Err(Error::InvalidConfig(
                    "maxConnections must be at least 1".into(),
                ));
            }
            config.max_connections = Some(n);
        }
        if let Some(raw) = get("filterExpiredOnRead") {
            config.filter_expired_on_read = parse_bool("filterExpiredOnRead", raw)?;
        }

        config.validate()?;
        debug!(table = %config.table_name, "parsed store config");
        Ok(config)
    }

    /// Parse from a TOML document of top-level `key = value` pairs
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let table: toml::Table = s
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("malformed TOML: {e}")))?;

        let mut props = HashMap::with_capacity(table.len());
        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(n) => n.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "{key}: expected a scalar, got {}",
                        other.type_str()
                    )))
                }
            };
            props.insert(key, text);
        }
        Self::from_properties(&props)
    }

    /// Check table names
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table_name)?;
        validate_identifier(&self.metadata_table_name)?;
        if self.table_name == self.metadata_table_name {
            return Err(Error::InvalidConfig(
                "tableName and metadataTableName must differ".into(),
            ));
        }
        Ok(())
    }

    /// Options for opening the SQLite backend
    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            connection_string: self.connection_string.clone(),
            read_only: self.read_only,
            table_name: self.table_name.clone(),
            metadata_table_name: self.metadata_table_name.clone(),
            busy_timeout: self.busy_timeout,
            max_connections: self.max_connections,
        }
    }
}

/// Interpret `cleanupIntervalInSeconds`: unset or empty is one hour, a
/// positive count is that many seconds, zero or negative disables the timer.
pub fn parse_cleanup_interval(raw: Option<&str>) -> Result<Option<Duration>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Some(DEFAULT_CLEANUP_INTERVAL)),
        Some(raw) => raw,
    };
    let secs: i64 = parse_number("cleanupIntervalInSeconds", raw)?;
    if secs <= 0 {
        return Ok(None);
    }
    Ok(Some(Duration::from_secs(secs.unsigned_abs())))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{key}: {raw:?} is not a valid number")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(Error::InvalidConfig(format!(
            "{key}: {raw:?} is not a boolean"
        ))),
    }
}
