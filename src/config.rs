// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Pool configuration and the key-value sources it is read from.
//!
//! A [`MemoryPool`](crate::MemoryPool) reads its options once, at construction, from the
//! [`CONFIG_NAMESPACE`] namespace of a [`ConfigSource`]. The options are listed in
//! [`CONFIG_ENTRIES`]:
//!
//! | Key          | Kind | Default   | Effect                                                      |
//! |--------------|------|-----------|-------------------------------------------------------------|
//! | `pool_size`  | uint | `2097152` | bytes reserved at construction                              |
//! | `can_expand` | bool | `true`    | when `false`, an exhausted pool fails instead of growing    |
//!
//! Hosts that already have a configuration file can also embed [`PoolConfig`] directly, since it
//! implements [`serde::Deserialize`]:
//!
//! ```
//! use sigpool::config::PoolConfig;
//!
//! let config: PoolConfig = toml::from_str("pool_size = 4096").expect("invalid configuration");
//! assert_eq!(config.pool_size, 4096);
//! assert!(config.can_expand);
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Namespace under which the pool options are looked up.
pub const CONFIG_NAMESPACE: &str = "memory";

/// Default value for [`PoolConfig::pool_size`].
pub const DEFAULT_POOL_SIZE: usize = 2 * 1024 * 1024;

/// Default value for [`PoolConfig::can_expand`].
pub const DEFAULT_CAN_EXPAND: bool = true;

/// The type of a configuration value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    /// Unsigned integer, written in decimal.
    Uint,
    /// Boolean: `true`/`false`, `yes`/`no`, `on`/`off` or `1`/`0` (case-insensitive).
    Bool,
}

/// Description of a configuration option.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ConfigEntry {
    /// Key of the option, relative to [`CONFIG_NAMESPACE`].
    pub key: &'static str,
    /// Type of the option value.
    pub kind: ValueKind,
    /// Default value, in the same textual form a [`ConfigSource`] returns.
    pub default: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// All the options read by [`PoolConfig::from_source`].
pub const CONFIG_ENTRIES: &[ConfigEntry] = &[
    ConfigEntry {
        key: "pool_size",
        kind: ValueKind::Uint,
        default: "2097152",
        description: "Initial size of the memory pool (in bytes)",
    },
    ConfigEntry {
        key: "can_expand",
        kind: ValueKind::Bool,
        default: "true",
        description: "Allow the memory pool to expand at runtime",
    },
];

/// A key-value store that configuration options can be read from.
///
/// Values are returned in textual form; [`PoolConfig::from_source`] takes care of parsing them.
pub trait ConfigSource {
    /// Returns the value of `key` in `namespace`, or `None` if the key is not set.
    fn get(&self, namespace: &str, key: &str) -> Option<String>;
}

impl<S: ConfigSource + ?Sized> ConfigSource for &S {
    #[inline]
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        (**self).get(namespace, key)
    }
}

/// Reads options from environment variables.
///
/// The variable for `key` in `namespace` is `<PREFIX>_<NAMESPACE>_<KEY>`, upper-cased. With the
/// default prefix, the pool size is read from `SIGPOOL_MEMORY_POOL_SIZE`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    /// Prefix used by [`EnvSource::default`].
    pub const DEFAULT_PREFIX: &'static str = "SIGPOOL";

    /// Creates a source that reads variables starting with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the name of the environment variable holding `key` in `namespace`.
    #[must_use]
    pub fn variable(&self, namespace: &str, key: &str) -> String {
        format!("{}_{}_{}", self.prefix, namespace, key).to_ascii_uppercase()
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        std::env::var(self.variable(namespace, key)).ok()
    }
}

/// In-memory configuration source.
///
/// # Examples
///
/// ```
/// use sigpool::config::MapSource;
/// use sigpool::config::PoolConfig;
///
/// let source = MapSource::new()
///     .with("memory", "pool_size", "128")
///     .with("memory", "can_expand", "false");
///
/// let config = PoolConfig::from_source(&source).expect("invalid configuration");
/// assert_eq!(config.pool_size, 128);
/// assert!(!config.can_expand);
/// ```
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct MapSource {
    values: BTreeMap<(String, String), String>,
}

impl MapSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` in `namespace` to `value`, replacing any previous value.
    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.values
            .insert((namespace.into(), key.into()), value.into());
        self
    }

    /// Builder-style version of [`insert`](Self::insert).
    #[must_use]
    pub fn with(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(namespace, key, value);
        self
    }
}

impl ConfigSource for MapSource {
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.values
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
    }
}

/// Options of a [`MemoryPool`](crate::MemoryPool).
///
/// Both options are read once, when the pool is constructed, and never change afterwards.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Bytes reserved when the pool is constructed.
    pub pool_size: usize,
    /// Whether the pool may acquire new chunks once the reserved memory is used up.
    pub can_expand: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            can_expand: DEFAULT_CAN_EXPAND,
        }
    }
}

impl PoolConfig {
    /// Reads the options from the [`CONFIG_NAMESPACE`] namespace of `source`.
    ///
    /// Keys that are not set take their default value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a key is set to a value that does not parse.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = source.get(CONFIG_NAMESPACE, "pool_size") {
            config.pool_size = parse_uint("pool_size", &value)?;
        }
        if let Some(value) = source.get(CONFIG_NAMESPACE, "can_expand") {
            config.can_expand = parse_bool("can_expand", &value)?;
        }

        Ok(config)
    }

    /// Reads the options like [`from_source`](Self::from_source) does, but a key set to an
    /// invalid value is logged and takes its default value instead of failing the whole read.
    #[must_use]
    pub fn from_source_lenient<S: ConfigSource + ?Sized>(source: &S) -> Self {
        let defaults = Self::default();
        Self {
            pool_size: read_lenient(source, "pool_size", parse_uint, defaults.pool_size),
            can_expand: read_lenient(source, "can_expand", parse_bool, defaults.can_expand),
        }
    }
}

fn read_lenient<S, T>(
    source: &S,
    key: &'static str,
    parse: fn(&'static str, &str) -> Result<T, ConfigError>,
    default: T,
) -> T
where
    S: ConfigSource + ?Sized,
{
    match source.get(CONFIG_NAMESPACE, key).map(|value| parse(key, &value)) {
        None => default,
        Some(Ok(value)) => value,
        Some(Err(err)) => {
            tracing::warn!(%err, "ignoring invalid configuration value, using the default");
            default
        }
    }
}

fn invalid(key: &'static str, value: &str, kind: ValueKind) -> ConfigError {
    ConfigError::InvalidValue {
        namespace: CONFIG_NAMESPACE,
        key,
        value: value.to_owned(),
        expected: match kind {
            ValueKind::Uint => "an unsigned integer",
            ValueKind::Bool => "a boolean",
        },
    }
}

fn parse_uint(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(key, value, ValueKind::Uint));
    }
    trimmed
        .parse()
        .map_err(|_| invalid(key, value, ValueKind::Uint))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, ValueKind::Bool)),
    }
}
