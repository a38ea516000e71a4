// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

/// Error returned when a configuration value cannot be interpreted.
///
/// Allocation itself never fails with an error: see [`MemoryPool::allocate`] for how an
/// exhausted pool is reported.
///
/// [`MemoryPool::allocate`]: crate::MemoryPool::allocate
#[non_exhaustive]
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum ConfigError {
    /// A configuration key is set to a value that does not parse as the expected type.
    #[error("invalid value {value:?} for `{namespace}.{key}`: expected {expected}")]
    InvalidValue {
        /// Namespace of the offending key.
        namespace: &'static str,
        /// The offending key.
        key: &'static str,
        /// The value as it was read from the configuration source.
        value: String,
        /// Human-readable description of the expected type.
        expected: &'static str,
    },
}
