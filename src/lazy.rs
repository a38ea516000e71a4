// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Lazy initialization of memory pools.
//!
//! See [`LazyPool`] for information and examples.

use crate::MemoryPool;
use core::ops::Deref;
use spin::Lazy;

/// Lazy-initialized [`MemoryPool`].
///
/// The pool is not constructed when `LazyPool` is constructed, but when it is first accessed.
/// This makes it possible to keep the pool of an instrumentation session in a `static` item.
///
/// The initialization function acquires memory from the system allocator, which is not safe to
/// do from a signal handler. Make sure the pool is accessed at least once (for example with
/// [`get`](Self::get)) before installing signal handlers that use it.
///
/// # Examples
///
/// ```
/// use sigpool::config::PoolConfig;
/// use sigpool::lazy::LazyPool;
/// use sigpool::MemoryPool;
///
/// static POOL: LazyPool = LazyPool::new(|| {
///     MemoryPool::from_config(PoolConfig {
///         pool_size: 64 * 1024,
///         can_expand: false,
///     })
/// });
///
/// // Initialize the pool now, outside of any signal handler.
/// let _ = POOL.get();
///
/// assert!(POOL.allocate(32).is_some());
/// ```
#[derive(Debug)]
pub struct LazyPool<F = fn() -> MemoryPool>(Lazy<MemoryPool, F>);

impl<F> LazyPool<F> {
    /// Constructs a new [`LazyPool`] from the given initialization function.
    ///
    /// The initialization function will be called when the `LazyPool` is first used.
    #[inline]
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self(Lazy::new(f))
    }
}

impl LazyPool {
    /// Constructs a [`LazyPool`] that will be initialized with [`MemoryPool::new`], reading its
    /// options from the environment.
    #[inline]
    #[must_use]
    pub const fn from_env() -> Self {
        Self::new(MemoryPool::new)
    }
}

impl<F: FnOnce() -> MemoryPool> LazyPool<F> {
    /// Returns a reference to the underlying `MemoryPool`, initializing it if necessary.
    ///
    /// Calling this method is equivalent to dereferencing (`lazy.get()` is equivalent to
    /// `&*lazy`).
    #[inline]
    pub fn get(&self) -> &MemoryPool {
        self
    }
}

impl<F: FnOnce() -> MemoryPool> Deref for LazyPool<F> {
    type Target = MemoryPool;

    #[inline]
    fn deref(&self) -> &MemoryPool {
        &self.0
    }
}
