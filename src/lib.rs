// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Sigpool: a memory pool for instrumentation records that is safe to use from signal handlers.
//!
//! Sigpool is an append-only (arena) allocator designed to back the metadata of an in-process
//! performance-instrumentation library: context entries, attribute nodes, snapshots and
//! everything else that is recorded while a program is being measured. Measurement events may be
//! triggered by asynchronous signals (for example sampling timers), so the allocator must remain
//! usable when a signal handler interrupts the very allocation it is trying to perform.
//!
//! # Features
//!
//! * Allocation is a constant-time pointer bump with no calls into the system allocator, except
//!   when the pool needs to grow
//! * Every returned address is 8-byte aligned and never moves: records can point to each other
//!   (linked lists, trees) directly inside pool memory
//! * Safe to call from multiple threads, and from a signal handler that interrupted an
//!   allocation on the same thread (the nested call fails instead of deadlocking)
//! * Configurable initial size and growth policy
//!
//! There is no way to free individual allocations. All the memory is released at once when the
//! [`MemoryPool`] is dropped.
//!
//! # Quick start & examples
//!
//! ```
//! use sigpool::config::PoolConfig;
//! use sigpool::MemoryPool;
//!
//! let pool = MemoryPool::from_config(PoolConfig {
//!     pool_size: 4096,
//!     can_expand: true,
//! });
//!
//! let ptr = pool.allocate(24).expect("allocation failed");
//! assert_eq!(ptr.as_ptr() as usize % 8, 0);
//! ```
//!
//! [`MemoryPool::store`] moves a value into the pool, which is convenient to build linked
//! structures:
//!
//! ```
//! use sigpool::MemoryPool;
//! use std::ptr::NonNull;
//!
//! struct Node {
//!     value: u64,
//!     parent: Option<NonNull<Node>>,
//! }
//!
//! let pool = MemoryPool::from_config(Default::default());
//! let root = pool.store(Node { value: 1, parent: None }).unwrap();
//! let child = pool.store(Node { value: 2, parent: Some(root) }).unwrap();
//!
//! // SAFETY: both nodes live in `pool`, which is still alive.
//! let parent = unsafe { child.as_ref().parent.unwrap().as_ref() };
//! assert_eq!(parent.value, 1);
//! ```
//!
//! # Configuration
//!
//! [`MemoryPool::new`] reads its options from environment variables (see
//! [`EnvSource`](config::EnvSource)), the other constructors take them explicitly. See the
//! [`config`] module for the list of options.
//!
//! # Growth
//!
//! The pool is a list of chunks. At construction, one chunk of exactly `pool_size` bytes
//! (rounded up to a multiple of 8) is reserved. Allocations are carved from the last chunk; when
//! it does not have enough room left, a new chunk is appended, sized to fit the request but never
//! smaller than 64 KiB. The space left at the end of the previous chunk is not reused (it is
//! reported as [`Usage::forfeited`]).
//!
//! If growing is disabled (`can_expand = false`), [`MemoryPool::allocate`] returns `None`
//! instead.
//!
//! Growing calls into the system allocator, which is not safe to do from a signal handler.
//! Programs that allocate from signal handlers should reserve enough memory upfront, or disable
//! growth.
//!
//! # Internal details
//!
//! All the pool state is protected by a single [spin lock](https://en.wikipedia.org/wiki/Spinlock)
//! paired with a thread-local "currently locking" flag. The flag is raised before the spin lock
//! is touched and lowered after it is released; a lock attempt that finds the flag already raised
//! must come from a signal handler that interrupted its own thread, and gives up immediately,
//! making [`MemoryPool::allocate`] return `None`. As a consequence, a signal handler that
//! interrupts *any* pool operation on its thread cannot allocate from *any* pool until the
//! handler returns.
//!
//! # Cargo feature flags
//!
//! * `lazy`: enables the [`LazyPool`](lazy::LazyPool) type, for pools stored in `static` items.

#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stderr)]
#![warn(clippy::print_stdout)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(unused_crate_dependencies)]
#![warn(unused_macro_rules)]
#![warn(unused_qualifications)]
#![doc(test(attr(deny(warnings))))]

mod arena;
mod chunk;
mod error;
mod lock;
mod usage;

pub mod config;


#[cfg(feature = "lazy")]
pub mod lazy;

use crate::arena::Arena;
use crate::chunk::SLOT_SIZE;
use crate::config::EnvSource;
use crate::config::PoolConfig;
use crate::lock::SignalSafeMutex;
use core::ptr::NonNull;

pub use crate::config::ConfigSource;
pub use crate::error::ConfigError;
pub use crate::usage::Usage;

/// A chunked, append-only memory pool.
///
/// See the [module-level documentation](crate) for an overview and examples.
#[derive(Debug)]
pub struct MemoryPool {
    inner: SignalSafeMutex<Arena>,
    config: PoolConfig,
}

impl MemoryPool {
    /// Constructs a memory pool configured from the environment.
    ///
    /// The options are read from [`EnvSource::default()`]. Options set to invalid values are
    /// logged and replaced by their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use sigpool::MemoryPool;
    ///
    /// let pool = MemoryPool::new();
    /// assert!(pool.allocate(16).is_some());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(PoolConfig::from_source_lenient(&EnvSource::default()))
    }

    /// Constructs a memory pool configured from the environment, and reserves an additional
    /// `bytes` bytes.
    ///
    /// The memory reserved for `pool_size` is set aside, and allocations are served from the
    /// `bytes` reservation first.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        let config = PoolConfig::from_source_lenient(&EnvSource::default());
        Self::from_config_with_capacity(config, bytes)
    }

    /// Constructs a memory pool with the given options.
    #[must_use]
    pub fn from_config(config: PoolConfig) -> Self {
        Self::build(config, None)
    }

    /// Constructs a memory pool with the given options, and reserves an additional `bytes`
    /// bytes.
    ///
    /// See [`with_capacity`](Self::with_capacity).
    #[must_use]
    pub fn from_config_with_capacity(config: PoolConfig, bytes: usize) -> Self {
        Self::build(config, Some(bytes))
    }

    /// Constructs a memory pool reading its options from `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if one of the options is set to an invalid value.
    ///
    /// # Examples
    ///
    /// ```
    /// use sigpool::config::MapSource;
    /// use sigpool::MemoryPool;
    ///
    /// let source = MapSource::new().with("memory", "pool_size", "65536");
    /// let pool = MemoryPool::from_source(&source).expect("invalid configuration");
    /// assert_eq!(pool.config().pool_size, 65536);
    /// ```
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Result<Self, ConfigError> {
        PoolConfig::from_source(source).map(Self::from_config)
    }

    fn build(config: PoolConfig, capacity: Option<usize>) -> Self {
        let mut arena = Arena::new();
        arena.reserve(config.pool_size);
        if let Some(bytes) = capacity {
            arena.reserve(bytes);
        }

        tracing::debug!(
            pool_size = config.pool_size,
            can_expand = config.can_expand,
            capacity,
            "created memory pool"
        );

        Self {
            inner: SignalSafeMutex::new(arena),
            config,
        }
    }

    /// Returns the options this pool was constructed with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Allocates `bytes` bytes of uninitialized memory.
    ///
    /// The returned pointer is aligned to 8 bytes, and points to at least `bytes` bytes (the size
    /// is rounded up to a multiple of 8). The memory stays valid, and is never handed out again,
    /// until the pool is dropped. A request for 0 bytes returns a valid, aligned pointer that
    /// must not be dereferenced.
    ///
    /// Returns `None` if:
    ///
    /// * the pool is exhausted and growing is disabled (`can_expand = false`); or
    /// * this is called from a signal handler that interrupted another operation on this (or any
    ///   other) pool on the same thread.
    ///
    /// When the pool needs to grow, this calls into the system allocator. If the system allocator
    /// fails, the process is terminated via [`std::alloc::handle_alloc_error`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sigpool::config::PoolConfig;
    /// use sigpool::MemoryPool;
    ///
    /// let pool = MemoryPool::from_config(PoolConfig {
    ///     pool_size: 128,
    ///     can_expand: false,
    /// });
    ///
    /// assert!(pool.allocate(64).is_some());
    /// assert!(pool.allocate(64).is_some());
    /// assert!(pool.allocate(8).is_none());
    /// ```
    #[inline]
    pub fn allocate(&self, bytes: usize) -> Option<NonNull<u8>> {
        let mut arena = self.inner.lock()?;
        let chunks = arena.chunk_count();
        let ptr = arena.allocate(bytes, self.config.can_expand);
        let grown = arena.chunk_count() != chunks;
        drop(arena);

        if grown {
            tracing::trace!(bytes, chunks = chunks + 1, "expanded memory pool");
        }

        ptr
    }

    /// Moves `value` into the pool and returns a pointer to it.
    ///
    /// The value is never dropped: its memory is reclaimed when the pool is dropped, without
    /// running any destructor.
    ///
    /// Returns `None` if the allocation fails (see [`allocate`](Self::allocate)), or if `T`
    /// requires an alignment greater than 8 bytes. In both cases, `value` is dropped.
    pub fn store<T>(&self, value: T) -> Option<NonNull<T>> {
        if align_of::<T>() > SLOT_SIZE {
            return None;
        }

        let ptr = self.allocate(size_of::<T>())?.cast::<T>();
        // SAFETY: `ptr` is aligned for `T` (checked above), and points to at least
        // `size_of::<T>()` bytes that nobody else is using.
        unsafe { ptr.as_ptr().write(value) };
        Some(ptr)
    }

    /// Returns memory usage information for this pool.
    ///
    /// Returns `None` under the same re-entrancy conditions as [`allocate`](Self::allocate).
    ///
    /// # Examples
    ///
    /// ```
    /// use sigpool::config::PoolConfig;
    /// use sigpool::MemoryPool;
    /// use sigpool::Usage;
    ///
    /// let pool = MemoryPool::from_config(PoolConfig {
    ///     pool_size: 1024,
    ///     can_expand: true,
    /// });
    /// let _ = pool.allocate(100);
    ///
    /// assert_eq!(
    ///     pool.usage(),
    ///     Some(Usage {
    ///         chunks: 1,
    ///         reserved: 1024,
    ///         used: 104,
    ///         forfeited: 0,
    ///     })
    /// );
    /// ```
    #[must_use]
    pub fn usage(&self) -> Option<Usage> {
        self.inner.lock().map(|arena| arena.usage())
    }
}

impl Default for MemoryPool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
