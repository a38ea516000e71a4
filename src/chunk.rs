// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use std::alloc::Layout;
use std::ptr::NonNull;

/// The unit of allocation. Every chunk is an array of slots, and every allocation is rounded up
/// to a whole number of slots, which gives all returned addresses the alignment of `Slot`.
pub(crate) type Slot = u64;

/// Size in bytes of a single [`Slot`].
pub(crate) const SLOT_SIZE: usize = size_of::<Slot>();

/// Returns the number of slots needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub(crate) const fn slots_for(bytes: usize) -> usize {
    bytes.div_ceil(SLOT_SIZE)
}

/// A fixed-capacity buffer of slots with a high-water mark.
///
/// The buffer is acquired once in [`Chunk::new`] and released once when the chunk is dropped.
/// It is never resized, so addresses handed out by [`Chunk::bump`] stay valid for as long as the
/// chunk is alive, even if the `Chunk` value itself is moved around (for example when the
/// arena's chunk list reallocates).
#[derive(Debug)]
pub(crate) struct Chunk {
    base: NonNull<Slot>,
    capacity: usize,
    high_water_mark: usize,
}

// SAFETY: `Chunk` exclusively owns the buffer pointed by `base`; nothing else holds a reference
// to the buffer itself (callers receive raw addresses of disjoint regions inside it).
unsafe impl Send for Chunk {}

impl Chunk {
    /// Acquires a new buffer of `capacity` slots.
    ///
    /// A chunk with zero capacity does not acquire any memory.
    ///
    /// If the global allocator fails, this calls [`std::alloc::handle_alloc_error`], which
    /// terminates the process.
    pub(crate) fn new(capacity: usize) -> Self {
        let base = if capacity == 0 {
            NonNull::dangling()
        } else {
            let layout = Self::layout(capacity);
            // SAFETY: `layout` has a non-zero size (checked above).
            let ptr = unsafe { std::alloc::alloc(layout) };
            match NonNull::new(ptr) {
                Some(ptr) => ptr.cast::<Slot>(),
                None => std::alloc::handle_alloc_error(layout),
            }
        };

        Self {
            base,
            capacity,
            high_water_mark: 0,
        }
    }

    fn layout(capacity: usize) -> Layout {
        match Layout::array::<Slot>(capacity) {
            Ok(layout) => layout,
            // The requested size does not fit in `isize`: no allocator could ever satisfy it.
            Err(_) => std::alloc::handle_alloc_error(Layout::new::<Slot>()),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub(crate) const fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    #[inline]
    #[must_use]
    pub(crate) const fn remaining(&self) -> usize {
        self.capacity - self.high_water_mark
    }

    /// Carves `slots` slots from the unused part of the buffer.
    ///
    /// Returns `None`, without modifying the chunk, if fewer than `slots` slots remain.
    #[inline]
    pub(crate) fn bump(&mut self, slots: usize) -> Option<NonNull<u8>> {
        if self.remaining() < slots {
            return None;
        }

        // SAFETY: `high_water_mark <= capacity`, so the resulting pointer is either inside the
        // buffer or one past its end.
        let ptr = unsafe { self.base.add(self.high_water_mark) };
        self.high_water_mark += slots;

        debug_assert!(
            self.high_water_mark <= self.capacity,
            "high-water mark exceeds the chunk capacity"
        );

        Some(ptr.cast::<u8>())
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if self.capacity == 0 {
            return;
        }
        // SAFETY: `base` was returned by `alloc` with this exact layout in `new()`.
        unsafe { std::alloc::dealloc(self.base.as_ptr().cast::<u8>(), Self::layout(self.capacity)) }
    }
}
