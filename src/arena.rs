// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::chunk::slots_for;
use crate::chunk::Chunk;
use crate::chunk::SLOT_SIZE;
use crate::usage::Usage;
use std::ptr::NonNull;

/// Size in bytes of the chunks appended when the arena runs out of space.
pub(crate) const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// [`DEFAULT_CHUNK_SIZE`] expressed in slots.
pub(crate) const DEFAULT_CHUNK_SLOTS: usize = DEFAULT_CHUNK_SIZE / SLOT_SIZE;

/// Append-only sequence of chunks.
///
/// Allocations are always served from the last chunk (the "current" chunk). When the current
/// chunk cannot fit a request, a new chunk is appended and becomes current; whatever was left in
/// the previous chunk is never used again. Chunks are only released when the arena is dropped.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    chunks: Vec<Chunk>,
}

impl Arena {
    #[inline]
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    #[inline]
    #[must_use]
    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Appends a chunk large enough to hold exactly `bytes` bytes (rounded up to whole slots) and
    /// makes it current.
    pub(crate) fn reserve(&mut self, bytes: usize) {
        self.push(slots_for(bytes));
    }

    /// Appends a chunk large enough to hold `bytes` bytes, and no smaller than
    /// [`DEFAULT_CHUNK_SIZE`], and makes it current.
    pub(crate) fn expand(&mut self, bytes: usize) {
        self.push(slots_for(bytes).max(DEFAULT_CHUNK_SLOTS));
    }

    fn push(&mut self, slots: usize) {
        self.chunks.push(Chunk::new(slots));
    }

    /// Carves `bytes` bytes out of the current chunk.
    ///
    /// If the current chunk is missing or too small, a new chunk is appended when `allow_expand`
    /// is true, otherwise `None` is returned and the arena is left untouched.
    pub(crate) fn allocate(&mut self, bytes: usize, allow_expand: bool) -> Option<NonNull<u8>> {
        let slots = slots_for(bytes);

        let fits = self
            .chunks
            .last()
            .is_some_and(|chunk| chunk.remaining() >= slots);

        if !fits {
            if !allow_expand {
                return None;
            }
            self.expand(bytes);
        }

        let ptr = self.chunks.last_mut()?.bump(slots);
        debug_assert!(ptr.is_some(), "freshly expanded chunk cannot fit the request");
        ptr
    }

    #[must_use]
    pub(crate) fn usage(&self) -> Usage {
        Usage::get(&self.chunks)
    }
}
