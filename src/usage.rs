// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::chunk::Chunk;
use crate::chunk::SLOT_SIZE;

/// Memory usage information.
///
/// This structure is returned by [`MemoryPool::usage`](crate::MemoryPool::usage). See that method
/// documentation for information and examples.
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct Usage {
    /// Number of chunks acquired by the pool.
    pub chunks: usize,
    /// Total memory acquired by the pool, across all chunks.
    pub reserved: usize,
    /// Memory handed out to callers, including the padding needed to round every request up to a
    /// multiple of 8 bytes.
    pub used: usize,
    /// Memory left unused at the end of chunks that no longer accept allocations.
    ///
    /// When a request does not fit in the current chunk, the pool moves on to a new chunk and
    /// the space left in the old one is never handed out. `reserved - used - forfeited` is the
    /// memory still available in the current chunk.
    pub forfeited: usize,
}

impl Usage {
    pub(crate) fn get(chunks: &[Chunk]) -> Self {
        let mut usage = Self {
            chunks: chunks.len(),
            ..Self::default()
        };

        for (index, chunk) in chunks.iter().enumerate() {
            usage.reserved += chunk.capacity() * SLOT_SIZE;
            usage.used += chunk.high_water_mark() * SLOT_SIZE;
            if index + 1 < chunks.len() {
                usage.forfeited += chunk.remaining() * SLOT_SIZE;
            }
        }

        usage
    }

    /// Memory that can still be handed out without acquiring a new chunk.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        self.reserved - self.used - self.forfeited
    }
}
