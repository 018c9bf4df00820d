// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World configuration: chunk sizing, entity id width, and the pluggable
//! allocators backing chunk and layout-metadata memory.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Byte width used to store the entity-id column inside a chunk. Bounds the
/// largest representable entity id (`maxEntityId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityIdByteSize {
    One,
    Two,
    Four,
}

impl EntityIdByteSize {
    pub fn bytes(self) -> usize {
        match self {
            EntityIdByteSize::One => 1,
            EntityIdByteSize::Two => 2,
            EntityIdByteSize::Four => 4,
        }
    }

    /// Largest entity id representable at this width (reserving nothing
    /// beyond the natural range of the byte count).
    pub fn max_entity_id(self) -> u32 {
        match self {
            EntityIdByteSize::One => u8::MAX as u32,
            EntityIdByteSize::Two => u16::MAX as u32,
            EntityIdByteSize::Four => u32::MAX,
        }
    }
}

/// Raw memory source for chunk byte buffers and layout-metadata blocks.
///
/// Swappable the way the teacher's column storage is type-erased: the
/// default is a thin wrapper over the global allocator, but arenas
/// (bump allocators, pooled allocators) can be substituted.
pub trait Allocator: Send + Sync {
    /// # Safety
    /// `layout` must have non-zero size.
    unsafe fn alloc(&self, layout: Layout) -> Option<NonNull<u8>>;
    /// # Safety
    /// `ptr`/`layout` must match a prior `alloc` call on this allocator.
    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Default allocator: the process global allocator (`std::alloc::System`
/// indirectly, via `alloc`/`dealloc`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    unsafe fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(alloc::alloc_zeroed(layout))
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

/// Per-world configuration, set once at construction (§6.3).
#[derive(Clone)]
pub struct WorldConfig {
    /// Byte size of one chunk's raw buffer. Default 16 KiB.
    pub chunk_size_bytes: usize,
    /// Width of the entity-id column within a chunk.
    pub entity_id_byte_size: EntityIdByteSize,
    /// Hint used to pre-size entity/archetype tables.
    pub default_entity_capacity: usize,
    /// Cap on the number of lazily-allocated chunk-manager metadata blocks;
    /// bounds total addressable chunks.
    pub max_meta_blocks: usize,
    /// Allocator backing archetype layout metadata (currently informational;
    /// layouts are small enough to live in the shared metadata table).
    pub layout_allocator: Arc<dyn Allocator>,
    /// Allocator backing chunk byte buffers.
    pub chunk_allocator: Arc<dyn Allocator>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 16 * 1024,
            entity_id_byte_size: EntityIdByteSize::Four,
            default_entity_capacity: 1024,
            max_meta_blocks: 4096,
            layout_allocator: Arc::new(SystemAllocator),
            chunk_allocator: Arc::new(SystemAllocator),
        }
    }
}

impl WorldConfig {
    pub fn with_chunk_size_bytes(mut self, bytes: usize) -> Self {
        self.chunk_size_bytes = bytes;
        self
    }

    pub fn with_entity_id_byte_size(mut self, size: EntityIdByteSize) -> Self {
        self.entity_id_byte_size = size;
        self
    }

    pub fn with_default_entity_capacity(mut self, capacity: usize) -> Self {
        self.default_entity_capacity = capacity;
        self
    }

    pub fn with_max_meta_blocks(mut self, blocks: usize) -> Self {
        self.max_meta_blocks = blocks;
        self
    }

    pub fn with_chunk_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.chunk_allocator = allocator;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = WorldConfig::default();
        assert_eq!(config.chunk_size_bytes, 16 * 1024);
        assert_eq!(config.entity_id_byte_size, EntityIdByteSize::Four);
    }

    #[test]
    fn entity_id_byte_size_bounds() {
        assert_eq!(EntityIdByteSize::One.max_entity_id(), 255);
        assert_eq!(EntityIdByteSize::Two.max_entity_id(), 65535);
        assert_eq!(EntityIdByteSize::Four.max_entity_id(), u32::MAX);
    }
}
