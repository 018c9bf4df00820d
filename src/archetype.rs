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

//! Per-world archetype storage: a growable list of fixed-size chunks
//! holding one component mask's rows in Structure-of-Arrays layout (§4.3).

use std::sync::Arc;

use crate::chunk::{ChunkHandle, ChunkManager};
use crate::config::EntityIdByteSize;
use crate::layout::ArchetypeLayout;
use crate::tags::ChunkTagRegistry;

/// Raw entity id (the `id` half of an [`crate::entity::Entity`]) as stored
/// in a chunk's entity-id column. Versions are not stored in chunk bytes;
/// [`crate::entity::EntityManager`] is the source of truth for them.
pub type RawEntityId = u32;

pub(crate) fn write_raw_id(bytes: &mut [u8], offset: usize, width: EntityIdByteSize, id: RawEntityId) {
    match width {
        EntityIdByteSize::One => bytes[offset] = id as u8,
        EntityIdByteSize::Two => bytes[offset..offset + 2].copy_from_slice(&(id as u16).to_le_bytes()),
        EntityIdByteSize::Four => bytes[offset..offset + 4].copy_from_slice(&id.to_le_bytes()),
    }
}

pub(crate) fn read_raw_id(bytes: &[u8], offset: usize, width: EntityIdByteSize) -> RawEntityId {
    match width {
        EntityIdByteSize::One => bytes[offset] as RawEntityId,
        EntityIdByteSize::Two => {
            u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap()) as RawEntityId
        }
        EntityIdByteSize::Four => u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()),
    }
}

/// One archetype's chunk list and row count, local to a single [`crate::world::World`].
pub struct Archetype {
    layout: Arc<ArchetypeLayout>,
    entity_id_width: EntityIdByteSize,
    chunks: Vec<ChunkHandle>,
    entity_count: usize,
}

impl Archetype {
    pub fn new(layout: Arc<ArchetypeLayout>, entity_id_width: EntityIdByteSize) -> Self {
        Self {
            layout,
            entity_id_width,
            chunks: Vec::new(),
            entity_count: 0,
        }
    }

    pub fn layout(&self) -> &ArchetypeLayout {
        &self.layout
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn get_chunk(&self, chunk_index: usize) -> Option<ChunkHandle> {
        self.chunks.get(chunk_index).copied()
    }

    pub fn chunks(&self) -> &[ChunkHandle] {
        &self.chunks
    }

    /// Split `global_index` into `(chunk_index, index_in_chunk)`.
    pub fn get_chunk_location(&self, global_index: usize) -> (usize, usize) {
        let per_chunk = self.layout.entities_per_chunk();
        (global_index / per_chunk, global_index % per_chunk)
    }

    /// Allocate the next row, requesting a new chunk from `chunk_manager` if
    /// the last one is full (or none exist yet). Writes `entity_id` into the
    /// entity-id column of the new slot. Returns the row's `global_index`.
    pub fn allocate(
        &mut self,
        entity_id: RawEntityId,
        chunk_manager: &ChunkManager,
    ) -> crate::error::Result<usize> {
        let per_chunk = self.layout.entities_per_chunk();
        let global_index = self.entity_count;
        let (chunk_index, index_in_chunk) = (global_index / per_chunk, global_index % per_chunk);

        if chunk_index == self.chunks.len() {
            self.chunks.push(chunk_manager.allocate()?);
        }
        let handle = self.chunks[chunk_index];
        let bytes = chunk_manager
            .bytes(handle)
            .expect("just-allocated or live chunk handle must resolve");
        let offset = self.layout.entity_id_offset(index_in_chunk);
        write_raw_id(bytes, offset, self.entity_id_width, entity_id);

        self.entity_count += 1;
        Ok(global_index)
    }

    /// Swap-remove `global_index` with the last row, copying the entity-id
    /// bytes and every present component column. Frees any now-empty
    /// trailing chunks, forgetting their tag union so `tags` doesn't grow a
    /// permanently stale entry once the handle's id is recycled under a new
    /// version. Returns the raw id of the entity that was moved into
    /// `global_index`, or `None` if the removed row was the last one.
    pub fn remove(
        &mut self,
        global_index: usize,
        chunk_manager: &ChunkManager,
        tags: &mut ChunkTagRegistry,
    ) -> crate::error::Result<Option<RawEntityId>> {
        debug_assert!(global_index < self.entity_count);
        let last_index = self.entity_count - 1;

        let moved = if global_index != last_index {
            let per_chunk = self.layout.entities_per_chunk();
            let (dst_chunk_idx, dst_slot) = (global_index / per_chunk, global_index % per_chunk);
            let (src_chunk_idx, src_slot) = (last_index / per_chunk, last_index % per_chunk);

            let dst_handle = self.chunks[dst_chunk_idx];
            let src_handle = self.chunks[src_chunk_idx];

            let moved_id = if dst_handle == src_handle {
                let bytes = chunk_manager.bytes(dst_handle).expect("live chunk");
                copy_row_within(bytes, &self.layout, self.entity_id_width, src_slot, dst_slot)
            } else {
                // Two distinct chunk buffers: take both mutable borrows up
                // front (they never alias, since the handles differ) and
                // copy the row's bytes across.
                let src_bytes: &mut [u8] = chunk_manager.bytes(src_handle).expect("live chunk");
                let src_ptr: *mut [u8] = src_bytes;
                let dst_bytes = chunk_manager.bytes(dst_handle).expect("live chunk");
                // SAFETY: src_handle != dst_handle, so src_ptr and dst_bytes
                // reference disjoint chunk buffers.
                let src_bytes: &[u8] = unsafe { &*src_ptr };
                copy_row_across(
                    src_bytes,
                    dst_bytes,
                    &self.layout,
                    self.entity_id_width,
                    src_slot,
                    dst_slot,
                )
            };
            Some(moved_id)
        } else {
            None
        };

        self.entity_count -= 1;

        // Free any now-empty trailing chunks (invariant: last chunk always
        // holds >= 1 entity, or the archetype is empty).
        let per_chunk = self.layout.entities_per_chunk();
        let chunks_needed = self.entity_count.div_ceil(per_chunk).max(if self.entity_count == 0 { 0 } else { 1 });
        while self.chunks.len() > chunks_needed {
            if let Some(handle) = self.chunks.pop() {
                chunk_manager.free(handle)?;
                tags.forget(handle);
            }
        }

        Ok(moved)
    }
}

fn copy_row_within(
    bytes: &mut [u8],
    layout: &ArchetypeLayout,
    width: EntityIdByteSize,
    src_slot: usize,
    dst_slot: usize,
) -> RawEntityId {
    let src_id_off = layout.entity_id_offset(src_slot);
    let moved_id = read_raw_id(bytes, src_id_off, width);
    let dst_id_off = layout.entity_id_offset(dst_slot);
    write_raw_id(bytes, dst_id_off, width, moved_id);

    for id in layout.present_component_ids() {
        let size = layout.component_size(id).unwrap();
        let base = layout.base_offset(id).unwrap();
        let src = base + src_slot * size;
        let dst = base + dst_slot * size;
        bytes.copy_within(src..src + size, dst);
    }
    moved_id
}

fn copy_row_across(
    src_bytes: &[u8],
    dst_bytes: &mut [u8],
    layout: &ArchetypeLayout,
    width: EntityIdByteSize,
    src_slot: usize,
    dst_slot: usize,
) -> RawEntityId {
    let src_id_off = layout.entity_id_offset(src_slot);
    let moved_id = read_raw_id(src_bytes, src_id_off, width);
    let dst_id_off = layout.entity_id_offset(dst_slot);
    write_raw_id(dst_bytes, dst_id_off, width, moved_id);

    for id in layout.present_component_ids() {
        let size = layout.component_size(id).unwrap();
        let base = layout.base_offset(id).unwrap();
        let src = base + src_slot * size;
        let dst = base + dst_slot * size;
        dst_bytes[dst..dst + size].copy_from_slice(&src_bytes[src..src + size]);
    }
    moved_id
}
