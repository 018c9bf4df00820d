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

//! Per-archetype chunk layout: how many entities fit in one chunk and where
//! each component's column starts (§4.2).

use crate::config::EntityIdByteSize;
use crate::error::{EcsError, Result};
use crate::registry::{ComponentId, ComponentMask, Registry};

const NO_OFFSET: u32 = u32::MAX;

/// Column layout for one archetype's chunks.
///
/// `base_offsets[i]` is the byte offset of component id `lo + i`'s column,
/// or [`NO_OFFSET`] if `lo + i` isn't part of this archetype's mask.
#[derive(Debug, Clone)]
pub struct ArchetypeLayout {
    lo: u16,
    base_offsets: Vec<u32>,
    sizes: Vec<u32>,
    entity_id_size: u32,
    entities_per_chunk: usize,
}

impl ArchetypeLayout {
    /// Build the layout for `mask` against `registry`'s component info,
    /// targeting chunks of `chunk_size_bytes` bytes.
    pub fn build(
        mask: &ComponentMask,
        registry: &Registry,
        chunk_size_bytes: usize,
        entity_id_byte_size: EntityIdByteSize,
    ) -> Result<Self> {
        let entity_id_size = entity_id_byte_size.bytes() as u32;

        let Some(lo) = mask.first_set() else {
            // Empty mask: entity-id-only chunks.
            let entities_per_chunk =
                (chunk_size_bytes / entity_id_size.max(1) as usize).max(1);
            return Ok(Self {
                lo: 0,
                base_offsets: Vec::new(),
                sizes: Vec::new(),
                entity_id_size,
                entities_per_chunk,
            });
        };
        let hi = mask.last_set().unwrap();

        let mut sizes = vec![0u32; hi - lo + 1];
        let mut aligns = vec![1u32; hi - lo + 1];
        let mut total_size: u64 = entity_id_size as u64;
        for id in lo..=hi {
            if mask.get(id) {
                let info = registry
                    .component_info(ComponentId(id as u16))
                    .ok_or_else(|| EcsError::UnknownId(format!("component id {id}")))?;
                sizes[id - lo] = info.size;
                aligns[id - lo] = info.align.max(1);
                total_size += info.size as u64;
            }
        }

        let mut entities_per_chunk = ((chunk_size_bytes as u64) / total_size.max(1)).max(1) as usize;

        loop {
            let mut offset = entities_per_chunk as u64 * entity_id_size as u64;
            let mut base_offsets = vec![NO_OFFSET; hi - lo + 1];
            let mut fits = true;

            for id in lo..=hi {
                if !mask.get(id) {
                    continue;
                }
                let idx = id - lo;
                if sizes[idx] == 0 {
                    // Zero-size (tag-style) component: no column bytes, but
                    // still occupies a base offset slot for uniform lookup.
                    base_offsets[idx] = offset as u32;
                    continue;
                }
                let align = aligns[idx] as u64;
                offset = (offset + align - 1) / align * align;
                base_offsets[idx] = offset as u32;
                offset += sizes[idx] as u64 * entities_per_chunk as u64;

                if offset > chunk_size_bytes as u64 {
                    fits = false;
                    break;
                }
            }

            if fits && offset <= chunk_size_bytes as u64 {
                return Ok(Self {
                    lo: lo as u16,
                    base_offsets,
                    sizes,
                    entity_id_size,
                    entities_per_chunk,
                });
            }

            if entities_per_chunk == 1 {
                return Err(EcsError::ChunkTooSmall);
            }
            entities_per_chunk -= 1;
        }
    }

    pub fn entities_per_chunk(&self) -> usize {
        self.entities_per_chunk
    }

    pub fn entity_id_offset(&self, index_in_chunk: usize) -> usize {
        index_in_chunk * self.entity_id_size as usize
    }

    pub fn entity_id_size(&self) -> usize {
        self.entity_id_size as usize
    }

    /// Byte offset where `id`'s column starts, or `None` if `id` isn't part
    /// of this archetype's mask.
    pub fn base_offset(&self, id: ComponentId) -> Option<usize> {
        let idx = (id.0 as usize).checked_sub(self.lo as usize)?;
        let offset = *self.base_offsets.get(idx)?;
        (offset != NO_OFFSET).then_some(offset as usize)
    }

    pub fn component_size(&self, id: ComponentId) -> Option<usize> {
        let idx = (id.0 as usize).checked_sub(self.lo as usize)?;
        self.sizes.get(idx).map(|&s| s as usize)
    }

    /// `offsetOf(id, indexInChunk)`: absolute byte offset of one component
    /// slot within a chunk.
    pub fn offset_of(&self, id: ComponentId, index_in_chunk: usize) -> Option<usize> {
        let base = self.base_offset(id)?;
        let size = self.component_size(id)?;
        Some(base + index_in_chunk * size)
    }

    /// Component ids present in this mask that occupy real column bytes
    /// (zero-size tag-style components are excluded, since there is
    /// nothing to copy for them on a row move).
    pub fn present_component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        let lo = self.lo as usize;
        self.sizes
            .iter()
            .enumerate()
            .filter(|(_, &size)| size > 0)
            .map(move |(idx, _)| ComponentId((lo + idx) as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Component, Tag};
    use crate::{declare_component, declare_tag};

    #[repr(C)]
    struct Position {
        #[allow(dead_code)]
        x: f32,
        #[allow(dead_code)]
        y: f32,
    }
    declare_component!(Position, 0);

    struct Health(#[allow(dead_code)] u32);
    declare_component!(Health, 1);

    struct Dead;
    declare_tag!(Dead, 0);
    impl Component for Dead {
        const ID: ComponentId = ComponentId(2);
    }

    fn registry() -> Registry {
        Registry::builder()
            .register_component::<Position>(1)
            .register_component::<Health>(2)
            .register_component::<Dead>(3)
            .build()
    }

    #[test]
    fn empty_mask_is_entity_id_only() {
        let registry = registry();
        let layout = ArchetypeLayout::build(
            &ComponentMask::EMPTY,
            &registry,
            1024,
            EntityIdByteSize::Four,
        )
        .unwrap();
        assert_eq!(layout.entity_id_size(), 4);
        assert!(layout.entities_per_chunk() > 0);
    }

    #[test]
    fn columns_are_aligned_and_non_overlapping() {
        let registry = registry();
        let mask = ComponentMask::EMPTY.with(0).with(1);
        let layout = ArchetypeLayout::build(&mask, &registry, 1024, EntityIdByteSize::Four).unwrap();

        let pos_off = layout.base_offset(ComponentId(0)).unwrap();
        let health_off = layout.base_offset(ComponentId(1)).unwrap();
        assert_eq!(pos_off % 4, 0);
        assert!(health_off >= pos_off + 8 * layout.entities_per_chunk());
    }

    #[test]
    fn zero_sized_component_gets_no_column_bytes_but_has_an_offset() {
        let registry = registry();
        let mask = ComponentMask::EMPTY.with(2);
        let layout = ArchetypeLayout::build(&mask, &registry, 1024, EntityIdByteSize::Four).unwrap();
        assert!(layout.base_offset(ComponentId(2)).is_some());
        assert_eq!(layout.component_size(ComponentId(2)), Some(0));
    }

    #[test]
    fn chunk_too_small_for_even_one_entity_is_an_error() {
        let registry = registry();
        let mask = ComponentMask::EMPTY.with(0).with(1);
        let result = ArchetypeLayout::build(&mask, &registry, 4, EntityIdByteSize::Four);
        assert!(matches!(result, Err(EcsError::ChunkTooSmall)));
    }
}
