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

//! `World`: entity lifecycle, component get/set/has, structural add/remove,
//! builder-based spawn, and query construction (§4.7).

use std::sync::Arc;

#[cfg(feature = "profiling")]
use tracing::{debug, info_span};

use crate::archetype_registry::ArchetypeRegistry;
use crate::chunk::ChunkManager;
use crate::component::Bundle;
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityLocation, EntityManager};
use crate::error::{EcsError, Result};
use crate::metadata::{ArchetypeId, SharedArchetypeMetadata};
use crate::query::{Query, QueryBuilder};
use crate::registry::{Component, ComponentMask, Registry, Tag};
use crate::tags::{ChunkTagRegistry, TagStorage};

/// Owns one world's entities, their archetypes, and the chunk memory backing
/// them. Multiple worlds may share one [`SharedArchetypeMetadata`] (and thus
/// one archetype-id/layout/edge-cache namespace) while keeping independent
/// entity tables and chunk storage (§6.4).
pub struct World {
    registry: Arc<Registry>,
    shared: SharedArchetypeMetadata,
    archetypes: ArchetypeRegistry,
    entities: EntityManager,
    chunks: ChunkManager,
    tags: ChunkTagRegistry,
    empty_archetype: ArchetypeId,
    config: WorldConfig,
}

impl World {
    /// Build a new world with its own, unshared [`SharedArchetypeMetadata`].
    /// Use [`World::with_shared_metadata`] to join an existing namespace.
    pub fn new(registry: Arc<Registry>, config: WorldConfig) -> Result<Self> {
        let shared = SharedArchetypeMetadata::new(&config);
        Self::with_shared_metadata(registry, shared, config)
    }

    /// Build a world that shares archetype ids/layouts/edges with other
    /// worlds already using `shared`.
    pub fn with_shared_metadata(
        registry: Arc<Registry>,
        shared: SharedArchetypeMetadata,
        config: WorldConfig,
    ) -> Result<Self> {
        let mut archetypes = ArchetypeRegistry::new(config.entity_id_byte_size);
        let empty_archetype = archetypes.get_or_create(ComponentMask::EMPTY, &shared, &registry)?;
        Ok(Self {
            registry,
            shared,
            archetypes,
            entities: EntityManager::new(&config),
            chunks: ChunkManager::new(&config),
            tags: ChunkTagRegistry::new(),
            empty_archetype,
            config,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn shared_metadata(&self) -> &SharedArchetypeMetadata {
        &self.shared
    }

    // ---- Entity lifecycle ---------------------------------------------

    /// Spawn a bare entity into the empty archetype.
    pub fn spawn(&mut self) -> Result<Entity> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.spawn").entered();

        let entity = self.entities.create()?;
        let archetype = self
            .archetypes
            .archetype_mut(self.empty_archetype)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let global_index = archetype.allocate(entity.id(), &self.chunks)?;
        self.entities.set_location(
            entity,
            EntityLocation {
                archetype_id: self.empty_archetype.0,
                global_index: global_index as u32,
            },
        )?;
        Ok(entity)
    }

    /// Spawn an entity carrying every component in `bundle`, placed directly
    /// into the target archetype without passing through the empty one.
    pub fn spawn_with<B: Bundle>(&mut self, bundle: B) -> Result<Entity> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.spawn_with").entered();

        let mask = B::mask();
        let archetype_id = self
            .archetypes
            .get_or_create(mask, &self.shared, &self.registry)?;
        let entity = self.entities.create()?;
        let global_index = self.allocate_and_write(archetype_id, entity.id(), bundle)?;

        self.entities.set_location(
            entity,
            EntityLocation {
                archetype_id: archetype_id.0,
                global_index: global_index as u32,
            },
        )?;
        Ok(entity)
    }

    /// Allocate a fresh row in `archetype_id` for `raw_id` and write
    /// `bundle`'s payload into it. Returns the row's `global_index`.
    fn allocate_and_write<B: Bundle>(&mut self, archetype_id: ArchetypeId, raw_id: u32, bundle: B) -> Result<usize> {
        let archetype = self
            .archetypes
            .archetype_mut(archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let global_index = archetype.allocate(raw_id, &self.chunks)?;
        let layout = self.shared.layout(archetype_id).ok_or(EcsError::ArchetypeNotFound)?;
        let (chunk_index, index_in_chunk) = archetype.get_chunk_location(global_index);
        let handle = archetype.get_chunk(chunk_index).ok_or(EcsError::ArchetypeNotFound)?;
        let chunk_bytes = self.chunks.bytes(handle).expect("just-allocated chunk must resolve");
        // SAFETY: index_in_chunk was just reserved by `allocate` above and is
        // not visible to any other caller yet.
        unsafe {
            bundle.write_into(chunk_bytes, &layout, index_in_chunk);
        }
        Ok(global_index)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Despawn `entity`, swap-removing its row and patching the moved
    /// sibling's location. Returns `false` for an already-dead or invalid
    /// handle rather than erroring (§6.2: `despawn(Entity) -> bool`).
    pub fn despawn(&mut self, entity: Entity) -> Result<bool> {
        if !self.entities.is_alive(entity) {
            return Ok(false);
        }
        let location = self.entities.location(entity)?;
        let archetype_id = ArchetypeId(location.archetype_id);
        self.remove_from_archetype(archetype_id, location.global_index as usize)?;
        self.entities.destroy(entity)?;
        Ok(true)
    }

    /// Swap-remove `global_index` out of `archetype_id` and patch the
    /// location of whichever entity got swapped into its place, if any.
    /// Shared by `despawn`, `add_component`, `remove_component`, and
    /// `overwrite`.
    fn remove_from_archetype(&mut self, archetype_id: ArchetypeId, global_index: usize) -> Result<()> {
        let archetype = self
            .archetypes
            .archetype_mut(archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        if let Some(moved_raw_id) = archetype.remove(global_index, &self.chunks, &mut self.tags)? {
            let moved_entity = self.entities.entity_for_id(moved_raw_id)?;
            self.entities.set_location(
                moved_entity,
                EntityLocation {
                    archetype_id: archetype_id.0,
                    global_index: global_index as u32,
                },
            )?;
        }
        Ok(())
    }

    // ---- Component access -----------------------------------------------

    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool> {
        let location = self.entities.location(entity)?;
        let mask = self
            .shared
            .mask(ArchetypeId(location.archetype_id))
            .ok_or(EcsError::ArchetypeNotFound)?;
        Ok(mask.get(T::ID.index()))
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T> {
        let (bytes, offset) = self.component_slot::<T>(entity)?;
        // SAFETY: offset/size are derived from T's own archetype-layout
        // entry; `bytes` is the chunk holding this entity's row.
        Ok(unsafe { &*(bytes.as_ptr().add(offset) as *const T) })
    }

    /// Mutable component access from a shared `&self`, mirroring
    /// [`crate::chunk::ChunkManager::bytes`]'s own "no borrow tracking"
    /// contract: concurrent callers must not request overlapping mutable
    /// access to the same component column. The scheduler upholds this for
    /// systems (§4.10's conflict analysis guarantees no two systems in one
    /// wave write the same component type); callers outside a scheduled
    /// wave must serialize their own access.
    pub fn get_component_mut<T: Component>(&self, entity: Entity) -> Result<&mut T> {
        let (bytes, offset) = self.component_slot::<T>(entity)?;
        Ok(unsafe { &mut *(bytes.as_mut_ptr().add(offset) as *mut T) })
    }

    fn component_slot<T: Component>(&self, entity: Entity) -> Result<(&mut [u8], usize)> {
        let location = self.entities.location(entity)?;
        if location == EntityLocation::NONE {
            return Err(EcsError::InvalidEntity);
        }
        let archetype_id = ArchetypeId(location.archetype_id);
        let layout = self.shared.layout(archetype_id).ok_or(EcsError::ArchetypeNotFound)?;
        let offset_in_row = layout.base_offset(T::ID).ok_or(EcsError::ComponentNotPresent)?;
        let size = layout.component_size(T::ID).ok_or(EcsError::ComponentNotPresent)?;
        let archetype = self.archetypes.archetype(archetype_id).ok_or(EcsError::ArchetypeNotFound)?;
        let (chunk_index, index_in_chunk) = archetype.get_chunk_location(location.global_index as usize);
        let handle = archetype.get_chunk(chunk_index).ok_or(EcsError::ArchetypeNotFound)?;
        let bytes = self.chunks.bytes(handle).ok_or(EcsError::ArchetypeNotFound)?;
        Ok((bytes, offset_in_row + index_in_chunk * size))
    }

    /// Add `component` to `entity`, moving it to the `+T` archetype via the
    /// cached edge and carrying over every component it already had.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.add_component").entered();

        let location = self.entities.location(entity)?;
        let source_id = ArchetypeId(location.archetype_id);
        let source_mask = self.shared.mask(source_id).ok_or(EcsError::ArchetypeNotFound)?;
        if source_mask.get(T::ID.index()) {
            return Err(EcsError::ComponentAlreadyPresent);
        }

        let target_id = self
            .archetypes
            .get_or_create_with_add(source_id, T::ID, &self.shared, &self.registry)?;
        let new_index = self.move_row(entity, source_id, target_id, location.global_index as usize)?;

        if std::mem::size_of::<T>() > 0 {
            let target_layout = self.shared.layout(target_id).ok_or(EcsError::ArchetypeNotFound)?;
            let archetype = self.archetypes.archetype(target_id).ok_or(EcsError::ArchetypeNotFound)?;
            let (chunk_index, index_in_chunk) = archetype.get_chunk_location(new_index);
            let handle = archetype.get_chunk(chunk_index).ok_or(EcsError::ArchetypeNotFound)?;
            let offset = target_layout
                .offset_of(T::ID, index_in_chunk)
                .expect("target archetype was created by adding T, so T is present");
            let bytes = self.chunks.bytes(handle).expect("just-written chunk must resolve");
            // SAFETY: offset is in-bounds of the chunk and this slot was
            // just reserved by `move_row`.
            unsafe {
                std::ptr::write(bytes.as_mut_ptr().add(offset) as *mut T, component);
            }
        }

        #[cfg(feature = "profiling")]
        debug!(entity_id = entity.id(), "add_component moved entity to a new archetype");
        Ok(())
    }

    /// Remove `T` from `entity`, moving it to the `-T` archetype.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.remove_component").entered();

        let location = self.entities.location(entity)?;
        let source_id = ArchetypeId(location.archetype_id);
        let source_mask = self.shared.mask(source_id).ok_or(EcsError::ArchetypeNotFound)?;
        if !source_mask.get(T::ID.index()) {
            return Err(EcsError::ComponentNotPresent);
        }

        let target_id = self
            .archetypes
            .get_or_create_with_remove(source_id, T::ID, &self.shared, &self.registry)?;
        self.move_row(entity, source_id, target_id, location.global_index as usize)?;
        Ok(())
    }

    /// Discard every component `entity` has and re-place it carrying
    /// `bundle` instead. Id/version are preserved.
    pub fn overwrite<B: Bundle>(&mut self, entity: Entity, bundle: B) -> Result<()> {
        let location = self.entities.location(entity)?;
        let source_id = ArchetypeId(location.archetype_id);
        self.remove_from_archetype(source_id, location.global_index as usize)?;

        let target_mask = B::mask();
        let target_id = self
            .archetypes
            .get_or_create(target_mask, &self.shared, &self.registry)?;
        let global_index = self.allocate_and_write(target_id, entity.id(), bundle)?;

        self.entities.set_location(
            entity,
            EntityLocation {
                archetype_id: target_id.0,
                global_index: global_index as u32,
            },
        )
    }

    /// Move `entity`'s row from `source_id` to `target_id`, copying every
    /// component the two archetypes have in common (the intersection of
    /// their masks, size > 0 only), then swap-remove the vacated source row
    /// and patch every affected location. Returns the row's new
    /// `global_index` in `target_id`.
    fn move_row(
        &mut self,
        entity: Entity,
        source_id: ArchetypeId,
        target_id: ArchetypeId,
        source_index: usize,
    ) -> Result<usize> {
        let source_layout = self.shared.layout(source_id).ok_or(EcsError::ArchetypeNotFound)?;
        let target_layout = self.shared.layout(target_id).ok_or(EcsError::ArchetypeNotFound)?;

        let target_archetype = self
            .archetypes
            .archetype_mut(target_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let target_index = target_archetype.allocate(entity.id(), &self.chunks)?;
        let (target_chunk_idx, target_slot) = target_archetype.get_chunk_location(target_index);
        let target_handle = target_archetype
            .get_chunk(target_chunk_idx)
            .ok_or(EcsError::ArchetypeNotFound)?;

        {
            let source_archetype = self
                .archetypes
                .archetype(source_id)
                .ok_or(EcsError::ArchetypeNotFound)?;
            let (source_chunk_idx, source_slot) = source_archetype.get_chunk_location(source_index);
            let source_handle = source_archetype
                .get_chunk(source_chunk_idx)
                .ok_or(EcsError::ArchetypeNotFound)?;

            for component_id in source_layout.present_component_ids() {
                let Some(dst_base) = target_layout.base_offset(component_id) else {
                    continue;
                };
                let size = source_layout.component_size(component_id).unwrap();
                let src_base = source_layout.base_offset(component_id).unwrap();
                let src = src_base + source_slot * size;
                let dst = dst_base + target_slot * size;

                if source_handle == target_handle {
                    let bytes = self.chunks.bytes(source_handle).expect("live chunk");
                    bytes.copy_within(src..src + size, dst);
                } else {
                    let src_bytes: &[u8] = self.chunks.bytes(source_handle).expect("live chunk");
                    let src_ptr: *const [u8] = src_bytes;
                    let dst_bytes = self.chunks.bytes(target_handle).expect("live chunk");
                    // SAFETY: source_handle != target_handle, so the two
                    // chunk buffers are disjoint; `src_ptr` keeps reading
                    // from the source slice valid after `dst_bytes` borrows
                    // (a different) chunk mutably.
                    let src_bytes: &[u8] = unsafe { &*src_ptr };
                    dst_bytes[dst..dst + size].copy_from_slice(&src_bytes[src..src + size]);
                }
            }
        }

        self.remove_from_archetype(source_id, source_index)?;

        self.entities.set_location(
            entity,
            EntityLocation {
                archetype_id: target_id.0,
                global_index: target_index as u32,
            },
        )?;
        Ok(target_index)
    }

    // ---- Tags (§4.9) ------------------------------------------------------

    fn entity_chunk_handle(&self, entity: Entity) -> Result<crate::chunk::ChunkHandle> {
        let location = self.entities.location(entity)?;
        let archetype_id = ArchetypeId(location.archetype_id);
        let archetype = self.archetypes.archetype(archetype_id).ok_or(EcsError::ArchetypeNotFound)?;
        let (chunk_index, _) = archetype.get_chunk_location(location.global_index as usize);
        archetype.get_chunk(chunk_index).ok_or(EcsError::ArchetypeNotFound)
    }

    /// Set tag `T` on `entity`, adding the `S` tag-storage component with its
    /// default value first if `entity` doesn't carry one yet. O(1): never
    /// moves the entity to a different archetype.
    pub fn set_tag<S: TagStorage + Default, T: Tag>(&mut self, entity: Entity) -> Result<()> {
        if !self.has_component::<S>(entity)? {
            self.add_component(entity, S::default())?;
        }
        let mask = {
            let storage = self.get_component_mut::<S>(entity)?;
            *storage.tag_mask_mut() = storage.tag_mask().with(T::ID.index());
            storage.tag_mask()
        };
        let handle = self.entity_chunk_handle(entity)?;
        self.tags.mark(handle, mask);
        Ok(())
    }

    /// Clear tag `T` on `entity`. The chunk-level union is left as-is (it
    /// over-approximates after a clear; tagged queries still filter exactly
    /// per-entity).
    pub fn clear_tag<S: TagStorage, T: Tag>(&self, entity: Entity) -> Result<()> {
        let storage = self.get_component_mut::<S>(entity)?;
        *storage.tag_mask_mut() = storage.tag_mask().without(T::ID.index());
        Ok(())
    }

    pub fn has_tag<S: TagStorage, T: Tag>(&self, entity: Entity) -> Result<bool> {
        if !self.has_component::<S>(entity)? {
            return Ok(false);
        }
        Ok(self.get_component::<S>(entity)?.tag_mask().get(T::ID.index()))
    }

    pub(crate) fn tag_registry(&self) -> &ChunkTagRegistry {
        &self.tags
    }

    // ---- Queries / archetype access --------------------------------------

    /// Start a fluent query builder; finish it with
    /// [`QueryBuilder::build`]`(&mut world)`.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Resolve (or seed) the local matched-archetype list for the query
    /// shape `(all, none, any)`, materializing it in this world's registry
    /// if this is the first time it's been asked for here.
    pub(crate) fn resolve_query(&mut self, all: ComponentMask, none: ComponentMask, any: ComponentMask) -> Result<Vec<ArchetypeId>> {
        let description = crate::metadata::QueryDescription { all, none, any };
        let query_id = self.archetypes.get_or_create_query(description, &self.shared)?;
        Ok(self.archetypes.local_query_archetypes(query_id).to_vec())
    }

    pub(crate) fn archetype_registry(&self) -> &ArchetypeRegistry {
        &self.archetypes
    }

    pub(crate) fn shared(&self) -> &SharedArchetypeMetadata {
        &self.shared
    }

    pub(crate) fn chunk_manager(&self) -> &ChunkManager {
        &self.chunks
    }

    pub(crate) fn entities(&self) -> &EntityManager {
        &self.entities
    }

    pub fn archetype_count(&self) -> usize {
        self.shared.archetype_count()
    }

    /// Frees all chunks, resets the entity manager, and re-creates the empty
    /// archetype (§4.7 `clear`). Note: this world's [`SharedArchetypeMetadata`]
    /// (and thus its archetype ids/layouts) is untouched, since other worlds
    /// may still be using it.
    pub fn clear(&mut self) -> Result<()> {
        self.archetypes = ArchetypeRegistry::new(self.config.entity_id_byte_size);
        self.chunks = ChunkManager::new(&self.config);
        self.entities = EntityManager::new(&self.config);
        self.empty_archetype =
            self.archetypes
                .get_or_create(ComponentMask::EMPTY, &self.shared, &self.registry)?;
        Ok(())
    }
}
