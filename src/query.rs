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

//! Fluent query builder and the live, cached view it produces (§4.8).
//!
//! A [`QueryBuilder`] only accumulates an `(all, none, any)` mask triple (plus
//! an optional tag requirement); it has no archetype knowledge of its own.
//! [`QueryBuilder::build`] hands that shape to [`World::resolve_query`], which
//! seeds or looks up this world's local matched-archetype list, then wraps it
//! in a [`Query`] borrowing the world for the rest of its lifetime.

use std::sync::Arc;

use crate::archetype::read_raw_id;
use crate::entity::Entity;
use crate::error::Result;
use crate::layout::ArchetypeLayout;
use crate::metadata::ArchetypeId;
use crate::registry::{Component, ComponentMask, Tag};
use crate::tags::{EntityTags, TagMask};
use crate::world::World;

/// Accumulates a query shape; terminated with [`QueryBuilder::build`].
#[derive(Default, Clone, Copy)]
pub struct QueryBuilder {
    all: ComponentMask,
    none: ComponentMask,
    any: ComponentMask,
    required_tags: Option<TagMask>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`.
    pub fn with<T: Component>(mut self) -> Self {
        self.all = self.all.with(T::ID.index());
        self
    }

    /// Exclude archetypes carrying `T`.
    pub fn without<T: Component>(mut self) -> Self {
        self.none = self.none.with(T::ID.index());
        self
    }

    /// Require at least one component from the set of `any` clauses seen so
    /// far (an empty `any` mask, the default, matches everything).
    pub fn with_any<T: Component>(mut self) -> Self {
        self.any = self.any.with(T::ID.index());
        self
    }

    /// Require tag `T` on [`EntityTags`] (§4.9). Implicitly requires
    /// `EntityTags` as a present component.
    pub fn with_tag<T: Tag>(mut self) -> Self {
        self.all = self.all.with(EntityTags::ID.index());
        let mask = self.required_tags.unwrap_or(TagMask::EMPTY);
        self.required_tags = Some(mask.with(T::ID.index()));
        self
    }

    /// Resolve this shape against `world`, seeding its local matched-archetype
    /// list if this is the first time it's been asked for here, and return
    /// the resulting live [`Query`].
    pub fn build(self, world: &mut World) -> Result<Query<'_>> {
        let matched = world.resolve_query(self.all, self.none, self.any)?;
        Ok(Query {
            world,
            matched,
            required_tags: self.required_tags,
        })
    }
}

/// A live view over every archetype currently matching a query shape.
///
/// Holds only a shared `&World`: building the matched-archetype list needs
/// `&mut World` (see [`QueryBuilder::build`]), but once built, iterating it —
/// including writing through [`ChunkView::column_mut`] — only needs shared
/// access, mirroring [`World::get_component_mut`]'s contract. That's what
/// lets a `System::run(&self, world: &World)` build and iterate queries
/// without taking `world` mutably.
pub struct Query<'w> {
    world: &'w World,
    matched: Vec<ArchetypeId>,
    required_tags: Option<TagMask>,
}

impl<'w> Query<'w> {
    /// Number of archetypes in the matched list (irrespective of tag
    /// filtering, which happens at the entity level).
    pub fn archetype_count(&self) -> usize {
        self.matched.len()
    }

    /// Number of entities this query yields. Exact, including per-entity tag
    /// filtering when a tag requirement is present.
    pub fn entity_count(&self) -> usize {
        match self.required_tags {
            Some(_) => self.entities().count(),
            None => self.chunks().map(|view| view.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// Chunk-granularity iteration (§4.8): one [`ChunkView`] per live chunk
    /// across every matched archetype, pruned by [`crate::tags::ChunkTagRegistry`]
    /// union when a tag requirement is set.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkView<'w>> + '_ {
        self.matched
            .iter()
            .flat_map(move |&archetype_id| self.archetype_chunk_views(archetype_id))
    }

    fn archetype_chunk_views(&self, archetype_id: ArchetypeId) -> std::vec::IntoIter<ChunkView<'w>> {
        let world = self.world;
        let mut views = Vec::new();

        let (Some(layout), Some(archetype)) = (
            world.shared().layout(archetype_id),
            world.archetype_registry().archetype(archetype_id),
        ) else {
            return views.into_iter();
        };

        let per_chunk = layout.entities_per_chunk();
        let entity_count = archetype.entity_count();

        for (chunk_index, &handle) in archetype.chunks().iter().enumerate() {
            if let Some(required) = self.required_tags {
                if !world.tag_registry().union(handle).contains_all(&required) {
                    continue;
                }
            }
            let start = chunk_index * per_chunk;
            let len = entity_count.saturating_sub(start).min(per_chunk);
            if len == 0 {
                continue;
            }
            views.push(ChunkView {
                world,
                layout: Arc::clone(&layout),
                handle,
                len,
            });
        }
        views.into_iter()
    }

    /// Entity-granularity iteration (§4.8). Chunks are pruned by tag union
    /// first; surviving entities are then filtered exactly against the
    /// required tag mask (the union can over-approximate after a clear, see
    /// [`crate::tags::ChunkTagRegistry`]).
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        let world = self.world;
        let required = self.required_tags;
        self.chunks().flat_map(move |view| {
            view.entities().into_iter().filter(move |&entity| match required {
                None => true,
                Some(required) => world
                    .get_component::<EntityTags>(entity)
                    .map(|tags| tags.0.contains_all(&required))
                    .unwrap_or(false),
            })
        })
    }

    /// Closure-based entry point alongside the iterator API (§B): `f` is
    /// handed the world (for component access) and each matching entity.
    pub fn for_each<F: FnMut(&World, Entity)>(&self, mut f: F) {
        for entity in self.entities() {
            f(self.world, entity);
        }
    }

    /// Same as [`Self::for_each`]; kept as a distinct name for call sites
    /// that mutate components through the closure, even though `World`'s
    /// interior-mutability contract (see [`World::get_component_mut`]) makes
    /// no technical difference between the two.
    pub fn for_each_mut<F: FnMut(&World, Entity)>(&self, mut f: F) {
        for entity in self.entities() {
            f(self.world, entity);
        }
    }
}

/// One chunk's worth of a query's matched rows: a stable row count plus
/// column-span accessors sized to it (§4.8).
pub struct ChunkView<'w> {
    world: &'w World,
    layout: Arc<ArchetypeLayout>,
    handle: crate::chunk::ChunkHandle,
    len: usize,
}

impl<'w> ChunkView<'w> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only column span for `T`, sized to [`Self::len`]. `None` if `T`
    /// isn't part of this chunk's archetype.
    pub fn column<T: Component>(&self) -> Option<&'w [T]> {
        let base = self.layout.base_offset(T::ID)?;
        let bytes = self.world.chunk_manager().bytes(self.handle)?;
        // SAFETY: `base` comes from this chunk's own `ArchetypeLayout` for
        // `T`, and `len` is this chunk's live row count.
        Some(unsafe { std::slice::from_raw_parts(bytes.as_ptr().add(base) as *const T, self.len) })
    }

    /// Mutable column span for `T`. Carries the same "no borrow tracking"
    /// contract as [`World::get_component_mut`]: callers must not request
    /// overlapping mutable access to the same column concurrently.
    pub fn column_mut<T: Component>(&self) -> Option<&'w mut [T]> {
        let base = self.layout.base_offset(T::ID)?;
        let bytes = self.world.chunk_manager().bytes(self.handle)?;
        Some(unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr().add(base) as *mut T, self.len) })
    }

    /// The live entities backing this chunk's rows, in slot order.
    pub fn entities(&self) -> Vec<Entity> {
        let width = self.world.config().entity_id_byte_size;
        let Some(bytes) = self.world.chunk_manager().bytes(self.handle) else {
            return Vec::new();
        };
        (0..self.len)
            .map(|slot| {
                let offset = self.layout.entity_id_offset(slot);
                let raw_id = read_raw_id(bytes, offset, width);
                self.world
                    .entities()
                    .entity_for_id(raw_id)
                    .expect("a live chunk row's raw id must resolve to a live entity")
            })
            .collect()
    }
}
