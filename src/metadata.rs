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

//! Process-wide archetype/query metadata, shareable across multiple
//! [`crate::world::World`] instances (§4.4).
//!
//! Everything here is keyed by dense ids assigned in creation order and
//! mutated only outside parallel wave execution; readers take the lock for
//! the duration of one lookup, never across a wave.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::{EntityIdByteSize, WorldConfig};
use crate::error::{EcsError, Result};
use crate::layout::ArchetypeLayout;
use crate::registry::{ComponentId, ComponentMask, Registry};

/// Dense, process-wide archetype identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub u32);

/// Dense, process-wide query identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryId(pub u32);

/// `(all, none, any)` component-mask triple identifying one query shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescription {
    pub all: ComponentMask,
    pub none: ComponentMask,
    pub any: ComponentMask,
}

impl QueryDescription {
    pub fn matches(&self, mask: &ComponentMask) -> bool {
        if !mask.contains_all(&self.all) {
            return false;
        }
        if !mask.is_disjoint(&self.none) {
            return false;
        }
        if !self.any.is_empty() && mask.intersect(&self.any).is_empty() {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeOp {
    Add(ComponentId),
    Remove(ComponentId),
}

struct Inner {
    mask_to_id: FxHashMap<ComponentMask, ArchetypeId>,
    masks: Vec<ComponentMask>,
    layouts: Vec<Arc<ArchetypeLayout>>,
    edges: FxHashMap<(ArchetypeId, EdgeOp), ArchetypeId>,
    description_to_id: FxHashMap<QueryDescription, QueryId>,
    queries: Vec<(QueryDescription, Vec<ArchetypeId>)>,
    chunk_size_bytes: usize,
    entity_id_byte_size: EntityIdByteSize,
    max_archetypes: usize,
    max_queries: usize,
}

/// Shared, lock-guarded archetype/query tables. Clone cheaply (it's an
/// `Arc` internally) to hand the same tables to several `World`s.
#[derive(Clone)]
pub struct SharedArchetypeMetadata {
    inner: Arc<RwLock<Inner>>,
}

/// Ids newly matched against an existing query as a side effect of
/// creating an archetype, so a world-local registry can append the new
/// archetype to its local query cache lists.
pub struct NewArchetype {
    pub id: ArchetypeId,
    pub newly_matched_queries: Vec<QueryId>,
}

impl SharedArchetypeMetadata {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                mask_to_id: FxHashMap::default(),
                masks: Vec::new(),
                layouts: Vec::new(),
                edges: FxHashMap::default(),
                description_to_id: FxHashMap::default(),
                queries: Vec::new(),
                chunk_size_bytes: config.chunk_size_bytes,
                entity_id_byte_size: config.entity_id_byte_size,
                max_archetypes: u32::MAX as usize,
                max_queries: u32::MAX as usize,
            })),
        }
    }

    pub fn layout(&self, id: ArchetypeId) -> Option<Arc<ArchetypeLayout>> {
        self.inner.read().layouts.get(id.0 as usize).cloned()
    }

    pub fn mask(&self, id: ArchetypeId) -> Option<ComponentMask> {
        self.inner.read().masks.get(id.0 as usize).copied()
    }

    /// `GetOrCreate(mask) -> id`. On first creation, also reports the ids
    /// of existing queries this new archetype newly matches.
    pub fn get_or_create(&self, mask: ComponentMask, registry: &Registry) -> Result<NewArchetype> {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.mask_to_id.get(&mask) {
                return Ok(NewArchetype {
                    id,
                    newly_matched_queries: Vec::new(),
                });
            }
        }

        let mut inner = self.inner.write();
        // Re-check under the write lock: another thread may have created it
        // while we waited (only relevant if callers ever race this call;
        // the scheduler otherwise keeps it outside parallel waves).
        if let Some(&id) = inner.mask_to_id.get(&mask) {
            return Ok(NewArchetype {
                id,
                newly_matched_queries: Vec::new(),
            });
        }

        if inner.masks.len() >= inner.max_archetypes {
            return Err(EcsError::ArchetypeIdOverflow);
        }

        let layout = Arc::new(ArchetypeLayout::build(
            &mask,
            registry,
            inner.chunk_size_bytes,
            inner.entity_id_byte_size,
        )?);

        let id = ArchetypeId(inner.masks.len() as u32);
        inner.masks.push(mask);
        inner.layouts.push(layout);
        inner.mask_to_id.insert(mask, id);

        let mut newly_matched_queries = Vec::new();
        for (query_id, (description, matched)) in inner.queries.iter_mut().enumerate() {
            if description.matches(&mask) {
                matched.push(id);
                newly_matched_queries.push(QueryId(query_id as u32));
            }
        }

        Ok(NewArchetype {
            id,
            newly_matched_queries,
        })
    }

    /// `GetOrCreateWithAdd(source, c)`: follow (or populate) the cached
    /// `+c` edge from `source`.
    pub fn get_or_create_with_add(
        &self,
        source: ArchetypeId,
        component: ComponentId,
        registry: &Registry,
    ) -> Result<NewArchetype> {
        if let Some(&target) = self.inner.read().edges.get(&(source, EdgeOp::Add(component))) {
            return Ok(NewArchetype {
                id: target,
                newly_matched_queries: Vec::new(),
            });
        }

        let source_mask = self
            .mask(source)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let target_mask = source_mask.with(component.index());
        let result = self.get_or_create(target_mask, registry)?;

        let mut inner = self.inner.write();
        inner.edges.insert((source, EdgeOp::Add(component)), result.id);
        inner.edges.insert((result.id, EdgeOp::Remove(component)), source);
        Ok(result)
    }

    /// `GetOrCreateWithRemove(source, c)`: the mirror of
    /// [`Self::get_or_create_with_add`].
    pub fn get_or_create_with_remove(
        &self,
        source: ArchetypeId,
        component: ComponentId,
        registry: &Registry,
    ) -> Result<NewArchetype> {
        if let Some(&target) = self
            .inner
            .read()
            .edges
            .get(&(source, EdgeOp::Remove(component)))
        {
            return Ok(NewArchetype {
                id: target,
                newly_matched_queries: Vec::new(),
            });
        }

        let source_mask = self
            .mask(source)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let target_mask = source_mask.without(component.index());
        let result = self.get_or_create(target_mask, registry)?;

        let mut inner = self.inner.write();
        inner.edges.insert((source, EdgeOp::Remove(component)), result.id);
        inner.edges.insert((result.id, EdgeOp::Add(component)), source);
        Ok(result)
    }

    /// `GetOrCreateQueryId(description) -> (id, matched)`. On miss, scans
    /// every existing archetype once to seed the matched list.
    pub fn get_or_create_query_id(
        &self,
        description: QueryDescription,
    ) -> Result<(QueryId, Vec<ArchetypeId>)> {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.description_to_id.get(&description) {
                return Ok((id, inner.queries[id.0 as usize].1.clone()));
            }
        }

        let mut inner = self.inner.write();
        if let Some(&id) = inner.description_to_id.get(&description) {
            return Ok((id, inner.queries[id.0 as usize].1.clone()));
        }

        if inner.queries.len() >= inner.max_queries {
            return Err(EcsError::QueryIdOverflow);
        }

        let matched: Vec<ArchetypeId> = inner
            .masks
            .iter()
            .enumerate()
            .filter(|(_, mask)| description.matches(mask))
            .map(|(idx, _)| ArchetypeId(idx as u32))
            .collect();

        let id = QueryId(inner.queries.len() as u32);
        inner.description_to_id.insert(description.clone(), id);
        inner.queries.push((description, matched.clone()));
        Ok((id, matched))
    }

    pub fn archetype_count(&self) -> usize {
        self.inner.read().masks.len()
    }
}
