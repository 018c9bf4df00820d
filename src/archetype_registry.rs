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

//! World-local archetype materialization and query cache (§4.5).
//!
//! [`crate::metadata::SharedArchetypeMetadata`] owns the process-wide mask
//! → id tables; this registry owns the per-world [`Archetype`] instances
//! (and their chunks) and each query's *local* matched-archetype list,
//! which only ever contains archetypes this world has materialized.

use rustc_hash::FxHashMap;

use crate::archetype::Archetype;
use crate::config::EntityIdByteSize;
use crate::error::{EcsError, Result};
use crate::metadata::{ArchetypeId, QueryDescription, QueryId, SharedArchetypeMetadata};
use crate::registry::{ComponentId, ComponentMask, Registry};

pub struct ArchetypeRegistry {
    archetypes: Vec<Option<Archetype>>,
    local_queries: FxHashMap<QueryId, (QueryDescription, Vec<ArchetypeId>)>,
    entity_id_width: EntityIdByteSize,
}

impl ArchetypeRegistry {
    pub fn new(entity_id_width: EntityIdByteSize) -> Self {
        Self {
            archetypes: Vec::new(),
            local_queries: FxHashMap::default(),
            entity_id_width,
        }
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.0 as usize)?.as_ref()
    }

    pub fn archetype_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.0 as usize)?.as_mut()
    }

    fn is_local(&self, id: ArchetypeId) -> bool {
        self.archetypes
            .get(id.0 as usize)
            .is_some_and(|a| a.is_some())
    }

    fn materialize(
        &mut self,
        id: ArchetypeId,
        mask: ComponentMask,
        shared: &SharedArchetypeMetadata,
    ) -> Result<()> {
        let idx = id.0 as usize;
        if self.is_local(id) {
            return Ok(());
        }
        if idx >= self.archetypes.len() {
            self.archetypes.resize_with(idx + 1, || None);
        }
        let layout = shared.layout(id).ok_or(EcsError::ArchetypeNotFound)?;
        self.archetypes[idx] = Some(Archetype::new(layout, self.entity_id_width));

        for (description, matched) in self.local_queries.values_mut() {
            if description.matches(&mask) {
                matched.push(id);
            }
        }
        Ok(())
    }

    /// `getOrCreate(mask)`: materializes a local `Archetype` for `mask`,
    /// creating it at the shared level first if needed.
    pub fn get_or_create(
        &mut self,
        mask: ComponentMask,
        shared: &SharedArchetypeMetadata,
        registry: &Registry,
    ) -> Result<ArchetypeId> {
        let result = shared.get_or_create(mask, registry)?;
        self.materialize(result.id, mask, shared)?;
        Ok(result.id)
    }

    pub fn get_or_create_with_add(
        &mut self,
        source: ArchetypeId,
        component: ComponentId,
        shared: &SharedArchetypeMetadata,
        registry: &Registry,
    ) -> Result<ArchetypeId> {
        let result = shared.get_or_create_with_add(source, component, registry)?;
        let mask = shared.mask(result.id).ok_or(EcsError::ArchetypeNotFound)?;
        self.materialize(result.id, mask, shared)?;
        Ok(result.id)
    }

    pub fn get_or_create_with_remove(
        &mut self,
        source: ArchetypeId,
        component: ComponentId,
        shared: &SharedArchetypeMetadata,
        registry: &Registry,
    ) -> Result<ArchetypeId> {
        let result = shared.get_or_create_with_remove(source, component, registry)?;
        let mask = shared.mask(result.id).ok_or(EcsError::ArchetypeNotFound)?;
        self.materialize(result.id, mask, shared)?;
        Ok(result.id)
    }

    /// `getOrCreateQuery(description)`: resolves (or seeds) the local
    /// matched-archetype list for `description`, filled only with
    /// archetypes already materialized in this world.
    pub fn get_or_create_query(
        &mut self,
        description: QueryDescription,
        shared: &SharedArchetypeMetadata,
    ) -> Result<QueryId> {
        let (query_id, global_matched) = shared.get_or_create_query_id(description.clone())?;
        if !self.local_queries.contains_key(&query_id) {
            let local_matched: Vec<ArchetypeId> = global_matched
                .into_iter()
                .filter(|id| self.is_local(*id))
                .collect();
            self.local_queries.insert(query_id, (description, local_matched));
        }
        Ok(query_id)
    }

    pub fn local_query_archetypes(&self, query_id: QueryId) -> &[ArchetypeId] {
        self.local_queries
            .get(&query_id)
            .map(|(_, matched)| matched.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::declare_component;
    use crate::registry::Component;

    struct Position;
    declare_component!(Position, 0);

    fn registry() -> Registry {
        Registry::builder().register_component::<Position>(1).build()
    }

    #[test]
    fn query_seeded_before_archetype_has_empty_local_list_until_materialized() {
        let shared = SharedArchetypeMetadata::new(&WorldConfig::default().with_chunk_size_bytes(256));
        let registry = registry();
        let mut world_a = ArchetypeRegistry::new(EntityIdByteSize::Four);
        let mut world_b = ArchetypeRegistry::new(EntityIdByteSize::Four);

        let description = QueryDescription {
            all: ComponentMask::EMPTY.with(0),
            none: ComponentMask::EMPTY,
            any: ComponentMask::EMPTY,
        };
        let query_id = world_a.get_or_create_query(description.clone(), &shared).unwrap();
        assert!(world_a.local_query_archetypes(query_id).is_empty());

        let mask = ComponentMask::EMPTY.with(0);
        let archetype_id = world_a.get_or_create(mask, &shared, &registry).unwrap();
        assert_eq!(world_a.local_query_archetypes(query_id), &[archetype_id]);

        // world_b never materialized this archetype locally.
        let query_id_b = world_b.get_or_create_query(description, &shared).unwrap();
        assert!(world_b.local_query_archetypes(query_id_b).is_empty());
    }
}
