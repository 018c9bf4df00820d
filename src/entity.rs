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

//! Generational entity ids and the per-world table that tracks where each
//! entity's row currently lives (§4.6).

use crate::config::{EntityIdByteSize, WorldConfig};
use crate::error::{EcsError, Result};

/// A generational entity handle: a dense `id` plus a `version` that
/// invalidates stale handles after the id is recycled.
///
/// `version == 0` never occurs on a live entity and is the sentinel for
/// [`Entity::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    id: u32,
    version: u32,
}

impl Entity {
    pub const INVALID: Entity = Entity { id: 0, version: 0 };

    #[inline]
    pub fn id(self) -> u32 {
        self.id
    }

    #[inline]
    pub fn version(self) -> u32 {
        self.version
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.version == 0
    }

    /// Pack into a single `u64` (`id` in the low 32 bits, `version` in the
    /// high 32 bits) for use as an entity-id column value.
    #[inline]
    pub fn to_bits(self) -> u64 {
        (self.id as u64) | ((self.version as u64) << 32)
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Entity {
            id: bits as u32,
            version: (bits >> 32) as u32,
        }
    }
}

/// Where one entity's row currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: u32,
    pub global_index: u32,
}

impl EntityLocation {
    pub const NONE: EntityLocation = EntityLocation {
        archetype_id: u32::MAX,
        global_index: u32::MAX,
    };
}

struct Slot {
    version: u32,
    location: EntityLocation,
}

/// Generational id table: assigns/recycles entity ids and tracks each
/// entity's current archetype location.
pub struct EntityManager {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    max_entity_id: u32,
}

impl EntityManager {
    pub fn new(config: &WorldConfig) -> Self {
        Self::with_capacity(config.default_entity_capacity, config.entity_id_byte_size)
    }

    pub fn with_capacity(capacity: usize, entity_id_byte_size: EntityIdByteSize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            max_entity_id: entity_id_byte_size.max_entity_id(),
        }
    }

    /// Allocate an entity id, reusing a recycled slot (bumped to the next
    /// odd version) if the free list is non-empty, else appending a fresh
    /// slot at version 1.
    pub fn create(&mut self) -> Result<Entity> {
        if let Some(id) = self.free_list.pop() {
            let slot = &mut self.slots[id as usize];
            debug_assert!(
                slot.version % 2 == 0,
                "recycled slot must be at a dead (even) version"
            );
            slot.version = slot.version.wrapping_add(1).max(1);
            slot.location = EntityLocation::NONE;
            return Ok(Entity {
                id,
                version: slot.version,
            });
        }

        let id = self.slots.len() as u32;
        if id > self.max_entity_id {
            return Err(EcsError::EntityIdOverflow);
        }
        self.slots.push(Slot {
            version: 1,
            location: EntityLocation::NONE,
        });
        Ok(Entity { id, version: 1 })
    }

    /// Validate `entity` is alive, bump its slot to a dead (even) version,
    /// and push the id onto the free list.
    pub fn destroy(&mut self, entity: Entity) -> Result<()> {
        let slot = self
            .slots
            .get_mut(entity.id as usize)
            .ok_or(EcsError::InvalidEntity)?;
        if slot.version != entity.version || entity.is_invalid() {
            return Err(EcsError::InvalidEntity);
        }
        slot.version = slot.version.wrapping_add(1);
        slot.location = EntityLocation::NONE;
        self.free_list.push(entity.id);
        Ok(())
    }

    /// Reconstruct the live `Entity` handle for a raw id, as read back out
    /// of a chunk's entity-id column (which stores only the `id` half).
    pub fn entity_for_id(&self, id: u32) -> Result<Entity> {
        let slot = self.slots.get(id as usize).ok_or(EcsError::InvalidEntity)?;
        Ok(Entity { id, version: slot.version })
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        !entity.is_invalid()
            && self
                .slots
                .get(entity.id as usize)
                .is_some_and(|s| s.version == entity.version)
    }

    pub fn location(&self, entity: Entity) -> Result<EntityLocation> {
        let slot = self
            .slots
            .get(entity.id as usize)
            .ok_or(EcsError::InvalidEntity)?;
        if slot.version != entity.version {
            return Err(EcsError::InvalidEntity);
        }
        Ok(slot.location)
    }

    pub fn set_location(&mut self, entity: Entity, location: EntityLocation) -> Result<()> {
        let slot = self
            .slots
            .get_mut(entity.id as usize)
            .ok_or(EcsError::InvalidEntity)?;
        if slot.version != entity.version {
            return Err(EcsError::InvalidEntity);
        }
        slot.location = location;
        Ok(())
    }

    /// Number of currently-live entities.
    pub fn alive_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EntityManager {
        EntityManager::with_capacity(4, EntityIdByteSize::Four)
    }

    #[test]
    fn create_destroy_invalidates_old_handle() {
        let mut mgr = manager();
        let e = mgr.create().unwrap();
        assert!(mgr.is_alive(e));
        mgr.destroy(e).unwrap();
        assert!(!mgr.is_alive(e));
        assert_eq!(mgr.destroy(e), Err(EcsError::InvalidEntity));
    }

    #[test]
    fn recycled_id_gets_a_new_version() {
        let mut mgr = manager();
        let e1 = mgr.create().unwrap();
        mgr.destroy(e1).unwrap();
        let e2 = mgr.create().unwrap();
        assert_eq!(e1.id(), e2.id());
        assert_ne!(e1.version(), e2.version());
        assert!(mgr.is_alive(e2));
        assert!(!mgr.is_alive(e1));
    }

    #[test]
    fn location_round_trips() {
        let mut mgr = manager();
        let e = mgr.create().unwrap();
        let loc = EntityLocation {
            archetype_id: 3,
            global_index: 7,
        };
        mgr.set_location(e, loc).unwrap();
        assert_eq!(mgr.location(e).unwrap(), loc);
    }

    #[test]
    fn alive_count_tracks_create_and_destroy() {
        let mut mgr = manager();
        let a = mgr.create().unwrap();
        let _b = mgr.create().unwrap();
        assert_eq!(mgr.alive_count(), 2);
        mgr.destroy(a).unwrap();
        assert_eq!(mgr.alive_count(), 1);
    }

    #[test]
    fn id_overflow_is_fatal() {
        let mut mgr = EntityManager::with_capacity(1, EntityIdByteSize::One);
        for _ in 0..=u8::MAX as u32 {
            mgr.create().unwrap();
        }
        assert_eq!(mgr.create(), Err(EcsError::EntityIdOverflow));
    }
}
