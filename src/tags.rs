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

//! Per-entity tag bitmask and the per-chunk union used to prune tagged
//! queries without an archetype move (§4.9).
//!
//! Setting or clearing a tag mutates an ordinary component's bytes in
//! place; it never crosses an archetype edge the way `add_component`/
//! `remove_component` do. [`ChunkTagRegistry`] tracks, per chunk handle, the
//! OR-union of every entity tag mask currently in that chunk, so a tagged
//! query can skip whole chunks whose union can't possibly satisfy it.

use rustc_hash::FxHashMap;

use crate::bitset::Bitset128;
use crate::chunk::ChunkHandle;
use crate::registry::{Component, ComponentId};

/// Tag mask width. 128 bits covers far more distinct tags than any game
/// reasonably declares; narrower than the 256-bit component mask since tags
/// are a much smaller id space by convention.
pub type TagMask = Bitset128;

/// Binds a Rust type storing a per-entity [`TagMask`] to the `Component`
/// machinery, so ordinary `add_component`/`get_component_mut` can place and
/// mutate it. Implemented once for [`EntityTags`]; a host can implement it
/// for its own reserved component type instead if it wants the tag field
/// alongside other data.
pub trait TagStorage: Component {
    fn tag_mask(&self) -> TagMask;
    fn tag_mask_mut(&mut self) -> &mut TagMask;
}

/// The reserved tag component from §4.9: a single `TagMask` field, no other
/// state. Bind it to a [`crate::registry::ComponentId`] with
/// [`crate::declare_component`] the same way any other component is bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityTags(pub TagMask);

// `EntityTags` is reserved component id 0: a host registering a `Registry`
// that uses the tag extension must call `.register_component::<EntityTags>(..)`
// first, before any of its own components, so this id stays valid. Unlike a
// host's own component types, the id can't be assigned via `declare_component!`
// from outside this crate (both the trait and the type are ours), so it's
// fixed here instead.
impl Component for EntityTags {
    const ID: ComponentId = ComponentId(0);
}

impl TagStorage for EntityTags {
    fn tag_mask(&self) -> TagMask {
        self.0
    }

    fn tag_mask_mut(&mut self) -> &mut TagMask {
        &mut self.0
    }
}

/// Per-chunk OR-union of every live entity's tag mask in that chunk.
///
/// The union is only ever grown on tag *set*; tag *clear* leaves it as-is
/// (§9 Open Question 3 — the union over-approximates after a clear, so
/// pruning stays conservative and exact filtering happens per-entity).
/// Entries are dropped when their owning chunk is freed, since a freed
/// chunk's slot will be reused under a new `ChunkHandle` version with a
/// fresh (empty) union.
#[derive(Default)]
pub struct ChunkTagRegistry {
    unions: FxHashMap<ChunkHandle, TagMask>,
}

impl ChunkTagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn union(&self, handle: ChunkHandle) -> TagMask {
        self.unions.get(&handle).copied().unwrap_or(TagMask::EMPTY)
    }

    /// OR `tags` into the union recorded for `handle`.
    pub fn mark(&mut self, handle: ChunkHandle, tags: TagMask) {
        let entry = self.unions.entry(handle).or_insert(TagMask::EMPTY);
        *entry = entry.union(&tags);
    }

    /// Drop the union recorded for `handle` (called when the chunk is freed).
    pub fn forget(&mut self, handle: ChunkHandle) {
        self.unions.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_grows_but_never_shrinks_on_its_own() {
        let mut registry = ChunkTagRegistry::new();
        let handle = ChunkHandle { id: 0, version: 1 };
        registry.mark(handle, TagMask::single(2));
        registry.mark(handle, TagMask::single(5));
        assert!(registry.union(handle).get(2));
        assert!(registry.union(handle).get(5));
    }

    #[test]
    fn forgotten_chunk_reports_empty_union() {
        let mut registry = ChunkTagRegistry::new();
        let handle = ChunkHandle { id: 0, version: 1 };
        registry.mark(handle, TagMask::single(1));
        registry.forget(handle);
        assert!(registry.union(handle).is_empty());
    }
}
