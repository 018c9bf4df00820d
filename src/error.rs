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

//! Error types
//!
//! Validation errors (§7 of the design notes) are ordinary recoverable
//! variants returned before any mutation happens. Capacity and structural
//! misuse errors are also returned as `Err`, never panics, with one
//! exception: a chunk's share-count underflowing zero is a logic bug in the
//! core itself rather than caller misuse, and is asserted instead.

use std::fmt;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity handle doesn't exist or its version no longer matches.
    InvalidEntity,

    /// `add_component` called for a component the entity already has.
    ComponentAlreadyPresent,

    /// `remove_component`/`get_component` called for a component the entity
    /// doesn't have.
    ComponentNotPresent,

    /// Archetype id referenced that has no corresponding metadata entry.
    ArchetypeNotFound,

    /// Entity id space exhausted (`entity_id_byte_size` too narrow for the
    /// number of live + recycled ids requested).
    EntityIdOverflow,

    /// Shared archetype metadata ran out of dense archetype ids.
    ArchetypeIdOverflow,

    /// Shared archetype metadata ran out of dense query ids.
    QueryIdOverflow,

    /// A single archetype's row doesn't fit in one chunk at any
    /// `entities_per_chunk >= 1`; `chunk_size_bytes` is too small for this
    /// component mask.
    ChunkTooSmall,

    /// `ChunkManager` capacity (`max_meta_blocks`) exhausted.
    ChunkCapacityExhausted,

    /// `ChunkManager::free` called on a handle with outstanding `acquire`s.
    ChunkInUse,

    /// System dependency graph contains a cycle; `Schedule::build` refuses
    /// to produce waves.
    SystemCycleDetected,

    /// `after` (or add/remove edge) referenced a system/component id the
    /// registry never assigned.
    UnknownId(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidEntity => write!(f, "entity handle is stale or invalid"),
            EcsError::ComponentAlreadyPresent => write!(f, "component already present on entity"),
            EcsError::ComponentNotPresent => write!(f, "component not present on entity"),
            EcsError::ArchetypeNotFound => write!(f, "archetype id has no metadata entry"),
            EcsError::EntityIdOverflow => write!(f, "entity id space exhausted"),
            EcsError::ArchetypeIdOverflow => write!(f, "archetype id space exhausted"),
            EcsError::QueryIdOverflow => write!(f, "query id space exhausted"),
            EcsError::ChunkTooSmall => {
                write!(f, "archetype row does not fit in one chunk at chunk_size_bytes")
            }
            EcsError::ChunkCapacityExhausted => write!(f, "chunk manager capacity exhausted"),
            EcsError::ChunkInUse => write!(f, "free() called on a chunk with outstanding borrows"),
            EcsError::SystemCycleDetected => write!(f, "system dependency graph contains a cycle"),
            EcsError::UnknownId(msg) => write!(f, "unknown id: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
