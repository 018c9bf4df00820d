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

//! Archetype ECS core: chunked Structure-of-Arrays storage, an archetype
//! graph with cached add/remove edges, cached queries (with an optional tag
//! extension), and a conflict-aware parallel system scheduler.
//!
//! This crate is the storage/scheduling core only — it assumes its
//! [`registry::Registry`] of component/tag ids and layouts is handed to it
//! already built (by a source generator in the full stack, or by hand as
//! every test and bench here does).

pub mod archetype;
pub mod archetype_registry;
pub mod bitset;
pub mod chunk;
pub mod command;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod layout;
pub mod metadata;
pub mod prelude;
pub mod query;
pub mod registry;
pub mod schedule;
pub mod system;
pub mod tags;
pub mod world;

pub use command::CommandBuffer;
pub use component::{Bundle, MAX_BUNDLE_COMPONENTS};
pub use config::WorldConfig;
pub use entity::Entity;
pub use error::{EcsError, Result};
pub use executor::{Executor, SystemProfiler, SystemStats};
pub use query::{ChunkView, Query, QueryBuilder};
pub use registry::{Component, ComponentId, Registry, Tag, TagId};
pub use schedule::Schedule;
pub use system::{BoxedSystem, System, SystemAccess, SystemId};
pub use tags::{ChunkTagRegistry, EntityTags, TagMask, TagStorage};
pub use world::World;
