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

//! Convenient re-exports of the types a host embedding the core needs most.
//!
//! ```
//! use archetype_ecs::prelude::*;
//! ```

pub use crate::command::CommandBuffer;
pub use crate::component::Bundle;
pub use crate::config::WorldConfig;
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::executor::Executor;
pub use crate::query::{ChunkView, Query, QueryBuilder};
pub use crate::registry::{Component, ComponentId, Registry, Tag, TagId};
pub use crate::schedule::Schedule;
pub use crate::system::{System, SystemAccess, SystemId};
pub use crate::tags::{EntityTags, TagStorage};
pub use crate::world::World;
pub use crate::{declare_component, declare_tag};
