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

//! Deferred structural mutations, queued during a system's `run` and applied
//! at the next wave barrier (§4.11).
//!
//! A system only ever sees a shared `&World` (see [`crate::query::Query`]'s
//! doc comment), so it cannot spawn, despawn, or move entities directly —
//! doing so would race every other system in its wave. Instead it records
//! what it wants done as a closure and hands it to a [`CommandBuffer`]; the
//! executor drains every system's buffer with `&mut World` once the wave
//! finishes.

use crate::component::Bundle;
use crate::entity::Entity;
use crate::error::Result;
use crate::registry::Component;
use crate::world::World;

/// Type alias for queued world mutations.
pub type CommandClosure = Box<dyn FnOnce(&mut World) -> Result<()> + Send>;

/// One deferred world mutation.
pub enum Command {
    /// Spawn an entity with a stateful closure (so a caller can capture the
    /// bundle and write it through [`World::spawn_with`] at apply time).
    Spawn(CommandClosure),

    /// Despawn a previously-spawned entity.
    Despawn(Entity),

    /// Any other world mutation (add/remove component, overwrite, ...).
    Custom(CommandClosure),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn(_) => write!(f, "Spawn(...)"),
            Command::Despawn(e) => f.debug_tuple("Despawn").field(e).finish(),
            Command::Custom(_) => write!(f, "Custom(...)"),
        }
    }
}

/// Queue of deferred mutations, applied in submission order.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Queue a bundle spawn.
    pub fn spawn<B>(&mut self, bundle: B)
    where
        B: Bundle + 'static,
    {
        self.commands.push(Command::Spawn(Box::new(move |world| {
            world.spawn_with(bundle).map(|_| ())
        })));
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.commands.push(Command::Despawn(entity));
    }

    /// Queue an arbitrary world mutation.
    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.commands.push(Command::Custom(Box::new(f)));
    }

    pub fn add_component<T: Component + 'static>(&mut self, entity: Entity, component: T) {
        self.add(move |world| world.add_component(entity, component));
    }

    pub fn remove_component<T: Component + 'static>(&mut self, entity: Entity) {
        self.add(move |world| world.remove_component::<T>(entity));
    }

    /// Drain and apply every queued command, in order, against `world`.
    pub fn apply(&mut self, world: &mut World) -> Result<()> {
        for command in self.commands.drain(..) {
            match command {
                Command::Spawn(f) => f(world)?,
                Command::Despawn(entity) => {
                    world.despawn(entity)?;
                }
                Command::Custom(f) => f(world)?,
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
