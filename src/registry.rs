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

//! The static registry the core is handed at world construction.
//!
//! In the full stack this table is produced by an attribute-driven source
//! generator (out of scope here, see spec §1/§6.1): it assigns every
//! component and tag a dense id and records its layout. The core never
//! invents ids at runtime; it only consumes this table.

use crate::bitset::Bitset256;

/// Mask width used for component sets. 256 distinct components is the
/// registry's compile-time upper bound for this build of the core; widen to
/// `Bitset512` (or narrow to `Bitset64`/`Bitset128`) if a game needs a
/// different ceiling.
pub type ComponentMask = Bitset256;

/// Dense, process-wide identifier for a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u16);

impl ComponentId {
    pub const INVALID: ComponentId = ComponentId(u16::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dense, process-wide identifier for a tag type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagId(pub u16);

impl TagId {
    pub const INVALID: TagId = TagId(u16::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Layout metadata for one component id, as the generator would emit it.
#[derive(Debug, Clone, Copy)]
pub struct ComponentTypeInfo {
    /// Byte size. Zero marks a tag-style, zero-data component: it
    /// participates in the archetype mask but occupies no chunk bytes.
    pub size: u32,
    /// Required alignment, a power of two.
    pub align: u32,
    /// Stable identity, independent of Rust's `TypeId` (which is not
    /// guaranteed stable across compilations).
    pub guid: u128,
}

/// Metadata for one tag id.
#[derive(Debug, Clone, Copy)]
pub struct TagTypeInfo {
    pub guid: u128,
}

/// Marker trait implemented once per component type, binding it to the
/// dense id the registry assigned it.
///
/// There is deliberately no blanket `impl<T> Component for T` the way a
/// `TypeId`-keyed design could offer: without a source generator to
/// synthesize per-type ids, each component type records its own id
/// explicitly (see [`declare_component`]).
pub trait Component: 'static + Send + Sync + Sized {
    const ID: ComponentId;
}

/// Marker trait implemented once per tag type.
pub trait Tag: 'static + Send + Sync + Sized {
    const ID: TagId;
}

/// Binds a plain Rust type to a [`ComponentId`], the way generated code
/// would. Also registers it with a [`RegistryBuilder`] via
/// `register::<T>(size, align, guid)` so the two stay in sync.
#[macro_export]
macro_rules! declare_component {
    ($ty:ty, $id:expr) => {
        impl $crate::registry::Component for $ty {
            const ID: $crate::registry::ComponentId = $crate::registry::ComponentId($id);
        }
    };
}

/// Binds a plain Rust type to a [`TagId`].
#[macro_export]
macro_rules! declare_tag {
    ($ty:ty, $id:expr) => {
        impl $crate::registry::Tag for $ty {
            const ID: $crate::registry::TagId = $crate::registry::TagId($id);
        }
    };
}

/// Read/write access mask plus explicit ordering for one system, as the
/// generator would emit from a system's function signature and attributes.
#[derive(Debug, Clone)]
pub struct SystemMetadata {
    pub name: &'static str,
    pub reads: ComponentMask,
    pub writes: ComponentMask,
    pub after: Vec<&'static str>,
}

/// Immutable, process-wide registry of component/tag/system metadata.
///
/// Built once via [`RegistryBuilder`] and shared (typically behind an
/// `Arc`) by every [`crate::world::World`] that needs the same component
/// universe.
pub struct Registry {
    components: Vec<ComponentTypeInfo>,
    tags: Vec<TagTypeInfo>,
    systems: Vec<SystemMetadata>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentTypeInfo> {
        self.components.get(id.index())
    }

    pub fn tag_info(&self, id: TagId) -> Option<&TagTypeInfo> {
        self.tags.get(id.index())
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn systems(&self) -> &[SystemMetadata] {
        &self.systems
    }

    pub fn system_by_name(&self, name: &str) -> Option<(usize, &SystemMetadata)> {
        self.systems.iter().enumerate().find(|(_, s)| s.name == name)
    }
}

/// Builder for [`Registry`]. Mirrors what a source generator would emit as
/// a single initialization call at program start.
#[derive(Default)]
pub struct RegistryBuilder {
    components: Vec<ComponentTypeInfo>,
    tags: Vec<TagTypeInfo>,
    systems: Vec<SystemMetadata>,
}

impl RegistryBuilder {
    /// Register component id `T::ID` with its layout. `T::ID.index()` must
    /// equal the number of components already registered (ids are assigned
    /// densely, in registration order) — this is asserted rather than
    /// silently remapped, since a gap would desynchronize the generator's
    /// assigned ids from the table's indices.
    pub fn register_component<T: Component>(mut self, guid: u128) -> Self {
        assert_eq!(
            T::ID.index(),
            self.components.len(),
            "component ids must be registered in dense, ascending order"
        );
        self.components.push(ComponentTypeInfo {
            size: std::mem::size_of::<T>() as u32,
            align: std::mem::align_of::<T>() as u32,
            guid,
        });
        self
    }

    pub fn register_tag<T: Tag>(mut self, guid: u128) -> Self {
        assert_eq!(
            T::ID.index(),
            self.tags.len(),
            "tag ids must be registered in dense, ascending order"
        );
        self.tags.push(TagTypeInfo { guid });
        self
    }

    pub fn register_system(mut self, metadata: SystemMetadata) -> Self {
        self.systems.push(metadata);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            components: self.components,
            tags: self.tags,
            systems: self.systems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    declare_component!(Position, 0);

    struct Velocity;
    declare_component!(Velocity, 1);

    #[test]
    fn builder_assigns_dense_ids() {
        let registry = Registry::builder()
            .register_component::<Position>(1)
            .register_component::<Velocity>(2)
            .build();

        assert_eq!(registry.component_count(), 2);
        assert_eq!(registry.component_info(Position::ID).unwrap().guid, 1);
        assert_eq!(registry.component_info(Velocity::ID).unwrap().guid, 2);
    }

    #[test]
    #[should_panic(expected = "dense, ascending order")]
    fn out_of_order_registration_panics() {
        let _ = Registry::builder().register_component::<Velocity>(2);
    }
}
