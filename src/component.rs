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

//! `Bundle`: a tuple of components that knows its own mask and how to
//! write itself into a freshly allocated chunk slot (§4.7 "Spawn via
//! builder").

use crate::layout::ArchetypeLayout;
use crate::registry::{Component, ComponentMask};

/// Maximum number of components supported by a single `Bundle` tuple.
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// A group of components spawned together.
///
/// `mask()` reports every component id the bundle carries, including
/// zero-size ones; `write_into` writes each component's bytes at
/// `index_in_chunk`, skipping zero-size components since they occupy no
/// column bytes.
pub trait Bundle: Send + Sync + 'static {
    fn mask() -> ComponentMask
    where
        Self: Sized;

    /// # Safety
    /// `chunk_bytes` must be the chunk addressed by `layout`, and
    /// `index_in_chunk` must be a slot this bundle's caller has already
    /// reserved (i.e. not concurrently written by anything else).
    unsafe fn write_into(self, chunk_bytes: &mut [u8], layout: &ArchetypeLayout, index_in_chunk: usize)
    where
        Self: Sized;
}

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component + Send + Sync + 'static),*> Bundle for ($($T,)*) {
            fn mask() -> ComponentMask {
                ComponentMask::EMPTY $(.with($T::ID.index()))*
            }

            #[allow(non_snake_case)]
            unsafe fn write_into(self, chunk_bytes: &mut [u8], layout: &ArchetypeLayout, index_in_chunk: usize) {
                let ($($T,)*) = self;
                $(
                    if std::mem::size_of::<$T>() > 0 {
                        let offset = layout
                            .offset_of($T::ID, index_in_chunk)
                            .expect("bundle component id must be present in its own mask's layout");
                        unsafe {
                            std::ptr::write(chunk_bytes.as_mut_ptr().add(offset) as *mut $T, $T);
                        }
                    }
                )*
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntityIdByteSize, WorldConfig};
    use crate::declare_component;
    use crate::registry::Registry;

    #[derive(Debug, Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }
    declare_component!(Position, 0);

    #[derive(Debug, Clone, Copy)]
    struct Velocity {
        dx: f32,
    }
    declare_component!(Velocity, 1);

    #[test]
    fn mask_reports_every_component_id() {
        let mask = <(Position, Velocity)>::mask();
        assert!(mask.get(0));
        assert!(mask.get(1));
        assert_eq!(mask.popcount(), 2);
    }

    #[test]
    fn write_into_places_bytes_at_layout_offsets() {
        let registry = Registry::builder()
            .register_component::<Position>(1)
            .register_component::<Velocity>(2)
            .build();
        let mask = <(Position, Velocity)>::mask();
        let config = WorldConfig::default().with_chunk_size_bytes(256);
        let layout = ArchetypeLayout::build(&mask, &registry, config.chunk_size_bytes, EntityIdByteSize::Four)
            .unwrap();
        let mut chunk = vec![0u8; config.chunk_size_bytes];

        let bundle = (Position { x: 1.0, y: 2.0 }, Velocity { dx: 3.0 });
        unsafe {
            bundle.write_into(&mut chunk, &layout, 0);
        }

        let pos_off = layout.base_offset(Position::ID).unwrap();
        let read_back: Position = unsafe { std::ptr::read(chunk.as_ptr().add(pos_off) as *const Position) };
        assert_eq!(read_back.x, 1.0);
        assert_eq!(read_back.y, 2.0);
    }
}
