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

//! System trait and access metadata (§4.10).

use crate::error::Result;
use crate::registry::ComponentMask;
use crate::world::World;

/// System ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// System access metadata: the read/write component masks used to detect
/// conflicts between two systems in the same wave.
#[derive(Debug, Clone, Copy)]
pub struct SystemAccess {
    pub reads: ComponentMask,
    pub writes: ComponentMask,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY,
        }
    }

    /// `A.write ∩ B.read ≠ ∅ ∨ A.read ∩ B.write ≠ ∅ ∨ A.write ∩ B.write ≠ ∅`
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        !self.writes.is_disjoint(&other.reads)
            || !self.reads.is_disjoint(&other.writes)
            || !self.writes.is_disjoint(&other.writes)
    }
}

/// A unit of per-wave work. Given shared access to the world so it can run
/// alongside other conflict-free systems in the same wave; must not
/// perform structural mutation directly (see [`crate::command::CommandBuffer`]).
pub trait System: Send + Sync {
    fn access(&self) -> SystemAccess;

    fn name(&self) -> &'static str;

    fn run(&mut self, world: &World) -> Result<()>;
}

/// Boxed system, as stored in a [`crate::schedule::Schedule`].
pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_write_conflicts() {
        let a = SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(3),
        };
        let b = SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(3),
        };
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn read_read_does_not_conflict() {
        let a = SystemAccess {
            reads: ComponentMask::EMPTY.with(1),
            writes: ComponentMask::EMPTY,
        };
        let b = SystemAccess {
            reads: ComponentMask::EMPTY.with(1),
            writes: ComponentMask::EMPTY,
        };
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn write_read_conflicts_either_direction() {
        let writer = SystemAccess {
            reads: ComponentMask::EMPTY,
            writes: ComponentMask::EMPTY.with(2),
        };
        let reader = SystemAccess {
            reads: ComponentMask::EMPTY.with(2),
            writes: ComponentMask::EMPTY,
        };
        assert!(writer.conflicts_with(&reader));
        assert!(reader.conflicts_with(&writer));
    }
}
