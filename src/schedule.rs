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

//! Schedule builder: turns a list of systems into conflict-free execution
//! waves (§4.10).
//!
//! Two edge sources feed the graph: a conflict edge from system `i` to
//! system `j` for every declaration-order pair `i < j` whose access masks
//! conflict, and an explicit edge from every id in a system's `after` set
//! to that system. Waves are then Kahn's-algorithm in-degree layers.

use std::collections::VecDeque;

use crate::error::{EcsError, Result};
use crate::system::{BoxedSystem, SystemAccess, SystemId};

struct SystemGraph {
    edges: Vec<Vec<SystemId>>,
}

impl SystemGraph {
    fn build(accesses: &[SystemAccess], after_edges: &[Vec<SystemId>]) -> Self {
        let count = accesses.len();
        let mut edges = vec![Vec::new(); count];

        for i in 0..count {
            for j in (i + 1)..count {
                if accesses[i].conflicts_with(&accesses[j]) {
                    edges[i].push(SystemId(j as u32));
                }
            }
        }

        // Explicit `after` edges, silently dropping references outside
        // this schedule's system set (subsetting, §4.10).
        for (j, afters) in after_edges.iter().enumerate() {
            for &after_id in afters {
                let i = after_id.0 as usize;
                if i < count {
                    edges[i].push(SystemId(j as u32));
                }
            }
        }

        Self { edges }
    }

    /// Kahn's algorithm: returns waves, or `SystemCycleDetected` if any
    /// node never reaches in-degree zero.
    fn waves(&self, count: usize) -> Result<Vec<Vec<SystemId>>> {
        let mut in_degree = vec![0usize; count];
        for targets in &self.edges {
            for target in targets {
                in_degree[target.0 as usize] += 1;
            }
        }

        let mut frontier: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut waves = Vec::new();
        let mut visited = 0usize;

        while !frontier.is_empty() {
            let mut wave = Vec::with_capacity(frontier.len());
            let current: Vec<usize> = frontier.drain(..).collect();
            for node in current {
                wave.push(SystemId(node as u32));
                visited += 1;
                for &target in &self.edges[node] {
                    in_degree[target.0 as usize] -= 1;
                    if in_degree[target.0 as usize] == 0 {
                        frontier.push_back(target.0 as usize);
                    }
                }
            }
            wave.sort_by_key(|id| id.0); // declaration order within a wave
            waves.push(wave);
        }

        if visited != count {
            return Err(EcsError::SystemCycleDetected);
        }
        Ok(waves)
    }
}

/// A built, conflict-free execution plan over a fixed set of systems.
pub struct Schedule {
    systems: Vec<BoxedSystem>,
    after_edges: Vec<Vec<SystemId>>,
    waves: Option<Vec<Vec<SystemId>>>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            after_edges: Vec::new(),
            waves: None,
        }
    }

    /// Add a system with no explicit ordering constraints beyond conflict
    /// edges. Returns the id assigned to it (its declaration index).
    pub fn add_system(&mut self, system: BoxedSystem) -> SystemId {
        self.add_system_after(system, &[])
    }

    /// Add a system that must run after every system id in `after`
    /// (ids referencing systems outside this schedule are dropped at
    /// build time, not here, so schedules can be built incrementally).
    pub fn add_system_after(&mut self, system: BoxedSystem, after: &[SystemId]) -> SystemId {
        let id = SystemId(self.systems.len() as u32);
        self.systems.push(system);
        self.after_edges.push(after.to_vec());
        self.waves = None;
        id
    }

    pub fn get_system_mut(&mut self, name: &str) -> Option<&mut (dyn crate::system::System + 'static)> {
        self.systems
            .iter_mut()
            .find(|sys| sys.name() == name)
            .map(|sys| sys.as_mut())
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub(crate) fn system_mut_by_id(&mut self, id: SystemId) -> Option<&mut BoxedSystem> {
        self.systems.get_mut(id.0 as usize)
    }

    pub(crate) fn systems_mut(&mut self) -> &mut [BoxedSystem] {
        &mut self.systems
    }

    /// Build (or rebuild) the wave plan. Systems added after this call
    /// invalidate the cached plan.
    pub fn build(mut self) -> Result<Self> {
        self.ensure_built()?;
        Ok(self)
    }

    pub(crate) fn ensure_built(&mut self) -> Result<()> {
        if self.waves.is_some() {
            return Ok(());
        }
        let accesses: Vec<SystemAccess> = self.systems.iter().map(|s| s.access()).collect();
        let graph = SystemGraph::build(&accesses, &self.after_edges);
        self.waves = Some(graph.waves(self.systems.len())?);
        Ok(())
    }

    pub fn wave_count(&self) -> usize {
        self.waves.as_ref().map_or(0, |w| w.len())
    }

    pub(crate) fn wave_plan(&self) -> &[Vec<SystemId>] {
        self.waves.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentMask;
    use crate::world::World;

    struct MockSystem {
        name: &'static str,
        reads: ComponentMask,
        writes: ComponentMask,
    }

    impl crate::system::System for MockSystem {
        fn run(&mut self, _world: &World) -> crate::error::Result<()> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn access(&self) -> SystemAccess {
            SystemAccess {
                reads: self.reads,
                writes: self.writes,
            }
        }
    }

    fn mock(name: &'static str, reads: &[usize], writes: &[usize]) -> Box<MockSystem> {
        Box::new(MockSystem {
            name,
            reads: ComponentMask::from_iter(reads.iter().copied()),
            writes: ComponentMask::from_iter(writes.iter().copied()),
        })
    }

    #[test]
    fn independent_systems_share_one_wave() {
        let mut schedule = Schedule::new();
        schedule.add_system(mock("a", &[], &[0]));
        schedule.add_system(mock("b", &[], &[1]));
        let schedule = schedule.build().unwrap();
        assert_eq!(schedule.wave_count(), 1);
    }

    #[test]
    fn write_write_conflict_forces_two_waves() {
        let mut schedule = Schedule::new();
        schedule.add_system(mock("a", &[], &[0]));
        schedule.add_system(mock("b", &[], &[0]));
        let schedule = schedule.build().unwrap();
        assert_eq!(schedule.wave_count(), 2);
    }

    #[test]
    fn explicit_after_edge_to_absent_system_is_dropped() {
        let mut schedule = Schedule::new();
        // References SystemId(5), which will never exist in this schedule.
        schedule.add_system_after(mock("a", &[], &[0]), &[SystemId(5)]);
        let schedule = schedule.build().unwrap();
        assert_eq!(schedule.wave_count(), 1);
    }

    #[test]
    fn cyclic_after_edges_are_fatal() {
        let mut schedule = Schedule::new();
        // a after b, b after a: a genuine cycle (independent of conflicts).
        schedule.add_system_after(mock("a", &[], &[]), &[SystemId(1)]);
        schedule.add_system_after(mock("b", &[], &[]), &[SystemId(0)]);
        assert_eq!(schedule.build().err(), Some(EcsError::SystemCycleDetected));
    }

    #[test]
    fn waves_preserve_declaration_order_within_a_wave() {
        let mut schedule = Schedule::new();
        schedule.add_system(mock("a", &[], &[0]));
        schedule.add_system(mock("b", &[], &[1]));
        schedule.add_system(mock("c", &[], &[2]));
        let schedule = schedule.build().unwrap();
        assert_eq!(schedule.wave_plan()[0], vec![SystemId(0), SystemId(1), SystemId(2)]);
    }
}
