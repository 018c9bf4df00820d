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

//! Drives a built [`Schedule`] wave by wave (§4.10, §4.11).
//!
//! Systems only ever see `&World` (see [`crate::system::System::run`]), so
//! structural mutation during a wave is impossible by construction — the
//! scheduler's conflict analysis only reasons about component read/write
//! masks, never about spawns or despawns. A system that needs to spawn,
//! despawn, or move an entity queues the change on a [`crate::command::CommandBuffer`]
//! it owns and applies that buffer itself at a wave boundary it controls
//! (e.g. between calls to [`Executor::execute_frame`]), consistent with the
//! documented deferred-command policy for structural mutation inside waves.

use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "profiling")]
use tracing::{debug, info_span};

use crate::error::Result;
use crate::schedule::Schedule;
use crate::system::SystemId;
use crate::world::World;

/// Aggregated timing for one system across every frame it has run in.
#[derive(Debug, Clone, Copy)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

/// Per-system wall-clock timings, recorded by [`Executor::execute_frame`].
#[derive(Default)]
pub struct SystemProfiler {
    timings: HashMap<SystemId, Vec<Duration>>,
    call_counts: HashMap<SystemId, u64>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&mut self, id: SystemId, duration: Duration) {
        self.timings.entry(id).or_default().push(duration);
        *self.call_counts.entry(id).or_insert(0) += 1;
    }

    pub fn get_stats(&self, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&id)?;
        if timings.is_empty() {
            return None;
        }
        let min = *timings.iter().min().unwrap();
        let max = *timings.iter().max().unwrap();
        let avg = timings.iter().sum::<Duration>() / timings.len() as u32;
        Some(SystemStats {
            min,
            max,
            avg,
            call_count: *self.call_counts.get(&id).unwrap_or(&0),
        })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.call_counts.clear();
    }
}

/// Runs a built [`Schedule`] to completion, one frame at a time.
///
/// Sequential by default; with the `parallel` feature (on by default, see
/// `Cargo.toml`) each wave's systems are dispatched across a rayon
/// work-stealing pool instead of run in a loop. Either way, every system in
/// a wave completes before the next wave starts (§4.10's "wave barrier").
pub struct Executor {
    schedule: Schedule,
    profiler: SystemProfiler,
}

impl Executor {
    /// Build an executor from a schedule, computing its wave plan up front
    /// so a cyclic dependency graph is rejected at construction time rather
    /// than on the first frame.
    pub fn new(mut schedule: Schedule) -> Result<Self> {
        schedule.ensure_built()?;
        Ok(Self {
            schedule,
            profiler: SystemProfiler::new(),
        })
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run every wave in order against `world`, recording per-system timing.
    pub fn execute_frame(&mut self, world: &World) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("executor.execute_frame").entered();

        let waves = self.schedule.wave_plan().to_vec();
        for wave in &waves {
            #[cfg(feature = "parallel")]
            self.run_wave_parallel(wave, world)?;
            #[cfg(not(feature = "parallel"))]
            self.run_wave_sequential(wave, world)?;
        }
        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn run_wave_sequential(&mut self, wave: &[SystemId], world: &World) -> Result<()> {
        for &id in wave {
            let system = self
                .schedule
                .system_mut_by_id(id)
                .expect("wave plan only ever contains ids from this schedule's own system list");
            let started = std::time::Instant::now();
            system.run(world)?;
            self.profiler.record_execution(id, started.elapsed());
            #[cfg(feature = "profiling")]
            debug!(system = system.name(), "ran system");
        }
        Ok(())
    }

    /// Dispatch every system in `wave` to a rayon worker.
    ///
    /// # Safety
    /// `Schedule::wave_plan` only groups systems whose `SystemAccess` masks
    /// are pairwise non-conflicting (no shared writes, no read/write
    /// overlap — see [`crate::system::SystemAccess::conflicts_with`]), and
    /// every id in `wave` is a distinct index into `self.schedule`'s system
    /// list. That gives each worker a unique, non-aliasing `&mut dyn System`
    /// even though they're all reached through one raw base pointer; `world`
    /// itself is only ever handed out as `&World` to every worker, mirroring
    /// the same shared-access contract `World::get_component_mut` already
    /// relies on for its callers.
    #[cfg(feature = "parallel")]
    fn run_wave_parallel(&mut self, wave: &[SystemId], world: &World) -> Result<()> {
        use rayon::prelude::*;

        let systems = self.schedule.systems_mut();
        let systems_ptr = systems.as_mut_ptr() as usize;

        let results: Vec<(SystemId, Result<Duration>)> = wave
            .par_iter()
            .map(|&id| {
                // SAFETY: see the method's doc comment.
                let system = unsafe { &mut *(systems_ptr as *mut crate::system::BoxedSystem).add(id.0 as usize) };
                let started = std::time::Instant::now();
                let outcome = system.run(world);
                (id, outcome.map(|_| started.elapsed()))
            })
            .collect();

        for (id, outcome) in results {
            self.profiler.record_execution(id, outcome?);
        }
        Ok(())
    }
}
