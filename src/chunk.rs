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

//! Chunk allocation: fixed-size raw byte buffers addressed by
//! version-checked handles.
//!
//! Slot metadata (`version`, `share_count`, backing pointer) lives in a
//! two-level "block of blocks" table: `blocks` is a flat array of lazily
//! installed [`MetaBlock`]s, each holding [`ENTRIES_PER_BLOCK`] slots. The
//! version/share-count pair is packed into one `AtomicU64` and updated by
//! CAS so `bytes`/`acquire`/`release` can be called from any thread without
//! a lock, as long as no thread calls `allocate`/`free` concurrently with
//! them (guaranteed by the scheduler: chunk-manager mutation only happens
//! outside parallel waves).

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::queue::SegQueue;

use crate::config::{Allocator, WorldConfig};
use crate::error::{EcsError, Result};

const ENTRIES_PER_BLOCK: usize = 256;

/// A versioned reference to one chunk. `version == 0` is never issued and
/// always denotes an invalid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    pub id: u32,
    pub version: u32,
}

impl ChunkHandle {
    pub const INVALID: ChunkHandle = ChunkHandle { id: 0, version: 0 };

    pub fn is_invalid(&self) -> bool {
        self.version == 0
    }
}

struct Slot {
    /// High 32 bits: version (0 = slot never allocated / currently free).
    /// Low 32 bits: outstanding `acquire()` count.
    packed: AtomicU64,
    ptr: AtomicPtr<u8>,
}

impl Slot {
    fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
            ptr: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    fn version(packed: u64) -> u32 {
        (packed >> 32) as u32
    }

    fn share_count(packed: u64) -> u32 {
        (packed & 0xFFFF_FFFF) as u32
    }

    fn pack(version: u32, share_count: u32) -> u64 {
        ((version as u64) << 32) | share_count as u64
    }
}

type MetaBlock = Box<[Slot; ENTRIES_PER_BLOCK]>;

fn new_block() -> MetaBlock {
    Box::new(std::array::from_fn(|_| Slot::new()))
}

/// Allocates fixed-size chunks and hands out version-checked [`ChunkHandle`]s.
///
/// `allocate`/`free` mutate free-list/slot state and must not race each
/// other on the same handle; `bytes`/`acquire`/`release` only read/CAS
/// already-installed slot state and are safe to call concurrently from
/// every system in a wave.
pub struct ChunkManager {
    chunk_size: usize,
    chunk_layout: Layout,
    allocator: Arc<dyn Allocator>,
    blocks: Vec<OnceLock<MetaBlock>>,
    free_list: SegQueue<u32>,
    next_id: AtomicU32,
    capacity: usize,
}

impl ChunkManager {
    pub fn new(config: &WorldConfig) -> Self {
        let capacity = config.max_meta_blocks * ENTRIES_PER_BLOCK;
        let chunk_layout = Layout::from_size_align(config.chunk_size_bytes.max(1), 16)
            .expect("chunk_size_bytes must yield a valid Layout");
        Self {
            chunk_size: config.chunk_size_bytes,
            chunk_layout,
            allocator: Arc::clone(&config.chunk_allocator),
            blocks: (0..config.max_meta_blocks).map(|_| OnceLock::new()).collect(),
            free_list: SegQueue::new(),
            next_id: AtomicU32::new(0),
            capacity,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn slot(&self, id: u32) -> Option<&Slot> {
        let block_idx = id as usize / ENTRIES_PER_BLOCK;
        let slot_idx = id as usize % ENTRIES_PER_BLOCK;
        self.blocks.get(block_idx)?.get().map(|b| &b[slot_idx])
    }

    /// Allocate a new chunk, installing its metadata block lazily if this
    /// is the first use of that region of the id space.
    pub fn allocate(&self) -> Result<ChunkHandle> {
        let id = match self.free_list.pop() {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                if id as usize >= self.capacity {
                    self.next_id.fetch_sub(1, Ordering::Relaxed);
                    return Err(EcsError::ChunkCapacityExhausted);
                }
                id
            }
        };

        let block_idx = id as usize / ENTRIES_PER_BLOCK;
        let slot_idx = id as usize % ENTRIES_PER_BLOCK;
        let block = self.blocks[block_idx].get_or_init(new_block);
        let slot = &block[slot_idx];

        // SAFETY: chunk_layout has non-zero size (checked at construction).
        let ptr = unsafe { self.allocator.alloc(self.chunk_layout) }
            .ok_or(EcsError::ChunkCapacityExhausted)?;
        slot.ptr.store(ptr.as_ptr(), Ordering::Release);

        let mut packed = slot.packed.load(Ordering::Acquire);
        loop {
            let next_version = Slot::version(packed).wrapping_add(1).max(1);
            let new_packed = Slot::pack(next_version, 0);
            match slot.packed.compare_exchange_weak(
                packed,
                new_packed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(ChunkHandle {
                        id,
                        version: next_version,
                    })
                }
                Err(actual) => packed = actual,
            }
        }
    }

    /// Free a chunk. Fails if any `acquire()` on this handle is still
    /// outstanding; that is a fatal structural-misuse condition (§7), never
    /// a recoverable one, since it means a caller forgot a `release()`.
    pub fn free(&self, handle: ChunkHandle) -> Result<()> {
        let Some(slot) = self.slot(handle.id) else {
            return Ok(()); // stale/never-allocated handle: silent no-op (§7)
        };
        let packed = slot.packed.load(Ordering::Acquire);
        if Slot::version(packed) != handle.version {
            return Ok(()); // stale handle
        }
        if Slot::share_count(packed) != 0 {
            return Err(EcsError::ChunkInUse);
        }

        let ptr = slot.ptr.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !ptr.is_null() {
            // SAFETY: ptr was produced by `self.allocator.alloc(self.chunk_layout)`
            // and has not been freed since (share_count was 0, no concurrent
            // free can have raced past the version check above).
            unsafe {
                std::ptr::write_bytes(ptr, 0, self.chunk_size);
                self.allocator.dealloc(NonNull::new_unchecked(ptr), self.chunk_layout);
            }
        }

        // Bump version so any handle still pointing at this slot becomes stale.
        slot.packed.fetch_add(1u64 << 32, Ordering::AcqRel);
        self.free_list.push(handle.id);
        Ok(())
    }

    /// Borrow a chunk's raw bytes. Returns `None` if `handle` is stale.
    ///
    /// No borrow tracking is performed beyond the version check: callers
    /// must not interleave this with a concurrent `free()` of the same
    /// handle (upheld by the scheduler keeping structural mutation outside
    /// parallel waves).
    pub fn bytes(&self, handle: ChunkHandle) -> Option<&mut [u8]> {
        let slot = self.slot(handle.id)?;
        let packed = slot.packed.load(Ordering::Acquire);
        if Slot::version(packed) != handle.version || handle.version == 0 {
            return None;
        }
        let ptr = slot.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: ptr is valid for chunk_size bytes while the version matches.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, self.chunk_size) })
    }

    /// Take a scoped borrow that prevents `free()` until released. Returns
    /// `false` if `handle` is stale.
    pub fn acquire(&self, handle: ChunkHandle) -> bool {
        let Some(slot) = self.slot(handle.id) else {
            return false;
        };
        let mut packed = slot.packed.load(Ordering::Acquire);
        loop {
            if Slot::version(packed) != handle.version {
                return false;
            }
            let new_packed = Slot::pack(handle.version, Slot::share_count(packed) + 1);
            match slot.packed.compare_exchange_weak(
                packed,
                new_packed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => packed = actual,
            }
        }
    }

    /// Release a borrow taken by `acquire()`. No-op if `handle` is stale.
    pub fn release(&self, handle: ChunkHandle) {
        let Some(slot) = self.slot(handle.id) else {
            return;
        };
        let mut packed = slot.packed.load(Ordering::Acquire);
        loop {
            if Slot::version(packed) != handle.version {
                return;
            }
            let share_count = Slot::share_count(packed);
            debug_assert!(share_count > 0, "release() without a matching acquire()");
            if share_count == 0 {
                return;
            }
            let new_packed = Slot::pack(handle.version, share_count - 1);
            match slot.packed.compare_exchange_weak(
                packed,
                new_packed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => packed = actual,
            }
        }
    }
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        for block_lock in &self.blocks {
            if let Some(block) = block_lock.get() {
                for slot in block.iter() {
                    let ptr = slot.ptr.load(Ordering::Acquire);
                    if !ptr.is_null() {
                        // SAFETY: outstanding pointers were allocated with
                        // `chunk_layout` and not yet deallocated.
                        unsafe {
                            self.allocator
                                .dealloc(NonNull::new_unchecked(ptr), self.chunk_layout);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ChunkManager {
        let config = WorldConfig::default().with_max_meta_blocks(2);
        ChunkManager::new(&config)
    }

    #[test]
    fn allocate_then_bytes_is_zeroed() {
        let mgr = manager();
        let handle = mgr.allocate().unwrap();
        let bytes = mgr.bytes(handle).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
        bytes[0] = 42;
        assert_eq!(mgr.bytes(handle).unwrap()[0], 42);
    }

    #[test]
    fn free_invalidates_handle() {
        let mgr = manager();
        let handle = mgr.allocate().unwrap();
        mgr.free(handle).unwrap();
        assert!(mgr.bytes(handle).is_none());
        assert!(!mgr.acquire(handle));
    }

    #[test]
    fn free_with_outstanding_acquire_fails() {
        let mgr = manager();
        let handle = mgr.allocate().unwrap();
        assert!(mgr.acquire(handle));
        assert_eq!(mgr.free(handle), Err(EcsError::ChunkInUse));
        mgr.release(handle);
        assert!(mgr.free(handle).is_ok());
    }

    #[test]
    fn freed_slot_is_reused_with_bumped_version() {
        let mgr = manager();
        let first = mgr.allocate().unwrap();
        mgr.free(first).unwrap();
        let second = mgr.allocate().unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(first.version, second.version);
        assert!(mgr.bytes(first).is_none());
        assert!(mgr.bytes(second).is_some());
    }

    #[test]
    fn capacity_is_bounded_by_max_meta_blocks() {
        let config = WorldConfig::default().with_max_meta_blocks(1);
        let mgr = ChunkManager::new(&config);
        let mut handles = Vec::new();
        for _ in 0..ENTRIES_PER_BLOCK {
            handles.push(mgr.allocate().unwrap());
        }
        assert_eq!(mgr.allocate(), Err(EcsError::ChunkCapacityExhausted));
    }
}
