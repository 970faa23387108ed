// Copyright 2025 eraflo
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

//! Slab pool with generational handles.
//!
//! Slots live in slabs that double in size as the pool grows, so growth
//! never moves or reallocates existing slots. Handles carry a generation
//! counter per slot; a handle whose generation no longer matches its slot
//! is stale and reads as absent instead of aliasing the slot's next
//! occupant.

use serde::{Deserialize, Serialize};

/// Sizing parameters for a [`Pool`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Slot count of the first slab. Later slabs double the previous size.
    pub initial: usize,
    /// Hard cap on total slots. `None` grows without bound.
    pub max_items: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial: 16,
            max_items: None,
        }
    }
}

/// Handle to a pooled slot.
///
/// Copyable and cheap; holding one does not keep the slot alive. Accessing
/// a slot that has since been released returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolHandle {
    /// Global slot index across all slabs.
    pub index: u32,
    /// Generation the slot had when this handle was issued.
    pub generation: u32,
}

struct Slot<T> {
    generation: u32,
    live: bool,
    value: T,
}

/// Slab allocator handing out default-initialized values of `T`.
///
/// Released slots are reset to `T::default()` and recycled through a free
/// list, so acquisition is amortized O(1) and values never carry state
/// over from a previous occupant.
pub struct Pool<T: Default> {
    slabs: Vec<Vec<Slot<T>>>,
    /// Global index of each slab's first slot.
    starts: Vec<u32>,
    free: Vec<u32>,
    /// High-water mark: slots below this have been handed out at least once.
    used: u32,
    live: usize,
    max_items: Option<usize>,
    initial: usize,
}

impl<T: Default> Pool<T> {
    /// Creates a pool with the given sizing. The first slab is allocated
    /// up front.
    pub fn new(config: PoolConfig) -> Self {
        let mut pool = Self {
            slabs: Vec::new(),
            starts: Vec::new(),
            free: Vec::new(),
            used: 0,
            live: 0,
            max_items: config.max_items,
            initial: config.initial.max(1),
        };
        pool.grow();
        pool
    }

    /// Creates an unbounded pool whose first slab holds `initial` slots.
    pub fn with_capacity(initial: usize) -> Self {
        Self::new(PoolConfig {
            initial,
            max_items: None,
        })
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no slots are live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total slots across all slabs.
    pub fn capacity(&self) -> usize {
        self.slabs.iter().map(Vec::len).sum()
    }

    /// Acquires a slot holding `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics when the pool is full and `max_items` forbids another slab.
    /// Running a bounded pool dry is a sizing bug, not a runtime condition
    /// to recover from.
    pub fn acquire(&mut self) -> PoolHandle {
        let index = if let Some(index) = self.free.pop() {
            let slot = self.slot_mut(index);
            slot.generation = slot.generation.wrapping_add(1);
            index
        } else {
            if (self.used as usize) == self.capacity() {
                self.grow();
            }
            let index = self.used;
            self.used += 1;
            index
        };
        let slot = self.slot_mut(index);
        slot.live = true;
        self.live += 1;
        PoolHandle {
            index,
            generation: self.slot(index).generation,
        }
    }

    /// Releases a slot, resetting it to `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the slot is already free. A double
    /// release is a use-after-free bug in the caller.
    pub fn release(&mut self, handle: PoolHandle) {
        let slot = match self.lookup_mut(handle) {
            Some(slot) => slot,
            None => panic!(
                "pool release of stale or free handle {}:{}",
                handle.index, handle.generation
            ),
        };
        slot.live = false;
        slot.value = T::default();
        self.live -= 1;
        self.free.push(handle.index);
    }

    /// Shared access to a live slot, `None` when the handle is stale.
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.lookup(handle).map(|slot| &slot.value)
    }

    /// Mutable access to a live slot, `None` when the handle is stale.
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.lookup_mut(handle).map(|slot| &mut slot.value)
    }

    /// Whether the handle still refers to a live slot.
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.lookup(handle).is_some()
    }

    /// Releases every live slot and invalidates all outstanding handles.
    pub fn clear(&mut self) {
        for index in 0..self.used {
            let slot = self.slot_mut(index);
            if slot.live {
                slot.live = false;
                slot.value = T::default();
            }
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.live = 0;
        self.used = 0;
        self.free.clear();
    }

    /// Asserts that every slot has been released. Teardown check.
    pub fn assert_drained(&self) {
        assert!(
            self.live == 0,
            "pool torn down with {} slot(s) still live",
            self.live
        );
    }

    fn grow(&mut self) {
        let next = match self.slabs.last() {
            Some(last) => last.len() * 2,
            None => self.initial,
        };
        let capacity = self.capacity();
        let next = match self.max_items {
            Some(max) if capacity >= max => panic!(
                "pool exhausted: {} slots live, configured max is {}",
                self.live, max
            ),
            Some(max) => next.min(max - capacity),
            None => next,
        };
        self.starts.push(capacity as u32);
        self.slabs
            .push((0..next).map(|_| Slot::default()).collect());
        log::trace!(
            "pool grew: slab of {} slots, capacity now {}",
            next,
            self.capacity()
        );
    }

    fn locate(&self, index: u32) -> (usize, usize) {
        let slab = self.starts.partition_point(|&start| start <= index) - 1;
        (slab, (index - self.starts[slab]) as usize)
    }

    fn slot(&self, index: u32) -> &Slot<T> {
        let (slab, offset) = self.locate(index);
        &self.slabs[slab][offset]
    }

    fn slot_mut(&mut self, index: u32) -> &mut Slot<T> {
        let (slab, offset) = self.locate(index);
        &mut self.slabs[slab][offset]
    }

    fn lookup(&self, handle: PoolHandle) -> Option<&Slot<T>> {
        if (handle.index as usize) >= self.capacity() {
            return None;
        }
        let slot = self.slot(handle.index);
        (slot.live && slot.generation == handle.generation).then_some(slot)
    }

    fn lookup_mut(&mut self, handle: PoolHandle) -> Option<&mut Slot<T>> {
        if (handle.index as usize) >= self.capacity() {
            return None;
        }
        let slot = self.slot_mut(handle.index);
        (slot.live && slot.generation == handle.generation).then(move || slot)
    }
}

impl<T: Default> Default for Slot<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            live: false,
            value: T::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_slots_never_alias() {
        let mut pool: Pool<u32> = Pool::with_capacity(2);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire(); // forces growth
        *pool.get_mut(a).unwrap() = 1;
        *pool.get_mut(b).unwrap() = 2;
        *pool.get_mut(c).unwrap() = 3;
        assert_eq!(pool.get(a), Some(&1));
        assert_eq!(pool.get(b), Some(&2));
        assert_eq!(pool.get(c), Some(&3));
    }

    #[test]
    fn slabs_double_in_size() {
        let mut pool: Pool<u8> = Pool::with_capacity(4);
        assert_eq!(pool.capacity(), 4);
        for _ in 0..5 {
            pool.acquire();
        }
        assert_eq!(pool.capacity(), 12); // 4 + 8
    }

    #[test]
    fn released_slots_recycle_and_reset() {
        let mut pool: Pool<u32> = Pool::with_capacity(4);
        let a = pool.acquire();
        *pool.get_mut(a).unwrap() = 99;
        pool.release(a);
        assert_eq!(pool.len(), 0);

        let b = pool.acquire();
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert_eq!(pool.get(b), Some(&0));
    }

    #[test]
    fn stale_handles_read_as_absent() {
        let mut pool: Pool<u32> = Pool::with_capacity(4);
        let a = pool.acquire();
        pool.release(a);
        assert!(pool.get(a).is_none());
        let _b = pool.acquire(); // reuses the slot
        assert!(pool.get(a).is_none());
        assert!(!pool.contains(a));
    }

    #[test]
    #[should_panic(expected = "stale or free handle")]
    fn double_release_panics() {
        let mut pool: Pool<u32> = Pool::with_capacity(4);
        let a = pool.acquire();
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn bounded_pool_clamps_final_slab() {
        let mut pool: Pool<u8> = Pool::new(PoolConfig {
            initial: 4,
            max_items: Some(10),
        });
        for _ in 0..10 {
            pool.acquire();
        }
        assert_eq!(pool.capacity(), 10); // 4 + 6, not 4 + 8
    }

    #[test]
    #[should_panic(expected = "pool exhausted")]
    fn bounded_pool_panics_past_max() {
        let mut pool: Pool<u8> = Pool::new(PoolConfig {
            initial: 2,
            max_items: Some(2),
        });
        pool.acquire();
        pool.acquire();
        pool.acquire();
    }

    #[test]
    fn clear_invalidates_outstanding_handles() {
        let mut pool: Pool<u32> = Pool::with_capacity(4);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.clear();
        assert!(pool.is_empty());
        assert!(pool.get(a).is_none());
        assert!(pool.get(b).is_none());
        let c = pool.acquire();
        assert!(pool.contains(c));
    }
}
