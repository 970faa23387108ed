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

//! Batch-scoped pool acquisition.
//!
//! Scratch objects created while servicing one call (a script invocation,
//! a frame of UI build-up) share a lifetime: they all die when the call
//! ends. A [`DisposalGroup`] collects the release work and runs it in one
//! sweep; [`RecyclingPool`] is a pool facade whose acquisitions register
//! themselves with a group instead of requiring individual releases.

use std::cell::RefCell;
use std::rc::Rc;

use super::pool::{Pool, PoolConfig, PoolHandle};

/// An ordered batch of deferred disposals.
///
/// Disposals run in registration order when the group is disposed or
/// dropped. Disposing twice is a no-op.
#[derive(Default)]
pub struct DisposalGroup {
    disposals: Vec<Box<dyn FnOnce()>>,
}

impl DisposalGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a disposal to run when the group is disposed.
    pub fn register(&mut self, disposal: impl FnOnce() + 'static) {
        self.disposals.push(Box::new(disposal));
    }

    /// Number of pending disposals.
    pub fn len(&self) -> usize {
        self.disposals.len()
    }

    /// Whether the group holds no pending disposals.
    pub fn is_empty(&self) -> bool {
        self.disposals.is_empty()
    }

    /// Runs and clears every registered disposal, in registration order.
    pub fn dispose(&mut self) {
        for disposal in self.disposals.drain(..) {
            disposal();
        }
    }
}

impl Drop for DisposalGroup {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A shared pool whose slots are released through disposal groups.
///
/// Slots acquired here must only be returned by disposing the group they
/// were registered with; releasing them by hand as well would be a double
/// release.
pub struct RecyclingPool<T: Default + 'static> {
    pool: Rc<RefCell<Pool<T>>>,
}

impl<T: Default + 'static> Clone for RecyclingPool<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Rc::clone(&self.pool),
        }
    }
}

impl<T: Default + 'static> RecyclingPool<T> {
    /// Creates a recycling pool with the given sizing.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            pool: Rc::new(RefCell::new(Pool::new(config))),
        }
    }

    /// Acquires a slot and registers its release with `group`.
    pub fn acquire(&self, group: &mut DisposalGroup) -> PoolHandle {
        let handle = self.pool.borrow_mut().acquire();
        let pool = Rc::clone(&self.pool);
        group.register(move || pool.borrow_mut().release(handle));
        handle
    }

    /// Reads a slot through a closure. `None` when the handle is stale.
    pub fn read<R>(&self, handle: PoolHandle, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.pool.borrow().get(handle).map(f)
    }

    /// Mutates a slot through a closure. `None` when the handle is stale.
    pub fn write<R>(&self, handle: PoolHandle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.pool.borrow_mut().get_mut(handle).map(f)
    }

    /// Number of live slots in the underlying pool.
    pub fn len(&self) -> usize {
        self.pool.borrow().len()
    }

    /// Whether the underlying pool has no live slots.
    pub fn is_empty(&self) -> bool {
        self.pool.borrow().is_empty()
    }
}
