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

//! Cooperative scheduling of script coroutines.
//!
//! A [`Scheduler`] owns every coroutine handed to it and advances the
//! running ones once per [`Scheduler::update`]. Pause and resume
//! requests are batched: they take effect at the start of the next
//! update, pauses first, so a thread paused and resumed in the same
//! frame nets out to running. Freshly resumed threads are admitted at
//! the front of the running order, newest first.
//!
//! A slice ends when the coroutine yields. The values it yielded are
//! carried back in on its next resume, which is how `wait`-style calls
//! built on [`Scheduler::pause`] round-trip data. Threads that complete
//! or fault are reaped at the end of the update that observed it, after
//! every surviving thread has had its slice.
//!
//! The handle is cheap to clone and all methods take `&self`. No
//! internal borrow is held while the VM runs a slice, so scripts are
//! free to spawn, pause, resume, and kill other threads from inside
//! their own.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use arbor_core::collections::{Chain, Linked, Links};
use arbor_core::memory::{Pool, PoolHandle};

use crate::vm::{Resumption, ScriptArgs, ScriptVm};

const RUNNING: usize = 0;
const PAUSING: usize = 1;
const RESUMING: usize = 2;

/// Handle to a scheduled script thread. Stale once the thread is
/// killed or has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptThreadId(PoolHandle);

struct ThreadSlot<V: ScriptVm> {
    links: Links<3>,
    vm_thread: Option<V::Thread>,
    /// Count of values the next resume carries in. A yield overwrites
    /// it with the count the coroutine left behind.
    resume_values: u32,
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl<V: ScriptVm> Default for ThreadSlot<V> {
    fn default() -> Self {
        Self {
            links: Links::default(),
            vm_thread: None,
            resume_values: 0,
            cleanup: None,
        }
    }
}

impl<V: ScriptVm> Linked<3> for ThreadSlot<V> {
    fn links(&self) -> &Links<3> {
        &self.links
    }
    fn links_mut(&mut self) -> &mut Links<3> {
        &mut self.links
    }
}

struct SchedulerInner<V: ScriptVm> {
    threads: Pool<ThreadSlot<V>>,
    running: Chain,
    pausing: Chain,
    resuming: Chain,
    by_vm: HashMap<V::Thread, PoolHandle>,
    /// The thread whose slice is on the stack during an update walk.
    current: Option<PoolHandle>,
}

/// A cooperative scheduler over coroutines of the VM `V`.
pub struct Scheduler<V: ScriptVm> {
    vm: Rc<V>,
    inner: Rc<RefCell<SchedulerInner<V>>>,
}

impl<V: ScriptVm> Clone for Scheduler<V> {
    fn clone(&self) -> Self {
        Self {
            vm: Rc::clone(&self.vm),
            inner: Rc::clone(&self.inner),
        }
    }
}

/// A script entry point packaged for an event source: `invoke` spawns
/// and starts one fresh thread per call, `cancel` invalidates `invoke`.
///
/// The spawned thread runs on the scheduler's next update, never inside
/// `invoke` itself, so event sources can fire from anywhere without
/// reentering script code.
pub struct ScheduledCallback<A = ()> {
    /// Spawns a thread running the packaged function with `A` pushed as
    /// its arguments.
    ///
    /// # Panics
    ///
    /// Panics if called after `cancel`.
    pub invoke: Box<dyn FnMut(A)>,
    /// Invalidates `invoke`. Threads already spawned keep running.
    pub cancel: Box<dyn FnOnce()>,
}

impl<V: ScriptVm> Scheduler<V> {
    /// Creates a scheduler driving coroutines of `vm`.
    pub fn new(vm: V) -> Self {
        Self {
            vm: Rc::new(vm),
            inner: Rc::new(RefCell::new(SchedulerInner {
                threads: Pool::with_capacity(16),
                running: Chain::new(RUNNING),
                pausing: Chain::new(PAUSING),
                resuming: Chain::new(RESUMING),
                by_vm: HashMap::new(),
                current: None,
            })),
        }
    }

    /// The VM this scheduler drives.
    pub fn vm(&self) -> &V {
        &self.vm
    }

    /// Spawns a coroutine from `function` and schedules it. With `run`
    /// set it takes its first slice on the next update; otherwise it
    /// sits paused until resumed.
    pub fn spawn(&self, function: &V::Function, run: bool) -> ScriptThreadId {
        let vm_thread = self.vm.spawn(function);
        let id = self.adopt(vm_thread, run);
        log::trace!("script thread spawned, run: {run}");
        id
    }

    /// Takes ownership of a coroutine spawned elsewhere, pinning it in
    /// the VM until the thread is killed.
    pub fn adopt(&self, vm_thread: V::Thread, run: bool) -> ScriptThreadId {
        self.vm.pin_thread(vm_thread);
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let handle = inner.threads.acquire();
        inner
            .threads
            .get_mut(handle)
            .expect("freshly acquired thread slot")
            .vm_thread = Some(vm_thread);
        inner.by_vm.insert(vm_thread, handle);
        if run {
            inner.resuming.push_back(&mut inner.threads, handle);
        }
        ScriptThreadId(handle)
    }

    /// Requests that `thread` skip further slices, effective at the
    /// start of the next update.
    ///
    /// # Panics
    ///
    /// Panics on a dead thread.
    pub fn pause(&self, thread: ScriptThreadId) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        assert!(
            inner.threads.contains(thread.0),
            "pause of a dead script thread"
        );
        inner.pausing.push_back(&mut inner.threads, thread.0);
    }

    /// Requests that `thread` run again, effective at the start of the
    /// next update. The values of its last yield are carried back in.
    ///
    /// # Panics
    ///
    /// Panics on a dead thread.
    pub fn resume(&self, thread: ScriptThreadId) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        assert!(
            inner.threads.contains(thread.0),
            "resume of a dead script thread"
        );
        inner.resuming.push_back(&mut inner.threads, thread.0);
    }

    /// Like [`Scheduler::resume`], but the next slice reports `values`
    /// incoming values instead of the count from the last yield.
    pub fn resume_with(&self, thread: ScriptThreadId, values: u32) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let slot = match inner.threads.get_mut(thread.0) {
            Some(slot) => slot,
            None => panic!("resume of a dead script thread"),
        };
        slot.resume_values = values;
        inner.resuming.push_back(&mut inner.threads, thread.0);
    }

    /// Applies pending pauses and resumes, then gives every running
    /// thread one slice, newest admissions first.
    ///
    /// Threads that complete are killed after the walk; a faulting
    /// thread is logged and killed the same way without disturbing the
    /// others. Pauses, resumes, and spawns made by the slices
    /// themselves take effect next update.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a script thread.
    pub fn update(&self) {
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            assert!(
                inner.current.is_none(),
                "scheduler update from inside a script thread"
            );

            let mut cursor = inner.pausing.front();
            while let Some(handle) = cursor {
                cursor = inner.pausing.next_of(&inner.threads, handle);
                inner.running.remove_if_present(&mut inner.threads, handle);
            }
            inner.pausing.clear(&mut inner.threads);

            let mut cursor = inner.resuming.front();
            while let Some(handle) = cursor {
                cursor = inner.resuming.next_of(&inner.threads, handle);
                inner.running.push_front(&mut inner.threads, handle);
            }
            inner.resuming.clear(&mut inner.threads);
        }

        let mut dead: Vec<PoolHandle> = Vec::new();
        let mut cursor = self.inner.borrow().running.front();
        while let Some(handle) = cursor {
            let (vm_thread, values) = {
                let mut inner = self.inner.borrow_mut();
                inner.current = Some(handle);
                let slot = match inner.threads.get(handle) {
                    Some(slot) => slot,
                    None => panic!("running chain holds a released thread slot"),
                };
                let vm_thread = match slot.vm_thread {
                    Some(vm_thread) => vm_thread,
                    None => panic!("script thread slot lost its coroutine"),
                };
                (vm_thread, slot.resume_values)
            };

            let resumption = self.vm.resume(vm_thread, values);

            let mut inner = self.inner.borrow_mut();
            match resumption {
                Resumption::Yielded { values } => {
                    if let Some(slot) = inner.threads.get_mut(handle) {
                        slot.resume_values = values;
                    }
                }
                Resumption::Completed => dead.push(handle),
                Resumption::Faulted(fault) => {
                    log::error!("script thread faulted: {fault}");
                    dead.push(handle);
                }
            }
            // The successor is read after the slice so that links
            // rewired by kills made during it are honored.
            cursor = inner.running.next_of(&inner.threads, handle);
        }

        self.inner.borrow_mut().current = None;
        for handle in dead {
            self.kill(ScriptThreadId(handle));
        }
    }

    /// Unschedules and destroys `thread`, running its cleanup callback
    /// if one is set, then releasing the VM pin. No-op on a dead
    /// thread.
    ///
    /// # Panics
    ///
    /// Panics if `thread` is the one currently running its slice; a
    /// script cannot kill itself.
    pub fn kill(&self, thread: ScriptThreadId) {
        let (cleanup, vm_thread) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if !inner.threads.contains(thread.0) {
                return;
            }
            assert!(
                inner.current != Some(thread.0),
                "a script thread cannot be killed while it is running"
            );
            inner.running.remove_if_present(&mut inner.threads, thread.0);
            inner.pausing.remove_if_present(&mut inner.threads, thread.0);
            inner
                .resuming
                .remove_if_present(&mut inner.threads, thread.0);
            let slot = match inner.threads.get_mut(thread.0) {
                Some(slot) => slot,
                None => panic!("live thread slot vanished"),
            };
            let cleanup = slot.cleanup.take();
            let vm_thread = match slot.vm_thread.take() {
                Some(vm_thread) => vm_thread,
                None => panic!("script thread slot lost its coroutine"),
            };
            inner.by_vm.remove(&vm_thread);
            inner.threads.release(thread.0);
            (cleanup, vm_thread)
        };
        log::trace!("script thread killed");
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        self.vm.unpin_thread(vm_thread);
    }

    /// Kills every scheduled thread, cleanups included.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a script thread.
    pub fn shutdown(&self) {
        let handles: Vec<PoolHandle> = {
            let guard = self.inner.borrow();
            assert!(
                guard.current.is_none(),
                "scheduler shutdown from inside a script thread"
            );
            guard.by_vm.values().copied().collect()
        };
        log::debug!("scheduler shutdown: {} thread(s) to kill", handles.len());
        for handle in handles {
            self.kill(ScriptThreadId(handle));
        }
    }

    /// Registers `cleanup` to run exactly once when `thread` is killed
    /// or completes.
    ///
    /// # Panics
    ///
    /// Panics on a dead thread, and if a cleanup callback is already
    /// set; callers layering teardown must clear the old one first.
    pub fn set_cleanup(&self, thread: ScriptThreadId, cleanup: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        let slot = match inner.threads.get_mut(thread.0) {
            Some(slot) => slot,
            None => panic!("cleanup set on a dead script thread"),
        };
        assert!(
            slot.cleanup.is_none(),
            "script thread already has a cleanup callback"
        );
        slot.cleanup = Some(Box::new(cleanup));
    }

    /// Removes the cleanup callback without running it. No-op on a
    /// dead thread or when none is set.
    pub fn clear_cleanup(&self, thread: ScriptThreadId) {
        if let Some(slot) = self.inner.borrow_mut().threads.get_mut(thread.0) {
            slot.cleanup = None;
        }
    }

    /// Packages `function` as a [`ScheduledCallback`]. Each `invoke`
    /// spawns a fresh paused thread, pushes the arguments, and queues
    /// it to run with that many values on the next update.
    pub fn create_callback<A: ScriptArgs<V>>(&self, function: &V::Function) -> ScheduledCallback<A> {
        let spawner = self.clone();
        let function = function.clone();
        let canceled = Rc::new(Cell::new(false));
        let canceled_invoke = Rc::clone(&canceled);
        ScheduledCallback {
            invoke: Box::new(move |args: A| {
                assert!(
                    !canceled_invoke.get(),
                    "scheduled callback invoked after cancel"
                );
                let thread = spawner.spawn(&function, false);
                let vm_thread = spawner
                    .vm_thread_of(thread)
                    .expect("freshly spawned script thread");
                let values = args.push(&spawner.vm, vm_thread);
                spawner.resume_with(thread, values);
            }),
            cancel: Box::new(move || canceled.set(true)),
        }
    }

    /// The scheduled thread wrapping `vm_thread`, if any.
    pub fn thread_for(&self, vm_thread: V::Thread) -> Option<ScriptThreadId> {
        self.inner
            .borrow()
            .by_vm
            .get(&vm_thread)
            .copied()
            .map(ScriptThreadId)
    }

    /// The coroutine behind `thread`, `None` once dead.
    pub fn vm_thread_of(&self, thread: ScriptThreadId) -> Option<V::Thread> {
        self.inner
            .borrow()
            .threads
            .get(thread.0)
            .and_then(|slot| slot.vm_thread)
    }

    /// The thread whose slice is currently on the stack, if an update
    /// walk is in progress.
    pub fn current(&self) -> Option<ScriptThreadId> {
        self.inner.borrow().current.map(ScriptThreadId)
    }

    /// Whether `thread` is still scheduled, paused or not.
    pub fn is_alive(&self, thread: ScriptThreadId) -> bool {
        self.inner.borrow().threads.contains(thread.0)
    }

    /// Count of scheduled threads, paused ones included.
    pub fn len(&self) -> usize {
        self.inner.borrow().threads.len()
    }

    /// Whether no threads are scheduled.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().threads.is_empty()
    }
}
