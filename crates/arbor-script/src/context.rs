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

//! Hierarchical script namespaces.
//!
//! A [`ScriptContext`] owns the threads it starts and a bag of named
//! shared objects. Lookups that miss fall through to the parent
//! context, so a child sees everything its ancestors expose while its
//! own names shadow theirs. Tearing a context down, explicitly or by
//! dropping the last handle, kills the threads it started; objects
//! live as long as someone still holds their `Rc`.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::scheduler::{Scheduler, ScriptThreadId};
use crate::vm::ScriptVm;

struct ContextInner<V: ScriptVm> {
    scheduler: Scheduler<V>,
    parent: Option<ScriptContext<V>>,
    objects: HashMap<&'static str, Rc<dyn Any>>,
    threads: Vec<ScriptThreadId>,
}

/// A scope for scripts: named objects with parent fallback, and
/// threads whose lifetime is bound to the scope.
pub struct ScriptContext<V: ScriptVm> {
    inner: Rc<RefCell<ContextInner<V>>>,
}

impl<V: ScriptVm> Clone for ScriptContext<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: ScriptVm> ScriptContext<V> {
    /// Creates a context scheduling its threads on `scheduler`, with
    /// lookups falling through to `parent` when given.
    pub fn new(scheduler: Scheduler<V>, parent: Option<&ScriptContext<V>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextInner {
                scheduler,
                parent: parent.cloned(),
                objects: HashMap::new(),
                threads: Vec::new(),
            })),
        }
    }

    /// A child context inheriting this one's scheduler and falling
    /// through to it on lookups.
    pub fn create_child(&self) -> ScriptContext<V> {
        ScriptContext::new(self.scheduler(), Some(self))
    }

    /// The scheduler this context spawns onto.
    pub fn scheduler(&self) -> Scheduler<V> {
        self.inner.borrow().scheduler.clone()
    }

    /// Exposes `object` to this context and its descendants under
    /// `name`, shadowing any `name` an ancestor exposes.
    pub fn add_object<T: 'static>(&self, name: &'static str, object: Rc<T>) {
        self.inner.borrow_mut().objects.insert(name, object);
    }

    /// Looks up `name` here and then up the parent chain. `None` when
    /// no context in the chain exposes it.
    ///
    /// # Panics
    ///
    /// Panics if the nearest `name` is an object of another type;
    /// shadowing across types is a wiring bug, not a miss.
    pub fn find_object<T: 'static>(&self, name: &'static str) -> Option<Rc<T>> {
        let mut cursor = Some(self.clone());
        while let Some(context) = cursor {
            let inner = context.inner.borrow();
            if let Some(object) = inner.objects.get(name) {
                let object = Rc::clone(object);
                drop(inner);
                return match object.downcast::<T>() {
                    Ok(object) => Some(object),
                    Err(_) => panic!("context object {name:?} has another type"),
                };
            }
            cursor = inner.parent.clone();
        }
        None
    }

    /// Like [`ScriptContext::find_object`], but a miss is a panic.
    pub fn object<T: 'static>(&self, name: &'static str) -> Rc<T> {
        match self.find_object(name) {
            Some(object) => object,
            None => panic!("no context object {name:?}"),
        }
    }

    /// Spawns `function` running on the scheduler and ties the thread's
    /// lifetime to this context.
    pub fn run(&self, function: &V::Function) -> ScriptThreadId {
        let scheduler = self.scheduler();
        let thread = scheduler.spawn(function, true);
        let mut inner = self.inner.borrow_mut();
        inner.threads.retain(|id| scheduler.is_alive(*id));
        inner.threads.push(thread);
        thread
    }

    /// Kills every thread this context started. A thread currently
    /// running its slice is spared and runs to its own completion.
    pub fn shutdown(&self) {
        let (scheduler, threads) = {
            let mut inner = self.inner.borrow_mut();
            (inner.scheduler.clone(), mem::take(&mut inner.threads))
        };
        kill_tracked(&scheduler, threads);
    }
}

impl<V: ScriptVm> Drop for ContextInner<V> {
    fn drop(&mut self) {
        let threads = mem::take(&mut self.threads);
        kill_tracked(&self.scheduler, threads);
    }
}

fn kill_tracked<V: ScriptVm>(scheduler: &Scheduler<V>, threads: Vec<ScriptThreadId>) {
    for thread in threads {
        // The context may be torn down from one of its own threads;
        // that thread cannot be killed mid-slice.
        if scheduler.current() == Some(thread) {
            continue;
        }
        scheduler.kill(thread);
    }
}
