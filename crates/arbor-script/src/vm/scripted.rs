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

//! A deterministic coroutine engine built from plain closures.
//!
//! Where an interpreter would suspend on a `yield` opcode, a
//! [`ScriptedVm`] "coroutine" is a closure returning a [`Step`] per
//! resume. That keeps scheduler, clock, and context tests free of any
//! interpreter while exercising the same lifecycle: spawn, resume,
//! yield values in and out, pin, fault.

use std::cell::RefCell;
use std::rc::Rc;

use arbor_core::memory::{Pool, PoolHandle};

use super::{Resumption, ScriptArgs, ScriptVm, VmFault};

/// What a scripted coroutine does with one resume.
#[derive(Debug, Clone)]
pub enum Step {
    /// Suspend, leaving this many values for the next resume to report.
    Yield(u32),
    /// Return normally.
    Finish,
    /// Raise an error with this message.
    Fail(String),
}

type StepFn = Box<dyn FnMut(u32) -> Step>;

/// A spawnable coroutine body: a factory producing one fresh step
/// closure per spawn, so a single function can back many threads.
#[derive(Clone)]
pub struct ScriptFunction(Rc<dyn Fn() -> StepFn>);

impl ScriptFunction {
    /// Wraps a factory of step closures. Each spawn calls the factory
    /// once; the closure it returns is resumed with the incoming value
    /// count until it stops yielding.
    pub fn new(factory: impl Fn() -> StepFn + 'static) -> Self {
        Self(Rc::new(factory))
    }

    /// A function that replays a fixed step sequence, then finishes.
    /// Every spawn starts over from the first step.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self::new(move || {
            let mut remaining = steps.clone().into_iter();
            Box::new(move |_values| remaining.next().unwrap_or(Step::Finish))
        })
    }

    fn instantiate(&self) -> StepFn {
        (self.0)()
    }
}

/// Identity of a spawned scripted coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptedThread(PoolHandle);

#[derive(Default)]
struct ThreadCell {
    /// Taken out while the closure runs; `None` with `finished` unset
    /// means the thread is mid-resume.
    script: Option<StepFn>,
    pins: u32,
    finished: bool,
    pushed: Vec<i32>,
}

struct VmInner {
    threads: Pool<ThreadCell>,
}

/// The closure-backed coroutine engine. Cheap to clone; all clones
/// share one thread pool.
#[derive(Clone)]
pub struct ScriptedVm {
    inner: Rc<RefCell<VmInner>>,
}

impl Default for ScriptedVm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedVm {
    /// Creates an engine with no live threads.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(VmInner {
                threads: Pool::with_capacity(8),
            })),
        }
    }

    /// Records a value as pushed onto `thread`, the scripted stand-in
    /// for an interpreter stack push.
    ///
    /// # Panics
    ///
    /// Panics if the thread is dead.
    pub fn push_value(&self, thread: ScriptedThread, value: i32) {
        let mut inner = self.inner.borrow_mut();
        match inner.threads.get_mut(thread.0) {
            Some(cell) => Vec::push(&mut cell.pushed, value),
            None => panic!("push to a dead scripted thread"),
        }
    }

    /// Every value pushed onto `thread` so far, oldest first. Empty for
    /// a dead thread.
    pub fn pushed_values(&self, thread: ScriptedThread) -> Vec<i32> {
        self.inner
            .borrow()
            .threads
            .get(thread.0)
            .map(|cell| cell.pushed.clone())
            .unwrap_or_default()
    }

    /// Number of thread slots still held live by pins.
    pub fn live_threads(&self) -> usize {
        self.inner.borrow().threads.len()
    }
}

impl ScriptVm for ScriptedVm {
    type Thread = ScriptedThread;
    type Function = ScriptFunction;

    fn spawn(&self, function: &ScriptFunction) -> ScriptedThread {
        let script = function.instantiate();
        let mut inner = self.inner.borrow_mut();
        let handle = inner.threads.acquire();
        inner
            .threads
            .get_mut(handle)
            .expect("freshly acquired thread cell")
            .script = Some(script);
        ScriptedThread(handle)
    }

    fn resume(&self, thread: ScriptedThread, values: u32) -> Resumption {
        let mut script = {
            let mut inner = self.inner.borrow_mut();
            let cell = match inner.threads.get_mut(thread.0) {
                Some(cell) => cell,
                None => return Resumption::Faulted(VmFault::new("resume of a dead thread")),
            };
            if cell.finished {
                return Resumption::Completed;
            }
            match cell.script.take() {
                Some(script) => script,
                None => return Resumption::Faulted(VmFault::new("thread is already running")),
            }
        };

        // No borrow held here: the step closure may call back into this
        // engine or into whatever scheduler is driving it.
        let step = script(values);

        let mut inner = self.inner.borrow_mut();
        match step {
            Step::Yield(values) => {
                // The thread may have been unpinned away mid-step; its
                // yield then reports into the void.
                if let Some(cell) = inner.threads.get_mut(thread.0) {
                    cell.script = Some(script);
                }
                Resumption::Yielded { values }
            }
            Step::Finish => {
                if let Some(cell) = inner.threads.get_mut(thread.0) {
                    cell.finished = true;
                }
                Resumption::Completed
            }
            Step::Fail(message) => {
                if let Some(cell) = inner.threads.get_mut(thread.0) {
                    cell.finished = true;
                }
                Resumption::Faulted(VmFault {
                    message,
                    traceback: Some(String::from("in scripted coroutine")),
                })
            }
        }
    }

    fn pin_thread(&self, thread: ScriptedThread) {
        let mut inner = self.inner.borrow_mut();
        match inner.threads.get_mut(thread.0) {
            Some(cell) => cell.pins += 1,
            None => panic!("pin of a dead scripted thread"),
        }
    }

    fn unpin_thread(&self, thread: ScriptedThread) {
        let mut inner = self.inner.borrow_mut();
        let pins = match inner.threads.get_mut(thread.0) {
            Some(cell) => {
                assert!(cell.pins > 0, "unpin without a matching pin");
                cell.pins -= 1;
                cell.pins
            }
            None => panic!("unpin of a dead scripted thread"),
        };
        if pins == 0 {
            inner.threads.release(thread.0);
        }
    }
}

/// A single integer argument.
impl ScriptArgs<ScriptedVm> for i32 {
    fn push(self, vm: &ScriptedVm, thread: ScriptedThread) -> u32 {
        vm.push_value(thread, self);
        1
    }
}

/// A variable number of integer arguments.
impl ScriptArgs<ScriptedVm> for Vec<i32> {
    fn push(self, vm: &ScriptedVm, thread: ScriptedThread) -> u32 {
        let count = self.len() as u32;
        for value in self {
            vm.push_value(thread, value);
        }
        count
    }
}
