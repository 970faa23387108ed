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

//! The coroutine VM seam.
//!
//! The scheduler drives any engine that can spawn resumable coroutines
//! through [`ScriptVm`]. An embedded interpreter binds its state here;
//! [`ScriptedVm`](scripted::ScriptedVm) is the in-crate implementation
//! built from plain closures, used by the tests and the sandbox.

pub mod scripted;

use std::fmt;
use std::hash::Hash;

/// A coroutine engine the scheduler can drive.
///
/// Methods take `&self`: implementations are expected to be cheap
/// handles over interior state, the way an interpreter wraps a single
/// VM pointer.
pub trait ScriptVm: 'static {
    /// Stable identity of a spawned coroutine.
    type Thread: Copy + Eq + Hash + fmt::Debug + 'static;
    /// A spawnable coroutine body. Cloneable so one function can back
    /// many spawns.
    type Function: Clone + 'static;

    /// Creates a fresh suspended coroutine from `function`.
    fn spawn(&self, function: &Self::Function) -> Self::Thread;

    /// Runs the coroutine until it yields, completes, or faults.
    /// `values` is how many values the resumption carries in.
    fn resume(&self, thread: Self::Thread, values: u32) -> Resumption;

    /// Keeps the coroutine alive independent of VM-side collection.
    /// Pins stack: every pin needs a matching unpin.
    fn pin_thread(&self, thread: Self::Thread);

    /// Releases one pin; the VM may reclaim the coroutine at zero.
    fn unpin_thread(&self, thread: Self::Thread);
}

/// What a coroutine did with its timeslice.
#[derive(Debug)]
pub enum Resumption {
    /// Suspended itself, leaving this many values for whoever resumes it.
    Yielded {
        /// Count of yielded values.
        values: u32,
    },
    /// Ran to the end of its body.
    Completed,
    /// Raised an error; the thread is dead.
    Faulted(VmFault),
}

/// A script error surfaced by [`ScriptVm::resume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmFault {
    /// The error message.
    pub message: String,
    /// Call trace at the point of failure, when the VM can produce one.
    pub traceback: Option<String>,
}

impl VmFault {
    /// A fault carrying just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: None,
        }
    }
}

impl fmt::Display for VmFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.traceback {
            Some(traceback) => write!(f, "{}\n{traceback}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Values that can be handed to a coroutine on resume.
///
/// Implementations push onto the VM-side thread and report how many
/// values they left there; the scheduler forwards that count through
/// the next [`ScriptVm::resume`].
pub trait ScriptArgs<V: ScriptVm> {
    /// Pushes the values onto `thread`, returning how many were pushed.
    fn push(self, vm: &V, thread: V::Thread) -> u32;
}

impl<V: ScriptVm> ScriptArgs<V> for () {
    fn push(self, _vm: &V, _thread: V::Thread) -> u32 {
        0
    }
}
