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

//! # Arbor Script
//!
//! Cooperative scripting runtime: a round-robin scheduler for
//! coroutine-style script threads over a pluggable VM, clock bindings
//! that park threads on timers, hierarchical script contexts, and a
//! tween system for interpolated values driven from the same frame
//! loop.
//!
//! The whole crate is single-threaded. Handles are cheap clones over
//! shared state, and every callback runs with no internal borrow held,
//! so scripts are free to call back into the scheduler, the clock, or
//! the tween system mid-slice.

#![warn(missing_docs)]

pub mod clock;
pub mod context;
pub mod deferred;
pub mod scheduler;
pub mod tween;
pub mod vm;

pub use clock::ScriptClock;
pub use context::ScriptContext;
pub use deferred::DeferredQueue;
pub use scheduler::{ScheduledCallback, Scheduler, ScriptThreadId};
pub use tween::{
    Ease, Lerp, Tween, TweenDuration, TweenEase, TweenGroup, TweenSequence, TweenSystem, TweenTo,
};
pub use vm::{Resumption, ScriptArgs, ScriptVm, VmFault};
