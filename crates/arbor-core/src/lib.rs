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

//! # Arbor Core
//!
//! Foundational crate containing the primitives the rest of the engine
//! support library is built from: compile-time string hashing, pooled
//! slot storage with generational handles, multi-lane index chains, and
//! the timeout/forwarder timer subsystem.

#![warn(missing_docs)]

pub mod collections;
pub mod hash;
pub mod memory;
pub mod time;

pub use hash::StringHash;
pub use memory::pool::{Pool, PoolHandle};
pub use time::timer::Timer;
