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

//! Deferred callback delivery with per-key deduplication.
//!
//! A [`DeferredQueue`] holds at most one callback per key: scheduling a
//! key again before the flush replaces the earlier callback. That
//! collapses bursts of notifications about the same subject into one
//! delivery, at the cost of dropping the intermediate ones. Callbacks
//! run in ascending key order at [`DeferredQueue::flush`].

use std::collections::BTreeMap;
use std::mem;

type Appointment = Box<dyn FnOnce()>;

/// A key-deduplicated batch of pending callbacks.
#[derive(Default)]
pub struct DeferredQueue {
    appointments: BTreeMap<u64, Appointment>,
}

impl DeferredQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `callback` under `key`, replacing any callback already
    /// queued for it.
    pub fn schedule(&mut self, key: u64, callback: impl FnOnce() + 'static) {
        self.appointments.insert(key, Box::new(callback));
    }

    /// Drops the callback queued under `key`, if any.
    pub fn cancel(&mut self, key: u64) {
        self.appointments.remove(&key);
    }

    /// Runs every queued callback in ascending key order and clears
    /// the queue.
    ///
    /// An owner that wants flushing callbacks to schedule follow-ups
    /// takes the whole queue out first and flushes the taken batch;
    /// re-schedules then accumulate in the replacement for the next
    /// round.
    pub fn flush(&mut self) {
        let batch = mem::take(&mut self.appointments);
        for (_key, callback) in batch {
            callback();
        }
    }

    /// Number of queued callbacks.
    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }
}

impl Drop for DeferredQueue {
    /// Pending callbacks are delivered, not dropped, on teardown.
    fn drop(&mut self) {
        self.flush();
    }
}
