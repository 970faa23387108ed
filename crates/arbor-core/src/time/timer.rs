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

//! Callback timer with pause, speed scaling, and nested sub-clocks.
//!
//! A [`Timer`] accumulates scaled wall time fed to [`Timer::update`] and
//! fires scheduled callbacks when their millisecond deadline passes.
//! Repeating timeouts advance their deadline by the original interval, so
//! a 1.0s interval updated in 0.4s steps fires at 1.0s, 2.0s, 3.0s of
//! clock time rather than drifting to 1.2s, 2.2s, 3.2s.
//!
//! The handle is cheap to clone and all methods take `&self`; callbacks
//! may schedule and cancel timeouts on the timer that is firing them. No
//! internal borrow is held while a callback runs.
//!
//! Forwarders receive each update's already-scaled delta, which is how
//! sub-clocks nest: a child timer registered as a forwarder of its parent
//! inherits the parent's pause state and speed on top of its own.

use std::cell::RefCell;
use std::rc::Rc;

use crate::collections::chain::{Chain, Linked, Links};
use crate::memory::pool::{Pool, PoolHandle};

const MILLISECONDS_PER_SECOND: f64 = 1000.0;

/// Handle to a scheduled timeout. Stale after the timeout fires (one-shot)
/// or is cancelled; operations on a stale id are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(PoolHandle);

/// Handle to a registered time forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForwarderId(PoolHandle);

struct TimeoutSlot {
    links: Links<1>,
    interval_ms: i64,
    fires_at_ms: i64,
    repeats: bool,
    /// Set once the timeout has been cancelled; a detached slot may still
    /// sit in the pending chain until the current scan finishes.
    detached: bool,
    fire: Option<Box<dyn FnMut()>>,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Default for TimeoutSlot {
    fn default() -> Self {
        Self {
            links: Links::default(),
            interval_ms: 0,
            fires_at_ms: 0,
            repeats: false,
            detached: false,
            fire: None,
            cancel: None,
        }
    }
}

impl Linked<1> for TimeoutSlot {
    fn links(&self) -> &Links<1> {
        &self.links
    }
    fn links_mut(&mut self) -> &mut Links<1> {
        &mut self.links
    }
}

struct ForwarderSlot {
    links: Links<1>,
    forward: Option<Box<dyn FnMut(f64)>>,
}

impl Default for ForwarderSlot {
    fn default() -> Self {
        Self {
            links: Links::default(),
            forward: None,
        }
    }
}

impl Linked<1> for ForwarderSlot {
    fn links(&self) -> &Links<1> {
        &self.links
    }
    fn links_mut(&mut self) -> &mut Links<1> {
        &mut self.links
    }
}

struct TimerInner {
    timeouts: Pool<TimeoutSlot>,
    pending: Chain,
    forwarders: Pool<ForwarderSlot>,
    forward_chain: Chain,
    clock_seconds: f64,
    running: bool,
    speed: f64,
    /// The timeout whose fire callback is currently on the stack.
    processing: Option<PoolHandle>,
}

/// A pausable, speed-scalable callback clock.
#[derive(Clone)]
pub struct Timer {
    inner: Rc<RefCell<TimerInner>>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a running timer at speed 1.0 with its clock at zero.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerInner {
                timeouts: Pool::with_capacity(16),
                pending: Chain::new(0),
                forwarders: Pool::with_capacity(4),
                forward_chain: Chain::new(0),
                clock_seconds: 0.0,
                running: true,
                speed: 1.0,
                processing: None,
            })),
        }
    }

    /// Schedules a one-shot callback `seconds` from the current clock.
    pub fn set_timeout(&self, seconds: f64, fire: impl FnMut() + 'static) -> TimeoutId {
        self.schedule(seconds, false, fire, None)
    }

    /// Schedules a repeating callback every `seconds` of clock time.
    pub fn set_interval(&self, seconds: f64, fire: impl FnMut() + 'static) -> TimeoutId {
        self.schedule(seconds, true, fire, None)
    }

    /// Schedules a callback with full control over repetition and an
    /// optional cancellation callback.
    ///
    /// The cancel callback runs exactly once if the timeout is cancelled
    /// before (or instead of) firing to completion. A one-shot timeout
    /// that fires naturally never runs it.
    pub fn schedule(
        &self,
        seconds: f64,
        repeats: bool,
        fire: impl FnMut() + 'static,
        cancel: Option<Box<dyn FnOnce()>>,
    ) -> TimeoutId {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let handle = inner.timeouts.acquire();
        let slot = inner
            .timeouts
            .get_mut(handle)
            .expect("freshly acquired timeout slot");
        slot.interval_ms = (seconds * MILLISECONDS_PER_SECOND) as i64;
        slot.fires_at_ms = ((seconds + inner.clock_seconds) * MILLISECONDS_PER_SECOND) as i64;
        slot.repeats = repeats;
        slot.fire = Some(Box::new(fire));
        slot.cancel = cancel;
        inner.pending.push_back(&mut inner.timeouts, handle);
        log::trace!(
            "timeout scheduled: fires at {}ms, repeats: {}",
            slot_fires_at(&inner.timeouts, handle),
            repeats
        );
        TimeoutId(handle)
    }

    /// Cancels a timeout, running its cancel callback if one was given.
    ///
    /// Idempotent: cancelling an already-cancelled or already-elapsed id
    /// does nothing. Cancelling the timeout from inside its own fire
    /// callback clears its repeat flag and lets the current scan remove
    /// it.
    pub fn cancel(&self, id: TimeoutId) {
        let cancel_cb;
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let during_processing = inner.processing == Some(id.0);
            match inner.timeouts.get_mut(id.0) {
                Some(slot) if !slot.detached => {
                    slot.detached = true;
                    cancel_cb = slot.cancel.take();
                    if during_processing {
                        slot.repeats = false;
                    }
                }
                _ => return,
            }
            if !during_processing {
                inner.pending.remove_if_present(&mut inner.timeouts, id.0);
                inner.timeouts.release(id.0);
            }
        }
        log::trace!("timeout cancelled");
        if let Some(cb) = cancel_cb {
            cb();
        }
    }

    /// Whether `id` still refers to a scheduled, uncancelled timeout.
    pub fn is_scheduled(&self, id: TimeoutId) -> bool {
        self.inner
            .borrow()
            .timeouts
            .get(id.0)
            .map(|slot| !slot.detached)
            .unwrap_or(false)
    }

    /// Advances the clock and fires due timeouts, then forwarders.
    ///
    /// The delta is scaled by the current speed, or to zero while paused;
    /// a zero scaled delta leaves the timer untouched (forwarders
    /// included), which is what freezes an entire sub-clock tree when an
    /// ancestor pauses. Timeouts scheduled by a fire callback land at the
    /// back of the pending scan and are visited by it when already due.
    pub fn update(&self, delta_seconds: f64) {
        let scaled;
        let now_ms;
        let mut cursor;
        {
            let mut inner = self.inner.borrow_mut();
            let factor = if inner.running { inner.speed } else { 0.0 };
            scaled = delta_seconds * factor;
            if scaled == 0.0 {
                return;
            }
            inner.clock_seconds += scaled;
            now_ms = (inner.clock_seconds * MILLISECONDS_PER_SECOND) as i64;
            cursor = inner.pending.front();
        }

        let mut elapsed: Vec<PoolHandle> = Vec::new();
        while let Some(handle) = cursor {
            let fire = {
                let mut inner = self.inner.borrow_mut();
                let due = inner
                    .timeouts
                    .get(handle)
                    .map(|slot| slot.fires_at_ms <= now_ms)
                    .unwrap_or(false);
                if due {
                    inner.processing = Some(handle);
                    inner
                        .timeouts
                        .get_mut(handle)
                        .and_then(|slot| slot.fire.take())
                } else {
                    None
                }
            };
            if let Some(mut fire_fn) = fire {
                fire_fn();
                let mut inner = self.inner.borrow_mut();
                inner.processing = None;
                if let Some(slot) = inner.timeouts.get_mut(handle) {
                    if slot.fire.is_none() {
                        slot.fire = Some(fire_fn);
                    }
                    if slot.repeats {
                        slot.fires_at_ms += slot.interval_ms;
                    } else {
                        elapsed.push(handle);
                    }
                }
            }
            // The successor is read after the callback so that links
            // rewired by cancellations made during it are honored.
            let inner = self.inner.borrow();
            cursor = inner.pending.next_of(&inner.timeouts, handle);
        }

        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            for handle in elapsed {
                inner.pending.remove_if_present(&mut inner.timeouts, handle);
                if inner.timeouts.contains(handle) {
                    inner.timeouts.release(handle);
                }
            }
        }

        cursor = self.inner.borrow().forward_chain.front();
        while let Some(handle) = cursor {
            let forward = {
                let mut inner = self.inner.borrow_mut();
                inner
                    .forwarders
                    .get_mut(handle)
                    .and_then(|slot| slot.forward.take())
            };
            if let Some(mut forward_fn) = forward {
                forward_fn(scaled);
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner.forwarders.get_mut(handle) {
                    if slot.forward.is_none() {
                        slot.forward = Some(forward_fn);
                    }
                }
            }
            let inner = self.inner.borrow();
            cursor = inner.forward_chain.next_of(&inner.forwarders, handle);
        }
    }

    /// Registers a forwarder that receives every update's scaled delta.
    pub fn add_forwarder(&self, forward: impl FnMut(f64) + 'static) -> ForwarderId {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let handle = inner.forwarders.acquire();
        inner
            .forwarders
            .get_mut(handle)
            .expect("freshly acquired forwarder slot")
            .forward = Some(Box::new(forward));
        inner.forward_chain.push_back(&mut inner.forwarders, handle);
        ForwarderId(handle)
    }

    /// Unregisters a forwarder. No-op on a stale id.
    pub fn remove_forwarder(&self, id: ForwarderId) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner
            .forward_chain
            .remove_if_present(&mut inner.forwarders, id.0);
        if inner.forwarders.contains(id.0) {
            inner.forwarders.release(id.0);
        }
    }

    /// Stops the clock. Updates become no-ops until [`Timer::resume`].
    pub fn pause(&self) {
        self.inner.borrow_mut().running = false;
    }

    /// Restarts a paused clock.
    pub fn resume(&self) {
        self.inner.borrow_mut().running = true;
    }

    /// Whether the clock is currently advancing.
    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    /// Scales every subsequent delta. 1.0 is real time.
    pub fn set_speed(&self, speed: f64) {
        self.inner.borrow_mut().speed = speed;
    }

    /// The current delta scale.
    pub fn speed(&self) -> f64 {
        self.inner.borrow().speed
    }

    /// Accumulated clock time in seconds.
    pub fn now_seconds(&self) -> f64 {
        self.inner.borrow().clock_seconds
    }

    /// Number of scheduled timeouts, cancelled-but-unswept ones included.
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Cancels every timeout (cancel callbacks fire, batched), drops all
    /// forwarders, and stops the clock. Used on teardown; [`Timer::resume`]
    /// restarts the clock if the timer is reused afterwards.
    pub fn clear_all(&self) {
        let mut cancels = Vec::new();
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let mut cursor = inner.pending.front();
            while let Some(handle) = cursor {
                cursor = inner.pending.next_of(&inner.timeouts, handle);
                if let Some(slot) = inner.timeouts.get_mut(handle) {
                    if !slot.detached {
                        slot.detached = true;
                        if let Some(cb) = slot.cancel.take() {
                            cancels.push(cb);
                        }
                    }
                }
            }
            inner.pending.clear(&mut inner.timeouts);
            inner.timeouts.clear();
            inner.forward_chain.clear(&mut inner.forwarders);
            inner.forwarders.clear();
            inner.running = false;
        }
        log::trace!("timer cleared: {} cancellation(s) to run", cancels.len());
        for cb in cancels {
            cb();
        }
    }
}

fn slot_fires_at(pool: &Pool<TimeoutSlot>, handle: PoolHandle) -> i64 {
    pool.get(handle).map(|slot| slot.fires_at_ms).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn counter() -> (Rc<RefCell<u32>>, impl FnMut() + 'static) {
        let count = Rc::new(RefCell::new(0));
        let inner = Rc::clone(&count);
        (count, move || *inner.borrow_mut() += 1)
    }

    #[test]
    fn one_shot_fires_once_and_expires() {
        let timer = Timer::new();
        let (count, fire) = counter();
        let id = timer.set_timeout(1.0, fire);
        timer.update(0.5);
        assert_eq!(*count.borrow(), 0);
        timer.update(0.5);
        assert_eq!(*count.borrow(), 1);
        assert!(!timer.is_scheduled(id));
        timer.update(5.0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn interval_keeps_phase_across_uneven_updates() {
        let timer = Timer::new();
        let (count, fire) = counter();
        timer.set_interval(1.0, fire);

        timer.update(0.4);
        timer.update(0.4);
        timer.update(0.4); // clock 1.2s: first fire
        assert_eq!(*count.borrow(), 1);

        timer.update(0.4); // 1.6s: next deadline is 2.0s, not 2.2s
        assert_eq!(*count.borrow(), 1);
        timer.update(0.4); // 2.0s
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn cancel_runs_callback_once_and_is_idempotent() {
        let timer = Timer::new();
        let (fired, fire) = counter();
        let cancelled = Rc::new(RefCell::new(0));
        let cancelled_inner = Rc::clone(&cancelled);
        let id = timer.schedule(
            1.0,
            false,
            fire,
            Some(Box::new(move || *cancelled_inner.borrow_mut() += 1)),
        );
        timer.cancel(id);
        timer.cancel(id);
        timer.update(2.0);
        assert_eq!(*fired.borrow(), 0);
        assert_eq!(*cancelled.borrow(), 1);
    }

    #[test]
    fn natural_completion_skips_cancel_callback() {
        let timer = Timer::new();
        let (fired, fire) = counter();
        let cancelled = Rc::new(RefCell::new(0));
        let cancelled_inner = Rc::clone(&cancelled);
        let id = timer.schedule(
            0.5,
            false,
            fire,
            Some(Box::new(move || *cancelled_inner.borrow_mut() += 1)),
        );
        timer.update(1.0);
        timer.cancel(id); // stale by now
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(*cancelled.borrow(), 0);
    }

    #[test]
    fn interval_cancelled_from_its_own_callback_stops() {
        let timer = Timer::new();
        let count = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<TimeoutId>>> = Rc::new(RefCell::new(None));
        let id = {
            let count = Rc::clone(&count);
            let slot = Rc::clone(&slot);
            let timer_handle = timer.clone();
            timer.set_interval(1.0, move || {
                *count.borrow_mut() += 1;
                if let Some(id) = *slot.borrow() {
                    timer_handle.cancel(id);
                }
            })
        };
        *slot.borrow_mut() = Some(id);

        timer.update(1.0);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(timer.pending_count(), 0);
        timer.update(3.0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn paused_timer_freezes_clock_and_forwarders() {
        let timer = Timer::new();
        let forwarded = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&forwarded);
        timer.add_forwarder(move |dt| sink.borrow_mut().push(dt));
        let (count, fire) = counter();
        timer.set_timeout(1.0, fire);

        timer.pause();
        timer.update(10.0);
        assert_eq!(*count.borrow(), 0);
        assert!(forwarded.borrow().is_empty());
        assert_relative_eq!(timer.now_seconds(), 0.0);

        timer.resume();
        timer.update(1.0);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(*forwarded.borrow(), vec![1.0]);
    }

    #[test]
    fn speed_scales_deltas_before_everything() {
        let timer = Timer::new();
        let forwarded = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&forwarded);
        timer.add_forwarder(move |dt| sink.borrow_mut().push(dt));
        let (count, fire) = counter();
        timer.set_timeout(1.0, fire);

        timer.set_speed(2.0);
        timer.update(0.5);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(*forwarded.borrow(), vec![1.0]);
        assert_relative_eq!(timer.now_seconds(), 1.0);
    }

    #[test]
    fn nested_timer_follows_parent_through_forwarder() {
        let parent = Timer::new();
        let child = Timer::new();
        let (count, fire) = counter();
        child.set_timeout(1.0, fire);
        {
            let child = child.clone();
            parent.add_forwarder(move |dt| child.update(dt));
        }

        parent.set_speed(2.0);
        parent.update(0.5); // child sees 1.0
        assert_eq!(*count.borrow(), 1);

        let (count2, fire2) = counter();
        child.set_timeout(1.0, fire2);
        parent.pause();
        parent.update(10.0);
        assert_eq!(*count2.borrow(), 0);
    }

    #[test]
    fn timeout_scheduled_while_due_fires_in_same_scan() {
        let timer = Timer::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log_outer = Rc::clone(&log);
            let timer_handle = timer.clone();
            timer.set_timeout(1.0, move || {
                log_outer.borrow_mut().push("outer");
                let log_inner = Rc::clone(&log_outer);
                timer_handle.set_timeout(0.0, move || {
                    log_inner.borrow_mut().push("inner");
                });
            });
        }
        timer.update(1.0);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn cancelling_another_pending_timeout_mid_scan_skips_it() {
        let timer = Timer::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<TimeoutId>>> = Rc::new(RefCell::new(None));
        {
            let log = Rc::clone(&log);
            let victim = Rc::clone(&victim);
            let timer_handle = timer.clone();
            timer.set_timeout(1.0, move || {
                log.borrow_mut().push("first");
                if let Some(id) = victim.borrow_mut().take() {
                    timer_handle.cancel(id);
                }
            });
        }
        {
            let log = Rc::clone(&log);
            let id = timer.set_timeout(1.0, move || log.borrow_mut().push("second"));
            *victim.borrow_mut() = Some(id);
        }
        timer.update(1.0);
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn clear_all_cancels_everything_and_stops() {
        let timer = Timer::new();
        let (fired, fire) = counter();
        let cancelled = Rc::new(RefCell::new(0));
        let cancelled_inner = Rc::clone(&cancelled);
        timer.schedule(
            1.0,
            true,
            fire,
            Some(Box::new(move || *cancelled_inner.borrow_mut() += 1)),
        );
        timer.clear_all();
        assert_eq!(*cancelled.borrow(), 1);
        assert!(!timer.is_running());
        timer.update(5.0);
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn removed_forwarder_stops_receiving() {
        let timer = Timer::new();
        let forwarded = Rc::new(RefCell::new(0u32));
        let sink = Rc::clone(&forwarded);
        let id = timer.add_forwarder(move |_| *sink.borrow_mut() += 1);
        timer.update(1.0);
        timer.remove_forwarder(id);
        timer.update(1.0);
        assert_eq!(*forwarded.borrow(), 1);
    }
}
