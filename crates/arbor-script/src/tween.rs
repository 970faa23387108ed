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

//! Value interpolation over scripted time.
//!
//! A [`Tween`] maps an absolute time to an effect: [`TweenTo`] writes
//! an interpolated value through a closure, and the combinators reshape
//! time for their children. [`TweenGroup`] runs children in parallel,
//! [`TweenDuration`] stretches them to a fixed length, [`TweenEase`]
//! warps time along a cosine curve, [`TweenSequence`] plays them back
//! to back.
//!
//! The [`TweenSystem`] drives tweens from frame deltas, usually fed by
//! a [`Timer`](arbor_core::time::Timer) forwarder. A tween is complete
//! when an advance no longer moves its clamped time, which is observed
//! one update after it reaches its duration. Change notifications are
//! deduplicated per key through a [`DeferredQueue`] and flushed once
//! per update, after every tween has advanced and before completion
//! callbacks run.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::mem;
use std::rc::Rc;

use crate::deferred::DeferredQueue;
use crate::scheduler::Scheduler;
use crate::vm::ScriptVm;

/// Values [`TweenTo`] can interpolate.
pub trait Lerp: Copy {
    /// The value a fraction `t` of the way from `start` to `end`.
    fn lerp(start: Self, end: Self, t: f64) -> Self;
}

impl Lerp for f32 {
    fn lerp(start: Self, end: Self, t: f64) -> Self {
        start + (end - start) * (t as f32)
    }
}

impl Lerp for f64 {
    fn lerp(start: Self, end: Self, t: f64) -> Self {
        start + (end - start) * t
    }
}

/// A time-indexed effect.
///
/// `set_time` is absolute and idempotent: setting the same clamped time
/// twice reports no movement, which is how the system detects
/// completion. Combinators forward reshaped times to their children,
/// so a child's time is not generally the system's.
pub trait Tween {
    /// Total running time in seconds.
    fn duration(&self) -> f64;

    /// The current time, clamped to the duration.
    fn time(&self) -> f64;

    /// Moves to an absolute `time`, clamped to the duration, applying
    /// the effect. Returns whether the stored time changed.
    fn set_time(&mut self, time: f64) -> bool;

    /// Moves forward by `delta` seconds. Returns whether the time
    /// moved; `false` means the tween has nothing further to do.
    fn advance(&mut self, delta: f64) -> bool {
        let time = self.time();
        self.set_time(time + delta)
    }
}

/// Clamp-and-store gate shared by every tween: returns whether the
/// stored time actually moved.
fn store_clamped(slot: &mut f64, time: f64, duration: f64) -> bool {
    let clamped = duration.min(time);
    if clamped == *slot {
        false
    } else {
        *slot = clamped;
        true
    }
}

struct ChangeNotice {
    queue: Rc<RefCell<DeferredQueue>>,
    key: u64,
    notify: Rc<dyn Fn()>,
}

/// Interpolates a value from `start` to `end` over one second of its
/// local time, writing each new value through an apply closure.
///
/// Wrapped in a [`TweenDuration`] it runs for that duration instead;
/// on its own the one-second span is the whole tween.
pub struct TweenTo<T: Lerp> {
    start: T,
    end: T,
    time: f64,
    apply: Box<dyn FnMut(T)>,
    change: Option<ChangeNotice>,
}

impl<T: Lerp> TweenTo<T> {
    /// Interpolates from `start` to `end`, handing each value to
    /// `apply`.
    pub fn new(start: T, end: T, apply: impl FnMut(T) + 'static) -> Self {
        Self {
            start,
            end,
            time: 0.0,
            apply: Box::new(apply),
            change: None,
        }
    }

    /// Also queues `notify` on `system`'s change queue whenever the
    /// value moves. Notices sharing a key collapse to one delivery per
    /// update, so several tweens writing one subject notify it once.
    pub fn with_change(
        mut self,
        system: &TweenSystem,
        key: u64,
        notify: impl Fn() + 'static,
    ) -> Self {
        self.change = Some(ChangeNotice {
            queue: system.change_queue(),
            key,
            notify: Rc::new(notify),
        });
        self
    }
}

impl<T: Lerp> Tween for TweenTo<T> {
    fn duration(&self) -> f64 {
        1.0
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) -> bool {
        let duration = self.duration();
        if !store_clamped(&mut self.time, time, duration) {
            return false;
        }
        (self.apply)(T::lerp(self.start, self.end, self.time));
        if let Some(notice) = &self.change {
            let notify = Rc::clone(&notice.notify);
            notice
                .queue
                .borrow_mut()
                .schedule(notice.key, move || notify());
        }
        true
    }
}

/// Runs children in parallel: everyone receives the group's time, and
/// the group lasts as long as its longest child.
#[derive(Default)]
pub struct TweenGroup {
    time: f64,
    tweens: Vec<Box<dyn Tween>>,
}

impl TweenGroup {
    /// An empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child tween.
    pub fn add(&mut self, tween: impl Tween + 'static) {
        self.tweens.push(Box::new(tween));
    }
}

impl Tween for TweenGroup {
    fn duration(&self) -> f64 {
        self.tweens
            .iter()
            .fold(0.0, |max, tween| tween.duration().max(max))
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) -> bool {
        let duration = self.duration();
        if !store_clamped(&mut self.time, time, duration) {
            return false;
        }
        for tween in &mut self.tweens {
            tween.set_time(self.time);
        }
        true
    }
}

/// The shape of a [`TweenEase`] time warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ease {
    /// Slow start: `1 - cos(x·π/2)`.
    In,
    /// Slow finish: `sin(x·π/2)`.
    Out,
    /// Slow at both ends: `-(cos(π·x) - 1) / 2`.
    InOut,
}

impl Ease {
    fn warp(self, x: f64) -> f64 {
        match self {
            Ease::In => 1.0 - (x * PI / 2.0).cos(),
            Ease::Out => (x * PI / 2.0).sin(),
            Ease::InOut => -((PI * x).cos() - 1.0) / 2.0,
        }
    }
}

/// Warps time along a cosine curve before forwarding it to the
/// children; lasts as long as the longest child.
pub struct TweenEase {
    ease: Ease,
    time: f64,
    tweens: Vec<Box<dyn Tween>>,
}

impl TweenEase {
    /// An empty ease wrapper applying `ease`.
    pub fn new(ease: Ease) -> Self {
        Self {
            ease,
            time: 0.0,
            tweens: Vec::new(),
        }
    }

    /// Adds a child tween.
    pub fn add(&mut self, tween: impl Tween + 'static) {
        self.tweens.push(Box::new(tween));
    }
}

impl Tween for TweenEase {
    fn duration(&self) -> f64 {
        self.tweens
            .iter()
            .fold(0.0, |max, tween| tween.duration().max(max))
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) -> bool {
        let duration = self.duration();
        if !store_clamped(&mut self.time, time, duration) {
            return false;
        }
        let x = if duration != 0.0 {
            self.time / duration
        } else {
            0.0
        };
        let warped = self.ease.warp(x) * duration;
        for tween in &mut self.tweens {
            tween.set_time(warped);
        }
        true
    }
}

/// Stretches or squeezes children to a fixed duration: each child is
/// kept at the same fraction of its own duration as the wrapper is of
/// its.
pub struct TweenDuration {
    duration: f64,
    time: f64,
    tweens: Vec<Box<dyn Tween>>,
}

impl TweenDuration {
    /// An empty wrapper lasting `duration` seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            time: 0.0,
            tweens: Vec::new(),
        }
    }

    /// Adds a child tween.
    pub fn add(&mut self, tween: impl Tween + 'static) {
        self.tweens.push(Box::new(tween));
    }
}

impl Tween for TweenDuration {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) -> bool {
        if !store_clamped(&mut self.time, time, self.duration) {
            return false;
        }
        let ratio = self.time / self.duration;
        for tween in &mut self.tweens {
            let target = ratio * tween.duration();
            tween.set_time(target);
        }
        true
    }
}

/// Plays children back to back; the total duration is the sum of
/// theirs. Children before the active one are pinned at their full
/// duration, children after it have not started.
#[derive(Default)]
pub struct TweenSequence {
    time: f64,
    tweens: Vec<Box<dyn Tween>>,
}

impl TweenSequence {
    /// An empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a child tween to the sequence.
    pub fn add(&mut self, tween: impl Tween + 'static) {
        self.tweens.push(Box::new(tween));
    }
}

impl Tween for TweenSequence {
    fn duration(&self) -> f64 {
        self.tweens.iter().map(|tween| tween.duration()).sum()
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) -> bool {
        let duration = self.duration();
        if !store_clamped(&mut self.time, time, duration) {
            return false;
        }
        let mut remaining = self.time;
        for tween in &mut self.tweens {
            let duration = tween.duration();
            if duration < remaining {
                remaining -= duration;
                tween.set_time(duration);
            } else {
                tween.set_time(remaining);
                break;
            }
        }
        true
    }
}

struct RunningTween {
    tween: Box<dyn Tween>,
    completion: Option<Box<dyn FnOnce()>>,
}

struct TweenSystemInner {
    running: Vec<RunningTween>,
}

/// Owns and advances running tweens.
///
/// Cheap to clone; all clones share one set of running tweens and one
/// change queue. No internal borrow is held while apply closures,
/// change notifications, or completion callbacks run, so any of them
/// may start or queue further work on the system.
#[derive(Clone)]
pub struct TweenSystem {
    inner: Rc<RefCell<TweenSystemInner>>,
    changes: Rc<RefCell<DeferredQueue>>,
}

impl Default for TweenSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TweenSystem {
    /// A system with nothing running.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TweenSystemInner {
                running: Vec::new(),
            })),
            changes: Rc::new(RefCell::new(DeferredQueue::new())),
        }
    }

    /// Starts `tween` running from the next update.
    pub fn run(&self, tween: impl Tween + 'static) {
        self.inner.borrow_mut().running.push(RunningTween {
            tween: Box::new(tween),
            completion: None,
        });
    }

    /// Starts `tween` and runs `completion` once when it finishes.
    pub fn run_with(&self, tween: impl Tween + 'static, completion: impl FnOnce() + 'static) {
        self.inner.borrow_mut().running.push(RunningTween {
            tween: Box::new(tween),
            completion: Some(Box::new(completion)),
        });
    }

    /// Starts `tween` and pauses the script thread currently running
    /// on `scheduler` until it completes. The caller must yield after
    /// this returns; completion resumes that exact thread in place,
    /// unless it has been killed in the meantime.
    ///
    /// # Panics
    ///
    /// Panics when no script thread is running its slice.
    pub fn run_and_wait<V: ScriptVm>(&self, scheduler: &Scheduler<V>, tween: impl Tween + 'static) {
        let thread = match scheduler.current() {
            Some(thread) => thread,
            None => panic!("run_and_wait called outside a script thread"),
        };
        scheduler.pause(thread);
        let scheduler = scheduler.clone();
        self.run_with(tween, move || {
            if scheduler.is_alive(thread) {
                scheduler.resume(thread);
            }
        });
    }

    /// Queues `callback` on the change queue under `key`, replacing
    /// any pending callback for that key. Delivered on the next
    /// update's flush.
    pub fn queue_callback(&self, key: u64, callback: impl FnOnce() + 'static) {
        self.changes.borrow_mut().schedule(key, callback);
    }

    /// Advances every running tween by `delta` seconds, then flushes
    /// the change queue, then runs the completion callbacks of tweens
    /// that stopped moving this update.
    pub fn update(&self, delta: f64) {
        let batch = mem::take(&mut self.inner.borrow_mut().running);
        let mut survivors = Vec::with_capacity(batch.len());
        let mut completions = Vec::new();
        for mut entry in batch {
            if entry.tween.advance(delta) {
                survivors.push(entry);
            } else if let Some(completion) = entry.completion.take() {
                completions.push(completion);
            }
        }
        {
            let mut inner = self.inner.borrow_mut();
            // Tweens started by apply closures during the walk landed
            // in the fresh vec; they run behind the survivors.
            let started = mem::take(&mut inner.running);
            survivors.extend(started);
            inner.running = survivors;
        }

        let mut changes = mem::take(&mut *self.changes.borrow_mut());
        changes.flush();

        for completion in completions {
            completion();
        }
    }

    /// Number of running tweens.
    pub fn len(&self) -> usize {
        self.inner.borrow().running.len()
    }

    /// Whether nothing is running.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().running.is_empty()
    }

    fn change_queue(&self) -> Rc<RefCell<DeferredQueue>> {
        Rc::clone(&self.changes)
    }
}
