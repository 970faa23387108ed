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

//! The script-facing time surface.
//!
//! A [`ScriptClock`] couples a [`Timer`] with a [`Scheduler`] and turns
//! elapsed time into script execution two ways. `set_timeout` and
//! `set_interval` spawn a fresh thread from a stored function each time
//! the deadline passes, through the scheduler's callback bridge. `wait`
//! is the direct path: it parks the calling thread and arranges for the
//! timeout to resume that exact thread in place, with a cleanup hook so
//! a killed waiter takes its timeout down with it.
//!
//! The usual frame order is `timer.update(dt)` then `scheduler.update()`,
//! so a thread resumed by a firing timeout runs its slice in the same
//! frame.

use arbor_core::time::{Timer, TimeoutId};

use crate::scheduler::{ScheduledCallback, Scheduler};
use crate::vm::ScriptVm;

/// Timer-driven spawning and waiting for script threads.
pub struct ScriptClock<V: ScriptVm> {
    timer: Timer,
    scheduler: Scheduler<V>,
}

impl<V: ScriptVm> Clone for ScriptClock<V> {
    fn clone(&self) -> Self {
        Self {
            timer: self.timer.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<V: ScriptVm> ScriptClock<V> {
    /// Couples `timer` and `scheduler`. Both are handles; the clock
    /// shares them with whatever else drives them.
    pub fn new(timer: Timer, scheduler: Scheduler<V>) -> Self {
        Self { timer, scheduler }
    }

    /// The underlying timer.
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Scheduler<V> {
        &self.scheduler
    }

    /// Runs `function` on a fresh script thread once, `seconds` of
    /// clock time from now.
    pub fn set_timeout(&self, seconds: f64, function: &V::Function) -> TimeoutId {
        let ScheduledCallback { mut invoke, cancel } =
            self.scheduler.create_callback::<()>(function);
        self.timer
            .schedule(seconds, false, move || invoke(()), Some(cancel))
    }

    /// Runs `function` on a fresh script thread every `seconds` of
    /// clock time, each firing its own thread.
    pub fn set_interval(&self, seconds: f64, function: &V::Function) -> TimeoutId {
        let ScheduledCallback { mut invoke, cancel } =
            self.scheduler.create_callback::<()>(function);
        self.timer
            .schedule(seconds, true, move || invoke(()), Some(cancel))
    }

    /// Cancels a timeout or interval, releasing the stored function.
    /// Threads it already spawned keep running. Idempotent.
    pub fn clear(&self, id: TimeoutId) {
        self.timer.cancel(id);
    }

    /// Parks the calling script thread for `seconds` of clock time.
    ///
    /// The thread is paused and a one-shot timeout is scheduled whose
    /// firing resumes that exact thread in place. Killing the thread
    /// while it waits cancels the timeout through its cleanup callback.
    /// The caller must yield after this returns; the resume lands on
    /// the first scheduler update after the timeout fires.
    ///
    /// # Panics
    ///
    /// Panics when no script thread is running its slice, and if the
    /// calling thread already has a cleanup callback registered.
    pub fn wait(&self, seconds: f64) {
        let thread = match self.scheduler.current() {
            Some(thread) => thread,
            None => panic!("wait called outside a script thread"),
        };
        self.scheduler.pause(thread);
        let timeout = {
            let scheduler = self.scheduler.clone();
            self.timer.schedule(
                seconds,
                false,
                move || {
                    scheduler.clear_cleanup(thread);
                    scheduler.resume(thread);
                },
                None,
            )
        };
        let timer = self.timer.clone();
        self.scheduler.set_cleanup(thread, move || timer.cancel(timeout));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::scripted::{ScriptFunction, ScriptedVm, Step};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fixture() -> (Timer, Scheduler<ScriptedVm>, ScriptClock<ScriptedVm>) {
        let timer = Timer::new();
        let scheduler = Scheduler::new(ScriptedVm::new());
        let clock = ScriptClock::new(timer.clone(), scheduler.clone());
        (timer, scheduler, clock)
    }

    /// One frame: clock time first, then script slices.
    fn frame(timer: &Timer, scheduler: &Scheduler<ScriptedVm>, dt: f64) {
        timer.update(dt);
        scheduler.update();
    }

    fn logging(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> ScriptFunction {
        let log = Rc::clone(log);
        ScriptFunction::new(move || {
            let log = Rc::clone(&log);
            Box::new(move |_values| {
                log.borrow_mut().push(tag);
                Step::Finish
            })
        })
    }

    #[test]
    fn timeouts_spawn_a_thread_when_due() {
        let (timer, scheduler, clock) = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        clock.set_timeout(1.0, &logging(&log, "fired"));

        frame(&timer, &scheduler, 0.5);
        assert!(log.borrow().is_empty());
        frame(&timer, &scheduler, 0.5);
        // Fired and ran in the same frame: resumed before the update.
        assert_eq!(*log.borrow(), vec!["fired"]);
        frame(&timer, &scheduler, 5.0);
        assert_eq!(*log.borrow(), vec!["fired"]);
    }

    #[test]
    fn intervals_spawn_a_fresh_thread_per_tick() {
        let (timer, scheduler, clock) = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        clock.set_interval(1.0, &logging(&log, "tick"));

        for _ in 0..3 {
            frame(&timer, &scheduler, 1.0);
        }
        assert_eq!(*log.borrow(), vec!["tick", "tick", "tick"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn clear_stops_future_firings() {
        let (timer, scheduler, clock) = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = clock.set_interval(1.0, &logging(&log, "tick"));

        frame(&timer, &scheduler, 1.0);
        clock.clear(id);
        clock.clear(id); // idempotent
        frame(&timer, &scheduler, 5.0);
        assert_eq!(*log.borrow(), vec!["tick"]);
    }

    #[test]
    fn wait_parks_the_thread_until_the_deadline() {
        let (timer, scheduler, clock) = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        let function = {
            let log = Rc::clone(&log);
            let clock = clock.clone();
            ScriptFunction::new(move || {
                let log = Rc::clone(&log);
                let clock = clock.clone();
                let mut waited = false;
                Box::new(move |_values| {
                    if !waited {
                        waited = true;
                        log.borrow_mut().push("waiting");
                        clock.wait(1.0);
                        Step::Yield(0)
                    } else {
                        log.borrow_mut().push("resumed");
                        Step::Finish
                    }
                })
            })
        };
        scheduler.spawn(&function, true);

        frame(&timer, &scheduler, 0.4); // wait begins at clock 0.4
        assert_eq!(*log.borrow(), vec!["waiting"]);
        frame(&timer, &scheduler, 0.4);
        frame(&timer, &scheduler, 0.4); // clock 1.2, deadline is 1.4
        assert_eq!(*log.borrow(), vec!["waiting"]);
        frame(&timer, &scheduler, 0.4); // clock 1.6: fires and resumes
        assert_eq!(*log.borrow(), vec!["waiting", "resumed"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn killing_a_waiter_cancels_its_timeout() {
        let (timer, scheduler, clock) = fixture();
        let function = {
            let clock = clock.clone();
            ScriptFunction::new(move || {
                let clock = clock.clone();
                Box::new(move |_values| {
                    clock.wait(10.0);
                    Step::Yield(0)
                })
            })
        };
        let thread = scheduler.spawn(&function, true);

        frame(&timer, &scheduler, 0.1);
        assert_eq!(timer.pending_count(), 1);

        scheduler.kill(thread);
        assert_eq!(timer.pending_count(), 0);
        frame(&timer, &scheduler, 20.0);
        assert!(scheduler.is_empty());
    }

    #[test]
    #[should_panic(expected = "outside a script thread")]
    fn wait_outside_a_thread_panics() {
        let (_timer, _scheduler, clock) = fixture();
        clock.wait(1.0);
    }
}
