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

//! End-to-end frame loops over the whole scripting stack: timer,
//! scheduler, clock, contexts, and tweens wired together the way an
//! embedding application drives them.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use approx::assert_relative_eq;
use arbor_core::time::Timer;
use arbor_script::vm::scripted::{ScriptFunction, ScriptedVm, Step};
use arbor_script::{ScriptClock, ScriptContext, Scheduler, TweenDuration, TweenSystem, TweenTo};

/// One application frame: clock time first, then script slices.
fn frame(timer: &Timer, scheduler: &Scheduler<ScriptedVm>, dt: f64) {
    timer.update(dt);
    scheduler.update();
}

#[test]
fn test_wait_and_interval_flow_across_frames() {
    // --- 1. Setup: a context exposing a shared log to its scripts ---
    let timer = Timer::new();
    let scheduler = Scheduler::new(ScriptedVm::new());
    let clock = ScriptClock::new(timer.clone(), scheduler.clone());
    let context = ScriptContext::new(scheduler.clone(), None);
    context.add_object("log", Rc::new(RefCell::new(Vec::<String>::new())));
    let log = context.object::<RefCell<Vec<String>>>("log");

    // The main script logs, parks itself for a second of clock time,
    // then logs again once the clock resumes it.
    let main_function = {
        let clock = clock.clone();
        let context = context.clone();
        ScriptFunction::new(move || {
            let clock = clock.clone();
            let context = context.clone();
            let mut waited = false;
            Box::new(move |_values| {
                let log = context.object::<RefCell<Vec<String>>>("log");
                if !waited {
                    waited = true;
                    log.borrow_mut().push("main: begin".into());
                    clock.wait(1.0);
                    Step::Yield(0)
                } else {
                    log.borrow_mut().push("main: after wait".into());
                    Step::Finish
                }
            })
        })
    };

    // Each interval firing spawns a one-shot ticker thread.
    let ticker = {
        let context = context.clone();
        ScriptFunction::new(move || {
            let context = context.clone();
            Box::new(move |_values| {
                context
                    .object::<RefCell<Vec<String>>>("log")
                    .borrow_mut()
                    .push("tick".into());
                Step::Finish
            })
        })
    };

    context.run(&main_function);
    let ticker_id = clock.set_interval(0.6, &ticker);

    // --- 2. Act: four half-second frames ---
    frame(&timer, &scheduler, 0.5); // main begins, parks until clock 1.5
    assert_eq!(log.borrow().as_slice(), ["main: begin"]);

    frame(&timer, &scheduler, 0.5); // interval fires at 0.6
    assert_eq!(log.borrow().as_slice(), ["main: begin", "tick"]);

    // Clock 1.5: the 1.2 interval tick and the wait deadline both fire.
    // Main was resumed last, so it takes the front of the running order.
    frame(&timer, &scheduler, 0.5);
    assert_eq!(
        log.borrow().as_slice(),
        ["main: begin", "tick", "main: after wait", "tick"]
    );

    clock.clear(ticker_id);
    frame(&timer, &scheduler, 0.5);

    // --- 3. Assert: everything drained ---
    assert_eq!(
        log.borrow().as_slice(),
        ["main: begin", "tick", "main: after wait", "tick"]
    );
    assert!(scheduler.is_empty(), "all script threads should be reaped");
    assert_eq!(timer.pending_count(), 0, "wait timeout consumed, interval cleared");
}

#[test]
fn test_tweens_drive_scripts_through_a_timer_forwarder() {
    // --- 1. Setup: the tween system ticks off the timer's forwarder ---
    let timer = Timer::new();
    let scheduler = Scheduler::new(ScriptedVm::new());
    let tweens = TweenSystem::new();
    {
        let tweens = tweens.clone();
        timer.add_forwarder(move |dt| tweens.update(dt));
    }

    let value = Rc::new(Cell::new(0.0f32));
    let resumed = Rc::new(Cell::new(false));

    // The script starts a two-second tween and parks on its completion.
    let function = {
        let tweens = tweens.clone();
        let scheduler = scheduler.clone();
        let value = Rc::clone(&value);
        let resumed = Rc::clone(&resumed);
        ScriptFunction::new(move || {
            let tweens = tweens.clone();
            let scheduler = scheduler.clone();
            let value = Rc::clone(&value);
            let resumed = Rc::clone(&resumed);
            let mut started = false;
            Box::new(move |_values| {
                if !started {
                    started = true;
                    let applied = Rc::clone(&value);
                    let mut stretched = TweenDuration::new(2.0);
                    stretched.add(TweenTo::new(0.0f32, 10.0, move |v| applied.set(v)));
                    tweens.run_and_wait(&scheduler, stretched);
                    Step::Yield(0)
                } else {
                    resumed.set(true);
                    Step::Finish
                }
            })
        })
    };
    scheduler.spawn(&function, true);

    // --- 2. Act: half-second frames; the tween starts during frame 1 ---
    frame(&timer, &scheduler, 0.5);
    assert_relative_eq!(value.get(), 0.0f32);

    frame(&timer, &scheduler, 0.5);
    assert_relative_eq!(value.get(), 2.5f32);
    assert_eq!(tweens.len(), 1);

    frame(&timer, &scheduler, 0.5);
    frame(&timer, &scheduler, 0.5);
    frame(&timer, &scheduler, 0.5); // tween reaches its end here
    assert_relative_eq!(value.get(), 10.0f32);
    assert!(!resumed.get(), "completion lands one update after the end");

    frame(&timer, &scheduler, 0.5); // completion fires, script resumes

    // --- 3. Assert ---
    assert!(resumed.get());
    assert!(scheduler.is_empty());
    assert!(tweens.is_empty());
}

#[test]
fn test_context_shutdown_cancels_waiting_threads() {
    // --- 1. Setup: three waiters parked deep into the future ---
    let timer = Timer::new();
    let scheduler = Scheduler::new(ScriptedVm::new());
    let clock = ScriptClock::new(timer.clone(), scheduler.clone());
    let context = ScriptContext::new(scheduler.clone(), None);

    let waiter = {
        let clock = clock.clone();
        ScriptFunction::new(move || {
            let clock = clock.clone();
            Box::new(move |_values| {
                clock.wait(10.0);
                Step::Yield(0)
            })
        })
    };
    for _ in 0..3 {
        context.run(&waiter);
    }

    frame(&timer, &scheduler, 0.1);
    assert_eq!(scheduler.len(), 3);
    assert_eq!(timer.pending_count(), 3);

    // --- 2. Act ---
    context.shutdown();

    // --- 3. Assert: cleanups took the timeouts down with the threads ---
    assert!(scheduler.is_empty());
    assert_eq!(timer.pending_count(), 0);
    frame(&timer, &scheduler, 20.0); // nothing left to fire or resume
    assert!(scheduler.is_empty());
}
