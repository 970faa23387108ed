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

// Arbor Sandbox
// Main binary for scripted-runtime demos

use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;

use anyhow::Result;
use arbor_core::time::Timer;
use arbor_data::{DataSapling, DataTree, StringHash};
use arbor_script::vm::scripted::{ScriptFunction, ScriptedVm, Step};
use arbor_script::{ScriptClock, ScriptContext, Scheduler, TweenDuration, TweenSystem, TweenTo};

const DOOR_DISTANCE: StringHash = StringHash::from_static("door_distance");
const DOOR_SECONDS: StringHash = StringHash::from_static("door_seconds");
const HEARTBEAT_SECONDS: StringHash = StringHash::from_static("heartbeat_seconds");

/// Writes and re-reads the demo settings as a record tree, the way a
/// shipped build would load them from a data file.
fn load_settings() -> Result<DataTree> {
    let mut sapling = DataSapling::new();
    sapling.set_float(DOOR_DISTANCE, 100.0);
    sapling.set_float(DOOR_SECONDS, 1.5);
    sapling.set_float(HEARTBEAT_SECONDS, 1.0);

    let mut stream = Vec::new();
    sapling.write_to(&mut stream)?;
    Ok(DataTree::read_from(&mut Cursor::new(&stream))?)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = load_settings()?;
    let door_distance = settings.get_float(DOOR_DISTANCE);
    let door_seconds = f64::from(settings.get_float(DOOR_SECONDS));
    let heartbeat_seconds = f64::from(settings.get_float(HEARTBEAT_SECONDS));

    // The runtime: one timer, one scheduler, tweens ticking off the
    // timer's forwarder so everything shares the scaled clock.
    let timer = Timer::new();
    let scheduler = Scheduler::new(ScriptedVm::new());
    let clock = ScriptClock::new(timer.clone(), scheduler.clone());
    let tweens = TweenSystem::new();
    {
        let tweens = tweens.clone();
        timer.add_forwarder(move |dt| tweens.update(dt));
    }

    let stage = ScriptContext::new(scheduler.clone(), None);
    let door_position = Rc::new(Cell::new(0.0f32));

    // A three-beat quest: catch breath, swing the door open, walk through.
    let opener = {
        let clock = clock.clone();
        let tweens = tweens.clone();
        let scheduler = scheduler.clone();
        let door_position = Rc::clone(&door_position);
        ScriptFunction::new(move || {
            let clock = clock.clone();
            let tweens = tweens.clone();
            let scheduler = scheduler.clone();
            let door_position = Rc::clone(&door_position);
            let mut beat = 0u32;
            Box::new(move |_values| {
                beat += 1;
                match beat {
                    1 => {
                        log::info!("opener: at the door, catching breath");
                        clock.wait(0.5);
                        Step::Yield(0)
                    }
                    2 => {
                        log::info!("opener: pushing the door open");
                        let applied = Rc::clone(&door_position);
                        let mut swing = TweenDuration::new(door_seconds);
                        swing.add(TweenTo::new(0.0f32, door_distance, move |v| applied.set(v)));
                        tweens.run_and_wait(&scheduler, swing);
                        Step::Yield(0)
                    }
                    _ => {
                        log::info!("opener: door open, walking through");
                        Step::Finish
                    }
                }
            })
        })
    };

    // Each interval firing spawns a short-lived reporter thread.
    let heartbeat = {
        let clock = clock.clone();
        ScriptFunction::new(move || {
            let clock = clock.clone();
            Box::new(move |_values| {
                log::info!("heartbeat at t={:.1}s", clock.timer().now_seconds());
                Step::Finish
            })
        })
    };

    stage.run(&opener);
    let heartbeat_id = clock.set_interval(heartbeat_seconds, &heartbeat);

    // Forty fixed frames of the usual order: clock time first, slices second.
    for frame in 1..=40u32 {
        timer.update(0.1);
        scheduler.update();
        if frame % 10 == 0 {
            log::info!(
                "frame {frame:>2}: door at {:>5.1} of {door_distance:.1}",
                door_position.get()
            );
        }
    }

    clock.clear(heartbeat_id);
    stage.shutdown();
    log::info!(
        "drained: {} threads scheduled, {} timeouts pending, {} tweens running",
        scheduler.len(),
        timer.pending_count(),
        tweens.len()
    );
    Ok(())
}
