//! Real-time frame driver.
//!
//! Pumps a runtime's scheduler from a tokio timer: every tick runs the
//! microtask queue and the frame queue, then spends what is left of the idle
//! budget on idle tasks. At least one idle task runs per tick so idle work
//! cannot starve under constant frame load.
//!
//! Runtimes are `!Send`, so the driver future must be polled on a
//! current-thread runtime or inside a `LocalSet`.

use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::reactive::Runtime;

/// Timing for [`run_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDriver {
    /// Time between frames.
    pub frame_interval: Duration,
    /// Time per frame that idle tasks may use.
    pub idle_budget: Duration,
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            idle_budget: Duration::from_millis(8),
        }
    }
}

impl FrameDriver {
    pub fn new(frame_interval: Duration, idle_budget: Duration) -> Self {
        Self {
            frame_interval,
            idle_budget,
        }
    }

    /// Drive `runtime` for `frames` ticks. See [`run_frames`].
    pub async fn run(&self, runtime: &Runtime, frames: usize) -> usize {
        run_frames(runtime, self, frames).await
    }
}

/// Drive `runtime` for `frames` ticks and return the number of tasks run.
pub async fn run_frames(runtime: &Runtime, driver: &FrameDriver, frames: usize) -> usize {
    let scheduler = runtime.scheduler();
    let mut ticker = time::interval(driver.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ran = 0;
    for frame in 0..frames {
        ticker.tick().await;

        ran += scheduler.run_microtasks();
        ran += scheduler.run_frame();

        let deadline = Instant::now() + driver.idle_budget;
        let mut idle = 0;
        while scheduler.run_idle() {
            idle += 1;
            if Instant::now() >= deadline {
                break;
            }
        }
        ran += idle;

        trace!(frame, idle, "frame driven");
        tokio::task::yield_now().await;
    }

    debug!(frames, tasks = ran, "frame driver finished");
    ran
}
