// driver.rs - Frame scheduling: when does the pipeline tick?
//
// `FrameDriver` is the explicit scheduler the outer loop calls on every
// refresh signal. It holds at most ONE pending render: requesting again
// before the refresh fires supersedes the earlier request instead of
// queueing a second execution.
//
//   Continuous   every refresh runs a frame while the driver is running
//   OnDemand     a refresh runs a frame only if one was requested
//
// `cancel` drops the pending request and stops continuous rendering;
// `restart` resumes and asks for a fresh frame. Neither interrupts a frame
// that is already executing: ticks are never re-entered.
//
// `RefreshClock` stands in for the display's refresh signal when there is
// no window: it paces the loop at a fixed rate.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{PipelineError, Result};

/// When the driver runs frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    #[default]
    Continuous,
    OnDemand,
}

/// Single-slot render scheduler.
#[derive(Debug)]
pub struct FrameDriver {
    schedule: Schedule,
    running: bool,
    pending: bool,
    /// Bumped by every request; identifies the latest one.
    generation: u64,
    executed: u64,
}

impl FrameDriver {
    pub fn new(schedule: Schedule) -> Self {
        FrameDriver {
            schedule,
            running: true,
            pending: true,
            generation: 0,
            executed: 0,
        }
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Ask for a frame on the next refresh, superseding any pending request.
    ///
    /// Returns the generation of this request.
    pub fn request_render(&mut self) -> u64 {
        self.generation += 1;
        self.pending = true;
        self.generation
    }

    /// Drop any pending request and stop scheduling frames.
    pub fn cancel(&mut self) {
        self.pending = false;
        self.running = false;
    }

    /// Resume after `cancel` and request a frame.
    pub fn restart(&mut self) {
        self.running = true;
        self.request_render();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Frames executed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Whether the next refresh would run a frame.
    pub fn should_run(&self) -> bool {
        self.running && (self.pending || self.schedule == Schedule::Continuous)
    }

    /// Called once per refresh signal. Runs `frame` at most once and
    /// returns its result, or `None` when nothing was due.
    pub fn tick<T>(&mut self, frame: impl FnOnce() -> T) -> Option<T> {
        if !self.should_run() {
            return None;
        }
        self.pending = false;
        self.executed += 1;
        trace!(executed = self.executed, generation = self.generation, "driver tick");
        Some(frame())
    }
}

impl Default for FrameDriver {
    fn default() -> Self {
        FrameDriver::new(Schedule::default())
    }
}

/// Fixed-rate stand-in for a display refresh signal.
#[derive(Debug)]
pub struct RefreshClock {
    interval: Duration,
    next: Instant,
    signals: u64,
}

impl RefreshClock {
    pub fn new(interval: Duration) -> Self {
        RefreshClock {
            interval,
            next: Instant::now(),
            signals: 0,
        }
    }

    /// A clock firing `fps` times per second.
    pub fn from_fps(fps: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(PipelineError::InvalidParams(format!(
                "refresh rate must be positive, got {fps}"
            )));
        }
        Ok(Self::new(Duration::from_secs_f64(1.0 / fps)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signals delivered so far.
    pub fn signals(&self) -> u64 {
        self.signals
    }

    /// Sleep until the next refresh. A caller that fell behind gets the
    /// signal immediately and the schedule restarts from now; missed
    /// refreshes are not replayed.
    pub fn wait(&mut self) -> u64 {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.interval;
        } else {
            self.next = now + self.interval;
        }
        self.signals += 1;
        self.signals
    }
}
