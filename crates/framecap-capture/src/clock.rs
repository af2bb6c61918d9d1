//! Logical clock that advances a fixed step per captured frame.
//!
//! Animations driven from this clock see time move by exactly one frame
//! duration per capture, no matter how long encoding takes in real time.

use std::collections::BTreeMap;

use tracing::trace;

/// Handle returned when scheduling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

type TimerCallback = Box<dyn FnMut(f64) + Send>;
type FrameCallback = Box<dyn FnOnce(f64) + Send>;

struct Timer {
    deadline_ms: f64,
    interval_ms: Option<f64>,
    callback: TimerCallback,
}

/// Deterministic clock with a timeout/interval queue and next-frame callbacks.
pub struct LogicalClock {
    now_ms: f64,
    step_ms: f64,
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
    frame_callbacks: Vec<(TimerId, FrameCallback)>,
}

impl LogicalClock {
    /// Create a clock at time zero advancing `step_ms` per tick.
    pub fn new(step_ms: f64) -> Self {
        Self {
            now_ms: 0.0,
            step_ms: sanitize_step(step_ms),
            next_id: 1,
            timers: BTreeMap::new(),
            frame_callbacks: Vec::new(),
        }
    }

    /// Create a clock ticking once per frame at `rate` frames per second.
    pub fn with_rate(rate: u32) -> Self {
        Self::new(1000.0 / f64::from(rate.max(1)))
    }

    /// Current logical time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Current step in milliseconds.
    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }

    /// Number of pending timers and frame callbacks.
    pub fn pending(&self) -> usize {
        self.timers.len() + self.frame_callbacks.len()
    }

    /// Run `callback` once when the clock reaches now + `delay_ms`.
    pub fn set_timeout<F>(&mut self, delay_ms: f64, callback: F) -> TimerId
    where
        F: FnMut(f64) + Send + 'static,
    {
        let id = self.allocate_id();
        self.timers.insert(
            id,
            Timer {
                deadline_ms: self.now_ms + delay_ms.max(0.0),
                interval_ms: None,
                callback: Box::new(callback),
            },
        );
        id
    }

    /// Run `callback` every `interval_ms` of logical time.
    ///
    /// Non-positive intervals fire once per step.
    pub fn set_interval<F>(&mut self, interval_ms: f64, callback: F) -> TimerId
    where
        F: FnMut(f64) + Send + 'static,
    {
        let interval = if interval_ms > 0.0 {
            interval_ms
        } else {
            self.step_ms
        };
        let id = self.allocate_id();
        self.timers.insert(
            id,
            Timer {
                deadline_ms: self.now_ms + interval,
                interval_ms: Some(interval),
                callback: Box::new(callback),
            },
        );
        id
    }

    /// Run `callback` once on the next tick, after due timers.
    pub fn request_frame<F>(&mut self, callback: F) -> TimerId
    where
        F: FnOnce(f64) + Send + 'static,
    {
        let id = self.allocate_id();
        self.frame_callbacks.push((id, Box::new(callback)));
        id
    }

    /// Cancel a timer or frame callback. Returns false if it was not pending.
    pub fn clear_timer(&mut self, id: TimerId) -> bool {
        if self.timers.remove(&id).is_some() {
            return true;
        }
        let before = self.frame_callbacks.len();
        self.frame_callbacks.retain(|(pending, _)| *pending != id);
        before != self.frame_callbacks.len()
    }

    /// Advance by one step, fire due timers in deadline order, then run
    /// the frame callbacks registered before this tick.
    pub fn advance(&mut self) -> f64 {
        self.now_ms += self.step_ms;
        let fired = self.fire_due_timers();

        let callbacks = std::mem::take(&mut self.frame_callbacks);
        let frames = callbacks.len();
        for (_, callback) in callbacks {
            callback(self.now_ms);
        }

        trace!(now_ms = self.now_ms, fired, frames, "Clock advanced");
        self.now_ms
    }

    /// Return to time zero and drop every pending timer.
    pub fn reset(&mut self) {
        self.now_ms = 0.0;
        self.timers.clear();
        self.frame_callbacks.clear();
    }

    fn fire_due_timers(&mut self) -> usize {
        let mut fired = 0;

        while let Some(id) = self.next_due() {
            let Some(mut timer) = self.timers.remove(&id) else {
                break;
            };
            (timer.callback)(self.now_ms);
            fired += 1;

            if let Some(interval) = timer.interval_ms {
                timer.deadline_ms += interval;
                self.timers.insert(id, timer);
            }
        }

        fired
    }

    fn next_due(&self) -> Option<TimerId> {
        self.timers
            .iter()
            .filter(|(_, timer)| timer.deadline_ms <= self.now_ms)
            .min_by(|(a_id, a), (b_id, b)| {
                a.deadline_ms
                    .total_cmp(&b.deadline_ms)
                    .then_with(|| a_id.cmp(b_id))
            })
            .map(|(id, _)| *id)
    }

    fn allocate_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl std::fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalClock")
            .field("now_ms", &self.now_ms)
            .field("step_ms", &self.step_ms)
            .field("timers", &self.timers.len())
            .field("frame_callbacks", &self.frame_callbacks.len())
            .finish()
    }
}

fn sanitize_step(step_ms: f64) -> f64 {
    if step_ms.is_finite() && step_ms > 0.0 {
        step_ms
    } else {
        1000.0 / 60.0
    }
}
