use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::timer::{FrameStats, FrameWindow, Timer};

/// Deterministic clock: time only moves when something sleeps or advances it.
///
/// Clones share the same clock, so a scripted input device holding a clone
/// observes the time the trial loop has reached.
#[derive(Debug, Clone)]
pub struct SimulatedTimer {
    now_ns: Arc<AtomicU64>,
    frames: FrameWindow,
}

impl SimulatedTimer {
    pub fn new() -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(0)),
            frames: FrameWindow::new(1000),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for SimulatedTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for SimulatedTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_frame(&mut self, d: Duration) {
        self.frames.push(d);
    }
    fn frame_stats(&self) -> FrameStats {
        self.frames.stats()
    }
}
