use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic session clock. Timestamps are nanoseconds since the timer origin.
pub trait Timer: Clone + Send + Sync {
    fn now(&self) -> u64;
    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(since))
    }
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_stats(&self) -> FrameStats;
}

/// Summary of recorded frame (draw + flip) durations.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub samples: usize,
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl FrameStats {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Duration>) -> Self {
        let times: Vec<f64> = samples
            .into_iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return FrameStats {
                samples: 0,
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
            };
        }
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        FrameStats {
            samples: times.len(),
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

/// Bounded window of the most recent frame durations.
#[derive(Debug, Clone)]
pub(crate) struct FrameWindow {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl FrameWindow {
    pub(crate) fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub(crate) fn push(&mut self, d: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    pub(crate) fn stats(&self) -> FrameStats {
        FrameStats::from_samples(self.samples.iter())
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    frames: FrameWindow,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        self.frames.push(d);
    }
    fn frame_stats(&self) -> FrameStats {
        self.frames.stats()
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frames: FrameWindow::new(1000),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // Relative sleep; resume with the remainder when a signal interrupts us.
        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != EINTR {
                break;
            }
            req = rem;
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_empty() {
        let timer = HighPrecisionTimer::new();
        let stats = timer.frame_stats();
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.effective_fps, 0.0);
    }

    #[test]
    fn test_stats_constant_frames() {
        let mut timer = HighPrecisionTimer::new();
        for _ in 0..10 {
            timer.record_frame(Duration::from_micros(16_667));
        }
        let stats = timer.frame_stats();
        assert_eq!(stats.samples, 10);
        assert!(stats.jitter_ns.abs() < 1e-6);
        assert!((stats.effective_fps - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_frame_window_evicts_oldest() {
        let mut window = FrameWindow::new(3);
        for ms in [1, 2, 3, 4] {
            window.push(Duration::from_millis(ms));
        }
        let stats = window.stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.min_frame_time_ns, 2_000_000.0);
        assert_eq!(stats.max_frame_time_ns, 4_000_000.0);
    }

    #[test]
    fn test_sleep_is_monotonic() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(2));
        assert!(timer.elapsed(before) >= Duration::from_millis(2));
    }
}
