use std::time::{Duration, Instant};

/// Session clock. Timestamps are the time elapsed since the session started.
pub trait Timer {
    fn now(&self) -> Duration;
    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }
    /// Wait until the next frame is due.
    fn wait_frame(&mut self, frame: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_count(&self) -> u64;
    fn frame_stats(&self) -> FrameStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl FrameStats {
    fn from_samples(frames: u64, samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self {
                frames,
                ..Self::default()
            };
        }
        let times: Vec<f64> = samples.iter().map(|d| d.as_nanos() as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            frames,
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

/// Bounded window of recent frame durations
#[derive(Debug, Clone)]
struct FrameWindow {
    samples: Vec<Duration>,
    max_samples: usize,
    frames: u64,
}

impl FrameWindow {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
            frames: 0,
        }
    }

    fn push(&mut self, d: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(d);
        self.frames += 1;
    }

    fn stats(&self) -> FrameStats {
        FrameStats::from_samples(self.frames, &self.samples)
    }
}

/// Wall-clock timer for live sessions, pacing frames with the most precise
/// sleep the platform offers.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    last_frame: Instant,
    window: FrameWindow,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn wait_frame(&mut self, frame: Duration) {
        let spent = self.last_frame.elapsed();
        if let Some(remaining) = frame.checked_sub(spent) {
            self.high_precision_sleep(remaining);
        }
        let now = Instant::now();
        let frame_time = now - self.last_frame;
        self.last_frame = now;
        self.record_frame(frame_time);
    }

    fn record_frame(&mut self, d: Duration) {
        self.window.push(d);
    }

    fn frame_count(&self) -> u64 {
        self.window.frames
    }

    fn frame_stats(&self) -> FrameStats {
        self.window.stats()
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            window: FrameWindow::new(1000),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        // SAFETY: `req` is a valid timespec and the remainder pointer may be null.
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated clock that advances by a fixed step per frame without sleeping.
/// Used for replays and tests, where frame time must be reproducible.
#[derive(Debug, Clone)]
pub struct FrameClock {
    now: Duration,
    window: FrameWindow,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            window: FrameWindow::new(1000),
        }
    }

    /// Frame period for a refresh rate, truncated to whole nanoseconds.
    pub fn period(fps: u32) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for FrameClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn wait_frame(&mut self, frame: Duration) {
        self.now += frame;
        self.record_frame(frame);
    }

    fn record_frame(&mut self, d: Duration) {
        self.window.push(d);
    }

    fn frame_count(&self) -> u64 {
        self.window.frames
    }

    fn frame_stats(&self) -> FrameStats {
        self.window.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_clock_advances_by_fixed_step() {
        let mut clock = FrameClock::new();
        let period = Duration::from_millis(20);
        for _ in 0..50 {
            clock.wait_frame(period);
        }
        assert_eq!(clock.now(), Duration::from_secs(1));
        assert_eq!(clock.frame_count(), 50);

        let stats = clock.frame_stats();
        assert_eq!(stats.frames, 50);
        assert_eq!(stats.jitter_ns, 0.0);
        assert!((stats.effective_fps - 50.0).abs() < 1e-9);
    }

    #[test]
    fn frame_window_is_bounded() {
        let mut window = FrameWindow::new(3);
        for ms in [10, 10, 10, 40] {
            window.push(Duration::from_millis(ms));
        }
        let stats = window.stats();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.max_frame_time_ns, 40_000_000.0);
        assert_eq!(stats.min_frame_time_ns, 10_000_000.0);
    }

    #[test]
    fn empty_stats_are_zeroed() {
        let stats = HighPrecisionTimer::new().frame_stats();
        assert_eq!(stats, FrameStats::default());
    }

    #[test]
    fn high_precision_timer_paces_frames() {
        let mut timer = HighPrecisionTimer::new();
        timer.wait_frame(Duration::from_millis(5));
        assert_eq!(timer.frame_count(), 1);
        assert!(timer.now() >= Duration::from_millis(5));
    }
}
