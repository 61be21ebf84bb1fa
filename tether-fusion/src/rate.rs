//! Per-second stream and render rate reporting.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Counts gathered over one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateReport {
    pub poses: u32,
    pub depth_frames: u32,
    pub renders: u32,
    pub elapsed: Duration,
}

impl RateReport {
    fn per_second(&self, count: u32) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            count as f64 / seconds
        } else {
            0.0
        }
    }

    pub fn pose_hz(&self) -> f64 {
        self.per_second(self.poses)
    }

    pub fn depth_hz(&self) -> f64 {
        self.per_second(self.depth_frames)
    }

    pub fn render_hz(&self) -> f64 {
        self.per_second(self.renders)
    }
}

impl fmt::Display for RateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pose {:.0} Hz, depth {:.0} Hz, render {:.0} Hz",
            self.pose_hz(),
            self.depth_hz(),
            self.render_hz()
        )
    }
}

/// Counts poses, depth frames and renders, and reports them once per
/// interval. Purely diagnostic.
#[derive(Debug)]
pub struct RateMonitor {
    poses: u32,
    depth_frames: u32,
    renders: u32,
    interval: Duration,
    last_report: Instant,
}

impl RateMonitor {
    pub fn new(now: Instant) -> Self {
        Self::with_interval(now, Duration::from_secs(1))
    }

    pub fn with_interval(now: Instant, interval: Duration) -> Self {
        Self {
            poses: 0,
            depth_frames: 0,
            renders: 0,
            interval,
            last_report: now,
        }
    }

    pub fn record_pose(&mut self) {
        self.poses += 1;
    }

    pub fn record_depth(&mut self) {
        self.depth_frames += 1;
    }

    pub fn record_render(&mut self) {
        self.renders += 1;
    }

    /// Emit and reset the counters if a full interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<RateReport> {
        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed < self.interval {
            return None;
        }

        let report = RateReport {
            poses: self.poses,
            depth_frames: self.depth_frames,
            renders: self.renders,
            elapsed,
        };
        info!("{}", report);

        self.poses = 0;
        self.depth_frames = 0;
        self.renders = 0;
        self.last_report = now;
        Some(report)
    }
}
