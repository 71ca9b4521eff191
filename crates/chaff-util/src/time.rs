//! Time utilities for chaffd
//!
//! Scheduling decisions (wave spacing, real-flag spacing) use monotonic
//! time so they are immune to wall-clock changes. Wall-clock time is only
//! used for log output.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Get the current local time.
pub fn now() -> DateTime<Local> {
    chrono::Local::now()
}

/// Format a DateTime with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Represents a point in monotonic time for interval enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Duration since `earlier`, or zero if `earlier` is later than `self`
    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    /// True if at least `interval` has passed between `since` and `self`.
    /// An unset `since` always counts as elapsed.
    pub fn has_elapsed(&self, since: Option<MonotonicInstant>, interval: Duration) -> bool {
        match since {
            Some(since) => self.duration_since(since) >= interval,
            None => true,
        }
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if seconds > 0 || d.subsec_millis() == 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", d.subsec_millis())
    }
}
