//! Time helpers: RFC3339 formatting for log correlation and a monotonic
//! timer for frame pacing measurements.
use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};
use std::time::{Duration, Instant, SystemTime};

pub fn utc_now() -> SystemTime {
    SystemTime::now()
}

pub fn to_rfc3339(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub fn now_iso8601() -> String {
    to_rfc3339(utc_now())
}

/// Monotonic duration measurer, used by the Frame Broker to time the
/// publish/sleep pacing cycle.
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::UNIX_EPOCH;

    #[test]
    fn to_rfc3339_formats_epoch() {
        let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200);
        assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
    }

    #[test]
    fn monotonic_timer_advances() {
        let timer = MonotonicTimer::new();
        thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
    }

    #[test]
    fn monotonic_timer_reset() {
        let mut timer = MonotonicTimer::new();
        thread::sleep(Duration::from_millis(5));
        let before = timer.elapsed();
        timer.reset();
        assert!(timer.elapsed() < before);
    }
}
