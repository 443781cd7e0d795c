#![forbid(unsafe_code)]

//! Time sources.
//!
//! The flow never reads the system monotonic clock. All scheduling runs on a
//! [`DeterministicClock`] that the host advances explicitly, so a test can
//! replay a 2-second verification ceiling without sleeping. Wall-clock time
//! is only used to stamp answer records.

use core::time::Duration;

/// Deterministic monotonic clock controlled by the host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeterministicClock {
    now: Duration,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    /// Current monotonic time.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Set the current time. Moving backwards is ignored.
    pub fn set(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Advance by `dt` (saturating).
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }
}

/// Milliseconds since the UNIX epoch.
///
/// Uses `web_time` so the crate also runs on `wasm32-unknown-unknown`.
#[must_use]
pub fn wall_clock_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_clock_advances_monotonically() {
        let mut c = DeterministicClock::new();
        assert_eq!(c.now(), Duration::ZERO);

        c.advance(Duration::from_millis(10));
        assert_eq!(c.now(), Duration::from_millis(10));

        c.set(Duration::from_millis(4));
        assert_eq!(c.now(), Duration::from_millis(10));

        c.set(Duration::MAX);
        c.advance(Duration::from_secs(1));
        assert_eq!(c.now(), Duration::MAX);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(wall_clock_ms() > 1_577_836_800_000);
    }
}
