//! Monotonic uptime timestamps shared by every module.
//!
//! The core never reads a clock on its own. Callers pass an [`Uptime`]
//! captured from whatever monotonic source the platform provides (the Embassy
//! time driver on target, a simulated clock in the emulator and tests).

use core::ops::Add;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Milliseconds elapsed since the current wake session started.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Uptime(u64);

impl Uptime {
    /// Session start.
    pub const ZERO: Self = Self(0);

    /// Builds a timestamp from a millisecond count.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Builds a timestamp from a whole-second count.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Whole seconds, saturating at `u32::MAX`.
    #[must_use]
    pub fn as_secs_u32(self) -> u32 {
        u32::try_from(self.0 / 1_000).unwrap_or(u32::MAX)
    }

    /// Returns the time elapsed since `earlier`, or zero if `earlier` is in the future.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Uptime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_saturates_for_future_instants() {
        let early = Uptime::from_millis(500);
        let late = Uptime::from_millis(1_750);
        assert_eq!(
            late.saturating_duration_since(early),
            Duration::from_millis(1_250)
        );
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
    }

    #[test]
    fn addition_saturates() {
        let near_end = Uptime::from_millis(u64::MAX - 1);
        assert_eq!(near_end + Duration::from_secs(10), Uptime::from_millis(u64::MAX));
        assert_eq!(Uptime::from_secs(2).as_secs_u32(), 2);
    }
}
