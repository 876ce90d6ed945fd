//! Conversions between the core's clock types and Embassy's.

use embassy_time::{Duration, Instant};
use tracker_core::time::Uptime;

/// Current time as core uptime.
pub fn now() -> Uptime {
    uptime_from(Instant::now())
}

pub fn uptime_from(instant: Instant) -> Uptime {
    Uptime::from_millis(instant.as_millis())
}

pub fn instant_from(uptime: Uptime) -> Instant {
    Instant::from_millis(uptime.as_millis())
}

pub fn to_embassy(duration: core::time::Duration) -> Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_convert_without_loss() {
        let converted = to_embassy(core::time::Duration::from_millis(850));
        assert_eq!(converted, Duration::from_millis(850));
    }

    #[test]
    fn instants_round_trip_at_millisecond_resolution() {
        let uptime = Uptime::from_millis(12_345);
        assert_eq!(uptime_from(instant_from(uptime)), uptime);
    }
}
