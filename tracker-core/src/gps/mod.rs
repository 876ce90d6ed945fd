//! Location tracking power-save policy.
//!
//! In transit mode the tracker turns location tracking off when no fix has
//! been seen for the configured signal timeout, and turns it back on after the
//! retry interval. Any other mode, or disabling the policy, restores tracking.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::timing::FRESH_FIX_AGE;
use crate::config::{GpsPowerSaveConfig, OperatingMode};
use crate::time::Uptime;

/// Snapshot of the location subsystem reported by the cloud layer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LocationStatus {
    pub has_fix: bool,
    /// Age of the most recent fix.
    pub fix_age: Option<Duration>,
}

impl LocationStatus {
    /// A fix counts as fresh when it is younger than [`FRESH_FIX_AGE`].
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.has_fix && self.fix_age.is_some_and(|age| age < FRESH_FIX_AGE)
    }
}

/// Action the cloud layer must take on location tracking.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrackingAction {
    Enable,
    Disable,
}

/// Persisted power-save bookkeeping.
///
/// Timestamps are session uptimes; [`GpsPowerState::rebase`] discards them
/// after a wake so that stale values from the previous session never count.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GpsPowerState {
    tracking_disabled: bool,
    last_signal_at: Option<Uptime>,
    disabled_at: Option<Uptime>,
}

impl GpsPowerState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tracking_disabled: false,
            last_signal_at: None,
            disabled_at: None,
        }
    }

    #[must_use]
    pub const fn is_tracking_disabled(&self) -> bool {
        self.tracking_disabled
    }

    /// Anchors every timer at `now` for a new wake session.
    pub fn rebase(&mut self, now: Uptime) {
        self.last_signal_at = Some(now);
        if self.tracking_disabled {
            self.disabled_at = Some(now);
        }
    }

    /// Updates the policy with the latest location status.
    pub fn evaluate(
        &mut self,
        config: &GpsPowerSaveConfig,
        mode: OperatingMode,
        status: &LocationStatus,
        now: Uptime,
    ) -> Option<TrackingAction> {
        if !config.enabled || mode != OperatingMode::Transit {
            return self.resume(now);
        }

        if status.has_fix {
            self.last_signal_at = Some(now);
        }

        if self.tracking_disabled {
            let disabled_at = *self.disabled_at.get_or_insert(now);
            if now.saturating_duration_since(disabled_at) >= config.retry_interval() {
                return self.resume(now);
            }
            return None;
        }

        let last_signal = *self.last_signal_at.get_or_insert(now);
        if now.saturating_duration_since(last_signal) >= config.signal_timeout() {
            self.tracking_disabled = true;
            self.disabled_at = Some(now);
            return Some(TrackingAction::Disable);
        }
        None
    }

    fn resume(&mut self, now: Uptime) -> Option<TrackingAction> {
        if !self.tracking_disabled {
            return None;
        }
        self.tracking_disabled = false;
        self.disabled_at = None;
        self.last_signal_at = Some(now);
        Some(TrackingAction::Enable)
    }
}
