//! Debounced multi-click classification for the single user button.
//!
//! The classifier is polled from the orchestrator loop with the raw pin level
//! and the current uptime. Edges are processed before any resolution rule, so
//! a third click arriving after the double-click boundary still resolves as a
//! triple click.

use core::time::Duration;

use crate::time::Uptime;

/// Minimum spacing between accepted level changes.
pub const DEBOUNCE: Duration = Duration::from_millis(50);
/// A burst of two clicks resolves as a double once this much time has passed.
pub const INTER_CLICK_WINDOW: Duration = Duration::from_millis(600);
/// Overall burst window; also the triple-click deadline.
pub const BURST_WINDOW: Duration = Duration::from_millis(1_000);

/// Raw level of the active-low button input.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ButtonLevel {
    #[default]
    Released,
    Pressed,
}

/// Resolved operator gesture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClickGesture {
    Single,
    Double,
    Triple,
}

/// Click counting state machine.
#[derive(Clone, Debug, Default)]
pub struct ClickClassifier {
    level: ButtonLevel,
    last_transition: Option<Uptime>,
    clicks: u8,
    burst_started: Option<Uptime>,
}

impl ClickClassifier {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            level: ButtonLevel::Released,
            last_transition: None,
            clicks: 0,
            burst_started: None,
        }
    }

    /// Clicks counted in the current, unresolved burst.
    #[must_use]
    pub const fn pending_clicks(&self) -> u8 {
        self.clicks
    }

    /// Feeds one sample of the button level.
    pub fn poll(&mut self, level: ButtonLevel, now: Uptime) -> Option<ClickGesture> {
        self.track_edge(level, now);

        let started = self.burst_started?;
        let elapsed = now.saturating_duration_since(started);

        let gesture = if self.clicks >= 3 && elapsed < BURST_WINDOW {
            Some(ClickGesture::Triple)
        } else if self.clicks == 2 && elapsed >= INTER_CLICK_WINDOW && elapsed < BURST_WINDOW {
            Some(ClickGesture::Double)
        } else if self.clicks == 1 && elapsed >= BURST_WINDOW {
            Some(ClickGesture::Single)
        } else if elapsed >= BURST_WINDOW {
            self.reset();
            return None;
        } else {
            None
        };

        if gesture.is_some() {
            self.reset();
        }
        gesture
    }

    fn track_edge(&mut self, level: ButtonLevel, now: Uptime) {
        if level == self.level {
            return;
        }
        let settled = self
            .last_transition
            .is_none_or(|last| now.saturating_duration_since(last) >= DEBOUNCE);
        if !settled {
            return;
        }

        self.level = level;
        self.last_transition = Some(now);
        if level == ButtonLevel::Pressed {
            if self.clicks == 0 {
                self.burst_started = Some(now);
            }
            self.clicks = self.clicks.saturating_add(1);
        }
    }

    fn reset(&mut self) {
        self.clicks = 0;
        self.burst_started = None;
    }
}
