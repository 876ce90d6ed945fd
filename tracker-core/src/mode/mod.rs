//! Operating-mode ownership and the transit/demo lock overlay.
//!
//! Locks pin the operating mode to a fixed value and remember the mode to
//! restore. At most one lock is engaged at a time: engaging the other one is
//! rejected, never queued.

use serde::{Deserialize, Serialize};

use crate::audio::AudioEvent;
use crate::config::OperatingMode;
use crate::input::ClickGesture;

/// Operator-forced overlay on the operating mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Lock {
    Transit,
    Demo,
}

impl Lock {
    /// Mode forced while the lock is engaged.
    #[must_use]
    pub const fn target_mode(self) -> OperatingMode {
        match self {
            Lock::Transit => OperatingMode::Transit,
            Lock::Demo => OperatingMode::Demo,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Lock::Transit => "transit",
            Lock::Demo => "demo",
        }
    }

    const fn engaged_cue(self) -> AudioEvent {
        match self {
            Lock::Transit => AudioEvent::TransitLockOn,
            Lock::Demo => AudioEvent::DemoLockOn,
        }
    }

    const fn released_cue(self) -> AudioEvent {
        match self {
            Lock::Transit => AudioEvent::TransitLockOff,
            Lock::Demo => AudioEvent::DemoLockOff,
        }
    }
}

/// Which locks an unlock request targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockTarget {
    Transit,
    Demo,
    All,
}

impl LockTarget {
    #[must_use]
    pub const fn covers(self, lock: Lock) -> bool {
        matches!(
            (self, lock),
            (LockTarget::All, _)
                | (LockTarget::Transit, Lock::Transit)
                | (LockTarget::Demo, Lock::Demo)
        )
    }
}

/// Engaged locks, each with the mode to restore on release.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    transit: Option<OperatingMode>,
    demo: Option<OperatingMode>,
}

impl LockState {
    pub const UNLOCKED: Self = Self {
        transit: None,
        demo: None,
    };

    #[must_use]
    pub const fn is_transit_locked(&self) -> bool {
        self.transit.is_some()
    }

    #[must_use]
    pub const fn is_demo_locked(&self) -> bool {
        self.demo.is_some()
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.transit.is_some() || self.demo.is_some()
    }

    /// The engaged lock, if any.
    #[must_use]
    pub const fn active(&self) -> Option<Lock> {
        if self.transit.is_some() {
            Some(Lock::Transit)
        } else if self.demo.is_some() {
            Some(Lock::Demo)
        } else {
            None
        }
    }

    /// Mode that will be restored when `lock` is released.
    #[must_use]
    pub const fn restore_mode(&self, lock: Lock) -> Option<OperatingMode> {
        match lock {
            Lock::Transit => self.transit,
            Lock::Demo => self.demo,
        }
    }

    fn slot(&mut self, lock: Lock) -> &mut Option<OperatingMode> {
        match lock {
            Lock::Transit => &mut self.transit,
            Lock::Demo => &mut self.demo,
        }
    }
}

/// Result of a lock transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockOutcome {
    /// The lock is now engaged and the mode forced to its target.
    Engaged {
        lock: Lock,
        previous: OperatingMode,
        mode: OperatingMode,
    },
    /// The lock was released and the saved mode restored.
    Released { lock: Lock, mode: OperatingMode },
    /// The other lock is engaged; nothing changed.
    Rejected { requested: Lock, active: Lock },
}

impl LockOutcome {
    /// Feedback cue for the transition.
    #[must_use]
    pub const fn cue(&self) -> AudioEvent {
        match self {
            LockOutcome::Engaged { lock, .. } => lock.engaged_cue(),
            LockOutcome::Released { lock, .. } => lock.released_cue(),
            LockOutcome::Rejected { .. } => AudioEvent::Error,
        }
    }

    /// Mode to apply, if the transition changed it.
    #[must_use]
    pub const fn applied_mode(&self) -> Option<OperatingMode> {
        match self {
            LockOutcome::Engaged { mode, .. } | LockOutcome::Released { mode, .. } => Some(*mode),
            LockOutcome::Rejected { .. } => None,
        }
    }
}

/// Decision for a mode change that originated remotely.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RemoteModeDecision {
    Accept(OperatingMode),
    Unchanged,
    Rejected { lock: Lock },
}

/// Local action bound to a click gesture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GestureAction {
    ToggleMute,
    ToggleLock(Lock),
}

impl From<ClickGesture> for GestureAction {
    fn from(gesture: ClickGesture) -> Self {
        match gesture {
            ClickGesture::Triple => GestureAction::ToggleMute,
            ClickGesture::Double => GestureAction::ToggleLock(Lock::Demo),
            ClickGesture::Single => GestureAction::ToggleLock(Lock::Transit),
        }
    }
}

/// Mode and lock state machine over a borrowed mode/lock pair.
///
/// The pair lives in the persistent state so that locks survive sleep.
pub struct ModeController<'a> {
    mode: &'a mut OperatingMode,
    locks: &'a mut LockState,
}

impl<'a> ModeController<'a> {
    pub fn new(mode: &'a mut OperatingMode, locks: &'a mut LockState) -> Self {
        Self { mode, locks }
    }

    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        *self.mode
    }

    #[must_use]
    pub fn locks(&self) -> LockState {
        *self.locks
    }

    /// Engages `lock` if no lock is active, or releases it if it is the active one.
    pub fn toggle(&mut self, lock: Lock) -> LockOutcome {
        match self.locks.active() {
            Some(active) if active == lock => self
                .release(lock)
                .unwrap_or(LockOutcome::Rejected { requested: lock, active }),
            Some(active) => LockOutcome::Rejected {
                requested: lock,
                active,
            },
            None => {
                let previous = *self.mode;
                let mode = lock.target_mode();
                *self.locks.slot(lock) = Some(previous);
                *self.mode = mode;
                LockOutcome::Engaged {
                    lock,
                    previous,
                    mode,
                }
            }
        }
    }

    /// Releases the engaged lock if `target` covers it.
    pub fn release_matching(&mut self, target: LockTarget) -> Option<LockOutcome> {
        let active = self.locks.active()?;
        if target.covers(active) {
            self.release(active)
        } else {
            None
        }
    }

    fn release(&mut self, lock: Lock) -> Option<LockOutcome> {
        let restored = self.locks.slot(lock).take()?;
        *self.mode = restored;
        Some(LockOutcome::Released {
            lock,
            mode: restored,
        })
    }

    /// Screens a remotely requested mode against the lock overlay.
    pub fn request_remote(&mut self, requested: OperatingMode) -> RemoteModeDecision {
        if requested == *self.mode {
            return RemoteModeDecision::Unchanged;
        }
        if let Some(lock) = self.locks.active() {
            return RemoteModeDecision::Rejected { lock };
        }
        *self.mode = requested;
        RemoteModeDecision::Accept(requested)
    }
}
