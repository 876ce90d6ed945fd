//! Audio request model, playback filtering, and the repeating locate pattern.

use core::time::Duration;

use crate::config::{AudioConfig, MAX_LOCATE_SEC, MIN_LOCATE_SEC};
use crate::config::timing::LOCATE_BEEP_GAP;
use crate::time::Uptime;

/// Named cues the audio driver knows how to render.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AudioEvent {
    PowerOn,
    Connected,
    GpsLock,
    NoteSent,
    Motion,
    TempAlert,
    HumidityAlert,
    LowBattery,
    Button,
    Sleep,
    Error,
    Ping,
    LocateBeep,
    TransitLockOn,
    TransitLockOff,
    DemoLockOn,
    DemoLockOff,
}

impl AudioEvent {
    /// Melody names accepted by the remote `play_melody` command.
    pub const MELODIES: [(&'static str, Self); 8] = [
        ("connected", Self::Connected),
        ("power_on", Self::PowerOn),
        ("alert", Self::TempAlert),
        ("ping", Self::Ping),
        ("error", Self::Error),
        ("low_battery", Self::LowBattery),
        ("gps_lock", Self::GpsLock),
        ("sleep", Self::Sleep),
    ];

    #[must_use]
    pub fn from_melody_name(name: &str) -> Option<Self> {
        Self::MELODIES
            .iter()
            .find(|(melody, _)| *melody == name)
            .map(|(_, event)| *event)
    }

    /// Cues that still play when the device is configured for alerts only.
    #[must_use]
    pub const fn is_alert_class(self) -> bool {
        matches!(
            self,
            Self::TempAlert
                | Self::HumidityAlert
                | Self::LowBattery
                | Self::Error
                | Self::Ping
                | Self::LocateBeep
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "power_on",
            Self::Connected => "connected",
            Self::GpsLock => "gps_lock",
            Self::NoteSent => "note_sent",
            Self::Motion => "motion",
            Self::TempAlert => "temp_alert",
            Self::HumidityAlert => "humidity_alert",
            Self::LowBattery => "low_battery",
            Self::Button => "button",
            Self::Sleep => "sleep",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::LocateBeep => "locate",
            Self::TransitLockOn => "transit_lock_on",
            Self::TransitLockOff => "transit_lock_off",
            Self::DemoLockOn => "demo_lock_on",
            Self::DemoLockOff => "demo_lock_off",
        }
    }
}

/// Work item consumed by the audio player.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AudioRequest {
    Event(AudioEvent),
    Tone { frequency_hz: u16, duration_ms: u16 },
    StartLocate { duration: Duration },
    StopLocate,
}

/// Playback settings shared between the orchestrator and the audio player.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AudioSettings {
    pub enabled: bool,
    pub muted: bool,
    pub volume: u8,
    pub alerts_only: bool,
}

impl AudioSettings {
    #[must_use]
    pub const fn from_config(config: &AudioConfig) -> Self {
        Self {
            enabled: config.enabled,
            muted: false,
            volume: config.volume,
            alerts_only: config.alerts_only,
        }
    }

    /// Adopts a new configuration while keeping the local mute toggle.
    #[must_use]
    pub const fn reconfigured(self, config: &AudioConfig) -> Self {
        Self {
            muted: self.muted,
            ..Self::from_config(config)
        }
    }

    #[must_use]
    pub const fn is_audible(&self) -> bool {
        self.enabled && !self.muted
    }

    /// Whether a named cue should reach the driver.
    #[must_use]
    pub const fn permits(&self, event: AudioEvent) -> bool {
        self.is_audible() && (!self.alerts_only || event.is_alert_class())
    }

    /// Whether an ad hoc request should reach the driver.
    #[must_use]
    pub const fn permits_request(&self, request: &AudioRequest) -> bool {
        match request {
            AudioRequest::Event(event) => self.permits(*event),
            AudioRequest::Tone { .. } => self.is_audible() && !self.alerts_only,
            AudioRequest::StartLocate { .. } => self.is_audible(),
            AudioRequest::StopLocate => true,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::from_config(&crate::config::Configuration::new().audio)
    }
}

/// Clamps a requested locate duration into the supported window.
///
/// A zero request falls back to the configured default.
#[must_use]
pub fn locate_duration(requested_sec: Option<u16>, default_sec: u16) -> Duration {
    let secs = match requested_sec {
        Some(secs) if secs > 0 => secs,
        _ => default_sec,
    };
    Duration::from_secs(u64::from(secs.clamp(MIN_LOCATE_SEC, MAX_LOCATE_SEC)))
}

/// What the audio player should do next while locating.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LocateStep {
    /// No pattern is running.
    Idle,
    /// Play one beep, then wait for the returned gap.
    Beep { gap: Duration },
    /// The pattern just reached its end time.
    Finished,
}

/// Repeating locate beep pattern with an absolute end time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LocatePattern {
    ends_at: Option<Uptime>,
}

impl LocatePattern {
    #[must_use]
    pub const fn idle() -> Self {
        Self { ends_at: None }
    }

    pub fn start(&mut self, now: Uptime, duration: Duration) {
        self.ends_at = Some(now + duration);
    }

    pub fn stop(&mut self) {
        self.ends_at = None;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.ends_at.is_some()
    }

    #[must_use]
    pub const fn ends_at(&self) -> Option<Uptime> {
        self.ends_at
    }

    /// Advances the pattern, ending it once `now` passes the end time.
    pub fn step(&mut self, now: Uptime) -> LocateStep {
        match self.ends_at {
            None => LocateStep::Idle,
            Some(end) if now >= end => {
                self.ends_at = None;
                LocateStep::Finished
            }
            Some(_) => LocateStep::Beep {
                gap: LOCATE_BEEP_GAP,
            },
        }
    }
}
