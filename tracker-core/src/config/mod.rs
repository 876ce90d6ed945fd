//! Device configuration, operating modes, and the timing constants shared by
//! every task.
//!
//! [`Configuration`] is a plain `Copy` value. The orchestrator owns the
//! authoritative copy and replaces it wholesale whenever an update is
//! accepted; other tasks only ever hold snapshots.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

use heapless::Vec;
use serde::{Deserialize, Serialize};

pub mod timing;

/// Operating modes, ordered from the most to the least chatty.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Fastest reporting cadence, continuous sync.
    #[default]
    Demo,
    /// Balanced cadence for assets on the move.
    Transit,
    /// Low-frequency reporting for parked assets.
    Storage,
    /// Sampling suspended; wakes on motion or command only.
    Sleep,
}

impl OperatingMode {
    pub const ALL: [Self; 4] = [Self::Demo, Self::Transit, Self::Storage, Self::Sleep];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Transit => "transit",
            Self::Storage => "storage",
            Self::Sleep => "sleep",
        }
    }

    /// Preset cadence associated with the mode.
    #[must_use]
    pub const fn preset(self) -> ModePreset {
        match self {
            Self::Demo => ModePreset {
                sensor_interval: Duration::from_secs(60),
                command_poll_interval: Duration::from_secs(1),
            },
            Self::Transit => ModePreset {
                sensor_interval: Duration::from_secs(60),
                command_poll_interval: Duration::from_secs(30),
            },
            Self::Storage => ModePreset {
                sensor_interval: Duration::from_secs(300),
                command_poll_interval: Duration::from_secs(60),
            },
            Self::Sleep => ModePreset {
                sensor_interval: Duration::ZERO,
                command_poll_interval: Duration::ZERO,
            },
        }
    }

    /// Sensor sampling period. Zero suspends sampling.
    #[must_use]
    pub const fn sensor_interval(self) -> Duration {
        self.preset().sensor_interval
    }

    /// Inbound command poll period. Zero means "no scheduled polling".
    #[must_use]
    pub const fn command_poll_interval(self) -> Duration {
        self.preset().command_poll_interval
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode name is not recognized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseModeError;

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown operating mode")
    }
}

impl FromStr for OperatingMode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
            .ok_or(ParseModeError)
    }
}

/// Per-mode cadence preset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModePreset {
    pub sensor_interval: Duration,
    pub command_poll_interval: Duration,
}

/// Accelerometer sensitivity used by the cloud layer's motion detection.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MotionSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl MotionSensitivity {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Motion threshold in g. Lower values trip on smaller movements.
    #[must_use]
    pub const fn threshold_g(self) -> f32 {
        match self {
            Self::Low => 3.0,
            Self::Medium => 1.5,
            Self::High => 0.5,
        }
    }
}

/// Error returned when a sensitivity name is not recognized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseSensitivityError;

impl fmt::Display for ParseSensitivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown motion sensitivity")
    }
}

impl FromStr for MotionSensitivity {
    type Err = ParseSensitivityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
            .ok_or(ParseSensitivityError)
    }
}

/// Alert thresholds evaluated against every sensor reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AlertThresholds {
    pub temp_high_c: f32,
    pub temp_low_c: f32,
    pub humidity_high_pct: f32,
    pub humidity_low_pct: f32,
    pub pressure_delta_hpa: f32,
    pub voltage_low_v: f32,
}

impl AlertThresholds {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            temp_high_c: 35.0,
            temp_low_c: 0.0,
            humidity_high_pct: 80.0,
            humidity_low_pct: 20.0,
            pressure_delta_hpa: 10.0,
            voltage_low_v: 3.4,
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio output settings distributed through the configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AudioConfig {
    pub enabled: bool,
    pub volume: u8,
    pub alerts_only: bool,
}

/// Location tracking power-save policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GpsPowerSaveConfig {
    pub enabled: bool,
    pub signal_timeout_min: u8,
    pub retry_interval_min: u8,
}

impl GpsPowerSaveConfig {
    #[must_use]
    pub fn signal_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.signal_timeout_min) * 60)
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.retry_interval_min) * 60)
    }
}

/// Deep-sleep request handed to the cloud layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SleepPlan {
    /// Timer wake-up. `None` sleeps until motion or an inbound command.
    pub duration: Option<Duration>,
    pub wake_on_motion: bool,
    pub wake_on_command: bool,
}

/// Complete device configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Configuration {
    pub mode: OperatingMode,
    pub gps_interval_min: u16,
    pub sync_interval_min: u16,
    pub heartbeat_hours: u8,
    pub thresholds: AlertThresholds,
    pub motion_sensitivity: MotionSensitivity,
    pub motion_wake_enabled: bool,
    pub audio: AudioConfig,
    pub cmd_wake_enabled: bool,
    pub cmd_ack_enabled: bool,
    pub locate_duration_sec: u16,
    pub led_enabled: bool,
    pub debug_mode: bool,
    pub gps_power_save: GpsPowerSaveConfig,
}

pub const MIN_LOCATE_SEC: u16 = 5;
pub const MAX_LOCATE_SEC: u16 = 300;

impl Configuration {
    /// Factory defaults used on cold boot and until the remote store answers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: OperatingMode::Demo,
            gps_interval_min: 5,
            sync_interval_min: 15,
            heartbeat_hours: 24,
            thresholds: AlertThresholds::new(),
            motion_sensitivity: MotionSensitivity::Medium,
            motion_wake_enabled: true,
            audio: AudioConfig {
                enabled: true,
                volume: 80,
                alerts_only: false,
            },
            cmd_wake_enabled: true,
            cmd_ack_enabled: true,
            locate_duration_sec: 30,
            led_enabled: true,
            debug_mode: false,
            gps_power_save: GpsPowerSaveConfig {
                enabled: true,
                signal_timeout_min: 15,
                retry_interval_min: 30,
            },
        }
    }

    /// Returns a copy with every numeric field forced into its legal range.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.gps_interval_min = self.gps_interval_min.clamp(1, 1440);
        self.sync_interval_min = self.sync_interval_min.clamp(1, 1440);
        self.heartbeat_hours = self.heartbeat_hours.clamp(1, 168);
        let t = &mut self.thresholds;
        t.temp_high_c = clamp_f32(t.temp_high_c, -40.0, 85.0);
        t.temp_low_c = clamp_f32(t.temp_low_c, -40.0, 85.0);
        t.humidity_high_pct = clamp_f32(t.humidity_high_pct, 0.0, 100.0);
        t.humidity_low_pct = clamp_f32(t.humidity_low_pct, 0.0, 100.0);
        t.pressure_delta_hpa = clamp_f32(t.pressure_delta_hpa, 1.0, 100.0);
        t.voltage_low_v = clamp_f32(t.voltage_low_v, 3.0, 4.2);
        self.audio.volume = self.audio.volume.min(100);
        self.locate_duration_sec = self.locate_duration_sec.clamp(MIN_LOCATE_SEC, MAX_LOCATE_SEC);
        self.gps_power_save.signal_timeout_min = self.gps_power_save.signal_timeout_min.clamp(1, 120);
        self.gps_power_save.retry_interval_min = self.gps_power_save.retry_interval_min.clamp(1, 240);
        if self.mode == OperatingMode::Sleep {
            self.motion_wake_enabled = true;
        }
        self
    }

    /// Deep-sleep plan for the current mode, or `None` when the mode never sleeps.
    #[must_use]
    pub fn sleep_plan(&self) -> Option<SleepPlan> {
        let duration = match self.mode {
            OperatingMode::Demo => return None,
            OperatingMode::Transit | OperatingMode::Storage => Some(Duration::from_secs(
                u64::from(self.gps_interval_min) * 60,
            )),
            OperatingMode::Sleep => None,
        };
        Some(SleepPlan {
            duration,
            wake_on_motion: self.motion_wake_enabled,
            wake_on_command: self.cmd_wake_enabled,
        })
    }

    /// Lists every field whose value differs from `other`.
    #[must_use]
    pub fn changes(&self, other: &Self) -> ConfigChanges {
        let mut changes = ConfigChanges::new();
        for field in ConfigField::ALL {
            if !self.field_eq(other, field) {
                // Capacity equals the number of fields.
                let _ = changes.push(field);
            }
        }
        changes
    }

    fn field_eq(&self, other: &Self, field: ConfigField) -> bool {
        let (a, b) = (&self.thresholds, &other.thresholds);
        match field {
            ConfigField::Mode => self.mode == other.mode,
            ConfigField::GpsInterval => self.gps_interval_min == other.gps_interval_min,
            ConfigField::SyncInterval => self.sync_interval_min == other.sync_interval_min,
            ConfigField::Heartbeat => self.heartbeat_hours == other.heartbeat_hours,
            ConfigField::TempHigh => a.temp_high_c.to_bits() == b.temp_high_c.to_bits(),
            ConfigField::TempLow => a.temp_low_c.to_bits() == b.temp_low_c.to_bits(),
            ConfigField::HumidityHigh => {
                a.humidity_high_pct.to_bits() == b.humidity_high_pct.to_bits()
            }
            ConfigField::HumidityLow => a.humidity_low_pct.to_bits() == b.humidity_low_pct.to_bits(),
            ConfigField::PressureDelta => {
                a.pressure_delta_hpa.to_bits() == b.pressure_delta_hpa.to_bits()
            }
            ConfigField::VoltageLow => a.voltage_low_v.to_bits() == b.voltage_low_v.to_bits(),
            ConfigField::MotionSensitivity => self.motion_sensitivity == other.motion_sensitivity,
            ConfigField::MotionWake => self.motion_wake_enabled == other.motion_wake_enabled,
            ConfigField::AudioEnabled => self.audio.enabled == other.audio.enabled,
            ConfigField::AudioVolume => self.audio.volume == other.audio.volume,
            ConfigField::AlertsOnly => self.audio.alerts_only == other.audio.alerts_only,
            ConfigField::CommandWake => self.cmd_wake_enabled == other.cmd_wake_enabled,
            ConfigField::CommandAck => self.cmd_ack_enabled == other.cmd_ack_enabled,
            ConfigField::LocateDuration => self.locate_duration_sec == other.locate_duration_sec,
            ConfigField::Led => self.led_enabled == other.led_enabled,
            ConfigField::Debug => self.debug_mode == other.debug_mode,
            ConfigField::GpsPowerSave => self.gps_power_save.enabled == other.gps_power_save.enabled,
            ConfigField::GpsSignalTimeout => {
                self.gps_power_save.signal_timeout_min == other.gps_power_save.signal_timeout_min
            }
            ConfigField::GpsRetryInterval => {
                self.gps_power_save.retry_interval_min == other.gps_power_save.retry_interval_min
            }
        }
    }

    /// Applies one key/value pair as published by the remote store.
    ///
    /// Returns `Ok(true)` when the field changed. Numeric values are clamped
    /// into range; booleans accept `true` or `1`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKey`] for unrecognized keys and
    /// [`ConfigError::InvalidValue`] when a numeric value does not parse.
    pub fn apply_remote(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        let field = ConfigField::from_key(key).ok_or(ConfigError::UnknownKey)?;
        let before = *self;
        let value = value.trim();
        let t = &mut self.thresholds;
        match field {
            ConfigField::Mode => {
                self.mode = value.parse().unwrap_or(OperatingMode::Demo);
            }
            ConfigField::GpsInterval => self.gps_interval_min = parse_clamped(value, 1, 1440)?,
            ConfigField::SyncInterval => self.sync_interval_min = parse_clamped(value, 1, 1440)?,
            ConfigField::Heartbeat => self.heartbeat_hours = parse_clamped(value, 1, 168)?,
            ConfigField::TempHigh => t.temp_high_c = parse_clamped_f32(value, -40.0, 85.0)?,
            ConfigField::TempLow => t.temp_low_c = parse_clamped_f32(value, -40.0, 85.0)?,
            ConfigField::HumidityHigh => t.humidity_high_pct = parse_clamped_f32(value, 0.0, 100.0)?,
            ConfigField::HumidityLow => t.humidity_low_pct = parse_clamped_f32(value, 0.0, 100.0)?,
            ConfigField::PressureDelta => {
                t.pressure_delta_hpa = parse_clamped_f32(value, 1.0, 100.0)?;
            }
            ConfigField::VoltageLow => t.voltage_low_v = parse_clamped_f32(value, 3.0, 4.2)?,
            ConfigField::MotionSensitivity => {
                self.motion_sensitivity = value.parse().unwrap_or_default();
            }
            ConfigField::MotionWake => self.motion_wake_enabled = parse_flag(value),
            ConfigField::AudioEnabled => self.audio.enabled = parse_flag(value),
            ConfigField::AudioVolume => self.audio.volume = parse_clamped(value, 0, 100)?,
            ConfigField::AlertsOnly => self.audio.alerts_only = parse_flag(value),
            ConfigField::CommandWake => self.cmd_wake_enabled = parse_flag(value),
            ConfigField::CommandAck => self.cmd_ack_enabled = parse_flag(value),
            ConfigField::LocateDuration => {
                self.locate_duration_sec = parse_clamped(value, MIN_LOCATE_SEC, MAX_LOCATE_SEC)?;
            }
            ConfigField::Led => self.led_enabled = parse_flag(value),
            ConfigField::Debug => self.debug_mode = parse_flag(value),
            ConfigField::GpsPowerSave => self.gps_power_save.enabled = parse_flag(value),
            ConfigField::GpsSignalTimeout => {
                self.gps_power_save.signal_timeout_min = parse_clamped(value, 1, 120)?;
            }
            ConfigField::GpsRetryInterval => {
                self.gps_power_save.retry_interval_min = parse_clamped(value, 1, 240)?;
            }
        }
        Ok(!before.field_eq(self, field))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Individually comparable configuration fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigField {
    Mode,
    GpsInterval,
    SyncInterval,
    Heartbeat,
    TempHigh,
    TempLow,
    HumidityHigh,
    HumidityLow,
    PressureDelta,
    VoltageLow,
    MotionSensitivity,
    MotionWake,
    AudioEnabled,
    AudioVolume,
    AlertsOnly,
    CommandWake,
    CommandAck,
    LocateDuration,
    Led,
    Debug,
    GpsPowerSave,
    GpsSignalTimeout,
    GpsRetryInterval,
}

pub const CONFIG_FIELD_COUNT: usize = 23;

/// Fields that differ between two configurations.
pub type ConfigChanges = Vec<ConfigField, CONFIG_FIELD_COUNT>;

impl ConfigField {
    pub const ALL: [Self; CONFIG_FIELD_COUNT] = [
        Self::Mode,
        Self::GpsInterval,
        Self::SyncInterval,
        Self::Heartbeat,
        Self::TempHigh,
        Self::TempLow,
        Self::HumidityHigh,
        Self::HumidityLow,
        Self::PressureDelta,
        Self::VoltageLow,
        Self::MotionSensitivity,
        Self::MotionWake,
        Self::AudioEnabled,
        Self::AudioVolume,
        Self::AlertsOnly,
        Self::CommandWake,
        Self::CommandAck,
        Self::LocateDuration,
        Self::Led,
        Self::Debug,
        Self::GpsPowerSave,
        Self::GpsSignalTimeout,
        Self::GpsRetryInterval,
    ];

    /// Key used by the remote key/value store.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::GpsInterval => "gps_interval_min",
            Self::SyncInterval => "sync_interval_min",
            Self::Heartbeat => "heartbeat_hours",
            Self::TempHigh => "temp_alert_high_c",
            Self::TempLow => "temp_alert_low_c",
            Self::HumidityHigh => "humidity_alert_high",
            Self::HumidityLow => "humidity_alert_low",
            Self::PressureDelta => "pressure_alert_delta",
            Self::VoltageLow => "voltage_alert_low",
            Self::MotionSensitivity => "motion_sensitivity",
            Self::MotionWake => "motion_wake_enabled",
            Self::AudioEnabled => "audio_enabled",
            Self::AudioVolume => "audio_volume",
            Self::AlertsOnly => "audio_alerts_only",
            Self::CommandWake => "cmd_wake_enabled",
            Self::CommandAck => "cmd_ack_enabled",
            Self::LocateDuration => "locate_duration_sec",
            Self::Led => "led_enabled",
            Self::Debug => "debug_mode",
            Self::GpsPowerSave => "gps_power_save_enabled",
            Self::GpsSignalTimeout => "gps_signal_timeout_min",
            Self::GpsRetryInterval => "gps_retry_interval_min",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }
}

/// Errors raised while applying remote configuration values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    UnknownKey,
    InvalidValue,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownKey => f.write_str("unknown configuration key"),
            ConfigError::InvalidValue => f.write_str("invalid configuration value"),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_clamped<T>(value: &str, min: T, max: T) -> Result<T, ConfigError>
where
    T: TryFrom<i64>,
    i64: From<T>,
{
    let raw: i64 = value.parse().map_err(|_| ConfigError::InvalidValue)?;
    let clamped = raw.clamp(i64::from(min), i64::from(max));
    T::try_from(clamped).map_err(|_| ConfigError::InvalidValue)
}

fn parse_clamped_f32(value: &str, min: f32, max: f32) -> Result<f32, ConfigError> {
    let raw: f32 = value.parse().map_err(|_| ConfigError::InvalidValue)?;
    if raw.is_nan() {
        return Err(ConfigError::InvalidValue);
    }
    Ok(clamp_f32(raw, min, max))
}

fn clamp_f32(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() { min } else { value.clamp(min, max) }
}
