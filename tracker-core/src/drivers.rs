//! Narrow interfaces to the collaborators the core drives.
//!
//! Everything reachable over the shared bus ([`SensorDriver`],
//! [`CloudTransport`], [`RemoteConfigStore`], [`PersistenceBackend`]) is
//! synchronous and must only be called while the caller holds the bus mutex.
//! Audio playback is asynchronous and never requires the bus.

use core::fmt;

use crate::audio::AudioEvent;
use crate::commands::InboundCommand;
use crate::config::{Configuration, OperatingMode, SleepPlan};
use crate::gps::LocationStatus;
use crate::input::ButtonLevel;
use crate::telemetry::OutboundRecord;

/// Failure reported by a collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverError {
    /// The bus transaction failed.
    Bus,
    /// The peripheral did not answer in time.
    Timeout,
    /// The peripheral answered but refused the request.
    Rejected,
    /// The peripheral is not present or not initialized.
    Unavailable,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Bus => f.write_str("bus error"),
            DriverError::Timeout => f.write_str("timeout"),
            DriverError::Rejected => f.write_str("request rejected"),
            DriverError::Unavailable => f.write_str("device unavailable"),
        }
    }
}

/// Raw environmental measurements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnvironmentSample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

/// Battery and supply status reported by the cloud module.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PowerStatus {
    pub voltage_v: f32,
    pub usb_powered: bool,
}

/// Temperature, humidity, and pressure sensor.
pub trait SensorDriver {
    /// Reads one sample.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the sensor does not produce a valid sample.
    fn read(&mut self) -> Result<EnvironmentSample, DriverError>;
}

/// Cloud connectivity module.
pub trait CloudTransport {
    /// Applies mode-dependent hub, location, and motion settings.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn configure(&mut self, config: &Configuration) -> Result<(), DriverError>;

    /// Queues one outbound record; `force_sync` pushes it immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn send_record(&mut self, record: &OutboundRecord) -> Result<(), DriverError>;

    /// Pops at most one pending inbound command.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn inbound_command(&mut self) -> Result<Option<InboundCommand>, DriverError>;

    fn is_connected(&mut self) -> bool;

    fn is_syncing(&mut self) -> bool;

    /// Starts an explicit sync with the backend.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn sync(&mut self) -> Result<(), DriverError>;

    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn location_status(&mut self) -> Result<LocationStatus, DriverError>;

    /// Enables or disables autonomous location tracking.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn set_location_tracking(&mut self, enabled: bool) -> Result<(), DriverError>;

    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn power_status(&mut self) -> Result<PowerStatus, DriverError>;

    /// Reconfigures battery monitoring after an external power transition.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn configure_power_monitoring(
        &mut self,
        usb_powered: bool,
        mode: OperatingMode,
    ) -> Result<(), DriverError>;

    /// Whether motion was detected since the last call.
    fn motion(&mut self) -> bool;

    /// Powers the host down; on success the device is expected not to return.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the request is refused.
    fn enter_sleep(&mut self, plan: &SleepPlan) -> Result<(), DriverError>;
}

/// Remote key/value configuration store.
pub trait RemoteConfigStore {
    /// Cheap check for pending remote changes.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn has_changed(&mut self) -> Result<bool, DriverError>;

    /// Applies every published value to `config`, returning whether any
    /// field was updated.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] on any transport failure.
    fn fetch_all(&mut self, config: &mut Configuration) -> Result<bool, DriverError>;
}

/// Storage that survives deep sleep.
pub trait PersistenceBackend {
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the frame could not be stored.
    fn save(&mut self, bytes: &[u8]) -> Result<(), DriverError>;

    /// Copies the stored frame into `buf`, returning its length, or `None`
    /// when nothing has been stored.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the storage could not be read.
    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError>;
}

/// Tone and melody output.
#[allow(async_fn_in_trait)]
pub trait AudioDriver {
    async fn play_event(&mut self, event: AudioEvent, volume: u8);

    async fn play_tone(&mut self, frequency_hz: u16, duration_ms: u16, volume: u8);

    fn stop(&mut self);

    fn set_enabled(&mut self, _enabled: bool) {}

    fn set_volume(&mut self, _volume: u8) {}

    fn set_alerts_only(&mut self, _alerts_only: bool) {}
}

/// The user button input.
pub trait ButtonInput {
    fn level(&mut self) -> ButtonLevel;
}
