//! Board bindings for the STM32L433 tracker carrier.
//!
//! The cloud module is not fitted on this carrier revision. [`OfflineModem`]
//! stands in for it: it never connects, refuses outbound records, and keeps
//! the persisted state frame in RAM so warm restarts exercise the restore
//! path.

pub mod adc;
pub mod buzzer;

use embassy_stm32::gpio::Input;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use tracker_core::commands::InboundCommand;
use tracker_core::config::{Configuration, OperatingMode, SleepPlan};
use tracker_core::drivers::{
    ButtonInput, CloudTransport, DriverError, PersistenceBackend, PowerStatus, RemoteConfigStore,
};
use tracker_core::gps::LocationStatus;
use tracker_core::input::ButtonLevel;
use tracker_core::state::STATE_FRAME_CAPACITY;
use tracker_core::telemetry::OutboundRecord;

use crate::context::{Platform, Shared};

pub struct Board;

impl Platform for Board {
    type Mutex = CriticalSectionRawMutex;
    type Sensor = adc::DieTemperature<'static>;
    type Cloud = OfflineModem;
    type Audio = buzzer::Buzzer<'static>;
}

pub type BoardShared = Shared<Board>;

/// Active-low push button with an external pull-up.
pub struct GpioButton<'d> {
    pin: Input<'d>,
}

impl<'d> GpioButton<'d> {
    pub fn new(pin: Input<'d>) -> Self {
        Self { pin }
    }
}

impl ButtonInput for GpioButton<'_> {
    fn level(&mut self) -> ButtonLevel {
        if self.pin.is_low() {
            ButtonLevel::Pressed
        } else {
            ButtonLevel::Released
        }
    }
}

pub struct OfflineModem {
    frame: [u8; STATE_FRAME_CAPACITY],
    frame_len: Option<usize>,
}

impl OfflineModem {
    pub const fn new() -> Self {
        Self {
            frame: [0; STATE_FRAME_CAPACITY],
            frame_len: None,
        }
    }
}

impl CloudTransport for OfflineModem {
    fn configure(&mut self, _config: &Configuration) -> Result<(), DriverError> {
        Ok(())
    }

    fn send_record(&mut self, _record: &OutboundRecord) -> Result<(), DriverError> {
        Err(DriverError::Unavailable)
    }

    fn inbound_command(&mut self) -> Result<Option<InboundCommand>, DriverError> {
        Ok(None)
    }

    fn is_connected(&mut self) -> bool {
        false
    }

    fn is_syncing(&mut self) -> bool {
        false
    }

    fn sync(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unavailable)
    }

    fn location_status(&mut self) -> Result<LocationStatus, DriverError> {
        Ok(LocationStatus::default())
    }

    fn set_location_tracking(&mut self, _enabled: bool) -> Result<(), DriverError> {
        Ok(())
    }

    fn power_status(&mut self) -> Result<PowerStatus, DriverError> {
        // Unmeasured; NaN never crosses the low-voltage threshold.
        Ok(PowerStatus {
            voltage_v: f32::NAN,
            usb_powered: true,
        })
    }

    fn configure_power_monitoring(
        &mut self,
        _usb_powered: bool,
        _mode: OperatingMode,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    fn motion(&mut self) -> bool {
        false
    }

    fn enter_sleep(&mut self, _plan: &SleepPlan) -> Result<(), DriverError> {
        Err(DriverError::Unavailable)
    }
}

impl RemoteConfigStore for OfflineModem {
    fn has_changed(&mut self) -> Result<bool, DriverError> {
        Ok(false)
    }

    fn fetch_all(&mut self, _config: &mut Configuration) -> Result<bool, DriverError> {
        Err(DriverError::Unavailable)
    }
}

impl PersistenceBackend for OfflineModem {
    fn save(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        let target = self
            .frame
            .get_mut(..bytes.len())
            .ok_or(DriverError::Rejected)?;
        target.copy_from_slice(bytes);
        self.frame_len = Some(bytes.len());
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        let Some(len) = self.frame_len else {
            return Ok(None);
        };
        let stored = self.frame.get(..len).ok_or(DriverError::Rejected)?;
        let target = buf.get_mut(..len).ok_or(DriverError::Rejected)?;
        target.copy_from_slice(stored);
        Ok(Some(len))
    }
}
