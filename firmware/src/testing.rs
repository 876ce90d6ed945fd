//! Host fakes for the collaborator traits.

use std::collections::VecDeque;
use std::vec::Vec;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use tracker_core::audio::AudioEvent;
use tracker_core::commands::InboundCommand;
use tracker_core::config::{Configuration, OperatingMode, SleepPlan};
use tracker_core::drivers::{
    AudioDriver, ButtonInput, CloudTransport, DriverError, EnvironmentSample, PersistenceBackend,
    PowerStatus, RemoteConfigStore, SensorDriver,
};
use tracker_core::gps::LocationStatus;
use tracker_core::input::ButtonLevel;
use tracker_core::telemetry::OutboundRecord;

use crate::context::{Platform, Shared};

pub struct FakePlatform;

impl Platform for FakePlatform {
    type Mutex = NoopRawMutex;
    type Sensor = FakeSensor;
    type Cloud = FakeCloud;
    type Audio = FakeAudio;
}

pub type TestShared = Shared<FakePlatform>;

pub fn shared() -> TestShared {
    Shared::new(FakeSensor::default(), FakeCloud::default(), FakeAudio::default())
}

pub fn with_cloud<R>(shared: &TestShared, f: impl FnOnce(&mut FakeCloud) -> R) -> R {
    block_on(async {
        let mut bus = shared
            .bus
            .acquire(core::time::Duration::from_millis(10))
            .await
            .expect("bus free in tests");
        f(&mut bus.cloud)
    })
}

pub fn with_sensor<R>(shared: &TestShared, f: impl FnOnce(&mut FakeSensor) -> R) -> R {
    block_on(async {
        let mut bus = shared
            .bus
            .acquire(core::time::Duration::from_millis(10))
            .await
            .expect("bus free in tests");
        f(&mut bus.sensor)
    })
}

pub fn drain_records(shared: &TestShared) -> Vec<OutboundRecord> {
    let mut records = Vec::new();
    while let Ok(record) = shared.queues.records.try_receive() {
        records.push(record);
    }
    records
}

pub fn sample(temperature_c: f32) -> EnvironmentSample {
    EnvironmentSample {
        temperature_c,
        humidity_pct: 50.0,
        pressure_hpa: 1013.0,
    }
}

pub struct FakeSensor {
    pub next: Result<EnvironmentSample, DriverError>,
    pub reads: u32,
}

impl Default for FakeSensor {
    fn default() -> Self {
        Self {
            next: Ok(sample(21.0)),
            reads: 0,
        }
    }
}

impl SensorDriver for FakeSensor {
    fn read(&mut self) -> Result<EnvironmentSample, DriverError> {
        self.reads += 1;
        self.next
    }
}

pub struct FakeCloud {
    pub connected: bool,
    pub syncing: bool,
    pub sync_calls: u32,
    pub configured: Vec<OperatingMode>,
    pub sent: Vec<OutboundRecord>,
    pub fail_sends: bool,
    pub commands: VecDeque<InboundCommand>,
    pub location: LocationStatus,
    pub tracking: Vec<bool>,
    pub power: PowerStatus,
    pub power_monitoring: Vec<(bool, OperatingMode)>,
    pub motion: bool,
    pub remote: Configuration,
    pub remote_changed: bool,
    pub fail_change_check: Option<DriverError>,
    pub fetches: u32,
    pub saved: Option<Vec<u8>>,
    pub fail_saves: bool,
    pub sleep_plans: Vec<SleepPlan>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            connected: true,
            syncing: false,
            sync_calls: 0,
            configured: Vec::new(),
            sent: Vec::new(),
            fail_sends: false,
            commands: VecDeque::new(),
            location: LocationStatus::default(),
            tracking: Vec::new(),
            power: PowerStatus {
                voltage_v: 3.9,
                usb_powered: false,
            },
            power_monitoring: Vec::new(),
            motion: false,
            remote: Configuration::new(),
            remote_changed: false,
            fail_change_check: None,
            fetches: 0,
            saved: None,
            fail_saves: false,
            sleep_plans: Vec::new(),
        }
    }
}

impl CloudTransport for FakeCloud {
    fn configure(&mut self, config: &Configuration) -> Result<(), DriverError> {
        self.configured.push(config.mode);
        Ok(())
    }

    fn send_record(&mut self, record: &OutboundRecord) -> Result<(), DriverError> {
        if self.fail_sends {
            return Err(DriverError::Timeout);
        }
        self.sent.push(record.clone());
        Ok(())
    }

    fn inbound_command(&mut self) -> Result<Option<InboundCommand>, DriverError> {
        Ok(self.commands.pop_front())
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn is_syncing(&mut self) -> bool {
        self.syncing
    }

    fn sync(&mut self) -> Result<(), DriverError> {
        self.sync_calls += 1;
        Ok(())
    }

    fn location_status(&mut self) -> Result<LocationStatus, DriverError> {
        Ok(self.location)
    }

    fn set_location_tracking(&mut self, enabled: bool) -> Result<(), DriverError> {
        self.tracking.push(enabled);
        Ok(())
    }

    fn power_status(&mut self) -> Result<PowerStatus, DriverError> {
        Ok(self.power)
    }

    fn configure_power_monitoring(
        &mut self,
        usb_powered: bool,
        mode: OperatingMode,
    ) -> Result<(), DriverError> {
        self.power_monitoring.push((usb_powered, mode));
        Ok(())
    }

    fn motion(&mut self) -> bool {
        core::mem::take(&mut self.motion)
    }

    fn enter_sleep(&mut self, plan: &SleepPlan) -> Result<(), DriverError> {
        self.sleep_plans.push(*plan);
        Ok(())
    }
}

impl RemoteConfigStore for FakeCloud {
    fn has_changed(&mut self) -> Result<bool, DriverError> {
        if let Some(error) = self.fail_change_check {
            return Err(error);
        }
        Ok(core::mem::take(&mut self.remote_changed))
    }

    fn fetch_all(&mut self, config: &mut Configuration) -> Result<bool, DriverError> {
        self.fetches += 1;
        let updated = *config != self.remote;
        *config = self.remote;
        Ok(updated)
    }
}

impl PersistenceBackend for FakeCloud {
    fn save(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        if self.fail_saves {
            return Err(DriverError::Rejected);
        }
        self.saved = Some(bytes.to_vec());
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        let Some(saved) = &self.saved else {
            return Ok(None);
        };
        let target = buf.get_mut(..saved.len()).ok_or(DriverError::Rejected)?;
        target.copy_from_slice(saved);
        Ok(Some(saved.len()))
    }
}

#[derive(Default)]
pub struct FakeAudio {
    pub events: Vec<(AudioEvent, u8)>,
    pub tones: Vec<(u16, u16)>,
    pub stops: u32,
    pub enabled: Option<bool>,
    pub volume: Option<u8>,
    pub alerts_only: Option<bool>,
}

impl AudioDriver for FakeAudio {
    async fn play_event(&mut self, event: AudioEvent, volume: u8) {
        self.events.push((event, volume));
    }

    async fn play_tone(&mut self, frequency_hz: u16, duration_ms: u16, _volume: u8) {
        self.tones.push((frequency_hz, duration_ms));
    }

    fn stop(&mut self) {
        self.stops += 1;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = Some(volume);
    }

    fn set_alerts_only(&mut self, alerts_only: bool) {
        self.alerts_only = Some(alerts_only);
    }
}

/// Button that replays a scripted level.
#[derive(Default)]
pub struct FakeButton {
    pub level: ButtonLevel,
}

impl ButtonInput for FakeButton {
    fn level(&mut self) -> ButtonLevel {
        self.level
    }
}
