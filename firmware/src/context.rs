//! Context shared by every task.
//!
//! One [`Shared`] value is created at start-up and handed to each task by
//! reference. It owns the bus devices, the published configuration, the
//! persistent state and every queue.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Timer;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use tracker_core::audio::{AudioRequest, AudioSettings};
use tracker_core::commands::CommandContext;
use tracker_core::config::Configuration;
use tracker_core::config::timing::PARK_POLL;
use tracker_core::drivers::{
    AudioDriver, CloudTransport, PersistenceBackend, RemoteConfigStore, SensorDriver,
};
use tracker_core::mode::{LockState, LockTarget};
use tracker_core::state::StateStore;
use tracker_core::telemetry::DeliveryLog;
use tracker_core::time::Uptime;

use crate::sync::{
    BusMutex, ConfigCell, DeliveryCell, ModeRequest, Queues, SettingsCell, SleepCoordinator,
    StateCell,
};
use crate::time::to_embassy;

/// Binds the concrete collaborators and mutex flavor of a build.
pub trait Platform {
    type Mutex: RawMutex;
    type Sensor: SensorDriver;
    type Cloud: CloudTransport + RemoteConfigStore + PersistenceBackend;
    type Audio: AudioDriver;
}

/// Devices reachable only over the shared bus.
pub struct DeviceBus<S, C> {
    pub sensor: S,
    pub cloud: C,
}

/// Monotonic driver failure counters.
pub struct ErrorCounters {
    sensor: AtomicU32,
    cloud: AtomicU32,
}

impl ErrorCounters {
    pub const fn new() -> Self {
        Self {
            sensor: AtomicU32::new(0),
            cloud: AtomicU32::new(0),
        }
    }

    pub fn record_sensor_failure(&self) {
        self.sensor.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cloud_failure(&self) {
        self.cloud.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sensor_failures(&self) -> u32 {
        self.sensor.load(Ordering::Relaxed)
    }

    pub fn cloud_failures(&self) -> u32 {
        self.cloud.load(Ordering::Relaxed)
    }
}

pub struct Shared<P: Platform> {
    pub bus: BusMutex<P::Mutex, DeviceBus<P::Sensor, P::Cloud>>,
    /// Only the audio task plays through the driver, apart from the start-up cue.
    pub audio: Mutex<P::Mutex, P::Audio>,
    pub config: ConfigCell<P::Mutex>,
    pub audio_settings: SettingsCell<P::Mutex>,
    pub state: StateCell<P::Mutex>,
    pub deliveries: DeliveryCell<P::Mutex>,
    pub queues: Queues<P::Mutex>,
    pub sleep: SleepCoordinator<P::Mutex>,
    pub errors: ErrorCounters,
    system_ready: AtomicBool,
}

impl<P: Platform> Shared<P> {
    pub fn new(sensor: P::Sensor, cloud: P::Cloud, audio: P::Audio) -> Self {
        let config = Configuration::new();
        Self {
            bus: BusMutex::new(DeviceBus { sensor, cloud }),
            audio: Mutex::new(audio),
            config: ConfigCell::new(config),
            audio_settings: SettingsCell::new(AudioSettings::from_config(&config.audio)),
            state: StateCell::new(StateStore::cold(Uptime::ZERO)),
            deliveries: DeliveryCell::new(DeliveryLog::new()),
            queues: Queues::new(),
            sleep: SleepCoordinator::new(),
            errors: ErrorCounters::new(),
            system_ready: AtomicBool::new(false),
        }
    }

    pub fn mark_system_ready(&self) {
        self.system_ready.store(true, Ordering::Release);
    }

    pub fn is_system_ready(&self) -> bool {
        self.system_ready.load(Ordering::Acquire)
    }

    /// Holds the caller until the orchestrator finishes start-up.
    pub async fn wait_system_ready(&self) {
        while !self.is_system_ready() {
            Timer::after(to_embassy(PARK_POLL)).await;
        }
    }
}

/// Command side effects routed through the shared context.
pub struct SharedCommandContext<'a, P: Platform> {
    shared: &'a Shared<P>,
}

impl<'a, P: Platform> SharedCommandContext<'a, P> {
    pub fn new(shared: &'a Shared<P>) -> Self {
        Self { shared }
    }
}

impl<P: Platform> CommandContext for SharedCommandContext<'_, P> {
    fn audio_settings(&self) -> AudioSettings {
        self.shared.audio_settings.get()
    }

    fn set_volume(&mut self, volume: u8) {
        self.shared.audio_settings.update(|settings| AudioSettings {
            volume,
            ..settings
        });
    }

    fn enqueue_audio(&mut self, request: AudioRequest) -> bool {
        self.shared.queues.offer_audio(request)
    }

    fn locks(&self) -> LockState {
        self.shared.state.with(|store| store.state().locks)
    }

    fn request_unlock(&mut self, target: LockTarget) -> bool {
        self.shared
            .queues
            .offer_mode_request(ModeRequest::ReleaseLock(target))
    }
}
