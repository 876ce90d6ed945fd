//! Synchronization primitives shared by the tracker tasks.
//!
//! Every wait here is bounded except [`Queues::push_config`], which must not
//! lose a configuration update. Contention is reported as `None`/`false` and
//! the caller skips its work until the next cycle.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer, with_deadline, with_timeout};
use portable_atomic::{AtomicBool, Ordering};
use tracker_core::audio::{AudioRequest, AudioSettings};
use tracker_core::config::Configuration;
use tracker_core::config::timing::{CONFIG_LOCK_TIMEOUT, PARK_POLL};
use tracker_core::mode::LockTarget;
use tracker_core::sleep::{ReadySet, TaskId};
use tracker_core::state::StateStore;
use tracker_core::telemetry::{DeliveryLog, OutboundRecord};

use crate::time::{now, to_embassy};

pub const AUDIO_QUEUE_DEPTH: usize = 8;
pub const RECORD_QUEUE_DEPTH: usize = 16;
pub const CONFIG_QUEUE_DEPTH: usize = 4;
pub const MODE_REQUEST_QUEUE_DEPTH: usize = 2;

/// Exclusive owner of the shared sensor/communication bus.
pub struct BusMutex<M: RawMutex, T> {
    inner: Mutex<M, T>,
}

impl<M: RawMutex, T> BusMutex<M, T> {
    pub const fn new(devices: T) -> Self {
        Self {
            inner: Mutex::new(devices),
        }
    }

    /// Waits up to `timeout` for the bus. Drop the guard before any other wait.
    pub async fn acquire(&self, timeout: core::time::Duration) -> Option<MutexGuard<'_, M, T>> {
        with_timeout(to_embassy(timeout), self.inner.lock()).await.ok()
    }
}

/// Published configuration; the orchestrator is the only writer.
pub struct ConfigCell<M: RawMutex> {
    inner: Mutex<M, Configuration>,
}

impl<M: RawMutex> ConfigCell<M> {
    pub const fn new(config: Configuration) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }

    /// Copy of the current configuration, or `None` if the lock is busy.
    pub async fn read(&self) -> Option<Configuration> {
        let guard = with_timeout(to_embassy(CONFIG_LOCK_TIMEOUT), self.inner.lock())
            .await
            .ok()?;
        Some(*guard)
    }

    /// Replaces the configuration wholesale; `false` if the lock was busy.
    pub async fn publish(&self, config: Configuration) -> bool {
        match with_timeout(to_embassy(CONFIG_LOCK_TIMEOUT), self.inner.lock()).await {
            Ok(mut guard) => {
                *guard = config;
                true
            }
            Err(_) => false,
        }
    }
}

/// Audio playback settings, read by the audio and command tasks.
pub struct SettingsCell<M: RawMutex> {
    inner: blocking_mutex::Mutex<M, Cell<AudioSettings>>,
}

impl<M: RawMutex> SettingsCell<M> {
    pub const fn new(settings: AudioSettings) -> Self {
        Self {
            inner: blocking_mutex::Mutex::new(Cell::new(settings)),
        }
    }

    pub fn get(&self) -> AudioSettings {
        self.inner.lock(Cell::get)
    }

    pub fn update(&self, f: impl FnOnce(AudioSettings) -> AudioSettings) -> AudioSettings {
        self.inner.lock(|cell| {
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }
}

/// Blocking cell around a value that is only touched in short closures.
pub struct SharedCell<M: RawMutex, T> {
    inner: blocking_mutex::Mutex<M, RefCell<T>>,
}

impl<M: RawMutex, T> SharedCell<M, T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: blocking_mutex::Mutex::new(RefCell::new(value)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

pub type StateCell<M> = SharedCell<M, StateStore>;
pub type DeliveryCell<M> = SharedCell<M, DeliveryLog>;

/// Request handed to the mode owner by other tasks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModeRequest {
    ReleaseLock(LockTarget),
}

/// The bounded queues between tasks.
pub struct Queues<M: RawMutex> {
    pub audio: Channel<M, AudioRequest, AUDIO_QUEUE_DEPTH>,
    pub records: Channel<M, OutboundRecord, RECORD_QUEUE_DEPTH>,
    pub config_updates: Channel<M, Configuration, CONFIG_QUEUE_DEPTH>,
    pub mode_requests: Channel<M, ModeRequest, MODE_REQUEST_QUEUE_DEPTH>,
}

impl<M: RawMutex> Queues<M> {
    pub const fn new() -> Self {
        Self {
            audio: Channel::new(),
            records: Channel::new(),
            config_updates: Channel::new(),
            mode_requests: Channel::new(),
        }
    }

    /// Non-blocking; a full queue drops the request.
    pub fn offer_audio(&self, request: AudioRequest) -> bool {
        let queued = self.audio.try_send(request).is_ok();
        if !queued {
            log_queue_full("audio");
        }
        queued
    }

    /// Non-blocking; a full queue drops the record.
    pub fn offer_record(&self, record: OutboundRecord) -> bool {
        let kind = record.kind();
        let queued = self.records.try_send(record).is_ok();
        if !queued {
            log_queue_full(kind.as_str());
        }
        queued
    }

    pub fn offer_mode_request(&self, request: ModeRequest) -> bool {
        let queued = self.mode_requests.try_send(request).is_ok();
        if !queued {
            log_queue_full("mode");
        }
        queued
    }

    /// Waits for room; configuration updates are never dropped.
    pub async fn push_config(&self, config: Configuration) {
        self.config_updates.send(config).await;
    }

    pub async fn next_audio(&self, timeout: core::time::Duration) -> Option<AudioRequest> {
        with_timeout(to_embassy(timeout), self.audio.receive()).await.ok()
    }

    pub async fn next_record(&self, timeout: core::time::Duration) -> Option<OutboundRecord> {
        with_timeout(to_embassy(timeout), self.records.receive()).await.ok()
    }
}

/// All-or-nothing sleep barrier.
///
/// A task that sees [`SleepCoordinator::is_requested`] calls
/// [`SleepCoordinator::park`], which marks it ready and holds it until the
/// request is cleared, either by a wake or by an aborted attempt.
pub struct SleepCoordinator<M: RawMutex> {
    requested: AtomicBool,
    ready: blocking_mutex::Mutex<M, Cell<ReadySet>>,
    changed: Signal<M, ()>,
}

impl<M: RawMutex> SleepCoordinator<M> {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            ready: blocking_mutex::Mutex::new(Cell::new(ReadySet::EMPTY)),
            changed: Signal::new(),
        }
    }

    /// Raises the sleep request, discarding readiness left by earlier attempts.
    pub fn request(&self) {
        self.clear_ready();
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Drops the request and every readiness bit.
    pub fn cancel(&self) {
        self.requested.store(false, Ordering::Release);
        self.clear_ready();
    }

    pub fn signal_ready(&self, task: TaskId) {
        self.ready.lock(|ready| ready.set(ready.get().with(task)));
        self.changed.signal(());
    }

    pub fn ready(&self) -> ReadySet {
        self.ready.lock(Cell::get)
    }

    /// Waits until every task in `required` is ready.
    ///
    /// The readiness bits are cleared on success and on timeout; the error
    /// carries the set that did report.
    pub async fn wait_all_ready(
        &self,
        required: ReadySet,
        timeout: core::time::Duration,
    ) -> Result<(), ReadySet> {
        let deadline = Instant::now() + to_embassy(timeout);
        loop {
            let ready = self.ready();
            if ready.is_superset_of(required) {
                self.clear_ready();
                return Ok(());
            }
            if with_deadline(deadline, self.changed.wait()).await.is_err() {
                self.clear_ready();
                return Err(ready);
            }
        }
    }

    /// Reports `task` ready and suspends it while the request stands.
    pub async fn park(&self, task: TaskId) {
        self.signal_ready(task);
        while self.is_requested() {
            Timer::after(to_embassy(PARK_POLL)).await;
        }
    }

    /// Sleeps until `deadline`, returning early once sleep is requested.
    pub async fn idle_until(&self, deadline: Instant) {
        loop {
            let current = Instant::now();
            if self.is_requested() || current >= deadline {
                return;
            }
            let slice = current + to_embassy(PARK_POLL);
            Timer::at(slice.min(deadline)).await;
        }
    }

    /// [`SleepCoordinator::idle_until`] for a relative period.
    pub async fn idle_for(&self, period: core::time::Duration) {
        self.idle_until(crate::time::instant_from(now() + period)).await;
    }

    fn clear_ready(&self) {
        self.ready.lock(|ready| ready.set(ReadySet::EMPTY));
        self.changed.reset();
    }
}

#[cfg(target_os = "none")]
fn log_queue_full(queue: &str) {
    defmt::warn!("queue: {} full, dropping", queue);
}

#[cfg(not(target_os = "none"))]
fn log_queue_full(queue: &str) {
    println!("queue: {queue} full, dropping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use tracker_core::audio::AudioEvent;

    #[test]
    fn audio_queue_drops_when_full() {
        let queues: Queues<NoopRawMutex> = Queues::new();
        for _ in 0..AUDIO_QUEUE_DEPTH {
            assert!(queues.offer_audio(AudioRequest::Event(AudioEvent::Ping)));
        }
        assert!(!queues.offer_audio(AudioRequest::Event(AudioEvent::Error)));
        assert_eq!(queues.audio.len(), AUDIO_QUEUE_DEPTH);
        assert_eq!(
            queues.audio.try_receive().ok(),
            Some(AudioRequest::Event(AudioEvent::Ping)),
            "oldest entry survives the drop"
        );
    }

    #[test]
    fn bus_acquire_times_out_while_held() {
        let bus: BusMutex<NoopRawMutex, u8> = BusMutex::new(0);
        block_on(async {
            let held = bus.acquire(core::time::Duration::from_millis(10)).await;
            assert!(held.is_some());
            let contended = bus.acquire(core::time::Duration::from_millis(20)).await;
            assert!(contended.is_none(), "second acquire must time out");
            drop(held);
            assert!(bus.acquire(core::time::Duration::from_millis(10)).await.is_some());
        });
    }

    #[test]
    fn rendezvous_completes_when_every_task_reports() {
        let sleep: SleepCoordinator<NoopRawMutex> = SleepCoordinator::new();
        sleep.request();
        let waiter = sleep.wait_all_ready(ReadySet::ALL, core::time::Duration::from_secs(2));
        let reporters = async {
            for task in TaskId::ALL {
                sleep.signal_ready(task);
                Timer::after_millis(1).await;
            }
        };
        let (result, ()) = block_on(join(waiter, reporters));
        assert_eq!(result, Ok(()));
        assert_eq!(sleep.ready(), ReadySet::EMPTY, "bits are cleared on success");
    }

    #[test]
    fn rendezvous_times_out_and_clears_bits() {
        let sleep: SleepCoordinator<NoopRawMutex> = SleepCoordinator::new();
        sleep.request();
        sleep.signal_ready(TaskId::Orchestrator);
        sleep.signal_ready(TaskId::SensorSampler);
        let result = block_on(
            sleep.wait_all_ready(ReadySet::ALL, core::time::Duration::from_millis(30)),
        );
        let reported = result.expect_err("four tasks never reported");
        assert!(reported.contains(TaskId::SensorSampler));
        assert_eq!(reported.missing(ReadySet::ALL).count(), 4);
        assert_eq!(sleep.ready(), ReadySet::EMPTY);
    }

    #[test]
    fn parked_task_resumes_after_cancel() {
        let sleep: SleepCoordinator<NoopRawMutex> = SleepCoordinator::new();
        sleep.request();
        let parked = sleep.park(TaskId::CloudSync);
        let canceller = async {
            Timer::after_millis(5).await;
            assert!(sleep.ready().contains(TaskId::CloudSync));
            sleep.cancel();
        };
        block_on(join(parked, canceller));
        assert!(!sleep.is_requested());
    }
}
