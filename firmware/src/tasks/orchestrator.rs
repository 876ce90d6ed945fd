//! Start-up, configuration ownership, button handling and the sleep hand-off.
//!
//! The orchestrator is the only writer of the operating mode and of the
//! published configuration. Other tasks reach the mode through
//! [`ModeRequest`]s and the configuration-update queue.

use core::time::Duration;

use embassy_time::{Instant, Timer};
use tracker_core::audio::{AudioEvent, AudioRequest, AudioSettings};
use tracker_core::config::timing::{
    AWAKE_WINDOW, BUS_TIMEOUT, CONNECT_POLL, CONNECT_TIMEOUT, HEALTH_LOG_PERIOD,
    ORCHESTRATOR_PERIOD, SLEEP_COORDINATION_TIMEOUT,
};
use tracker_core::config::{Configuration, OperatingMode, SleepPlan};
use tracker_core::drivers::{AudioDriver, ButtonInput, CloudTransport, RemoteConfigStore};
use tracker_core::input::{ClickClassifier, ClickGesture};
use tracker_core::mode::{GestureAction, Lock, LockOutcome, RemoteModeDecision};
use tracker_core::sleep::{ReadySet, TaskId};
use tracker_core::state::{BootKind, StateError, StateStore};
use tracker_core::telemetry::{HealthRecord, OutboundRecord, TrackRecord};
use tracker_core::time::Uptime;

use super::{cloud_failed, log_bus_busy, take_snapshot};
use crate::context::{Platform, Shared};
use crate::sync::ModeRequest;
use crate::time::{now, to_embassy};

const TASK: &str = "orchestrator";

/// Result of one sleep attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SleepOutcome {
    /// State was saved and the transport accepted the sleep request.
    Entered,
    /// The attempt was abandoned and every task resumed.
    Aborted,
}

pub struct Orchestrator<'a, P: Platform, B: ButtonInput> {
    shared: &'a Shared<P>,
    button: B,
    config: Configuration,
    classifier: ClickClassifier,
    awake_since: Uptime,
    last_health_log: Uptime,
    last_heartbeat: Option<Uptime>,
    publish_pending: bool,
    mode_sync_pending: bool,
}

impl<'a, P: Platform, B: ButtonInput> Orchestrator<'a, P, B> {
    pub fn new(shared: &'a Shared<P>, button: B) -> Self {
        Self {
            shared,
            button,
            config: Configuration::new(),
            classifier: ClickClassifier::new(),
            awake_since: Uptime::ZERO,
            last_health_log: Uptime::ZERO,
            last_heartbeat: None,
            publish_pending: false,
            mode_sync_pending: false,
        }
    }

    pub async fn run(mut self) -> ! {
        self.start().await;
        loop {
            let started = Instant::now();
            self.tick(now()).await;
            Timer::at(started + to_embassy(ORCHESTRATOR_PERIOD)).await;
        }
    }

    /// Restores state, waits for connectivity and publishes the first
    /// configuration, then releases the other tasks.
    pub async fn start(&mut self) -> BootKind {
        self.play_startup_cue().await;
        let boot = self.restore_state(now()).await;

        if self.wait_for_connectivity().await {
            self.fetch_initial_config().await;
            self.shared
                .queues
                .offer_audio(AudioRequest::Event(AudioEvent::Connected));
        } else {
            log_connect_timeout();
        }

        self.publish_pending = true;
        self.publish().await;
        self.sync_mode().await;
        self.shared.mark_system_ready();

        let started = now();
        self.awake_since = started;
        self.last_health_log = started;
        boot
    }

    /// One loop iteration.
    pub async fn tick(&mut self, now: Uptime) {
        if let Ok(update) = self.shared.queues.config_updates.try_receive() {
            self.apply_config(update);
        }
        self.drain_mode_requests();
        self.poll_button(now);
        self.publish().await;
        self.sync_mode().await;
        self.report_health(now);
        self.maybe_request_sleep(now);

        if self.shared.sleep.is_requested()
            && self.coordinate_sleep().await == SleepOutcome::Entered
        {
            log_resumed_without_reset();
            self.abort_sleep(crate::time::now());
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Raises a sleep request and plays the sleep cue.
    pub fn request_sleep(&self) {
        self.shared
            .queues
            .offer_audio(AudioRequest::Event(AudioEvent::Sleep));
        self.shared.sleep.request();
    }

    /// Runs the rendezvous, persists state and hands off to the transport.
    pub async fn coordinate_sleep(&mut self) -> SleepOutcome {
        let Some(plan) = self.config.sleep_plan() else {
            log_sleep_aborted("mode never sleeps");
            self.abort_sleep(now());
            return SleepOutcome::Aborted;
        };

        self.shared.sleep.signal_ready(TaskId::Orchestrator);
        if let Err(reported) = self
            .shared
            .sleep
            .wait_all_ready(ReadySet::ALL, SLEEP_COORDINATION_TIMEOUT)
            .await
        {
            for task in reported.missing(ReadySet::ALL) {
                log_task_not_ready(task);
            }
            log_sleep_aborted("rendezvous timed out");
            self.abort_sleep(now());
            return SleepOutcome::Aborted;
        }

        let at = now();
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_sleep_aborted("bus busy");
            self.abort_sleep(at);
            return SleepOutcome::Aborted;
        };

        if let Err(error) = self.shared.state.with(|store| store.save(&mut bus.cloud, at)) {
            drop(bus);
            log_state_save_failed(&error);
            self.abort_sleep(at);
            return SleepOutcome::Aborted;
        }

        log_entering_sleep(self.config.mode, &plan);
        let entered = bus.cloud.enter_sleep(&plan);
        drop(bus);

        match entered {
            Ok(()) => SleepOutcome::Entered,
            Err(error) => {
                cloud_failed(TASK, "enter sleep", error, &self.shared.errors);
                self.abort_sleep(at);
                SleepOutcome::Aborted
            }
        }
    }

    async fn play_startup_cue(&self) {
        let settings = self.shared.audio_settings.get();
        if settings.permits(AudioEvent::PowerOn) {
            let mut audio = self.shared.audio.lock().await;
            audio.play_event(AudioEvent::PowerOn, settings.volume).await;
        }
    }

    async fn restore_state(&mut self, now: Uptime) -> BootKind {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return BootKind::Cold;
        };

        let store = StateStore::load(&mut bus.cloud, now).unwrap_or_else(|error| {
            log_state_discarded(&error);
            StateStore::cold(now)
        });
        let boot = store.boot_kind();
        self.config.mode = store.state().mode;

        if boot == BootKind::Cold
            && let Err(error) = bus.cloud.configure(&self.config)
        {
            cloud_failed(TASK, "configure", error, &self.shared.errors);
        }
        drop(bus);

        log_boot(boot, store.state().boot_count, self.config.mode);
        self.shared.state.with(|state| *state = store);
        boot
    }

    async fn wait_for_connectivity(&self) -> bool {
        let deadline = Instant::now() + to_embassy(CONNECT_TIMEOUT);
        loop {
            if let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await
                && bus.cloud.is_connected()
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            Timer::after(to_embassy(CONNECT_POLL)).await;
        }
    }

    async fn fetch_initial_config(&mut self) {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return;
        };
        let mut fetched = self.config;
        let result = bus.cloud.fetch_all(&mut fetched);
        drop(bus);

        match result {
            Ok(_) => self.apply_config(fetched),
            Err(error) => cloud_failed(TASK, "fetch config", error, &self.shared.errors),
        }
    }

    /// Adopts a new configuration, screening its mode against the locks.
    fn apply_config(&mut self, update: Configuration) {
        let mut next = update.sanitized();
        let decision = self
            .shared
            .state
            .with(|store| store.state_mut().mode_controller().request_remote(next.mode));

        let mode_changed = match decision {
            RemoteModeDecision::Accept(mode) => {
                log_mode_change(self.config.mode, mode);
                true
            }
            RemoteModeDecision::Unchanged => false,
            RemoteModeDecision::Rejected { lock } => {
                log_remote_mode_rejected(next.mode, lock);
                next.mode = self.config.mode;
                false
            }
        };

        self.config = next;
        self.shared
            .audio_settings
            .update(|settings| settings.reconfigured(&next.audio));
        self.publish_pending = true;
        self.mode_sync_pending |= mode_changed;
    }

    fn drain_mode_requests(&mut self) {
        while let Ok(request) = self.shared.queues.mode_requests.try_receive() {
            match request {
                ModeRequest::ReleaseLock(target) => {
                    let outcome = self
                        .shared
                        .state
                        .with(|store| store.state_mut().mode_controller().release_matching(target));
                    match outcome {
                        Some(outcome) => self.apply_lock_outcome(outcome),
                        None => log_nothing_to_release(),
                    }
                }
            }
        }
    }

    fn poll_button(&mut self, now: Uptime) {
        let level = self.button.level();
        let Some(gesture) = self.classifier.poll(level, now) else {
            return;
        };
        log_gesture(gesture);

        match GestureAction::from(gesture) {
            GestureAction::ToggleMute => {
                let settings = self.shared.audio_settings.update(|settings| AudioSettings {
                    muted: !settings.muted,
                    ..settings
                });
                log_mute(settings.muted);
                if !settings.muted {
                    self.shared
                        .queues
                        .offer_audio(AudioRequest::Event(AudioEvent::Button));
                }
            }
            GestureAction::ToggleLock(lock) => {
                let outcome = self
                    .shared
                    .state
                    .with(|store| store.state_mut().mode_controller().toggle(lock));
                self.apply_lock_outcome(outcome);
            }
        }
    }

    fn apply_lock_outcome(&mut self, outcome: LockOutcome) {
        log_lock_outcome(&outcome);
        self.shared
            .queues
            .offer_audio(AudioRequest::Event(outcome.cue()));

        if let Some(mode) = outcome.applied_mode()
            && mode != self.config.mode
        {
            self.config.mode = mode;
            self.publish_pending = true;
            self.mode_sync_pending = true;
        }
    }

    async fn publish(&mut self) {
        if !self.publish_pending {
            return;
        }
        if self.shared.config.publish(self.config).await {
            self.publish_pending = false;
        } else {
            log_publish_deferred();
        }
    }

    /// Reconfigures the transport for the mode and pushes an out-of-band
    /// snapshot. Retried on the next tick when the bus is busy.
    async fn sync_mode(&mut self) {
        if !self.mode_sync_pending {
            return;
        }
        let at = now();
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return;
        };
        if let Err(error) = bus.cloud.configure(&self.config) {
            cloud_failed(TASK, "configure", error, &self.shared.errors);
        }
        let snapshot = take_snapshot(TASK, &mut *bus, &self.shared.errors);
        drop(bus);

        self.mode_sync_pending = false;
        let reading = match snapshot {
            Some(snapshot) => snapshot.reading(false, at.as_secs_u32()),
            None => tracker_core::alerts::SensorReading::invalid(at.as_secs_u32()),
        };
        self.shared.queues.offer_record(OutboundRecord::Track(TrackRecord {
            reading,
            mode: self.config.mode,
            force_sync: true,
        }));
    }

    fn report_health(&mut self, now: Uptime) {
        if now.saturating_duration_since(self.last_health_log) >= HEALTH_LOG_PERIOD {
            self.last_health_log = now;
            let health = self.health_record(now);
            let delivery_failures = self.shared.deliveries.with(|log| log.failures());
            log_health(
                &health,
                self.shared.queues.audio.len(),
                self.shared.queues.records.len(),
                delivery_failures,
            );
        }

        let heartbeat = Duration::from_secs(u64::from(self.config.heartbeat_hours) * 3_600);
        let due = self
            .last_heartbeat
            .is_none_or(|last| now.saturating_duration_since(last) >= heartbeat);
        if due {
            self.last_heartbeat = Some(now);
            let health = self.health_record(now);
            self.shared
                .queues
                .offer_record(OutboundRecord::Health(health));
        }
    }

    fn health_record(&self, now: Uptime) -> HealthRecord {
        let (uptime_sec, total_uptime_sec, boot_count, last_fix_age_sec) =
            self.shared.state.with(|store| {
                (
                    whole_secs(store.session_uptime(now)),
                    store.total_uptime_sec(now),
                    store.state().boot_count,
                    store.last_fix_age(now).map(whole_secs),
                )
            });
        HealthRecord {
            firmware_version: env!("CARGO_PKG_VERSION"),
            uptime_sec,
            total_uptime_sec,
            boot_count,
            mode: self.config.mode,
            sensor_failures: self.shared.errors.sensor_failures(),
            cloud_failures: self.shared.errors.cloud_failures(),
            last_fix_age_sec,
        }
    }

    fn maybe_request_sleep(&self, now: Uptime) {
        if self.shared.sleep.is_requested() || self.config.sleep_plan().is_none() {
            return;
        }
        if now.saturating_duration_since(self.awake_since) >= AWAKE_WINDOW {
            log_sleep_requested(self.config.mode);
            self.request_sleep();
        }
    }

    fn abort_sleep(&mut self, now: Uptime) {
        self.shared.sleep.cancel();
        self.awake_since = now;
    }
}

fn whole_secs(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}

fn boot_label(boot: BootKind) -> &'static str {
    match boot {
        BootKind::Cold => "cold",
        BootKind::Warm => "warm",
    }
}

fn gesture_label(gesture: ClickGesture) -> &'static str {
    match gesture {
        ClickGesture::Single => "single",
        ClickGesture::Double => "double",
        ClickGesture::Triple => "triple",
    }
}

#[cfg(target_os = "none")]
fn log_boot(boot: BootKind, boot_count: u32, mode: OperatingMode) {
    defmt::info!(
        "orchestrator: {} boot #{} mode={}",
        boot_label(boot),
        boot_count,
        mode.as_str()
    );
}

#[cfg(not(target_os = "none"))]
fn log_boot(boot: BootKind, boot_count: u32, mode: OperatingMode) {
    println!(
        "orchestrator: {} boot #{boot_count} mode={mode}",
        boot_label(boot)
    );
}

#[cfg(target_os = "none")]
fn log_state_discarded(error: &StateError) {
    defmt::warn!(
        "orchestrator: using cold defaults ({})",
        defmt::Display2Format(error)
    );
}

#[cfg(not(target_os = "none"))]
fn log_state_discarded(error: &StateError) {
    println!("orchestrator: using cold defaults ({error})");
}

#[cfg(target_os = "none")]
fn log_state_save_failed(error: &StateError) {
    defmt::error!(
        "orchestrator: state save failed: {}",
        defmt::Display2Format(error)
    );
}

#[cfg(not(target_os = "none"))]
fn log_state_save_failed(error: &StateError) {
    println!("orchestrator: state save failed: {error}");
}

#[cfg(target_os = "none")]
fn log_connect_timeout() {
    defmt::warn!("orchestrator: cloud not connected, continuing with defaults");
}

#[cfg(not(target_os = "none"))]
fn log_connect_timeout() {
    println!("orchestrator: cloud not connected, continuing with defaults");
}

#[cfg(target_os = "none")]
fn log_mode_change(from: OperatingMode, to: OperatingMode) {
    defmt::info!("orchestrator: mode {} -> {}", from.as_str(), to.as_str());
}

#[cfg(not(target_os = "none"))]
fn log_mode_change(from: OperatingMode, to: OperatingMode) {
    println!("orchestrator: mode {from} -> {to}");
}

#[cfg(target_os = "none")]
fn log_remote_mode_rejected(requested: OperatingMode, lock: Lock) {
    defmt::warn!(
        "orchestrator: remote mode {} ignored, {} lock active",
        requested.as_str(),
        lock.as_str()
    );
}

#[cfg(not(target_os = "none"))]
fn log_remote_mode_rejected(requested: OperatingMode, lock: Lock) {
    println!(
        "orchestrator: remote mode {requested} ignored, {} lock active",
        lock.as_str()
    );
}

#[cfg(target_os = "none")]
fn log_gesture(gesture: ClickGesture) {
    defmt::info!("orchestrator: {} click", gesture_label(gesture));
}

#[cfg(not(target_os = "none"))]
fn log_gesture(gesture: ClickGesture) {
    println!("orchestrator: {} click", gesture_label(gesture));
}

#[cfg(target_os = "none")]
fn log_mute(muted: bool) {
    defmt::info!("orchestrator: muted={}", muted);
}

#[cfg(not(target_os = "none"))]
fn log_mute(muted: bool) {
    println!("orchestrator: muted={muted}");
}

#[cfg(target_os = "none")]
fn log_lock_outcome(outcome: &LockOutcome) {
    match *outcome {
        LockOutcome::Engaged { lock, mode, .. } => {
            defmt::info!("orchestrator: {} lock engaged mode={}", lock.as_str(), mode.as_str());
        }
        LockOutcome::Released { lock, mode } => {
            defmt::info!("orchestrator: {} lock released mode={}", lock.as_str(), mode.as_str());
        }
        LockOutcome::Rejected { requested, active } => defmt::warn!(
            "orchestrator: {} lock rejected, {} lock active",
            requested.as_str(),
            active.as_str()
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn log_lock_outcome(outcome: &LockOutcome) {
    match *outcome {
        LockOutcome::Engaged { lock, mode, .. } => {
            println!("orchestrator: {} lock engaged mode={mode}", lock.as_str());
        }
        LockOutcome::Released { lock, mode } => {
            println!("orchestrator: {} lock released mode={mode}", lock.as_str());
        }
        LockOutcome::Rejected { requested, active } => println!(
            "orchestrator: {} lock rejected, {} lock active",
            requested.as_str(),
            active.as_str()
        ),
    }
}

#[cfg(target_os = "none")]
fn log_nothing_to_release() {
    defmt::info!("orchestrator: unlock request found no matching lock");
}

#[cfg(not(target_os = "none"))]
fn log_nothing_to_release() {
    println!("orchestrator: unlock request found no matching lock");
}

#[cfg(target_os = "none")]
fn log_publish_deferred() {
    defmt::debug!("orchestrator: config cell busy, publishing next tick");
}

#[cfg(not(target_os = "none"))]
fn log_publish_deferred() {
    println!("orchestrator: config cell busy, publishing next tick");
}

#[cfg(target_os = "none")]
fn log_health(health: &HealthRecord, audio_depth: usize, record_depth: usize, delivery_failures: usize) {
    defmt::info!(
        "health: up={}s total={}s boot=#{} mode={} sensor_err={} cloud_err={} audio_q={} record_q={} undelivered={}",
        health.uptime_sec,
        health.total_uptime_sec,
        health.boot_count,
        health.mode.as_str(),
        health.sensor_failures,
        health.cloud_failures,
        audio_depth,
        record_depth,
        delivery_failures
    );
}

#[cfg(not(target_os = "none"))]
fn log_health(health: &HealthRecord, audio_depth: usize, record_depth: usize, delivery_failures: usize) {
    println!(
        "health: up={}s total={}s boot=#{} mode={} sensor_err={} cloud_err={} audio_q={audio_depth} record_q={record_depth} undelivered={delivery_failures}",
        health.uptime_sec,
        health.total_uptime_sec,
        health.boot_count,
        health.mode,
        health.sensor_failures,
        health.cloud_failures,
    );
}

#[cfg(target_os = "none")]
fn log_sleep_requested(mode: OperatingMode) {
    defmt::info!("orchestrator: awake window over, requesting sleep ({})", mode.as_str());
}

#[cfg(not(target_os = "none"))]
fn log_sleep_requested(mode: OperatingMode) {
    println!("orchestrator: awake window over, requesting sleep ({mode})");
}

#[cfg(target_os = "none")]
fn log_task_not_ready(task: TaskId) {
    defmt::warn!("orchestrator: {} did not reach sleep readiness", task.name());
}

#[cfg(not(target_os = "none"))]
fn log_task_not_ready(task: TaskId) {
    println!("orchestrator: {} did not reach sleep readiness", task.name());
}

#[cfg(target_os = "none")]
fn log_sleep_aborted(reason: &str) {
    defmt::warn!("orchestrator: sleep aborted ({})", reason);
}

#[cfg(not(target_os = "none"))]
fn log_sleep_aborted(reason: &str) {
    println!("orchestrator: sleep aborted ({reason})");
}

#[cfg(target_os = "none")]
fn log_entering_sleep(mode: OperatingMode, plan: &SleepPlan) {
    let secs = plan.duration.map_or(0, |duration| duration.as_secs());
    defmt::info!(
        "orchestrator: entering sleep mode={} timer={}s motion_wake={}",
        mode.as_str(),
        secs,
        plan.wake_on_motion
    );
}

#[cfg(not(target_os = "none"))]
fn log_entering_sleep(mode: OperatingMode, plan: &SleepPlan) {
    let secs = plan.duration.map_or(0, |duration| duration.as_secs());
    println!(
        "orchestrator: entering sleep mode={mode} timer={secs}s motion_wake={}",
        plan.wake_on_motion
    );
}

#[cfg(target_os = "none")]
fn log_resumed_without_reset() {
    defmt::warn!("orchestrator: transport returned from sleep, resuming");
}

#[cfg(not(target_os = "none"))]
fn log_resumed_without_reset() {
    println!("orchestrator: transport returned from sleep, resuming");
}
