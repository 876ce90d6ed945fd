//! Outbound record delivery and location freshness checks.

use tracker_core::audio::{AudioEvent, AudioRequest};
use tracker_core::config::timing::{BUS_TIMEOUT, LOCATION_CHECK_PERIOD, RECORD_RECEIVE_TIMEOUT};
use tracker_core::config::{Configuration, OperatingMode};
use tracker_core::drivers::CloudTransport;
use tracker_core::gps::TrackingAction;
use tracker_core::sleep::TaskId;
use tracker_core::telemetry::{OutboundRecord, RecordKind};
use tracker_core::time::Uptime;

use super::{cloud_failed, log_bus_busy};
use crate::context::{Platform, Shared};
use crate::time::now;

const TASK: &str = "cloud";

/// Result of one delivery attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    Sent,
    /// The transport refused the record; it is dropped.
    Failed,
    /// The bus was busy; the record stays pending.
    Deferred,
}

pub struct CloudSync<'a, P: Platform> {
    shared: &'a Shared<P>,
    config: Configuration,
    pending: Option<OutboundRecord>,
    next_location_check: Uptime,
    was_fresh: bool,
}

impl<'a, P: Platform> CloudSync<'a, P> {
    pub fn new(shared: &'a Shared<P>) -> Self {
        Self {
            shared,
            config: Configuration::new(),
            pending: None,
            next_location_check: Uptime::ZERO,
            was_fresh: false,
        }
    }

    pub async fn run(mut self) -> ! {
        self.shared.wait_system_ready().await;
        loop {
            if self.shared.sleep.is_requested() {
                self.flush().await;
                self.shared.sleep.park(TaskId::CloudSync).await;
                continue;
            }
            if let Some(config) = self.shared.config.read().await {
                self.config = config;
            }

            if self.pending.is_none() {
                self.pending = self.shared.queues.next_record(RECORD_RECEIVE_TIMEOUT).await;
            }
            if let Some(record) = self.pending.take() {
                self.deliver(record, now()).await;
            }

            let current = now();
            if current >= self.next_location_check {
                self.check_location(current).await;
                self.next_location_check = current + LOCATION_CHECK_PERIOD;
            }
        }
    }

    /// Hands one record to the transport.
    pub async fn deliver(&mut self, record: OutboundRecord, now: Uptime) -> Delivery {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            self.pending = Some(record);
            return Delivery::Deferred;
        };
        let result = bus.cloud.send_record(&record);
        drop(bus);

        let kind = record.kind();
        let delivered = result.is_ok();
        self.shared
            .deliveries
            .with(|log| log.record(now, kind, delivered));
        match result {
            Ok(()) => {
                if record.force_sync() {
                    self.shared
                        .state
                        .with(|store| store.state_mut().last_sync = Some(now));
                }
                Delivery::Sent
            }
            Err(error) => {
                cloud_failed(TASK, "send record", error, &self.shared.errors);
                log_record_dropped(kind);
                Delivery::Failed
            }
        }
    }

    /// Delivers whatever is queued before the task parks for sleep.
    pub async fn flush(&mut self) {
        let mut remaining = self.shared.queues.records.len() + usize::from(self.pending.is_some());
        while remaining > 0 {
            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.shared.queues.records.try_receive() {
                    Ok(record) => record,
                    Err(_) => return,
                },
            };
            if self.deliver(record, now()).await == Delivery::Deferred {
                return;
            }
            remaining -= 1;
        }
    }

    /// Tracks fix freshness, applies GPS power-save and keeps demo mode synced.
    pub async fn check_location(&mut self, now: Uptime) {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return;
        };
        let status = match bus.cloud.location_status() {
            Ok(status) => status,
            Err(error) => {
                cloud_failed(TASK, "location status", error, &self.shared.errors);
                return;
            }
        };

        let fresh = status.is_fresh();
        let config = self.config;
        let action = self.shared.state.with(|store| {
            let state = store.state_mut();
            if fresh {
                state.last_gps_fix = Some(now);
            }
            state
                .gps
                .evaluate(&config.gps_power_save, config.mode, &status, now)
        });
        if let Some(action) = action {
            log_tracking(action);
            if let Err(error) = bus
                .cloud
                .set_location_tracking(action == TrackingAction::Enable)
            {
                cloud_failed(TASK, "location tracking", error, &self.shared.errors);
            }
        }

        if config.mode == OperatingMode::Demo
            && !bus.cloud.is_syncing()
            && let Err(error) = bus.cloud.sync()
        {
            cloud_failed(TASK, "sync", error, &self.shared.errors);
        }
        drop(bus);

        if fresh && !self.was_fresh {
            self.shared
                .queues
                .offer_audio(AudioRequest::Event(AudioEvent::GpsLock));
        }
        self.was_fresh = fresh;
    }
}

#[cfg(target_os = "none")]
fn log_record_dropped(kind: RecordKind) {
    defmt::warn!("cloud: {} record dropped", kind.as_str());
}

#[cfg(not(target_os = "none"))]
fn log_record_dropped(kind: RecordKind) {
    println!("cloud: {} record dropped", kind.as_str());
}

#[cfg(target_os = "none")]
fn log_tracking(action: TrackingAction) {
    match action {
        TrackingAction::Enable => defmt::info!("cloud: location tracking resumed"),
        TrackingAction::Disable => defmt::info!("cloud: no signal, location tracking paused"),
    }
}

#[cfg(not(target_os = "none"))]
fn log_tracking(action: TrackingAction) {
    match action {
        TrackingAction::Enable => println!("cloud: location tracking resumed"),
        TrackingAction::Disable => println!("cloud: no signal, location tracking paused"),
    }
}
