//! Periodic environmental sampling and alert evaluation.

use embassy_time::Instant;
use tracker_core::alerts::{self, AlertKind, AlertRecord, SensorReading};
use tracker_core::audio::{AudioEvent, AudioRequest};
use tracker_core::config::Configuration;
use tracker_core::config::timing::{BUS_TIMEOUT, IDLE_PERIOD};
use tracker_core::drivers::CloudTransport;
use tracker_core::sleep::TaskId;
use tracker_core::telemetry::{OutboundRecord, TrackRecord};
use tracker_core::time::Uptime;

use super::{cloud_failed, log_bus_busy, take_snapshot};
use crate::context::{Platform, Shared};
use crate::time::{now, to_embassy};

const TASK: &str = "sensor";

/// What one sampling cycle produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleOutcome {
    /// The bus was busy; nothing was read.
    Skipped,
    /// A driver call failed; no records were emitted.
    Failed,
    Reported { alerts: u32 },
}

pub struct SensorSampler<'a, P: Platform> {
    shared: &'a Shared<P>,
    config: Configuration,
    usb_powered: Option<bool>,
}

impl<'a, P: Platform> SensorSampler<'a, P> {
    pub fn new(shared: &'a Shared<P>) -> Self {
        Self {
            shared,
            config: Configuration::new(),
            usb_powered: None,
        }
    }

    pub async fn run(mut self) -> ! {
        self.shared.wait_system_ready().await;
        loop {
            if self.shared.sleep.is_requested() {
                self.shared.sleep.park(TaskId::SensorSampler).await;
                continue;
            }
            self.refresh_config().await;

            let interval = self.config.mode.sensor_interval();
            if interval.is_zero() {
                self.shared.sleep.idle_for(IDLE_PERIOD).await;
                continue;
            }

            let started = Instant::now();
            self.sample(now()).await;
            self.shared
                .sleep
                .idle_until(started + to_embassy(interval))
                .await;
        }
    }

    pub async fn refresh_config(&mut self) {
        if let Some(config) = self.shared.config.read().await {
            self.config = config;
        }
    }

    /// Reads every sensor once and emits the resulting records and cues.
    pub async fn sample(&mut self, now: Uptime) -> SampleOutcome {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return SampleOutcome::Skipped;
        };
        let snapshot = take_snapshot(TASK, &mut *bus, &self.shared.errors);
        let motion = bus.cloud.motion();
        if let Some(snapshot) = snapshot
            && self.usb_powered != Some(snapshot.power.usb_powered)
        {
            if self.usb_powered.is_some() {
                log_power_transition(snapshot.power.usb_powered);
                if let Err(error) = bus
                    .cloud
                    .configure_power_monitoring(snapshot.power.usb_powered, self.config.mode)
                {
                    cloud_failed(TASK, "power monitoring", error, &self.shared.errors);
                }
            }
            self.usb_powered = Some(snapshot.power.usb_powered);
        }
        drop(bus);

        let Some(snapshot) = snapshot else {
            if motion {
                self.shared
                    .state
                    .with(|store| store.state_mut().motion_pending = true);
            }
            return SampleOutcome::Failed;
        };

        let thresholds = self.config.thresholds;
        let (reading, evaluation) = self.shared.state.with(|store| {
            let state = store.state_mut();
            let pending = state.take_motion();
            let reading = snapshot.reading(motion || pending, now.as_secs_u32());
            let evaluation =
                alerts::evaluate(&reading, &thresholds, state.last_pressure_hpa, state.alerts);
            state.alerts = evaluation.apply(state.alerts);
            state.last_pressure_hpa = Some(reading.pressure_hpa);
            (reading, evaluation)
        });

        for kind in evaluation.triggered.iter() {
            let record = AlertRecord::new(kind, &reading, &thresholds);
            log_alert_triggered(kind, &record);
            self.shared.queues.offer_record(OutboundRecord::Alert(record));
            if let Some(cue) = kind.cue() {
                self.shared.queues.offer_audio(AudioRequest::Event(cue));
            }
        }
        for kind in evaluation.cleared.iter() {
            log_alert_cleared(kind);
        }
        if motion {
            self.shared
                .queues
                .offer_audio(AudioRequest::Event(AudioEvent::Motion));
        }

        self.report(reading);
        SampleOutcome::Reported {
            alerts: evaluation.triggered.len(),
        }
    }

    fn report(&self, reading: SensorReading) {
        let delivered = self.shared.queues.offer_record(OutboundRecord::Track(TrackRecord {
            reading,
            mode: self.config.mode,
            force_sync: false,
        }));
        if !delivered && reading.motion {
            self.shared
                .state
                .with(|store| store.state_mut().motion_pending = true);
        }
    }
}

#[cfg(target_os = "none")]
fn log_alert_triggered(kind: AlertKind, record: &AlertRecord) {
    defmt::warn!("sensor: alert {}: {}", kind.as_str(), record.message.as_str());
}

#[cfg(not(target_os = "none"))]
fn log_alert_triggered(kind: AlertKind, record: &AlertRecord) {
    println!("sensor: alert {}: {}", kind.as_str(), record.message);
}

#[cfg(target_os = "none")]
fn log_alert_cleared(kind: AlertKind) {
    defmt::info!("sensor: alert {} cleared", kind.as_str());
}

#[cfg(not(target_os = "none"))]
fn log_alert_cleared(kind: AlertKind) {
    println!("sensor: alert {} cleared", kind.as_str());
}

#[cfg(target_os = "none")]
fn log_power_transition(usb_powered: bool) {
    defmt::info!("sensor: external power {}", if usb_powered { "connected" } else { "removed" });
}

#[cfg(not(target_os = "none"))]
fn log_power_transition(usb_powered: bool) {
    println!(
        "sensor: external power {}",
        if usb_powered { "connected" } else { "removed" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, sample, with_cloud, with_sensor};
    use embassy_futures::block_on;
    use tracker_core::config::OperatingMode;
    use tracker_core::drivers::DriverError;

    #[test]
    fn hot_reading_emits_alert_cue_and_track_record() {
        let shared = testing::shared();
        let mut sampler = SensorSampler::new(&shared);
        with_sensor(&shared, |sensor| sensor.next = Ok(sample(36.0)));

        let outcome = block_on(sampler.sample(Uptime::from_secs(60)));

        assert_eq!(outcome, SampleOutcome::Reported { alerts: 1 });
        let records = testing::drain_records(&shared);
        assert_eq!(records.len(), 2);
        match &records[0] {
            OutboundRecord::Alert(alert) => {
                assert_eq!(alert.kind, AlertKind::TempHigh);
                assert!((alert.threshold - 35.0).abs() < f32::EPSILON);
            }
            other => panic!("expected alert first, got {other:?}"),
        }
        assert!(matches!(records[1], OutboundRecord::Track(_)));
        assert_eq!(
            shared.queues.audio.try_receive().ok(),
            Some(AudioRequest::Event(AudioEvent::TempAlert))
        );
        assert!(shared.state.with(|store| store.state().alerts.contains(AlertKind::TempHigh)));
    }

    #[test]
    fn triggered_alert_is_not_repeated() {
        let shared = testing::shared();
        let mut sampler = SensorSampler::new(&shared);
        with_sensor(&shared, |sensor| sensor.next = Ok(sample(36.0)));
        block_on(sampler.sample(Uptime::from_secs(60)));
        testing::drain_records(&shared);

        let outcome = block_on(sampler.sample(Uptime::from_secs(120)));
        assert_eq!(outcome, SampleOutcome::Reported { alerts: 0 });
        assert_eq!(testing::drain_records(&shared).len(), 1, "track record only");
    }

    #[test]
    fn sensor_failure_counts_and_keeps_motion_pending() {
        let shared = testing::shared();
        let mut sampler = SensorSampler::new(&shared);
        with_sensor(&shared, |sensor| sensor.next = Err(DriverError::Bus));
        with_cloud(&shared, |cloud| cloud.motion = true);

        assert_eq!(block_on(sampler.sample(Uptime::from_secs(1))), SampleOutcome::Failed);
        assert_eq!(shared.errors.sensor_failures(), 1);
        assert!(testing::drain_records(&shared).is_empty());
        assert!(shared.state.with(|store| store.state().motion_pending));

        with_sensor(&shared, |sensor| sensor.next = Ok(sample(21.0)));
        block_on(sampler.sample(Uptime::from_secs(2)));
        let records = testing::drain_records(&shared);
        match &records[..] {
            [OutboundRecord::Track(track)] => assert!(track.reading.motion, "pending motion reported"),
            other => panic!("unexpected records {other:?}"),
        }
        assert!(!shared.state.with(|store| store.state().motion_pending));
    }

    #[test]
    fn fresh_motion_also_consumes_pending_motion() {
        let shared = testing::shared();
        let mut sampler = SensorSampler::new(&shared);
        with_sensor(&shared, |sensor| sensor.next = Err(DriverError::Bus));
        with_cloud(&shared, |cloud| cloud.motion = true);
        assert_eq!(block_on(sampler.sample(Uptime::from_secs(1))), SampleOutcome::Failed);

        with_sensor(&shared, |sensor| sensor.next = Ok(sample(21.0)));
        with_cloud(&shared, |cloud| cloud.motion = true);
        block_on(sampler.sample(Uptime::from_secs(2)));
        assert!(!shared.state.with(|store| store.state().motion_pending));
        testing::drain_records(&shared);

        block_on(sampler.sample(Uptime::from_secs(3)));
        match &testing::drain_records(&shared)[..] {
            [OutboundRecord::Track(track)] => assert!(!track.reading.motion, "motion reported once"),
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn busy_bus_skips_the_cycle() {
        let shared = testing::shared();
        let mut sampler = SensorSampler::new(&shared);
        block_on(async {
            let _held = shared.bus.acquire(BUS_TIMEOUT).await.expect("bus free");
            assert_eq!(sampler.sample(Uptime::from_secs(1)).await, SampleOutcome::Skipped);
        });
        assert!(testing::drain_records(&shared).is_empty());
        assert_eq!(shared.errors.sensor_failures(), 0, "contention is not a failure");
    }

    #[test]
    fn usb_transition_reconfigures_power_monitoring() {
        let shared = testing::shared();
        let mut sampler = SensorSampler::new(&shared);
        block_on(sampler.sample(Uptime::from_secs(1)));
        with_cloud(&shared, |cloud| cloud.power.usb_powered = true);
        block_on(sampler.sample(Uptime::from_secs(2)));
        block_on(sampler.sample(Uptime::from_secs(3)));

        assert_eq!(
            with_cloud(&shared, |cloud| cloud.power_monitoring.clone()),
            vec![(true, OperatingMode::Demo)]
        );
    }
}
