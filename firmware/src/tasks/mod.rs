//! The six cooperating tasks.
//!
//! Each task is a struct over [`Shared`](crate::context::Shared) with a
//! `run` loop and smaller async steps that the host tests drive directly.

pub mod audio;
pub mod cloud;
pub mod command;
pub mod config_watch;
pub mod orchestrator;
pub mod sensor;

use tracker_core::alerts::SensorReading;
use tracker_core::drivers::{
    CloudTransport, DriverError, EnvironmentSample, PowerStatus, SensorDriver,
};

use crate::context::{DeviceBus, ErrorCounters};

/// One environmental plus battery measurement taken under the bus mutex.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub environment: EnvironmentSample,
    pub power: PowerStatus,
}

impl Snapshot {
    pub fn reading(&self, motion: bool, timestamp_sec: u32) -> SensorReading {
        SensorReading {
            temperature_c: self.environment.temperature_c,
            humidity_pct: self.environment.humidity_pct,
            pressure_hpa: self.environment.pressure_hpa,
            voltage_v: self.power.voltage_v,
            motion,
            valid: true,
            timestamp_sec,
        }
    }
}

/// Reads the sensor and battery status, counting any failure.
pub fn take_snapshot<S: SensorDriver, C: CloudTransport>(
    task: &str,
    bus: &mut DeviceBus<S, C>,
    errors: &ErrorCounters,
) -> Option<Snapshot> {
    let environment = match bus.sensor.read() {
        Ok(sample) => sample,
        Err(error) => {
            errors.record_sensor_failure();
            log_driver_failure(task, "sensor read", error);
            return None;
        }
    };
    let power = match bus.cloud.power_status() {
        Ok(power) => power,
        Err(error) => {
            errors.record_cloud_failure();
            log_driver_failure(task, "power status", error);
            return None;
        }
    };
    Some(Snapshot { environment, power })
}

/// Logs and counts a failed cloud call.
pub fn cloud_failed(task: &str, operation: &str, error: DriverError, errors: &ErrorCounters) {
    errors.record_cloud_failure();
    log_driver_failure(task, operation, error);
}

#[cfg(target_os = "none")]
pub fn log_bus_busy(task: &str) {
    defmt::debug!("{}: bus busy, skipping cycle", task);
}

#[cfg(not(target_os = "none"))]
pub fn log_bus_busy(task: &str) {
    println!("{task}: bus busy, skipping cycle");
}

#[cfg(target_os = "none")]
pub fn log_driver_failure(task: &str, operation: &str, error: DriverError) {
    defmt::warn!(
        "{}: {} failed: {}",
        task,
        operation,
        defmt::Display2Format(&error)
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_driver_failure(task: &str, operation: &str, error: DriverError) {
    println!("{task}: {operation} failed: {error}");
}
