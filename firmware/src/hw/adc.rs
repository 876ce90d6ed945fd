//! On-die temperature sampling for the STM32L4.
//!
//! The board carries no external environmental sensor, so the sampler reads
//! the MCU's internal temperature channel and reports humidity and pressure as
//! unmeasured (`NaN`), which never crosses an alert threshold.

use core::ptr;

use embassy_stm32::adc::{Adc, SampleTime, Temperature, VrefInt};
use embassy_stm32::peripherals::ADC1;
use tracker_core::drivers::{DriverError, EnvironmentSample, SensorDriver};

/// Factory-programmed VREFINT reading taken at VDDA = 3.0 V.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;
/// Temperature sensor reading at 30 °C, VDDA = 3.0 V.
const TS_CAL1_ADDR: *const u16 = 0x1FFF_75A8 as *const u16;
/// Temperature sensor reading at 130 °C, VDDA = 3.0 V.
const TS_CAL2_ADDR: *const u16 = 0x1FFF_75CA as *const u16;

const TS_CAL1_TEMP_C: f32 = 30.0;
const TS_CAL2_TEMP_C: f32 = 130.0;

#[derive(Copy, Clone)]
struct Calibration {
    vrefint: u16,
    ts_cal1: u16,
    ts_cal2: u16,
}

impl Calibration {
    fn read() -> Self {
        // SAFETY: the addresses are the documented system-memory calibration
        // words, readable for the lifetime of the device.
        unsafe {
            Self {
                vrefint: ptr::read_volatile(VREFINT_CAL_ADDR),
                ts_cal1: ptr::read_volatile(TS_CAL1_ADDR),
                ts_cal2: ptr::read_volatile(TS_CAL2_ADDR),
            }
        }
    }

    fn temperature_c(self, vrefint_raw: u16, ts_raw: u16) -> Option<f32> {
        if vrefint_raw == 0 || self.ts_cal2 <= self.ts_cal1 {
            return None;
        }
        // Rescale the reading to the 3.0 V reference used at calibration.
        let scaled = f32::from(ts_raw) * f32::from(self.vrefint) / f32::from(vrefint_raw);
        let slope = (TS_CAL2_TEMP_C - TS_CAL1_TEMP_C)
            / (f32::from(self.ts_cal2) - f32::from(self.ts_cal1));
        Some(slope * (scaled - f32::from(self.ts_cal1)) + TS_CAL1_TEMP_C)
    }
}

pub struct DieTemperature<'d> {
    adc: Adc<'d, ADC1>,
    vrefint: VrefInt,
    temperature: Temperature,
    calibration: Calibration,
    discard_next: bool,
}

impl<'d> DieTemperature<'d> {
    pub fn new(mut adc: Adc<'d, ADC1>) -> Self {
        adc.set_sample_time(SampleTime::CYCLES640_5);
        let vrefint = adc.enable_vrefint();
        let temperature = adc.enable_temperature();
        Self {
            adc,
            vrefint,
            temperature,
            calibration: Calibration::read(),
            discard_next: true,
        }
    }
}

impl SensorDriver for DieTemperature<'_> {
    fn read(&mut self) -> Result<EnvironmentSample, DriverError> {
        // The first conversion after enabling the channels is unreliable.
        if self.discard_next {
            let _ = self.adc.blocking_read(&mut self.vrefint);
            self.discard_next = false;
        }
        let vrefint_raw = self.adc.blocking_read(&mut self.vrefint);
        let ts_raw = self.adc.blocking_read(&mut self.temperature);
        let temperature_c = self
            .calibration
            .temperature_c(vrefint_raw, ts_raw)
            .ok_or(DriverError::Rejected)?;
        Ok(EnvironmentSample {
            temperature_c,
            humidity_pct: f32::NAN,
            pressure_hpa: f32::NAN,
        })
    }
}
