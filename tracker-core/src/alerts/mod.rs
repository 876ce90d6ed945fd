//! Threshold alerts with per-condition hysteresis.
//!
//! [`evaluate`] is a pure function: it looks at one [`SensorReading`], the
//! configured [`AlertThresholds`], the previous pressure, and the set of alerts
//! already reported, and returns which alerts fire and which clear. Callers
//! fold the result back into the persisted [`AlertSet`] with
//! [`AlertEvaluation::apply`].

use core::fmt::{self, Write as _};

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::audio::AudioEvent;
use crate::config::AlertThresholds;

/// Margin below the high / above the low temperature threshold before clearing.
pub const TEMP_HYSTERESIS_C: f32 = 2.0;
/// Margin for humidity alerts.
pub const HUMIDITY_HYSTERESIS_PCT: f32 = 5.0;
/// Margin above the low-voltage threshold before the battery alert clears.
pub const VOLTAGE_HYSTERESIS_V: f32 = 0.1;

/// Independent alert conditions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AlertKind {
    TempHigh,
    TempLow,
    HumidityHigh,
    HumidityLow,
    PressureDelta,
    LowBattery,
}

impl AlertKind {
    pub const ALL: [Self; 6] = [
        Self::TempHigh,
        Self::TempLow,
        Self::HumidityHigh,
        Self::HumidityLow,
        Self::PressureDelta,
        Self::LowBattery,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TempHigh => "temp_high",
            Self::TempLow => "temp_low",
            Self::HumidityHigh => "humidity_high",
            Self::HumidityLow => "humidity_low",
            Self::PressureDelta => "pressure_change",
            Self::LowBattery => "low_battery",
        }
    }

    /// Cue played when the alert fires.
    #[must_use]
    pub const fn cue(self) -> Option<AudioEvent> {
        match self {
            Self::TempHigh | Self::TempLow => Some(AudioEvent::TempAlert),
            Self::HumidityHigh | Self::HumidityLow => Some(AudioEvent::HumidityAlert),
            Self::LowBattery => Some(AudioEvent::LowBattery),
            Self::PressureDelta => None,
        }
    }
}

/// Fixed-size set of alert kinds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AlertSet(u8);

impl AlertSet {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn contains(self, kind: AlertKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: AlertKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: AlertKind) {
        self.0 &= !kind.bit();
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub fn iter(self) -> impl Iterator<Item = AlertKind> {
        AlertKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<AlertKind> for AlertSet {
    fn from_iter<I: IntoIterator<Item = AlertKind>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// One sampling cycle's measurements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
    pub voltage_v: f32,
    pub motion: bool,
    pub valid: bool,
    /// Seconds since the wake session started.
    pub timestamp_sec: u32,
}

impl SensorReading {
    /// A reading for a failed acquisition; never triggers or clears alerts.
    #[must_use]
    pub const fn invalid(timestamp_sec: u32) -> Self {
        Self {
            temperature_c: 0.0,
            humidity_pct: 0.0,
            pressure_hpa: 0.0,
            voltage_v: 0.0,
            motion: false,
            valid: false,
            timestamp_sec,
        }
    }
}

/// Alerts that changed state during one evaluation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AlertEvaluation {
    pub triggered: AlertSet,
    pub cleared: AlertSet,
}

impl AlertEvaluation {
    /// Folds the evaluation into the already-sent set.
    #[must_use]
    pub fn apply(&self, sent: AlertSet) -> AlertSet {
        let mut next = sent;
        for kind in self.triggered.iter() {
            next.insert(kind);
        }
        for kind in self.cleared.iter() {
            next.remove(kind);
        }
        next
    }

    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.triggered.is_empty() && self.cleared.is_empty()
    }
}

/// Evaluates every alert condition against one reading.
///
/// Triggers and clears are both computed against `sent` as it stood before
/// this reading, so a kind never triggers and clears in the same pass.
#[must_use]
pub fn evaluate(
    reading: &SensorReading,
    thresholds: &AlertThresholds,
    previous_pressure_hpa: Option<f32>,
    sent: AlertSet,
) -> AlertEvaluation {
    let mut evaluation = AlertEvaluation::default();
    if !reading.valid {
        return evaluation;
    }

    for kind in AlertKind::ALL {
        if sent.contains(kind) {
            if clears(kind, reading, thresholds) {
                evaluation.cleared.insert(kind);
            }
        } else if trips(kind, reading, thresholds, previous_pressure_hpa) {
            evaluation.triggered.insert(kind);
        }
    }

    evaluation
}

fn trips(
    kind: AlertKind,
    reading: &SensorReading,
    thresholds: &AlertThresholds,
    previous_pressure_hpa: Option<f32>,
) -> bool {
    match kind {
        AlertKind::TempHigh => reading.temperature_c > thresholds.temp_high_c,
        AlertKind::TempLow => reading.temperature_c < thresholds.temp_low_c,
        AlertKind::HumidityHigh => reading.humidity_pct > thresholds.humidity_high_pct,
        AlertKind::HumidityLow => reading.humidity_pct < thresholds.humidity_low_pct,
        AlertKind::PressureDelta => previous_pressure_hpa
            .filter(|previous| *previous > 0.0)
            .is_some_and(|previous| {
                (reading.pressure_hpa - previous).abs() > thresholds.pressure_delta_hpa
            }),
        AlertKind::LowBattery => {
            reading.voltage_v > 0.0 && reading.voltage_v < thresholds.voltage_low_v
        }
    }
}

fn clears(kind: AlertKind, reading: &SensorReading, thresholds: &AlertThresholds) -> bool {
    match kind {
        AlertKind::TempHigh => reading.temperature_c < thresholds.temp_high_c - TEMP_HYSTERESIS_C,
        AlertKind::TempLow => reading.temperature_c > thresholds.temp_low_c + TEMP_HYSTERESIS_C,
        AlertKind::HumidityHigh => {
            reading.humidity_pct < thresholds.humidity_high_pct - HUMIDITY_HYSTERESIS_PCT
        }
        AlertKind::HumidityLow => {
            reading.humidity_pct > thresholds.humidity_low_pct + HUMIDITY_HYSTERESIS_PCT
        }
        // One-shot: reported once, then released on the next evaluation.
        AlertKind::PressureDelta => true,
        AlertKind::LowBattery => reading.voltage_v > thresholds.voltage_low_v + VOLTAGE_HYSTERESIS_V,
    }
}

/// Capacity of a human-readable alert message.
pub const ALERT_MESSAGE_CAPACITY: usize = 64;

/// Outbound description of one triggered alert.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertRecord {
    pub kind: AlertKind,
    pub value: f32,
    pub threshold: f32,
    pub message: String<ALERT_MESSAGE_CAPACITY>,
}

impl AlertRecord {
    /// Describes a freshly triggered alert.
    #[must_use]
    pub fn new(kind: AlertKind, reading: &SensorReading, thresholds: &AlertThresholds) -> Self {
        let (value, threshold) = match kind {
            AlertKind::TempHigh => (reading.temperature_c, thresholds.temp_high_c),
            AlertKind::TempLow => (reading.temperature_c, thresholds.temp_low_c),
            AlertKind::HumidityHigh => (reading.humidity_pct, thresholds.humidity_high_pct),
            AlertKind::HumidityLow => (reading.humidity_pct, thresholds.humidity_low_pct),
            AlertKind::PressureDelta => (reading.pressure_hpa, thresholds.pressure_delta_hpa),
            AlertKind::LowBattery => (reading.voltage_v, thresholds.voltage_low_v),
        };
        let mut message = String::new();
        // Truncation only loses the tail of the message.
        let _ = write_message(&mut message, kind, value, threshold);
        Self {
            kind,
            value,
            threshold,
            message,
        }
    }
}

fn write_message(
    out: &mut String<ALERT_MESSAGE_CAPACITY>,
    kind: AlertKind,
    value: f32,
    threshold: f32,
) -> fmt::Result {
    match kind {
        AlertKind::TempHigh => write!(out, "Temperature {value:.1}C exceeds {threshold:.1}C threshold"),
        AlertKind::TempLow => write!(out, "Temperature {value:.1}C below {threshold:.1}C threshold"),
        AlertKind::HumidityHigh => write!(out, "Humidity {value:.1}% exceeds {threshold:.1}% threshold"),
        AlertKind::HumidityLow => write!(out, "Humidity {value:.1}% below {threshold:.1}% threshold"),
        AlertKind::PressureDelta => write!(out, "Pressure changed significantly to {value:.1} hPa"),
        AlertKind::LowBattery => write!(out, "Battery {value:.2}V below {threshold:.2}V threshold"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature_c: f32) -> SensorReading {
        SensorReading {
            temperature_c,
            humidity_pct: 50.0,
            pressure_hpa: 1013.0,
            voltage_v: 3.9,
            motion: false,
            valid: true,
            timestamp_sec: 0,
        }
    }

    #[test]
    fn temperature_high_uses_two_degree_hysteresis() {
        let thresholds = AlertThresholds::new();
        let mut sent = AlertSet::EMPTY;

        let hot = evaluate(&reading(36.0), &thresholds, None, sent);
        assert!(hot.triggered.contains(AlertKind::TempHigh));
        sent = hot.apply(sent);

        let still_warm = evaluate(&reading(34.5), &thresholds, None, sent);
        assert!(still_warm.is_quiet(), "within hysteresis margin");
        sent = still_warm.apply(sent);
        assert!(sent.contains(AlertKind::TempHigh));

        let cool = evaluate(&reading(32.9), &thresholds, None, sent);
        assert!(cool.cleared.contains(AlertKind::TempHigh));
        assert!(!cool.apply(sent).contains(AlertKind::TempHigh));
    }

    #[test]
    fn already_sent_alert_does_not_retrigger() {
        let thresholds = AlertThresholds::new();
        let sent: AlertSet = [AlertKind::TempHigh].into_iter().collect();
        let evaluation = evaluate(&reading(40.0), &thresholds, None, sent);
        assert!(evaluation.triggered.is_empty());
    }

    #[test]
    fn pressure_delta_is_one_shot() {
        let thresholds = AlertThresholds::new();
        let mut sample = reading(20.0);
        sample.pressure_hpa = 990.0;

        let first = evaluate(&sample, &thresholds, Some(1013.0), AlertSet::EMPTY);
        assert!(first.triggered.contains(AlertKind::PressureDelta));
        let sent = first.apply(AlertSet::EMPTY);

        let second = evaluate(&sample, &thresholds, Some(1013.0), sent);
        assert!(second.cleared.contains(AlertKind::PressureDelta));
        assert!(!second.triggered.contains(AlertKind::PressureDelta));
        let sent = second.apply(sent);

        let third = evaluate(&sample, &thresholds, Some(1013.0), sent);
        assert!(third.triggered.contains(AlertKind::PressureDelta));
    }

    #[test]
    fn pressure_needs_a_previous_sample() {
        let thresholds = AlertThresholds::new();
        let mut sample = reading(20.0);
        sample.pressure_hpa = 900.0;
        assert!(evaluate(&sample, &thresholds, None, AlertSet::EMPTY).is_quiet());
        assert!(evaluate(&sample, &thresholds, Some(0.0), AlertSet::EMPTY).is_quiet());
    }

    #[test]
    fn battery_alert_ignores_missing_voltage() {
        let thresholds = AlertThresholds::new();
        let mut sample = reading(20.0);
        sample.voltage_v = 0.0;
        assert!(evaluate(&sample, &thresholds, None, AlertSet::EMPTY).is_quiet());

        sample.voltage_v = 3.3;
        let low = evaluate(&sample, &thresholds, None, AlertSet::EMPTY);
        assert!(low.triggered.contains(AlertKind::LowBattery));
        let sent = low.apply(AlertSet::EMPTY);

        sample.voltage_v = 3.45;
        assert!(evaluate(&sample, &thresholds, None, sent).is_quiet());
        sample.voltage_v = 3.6;
        assert!(evaluate(&sample, &thresholds, None, sent)
            .cleared
            .contains(AlertKind::LowBattery));
    }

    #[test]
    fn multiple_alerts_fire_together() {
        let thresholds = AlertThresholds::new();
        let mut sample = reading(-5.0);
        sample.humidity_pct = 95.0;
        sample.voltage_v = 3.2;
        let evaluation = evaluate(&sample, &thresholds, None, AlertSet::EMPTY);
        assert_eq!(evaluation.triggered.len(), 3);
        assert!(evaluation.triggered.contains(AlertKind::TempLow));
        assert!(evaluation.triggered.contains(AlertKind::HumidityHigh));
        assert!(evaluation.triggered.contains(AlertKind::LowBattery));
    }

    #[test]
    fn invalid_reading_changes_nothing() {
        let thresholds = AlertThresholds::new();
        let sent: AlertSet = [AlertKind::PressureDelta].into_iter().collect();
        let evaluation = evaluate(&SensorReading::invalid(0), &thresholds, Some(1000.0), sent);
        assert!(evaluation.is_quiet());
    }

    #[test]
    fn record_message_names_value_and_threshold() {
        let record = AlertRecord::new(AlertKind::TempHigh, &reading(36.0), &AlertThresholds::new());
        assert_eq!(record.message.as_str(), "Temperature 36.0C exceeds 35.0C threshold");
        assert_eq!(AlertKind::LowBattery.cue(), Some(AudioEvent::LowBattery));
        assert_eq!(AlertKind::PressureDelta.cue(), None);
    }
}
