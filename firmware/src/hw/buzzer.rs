//! Piezo buzzer driven by toggling a push-pull GPIO.

use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Instant, Timer};
use tracker_core::audio::AudioEvent;
use tracker_core::drivers::AudioDriver;

/// One note: frequency in Hz (`0` rests) and length in milliseconds.
type Note = (u16, u16);

const REST_MS: u64 = 30;

fn melody(event: AudioEvent) -> &'static [Note] {
    match event {
        AudioEvent::PowerOn => &[(523, 100), (659, 100), (784, 150)],
        AudioEvent::Connected => &[(784, 80), (1047, 120)],
        AudioEvent::GpsLock => &[(1047, 60), (0, 40), (1047, 60)],
        AudioEvent::NoteSent => &[(1319, 40)],
        AudioEvent::Motion => &[(880, 50)],
        AudioEvent::TempAlert | AudioEvent::HumidityAlert => {
            &[(1760, 150), (0, 80), (1760, 150), (0, 80), (1760, 150)]
        }
        AudioEvent::LowBattery => &[(659, 200), (523, 200), (392, 300)],
        AudioEvent::Button => &[(2093, 20)],
        AudioEvent::Sleep => &[(784, 100), (659, 100), (523, 150)],
        AudioEvent::Error => &[(220, 300)],
        AudioEvent::Ping => &[(1568, 100)],
        AudioEvent::LocateBeep => &[(2637, 150)],
        AudioEvent::TransitLockOn => &[(523, 80), (784, 80), (1047, 120)],
        AudioEvent::TransitLockOff => &[(1047, 80), (784, 80), (523, 120)],
        AudioEvent::DemoLockOn => &[(659, 80), (988, 120)],
        AudioEvent::DemoLockOff => &[(988, 80), (659, 120)],
    }
}

pub struct Buzzer<'d> {
    pin: Output<'d>,
    enabled: bool,
    stopped: bool,
}

impl<'d> Buzzer<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self {
            pin,
            enabled: true,
            stopped: false,
        }
    }

    async fn square_wave(&mut self, frequency_hz: u16, duration_ms: u16) {
        let length = Duration::from_millis(u64::from(duration_ms));
        if frequency_hz == 0 {
            Timer::after(length).await;
            return;
        }
        let half_period = Duration::from_micros(500_000 / u64::from(frequency_hz));
        let end = Instant::now() + length;
        while Instant::now() < end && !self.stopped {
            self.pin.toggle();
            Timer::after(half_period).await;
        }
        self.pin.set_low();
    }
}

impl AudioDriver for Buzzer<'_> {
    async fn play_event(&mut self, event: AudioEvent, volume: u8) {
        if !self.enabled || volume == 0 {
            return;
        }
        self.stopped = false;
        for &(frequency_hz, duration_ms) in melody(event) {
            if self.stopped {
                break;
            }
            self.square_wave(frequency_hz, duration_ms).await;
            Timer::after_millis(REST_MS).await;
        }
    }

    async fn play_tone(&mut self, frequency_hz: u16, duration_ms: u16, volume: u8) {
        if !self.enabled || volume == 0 {
            return;
        }
        self.stopped = false;
        self.square_wave(frequency_hz, duration_ms).await;
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.pin.set_low();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stop();
        }
    }
}
