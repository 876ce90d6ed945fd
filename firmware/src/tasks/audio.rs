//! Audio player: drains the audio queue and drives the locate pattern.

use tracker_core::audio::{AudioEvent, AudioRequest, AudioSettings, LocatePattern, LocateStep};
use tracker_core::config::timing::{AUDIO_IDLE_WAIT, LOCATE_POLL};
use tracker_core::drivers::AudioDriver;
use tracker_core::sleep::TaskId;
use tracker_core::time::Uptime;

use crate::context::{Platform, Shared};
use crate::time::now;

pub struct AudioPlayer<'a, P: Platform> {
    shared: &'a Shared<P>,
    pattern: LocatePattern,
    next_beep: Option<Uptime>,
    applied: Option<AudioSettings>,
}

impl<'a, P: Platform> AudioPlayer<'a, P> {
    pub fn new(shared: &'a Shared<P>) -> Self {
        Self {
            shared,
            pattern: LocatePattern::idle(),
            next_beep: None,
            applied: None,
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.sync_settings().await;
            // A running locate pattern holds the task awake until it ends.
            if self.shared.sleep.is_requested() && !self.pattern.is_active() {
                self.shared.sleep.park(TaskId::AudioPlayer).await;
                continue;
            }
            let wait = if self.pattern.is_active() {
                LOCATE_POLL
            } else {
                AUDIO_IDLE_WAIT
            };
            if let Some(request) = self.shared.queues.next_audio(wait).await {
                self.handle(request, now()).await;
            }
            self.tick_locate(now()).await;
        }
    }

    pub fn is_locating(&self) -> bool {
        self.pattern.is_active()
    }

    /// Pushes changed settings down to the driver.
    pub async fn sync_settings(&mut self) {
        let settings = self.shared.audio_settings.get();
        if self.applied == Some(settings) {
            return;
        }
        let mut driver = self.shared.audio.lock().await;
        driver.set_enabled(settings.is_audible());
        driver.set_volume(settings.volume);
        driver.set_alerts_only(settings.alerts_only);
        self.applied = Some(settings);
    }

    pub async fn handle(&mut self, request: AudioRequest, now: Uptime) {
        let settings = self.shared.audio_settings.get();
        if !settings.permits_request(&request) {
            log_suppressed(&request);
            return;
        }
        match request {
            AudioRequest::Event(event) => {
                self.shared
                    .audio
                    .lock()
                    .await
                    .play_event(event, settings.volume)
                    .await;
            }
            AudioRequest::Tone {
                frequency_hz,
                duration_ms,
            } => {
                self.shared
                    .audio
                    .lock()
                    .await
                    .play_tone(frequency_hz, duration_ms, settings.volume)
                    .await;
            }
            AudioRequest::StartLocate { duration } => {
                log_locate(true);
                self.pattern.start(now, duration);
                self.next_beep = Some(now);
            }
            AudioRequest::StopLocate => {
                if self.pattern.is_active() {
                    log_locate(false);
                }
                self.stop_locate().await;
            }
        }
    }

    /// Plays the next locate beep once it is due.
    pub async fn tick_locate(&mut self, now: Uptime) {
        if !self.pattern.is_active() {
            return;
        }
        let settings = self.shared.audio_settings.get();
        if !settings.is_audible() {
            log_locate(false);
            self.stop_locate().await;
            return;
        }
        if self.next_beep.is_some_and(|due| now < due) {
            return;
        }
        match self.pattern.step(now) {
            LocateStep::Beep { gap } => {
                self.shared
                    .audio
                    .lock()
                    .await
                    .play_event(AudioEvent::LocateBeep, settings.volume)
                    .await;
                self.next_beep = Some(now + gap);
            }
            LocateStep::Finished => {
                log_locate(false);
                self.stop_locate().await;
            }
            LocateStep::Idle => self.next_beep = None,
        }
    }

    async fn stop_locate(&mut self) {
        self.pattern.stop();
        self.next_beep = None;
        self.shared.audio.lock().await.stop();
    }
}

#[cfg(target_os = "none")]
fn log_suppressed(request: &AudioRequest) {
    match request {
        AudioRequest::Event(event) => defmt::debug!("audio: {} suppressed", event.as_str()),
        _ => defmt::debug!("audio: request suppressed"),
    }
}

#[cfg(not(target_os = "none"))]
fn log_suppressed(request: &AudioRequest) {
    println!("audio: {request:?} suppressed");
}

#[cfg(target_os = "none")]
fn log_locate(active: bool) {
    defmt::info!("audio: locate {}", if active { "started" } else { "stopped" });
}

#[cfg(not(target_os = "none"))]
fn log_locate(active: bool) {
    println!("audio: locate {}", if active { "started" } else { "stopped" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use core::time::Duration;
    use embassy_futures::block_on;

    fn events(shared: &testing::TestShared) -> Vec<AudioEvent> {
        block_on(async {
            shared
                .audio
                .lock()
                .await
                .events
                .iter()
                .map(|(event, _)| *event)
                .collect()
        })
    }

    #[test]
    fn events_play_at_the_shared_volume() {
        let shared = testing::shared();
        shared.audio_settings.update(|settings| AudioSettings {
            volume: 40,
            ..settings
        });
        let mut player = AudioPlayer::new(&shared);

        block_on(player.handle(AudioRequest::Event(AudioEvent::Ping), Uptime::ZERO));

        let recorded = block_on(async { shared.audio.lock().await.events.clone() });
        assert_eq!(recorded, vec![(AudioEvent::Ping, 40)]);
    }

    #[test]
    fn muted_settings_suppress_playback() {
        let shared = testing::shared();
        shared.audio_settings.update(|settings| AudioSettings {
            muted: true,
            ..settings
        });
        let mut player = AudioPlayer::new(&shared);

        block_on(player.handle(AudioRequest::Event(AudioEvent::Motion), Uptime::ZERO));
        block_on(player.handle(
            AudioRequest::Tone {
                frequency_hz: 1_000,
                duration_ms: 200,
            },
            Uptime::ZERO,
        ));

        assert!(events(&shared).is_empty());
        assert!(block_on(async { shared.audio.lock().await.tones.is_empty() }));
    }

    #[test]
    fn locate_beeps_on_its_gap_until_the_end_time() {
        let shared = testing::shared();
        let mut player = AudioPlayer::new(&shared);
        let start = Uptime::from_secs(10);

        block_on(player.handle(
            AudioRequest::StartLocate {
                duration: Duration::from_secs(5),
            },
            start,
        ));
        assert!(player.is_locating());

        block_on(player.tick_locate(start));
        block_on(player.tick_locate(start + Duration::from_millis(100)));
        block_on(player.tick_locate(start + Duration::from_millis(900)));
        assert_eq!(events(&shared), vec![AudioEvent::LocateBeep; 2]);

        block_on(player.tick_locate(start + Duration::from_secs(6)));
        assert!(!player.is_locating());
        assert_eq!(block_on(async { shared.audio.lock().await.stops }), 1);
    }

    #[test]
    fn stop_request_cancels_locate() {
        let shared = testing::shared();
        let mut player = AudioPlayer::new(&shared);
        block_on(player.handle(
            AudioRequest::StartLocate {
                duration: Duration::from_secs(60),
            },
            Uptime::ZERO,
        ));

        block_on(player.handle(AudioRequest::StopLocate, Uptime::from_secs(1)));
        block_on(player.tick_locate(Uptime::from_secs(2)));

        assert!(!player.is_locating());
        assert!(events(&shared).is_empty());
    }

    #[test]
    fn muting_mid_locate_ends_the_pattern() {
        let shared = testing::shared();
        let mut player = AudioPlayer::new(&shared);
        block_on(player.handle(
            AudioRequest::StartLocate {
                duration: Duration::from_secs(60),
            },
            Uptime::ZERO,
        ));
        shared.audio_settings.update(|settings| AudioSettings {
            muted: true,
            ..settings
        });

        block_on(player.tick_locate(Uptime::from_secs(1)));

        assert!(!player.is_locating());
        assert!(events(&shared).is_empty());
    }

    #[test]
    fn settings_reach_the_driver_once_per_change() {
        let shared = testing::shared();
        let mut player = AudioPlayer::new(&shared);
        block_on(player.sync_settings());
        shared.audio_settings.update(|settings| AudioSettings {
            volume: 10,
            alerts_only: true,
            ..settings
        });
        block_on(player.sync_settings());

        let (enabled, volume, alerts_only) = block_on(async {
            let audio = shared.audio.lock().await;
            (audio.enabled, audio.volume, audio.alerts_only)
        });
        assert_eq!(enabled, Some(true));
        assert_eq!(volume, Some(10));
        assert_eq!(alerts_only, Some(true));
    }
}
