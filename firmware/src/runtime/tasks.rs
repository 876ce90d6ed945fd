//! Executor entry points, one per task, bound to the board types.

use crate::hw::{BoardShared, GpioButton};
use crate::tasks::audio::AudioPlayer;
use crate::tasks::cloud::CloudSync;
use crate::tasks::command::CommandPoller;
use crate::tasks::config_watch::ConfigWatcher;
use crate::tasks::orchestrator::Orchestrator;
use crate::tasks::sensor::SensorSampler;

#[embassy_executor::task]
pub async fn orchestrator(shared: &'static BoardShared, button: GpioButton<'static>) -> ! {
    Orchestrator::new(shared, button).run().await
}

#[embassy_executor::task]
pub async fn sensor(shared: &'static BoardShared) -> ! {
    SensorSampler::new(shared).run().await
}

#[embassy_executor::task]
pub async fn config_watch(shared: &'static BoardShared) -> ! {
    ConfigWatcher::new(shared).run().await
}

#[embassy_executor::task]
pub async fn cloud(shared: &'static BoardShared) -> ! {
    CloudSync::new(shared).run().await
}

#[embassy_executor::task]
pub async fn audio(shared: &'static BoardShared) -> ! {
    AudioPlayer::new(shared).run().await
}

#[embassy_executor::task]
pub async fn command(shared: &'static BoardShared) -> ! {
    CommandPoller::new(shared).run().await
}
