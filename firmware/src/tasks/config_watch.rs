//! Remote configuration polling.
//!
//! The watcher compares every fetch against the last configuration it
//! forwarded, so a remote write that changes nothing never reaches the
//! orchestrator.

use tracker_core::config::timing::{BUS_TIMEOUT, CONFIG_POLL_PERIOD};
use tracker_core::config::{ConfigChanges, Configuration};
use tracker_core::drivers::RemoteConfigStore;
use tracker_core::sleep::TaskId;

use super::{cloud_failed, log_bus_busy};
use crate::context::{Platform, Shared};

const TASK: &str = "config";

pub struct ConfigWatcher<'a, P: Platform> {
    shared: &'a Shared<P>,
    known: Configuration,
}

impl<'a, P: Platform> ConfigWatcher<'a, P> {
    pub fn new(shared: &'a Shared<P>) -> Self {
        Self {
            shared,
            known: Configuration::new(),
        }
    }

    pub async fn run(mut self) -> ! {
        self.shared.wait_system_ready().await;
        if let Some(config) = self.shared.config.read().await {
            self.known = config;
        }
        loop {
            if self.shared.sleep.is_requested() {
                self.shared.sleep.park(TaskId::ConfigWatcher).await;
                continue;
            }
            self.step().await;
            self.shared.sleep.idle_for(CONFIG_POLL_PERIOD).await;
        }
    }

    /// Checks the remote store once, forwarding a real change.
    pub async fn step(&mut self) -> Option<ConfigChanges> {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return None;
        };
        match bus.cloud.has_changed() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(error) => {
                cloud_failed(TASK, "change check", error, &self.shared.errors);
                return None;
            }
        }
        let mut fetched = self.known;
        if let Err(error) = bus.cloud.fetch_all(&mut fetched) {
            cloud_failed(TASK, "fetch", error, &self.shared.errors);
            return None;
        }
        drop(bus);

        let fetched = fetched.sanitized();
        let changes = self.known.changes(&fetched);
        if changes.is_empty() {
            log_no_op();
            return None;
        }
        log_changes(&changes);
        self.known = fetched;
        self.shared.queues.push_config(fetched).await;
        Some(changes)
    }
}

#[cfg(target_os = "none")]
fn log_no_op() {
    defmt::debug!("config: remote update changed nothing");
}

#[cfg(not(target_os = "none"))]
fn log_no_op() {
    println!("config: remote update changed nothing");
}

#[cfg(target_os = "none")]
fn log_changes(changes: &ConfigChanges) {
    for field in changes {
        defmt::info!("config: {} changed", field.key());
    }
}

#[cfg(not(target_os = "none"))]
fn log_changes(changes: &ConfigChanges) {
    let keys: std::vec::Vec<&str> = changes.iter().map(|field| field.key()).collect();
    println!("config: changed {}", keys.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, with_cloud};
    use embassy_futures::block_on;
    use tracker_core::config::{ConfigField, OperatingMode};
    use tracker_core::drivers::DriverError;

    #[test]
    fn unchanged_store_is_not_fetched() {
        let shared = testing::shared();
        let mut watcher = ConfigWatcher::new(&shared);

        assert!(block_on(watcher.step()).is_none());
        assert_eq!(with_cloud(&shared, |cloud| cloud.fetches), 0);
    }

    #[test]
    fn no_op_write_is_suppressed() {
        let shared = testing::shared();
        let mut watcher = ConfigWatcher::new(&shared);
        with_cloud(&shared, |cloud| cloud.remote_changed = true);

        assert!(block_on(watcher.step()).is_none());
        assert_eq!(with_cloud(&shared, |cloud| cloud.fetches), 1);
        assert!(shared.queues.config_updates.try_receive().is_err());
    }

    #[test]
    fn real_change_is_forwarded_once() {
        let shared = testing::shared();
        let mut watcher = ConfigWatcher::new(&shared);
        with_cloud(&shared, |cloud| {
            cloud.remote.mode = OperatingMode::Storage;
            cloud.remote.audio.volume = 150;
            cloud.remote_changed = true;
        });

        let changes = block_on(watcher.step()).expect("change forwarded");
        assert_eq!(
            changes.as_slice(),
            &[ConfigField::Mode, ConfigField::AudioVolume]
        );
        let forwarded = shared
            .queues
            .config_updates
            .try_receive()
            .expect("update queued");
        assert_eq!(forwarded.mode, OperatingMode::Storage);
        assert_eq!(forwarded.audio.volume, 100, "values are clamped before forwarding");

        with_cloud(&shared, |cloud| cloud.remote_changed = true);
        assert!(block_on(watcher.step()).is_none(), "same values again");
    }

    #[test]
    fn change_check_failure_counts() {
        let shared = testing::shared();
        let mut watcher = ConfigWatcher::new(&shared);
        with_cloud(&shared, |cloud| cloud.fail_change_check = Some(DriverError::Timeout));

        assert!(block_on(watcher.step()).is_none());
        assert_eq!(shared.errors.cloud_failures(), 1);
    }
}
