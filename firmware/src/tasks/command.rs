//! Inbound command polling.

use embassy_time::Instant;
use tracker_core::commands::{self, CommandAck, CommandStatus, InboundCommand};
use tracker_core::config::Configuration;
use tracker_core::config::timing::{BUS_TIMEOUT, IDLE_PERIOD};
use tracker_core::drivers::CloudTransport;
use tracker_core::sleep::TaskId;
use tracker_core::telemetry::OutboundRecord;
use tracker_core::time::Uptime;

use super::{cloud_failed, log_bus_busy};
use crate::context::{Platform, Shared, SharedCommandContext};
use crate::time::{now, to_embassy};

const TASK: &str = "command";

pub struct CommandPoller<'a, P: Platform> {
    shared: &'a Shared<P>,
    config: Configuration,
}

impl<'a, P: Platform> CommandPoller<'a, P> {
    pub fn new(shared: &'a Shared<P>) -> Self {
        Self {
            shared,
            config: Configuration::new(),
        }
    }

    pub async fn run(mut self) -> ! {
        self.shared.wait_system_ready().await;
        loop {
            if self.shared.sleep.is_requested() {
                self.shared.sleep.park(TaskId::CommandPoller).await;
                continue;
            }
            if let Some(config) = self.shared.config.read().await {
                self.config = config;
            }

            let started = Instant::now();
            self.step(now()).await;

            let interval = self.config.mode.command_poll_interval();
            let period = if interval.is_zero() {
                IDLE_PERIOD
            } else {
                interval
            };
            self.shared
                .sleep
                .idle_until(started + to_embassy(period))
                .await;
        }
    }

    /// Handles at most one pending command.
    pub async fn step(&mut self, now: Uptime) -> Option<CommandAck> {
        let inbound = self.poll().await?;
        log_received(&inbound);

        let mut context = SharedCommandContext::new(self.shared);
        let ack = commands::execute(&inbound, &self.config, &mut context, now.as_secs_u32());
        log_ack(&ack);

        if self.config.cmd_ack_enabled {
            self.shared
                .queues
                .offer_record(OutboundRecord::CommandAck(ack.clone()));
        }
        Some(ack)
    }

    async fn poll(&self) -> Option<InboundCommand> {
        let Some(mut bus) = self.shared.bus.acquire(BUS_TIMEOUT).await else {
            log_bus_busy(TASK);
            return None;
        };
        match bus.cloud.inbound_command() {
            Ok(command) => command,
            Err(error) => {
                cloud_failed(TASK, "inbound poll", error, &self.shared.errors);
                None
            }
        }
    }
}

#[cfg(target_os = "none")]
fn log_received(inbound: &InboundCommand) {
    defmt::info!(
        "command: {} ({})",
        inbound.command.kind().as_str(),
        inbound.id.as_str()
    );
}

#[cfg(not(target_os = "none"))]
fn log_received(inbound: &InboundCommand) {
    println!("command: {} ({})", inbound.command.kind().as_str(), inbound.id);
}

#[cfg(target_os = "none")]
fn log_ack(ack: &CommandAck) {
    if ack.status == CommandStatus::Error {
        defmt::warn!("command: {} failed: {}", ack.kind.as_str(), ack.message.as_str());
    } else {
        defmt::info!("command: {} {}: {}", ack.kind.as_str(), ack.status.as_str(), ack.message.as_str());
    }
}

#[cfg(not(target_os = "none"))]
fn log_ack(ack: &CommandAck) {
    if ack.status == CommandStatus::Error {
        println!("command: {} failed: {}", ack.kind.as_str(), ack.message);
    } else {
        println!(
            "command: {} {}: {}",
            ack.kind.as_str(),
            ack.status.as_str(),
            ack.message
        );
    }
}
