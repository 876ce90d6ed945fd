//! Outbound records and the delivery history kept by the cloud task.
//!
//! Records are produced by several tasks, queued in FIFO order, and handed
//! one at a time to the cloud transport. How a record is serialized on the
//! wire is up to the transport.

use heapless::{HistoryBuf, OldestOrdered};

use crate::alerts::{AlertRecord, SensorReading};
use crate::commands::CommandAck;
use crate::config::OperatingMode;
use crate::time::Uptime;

/// Routine or mode-change sensor snapshot.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrackRecord {
    pub reading: SensorReading,
    pub mode: OperatingMode,
    /// Push to the backend immediately instead of waiting for the sync cadence.
    pub force_sync: bool,
}

/// Periodic device health summary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HealthRecord {
    pub firmware_version: &'static str,
    pub uptime_sec: u32,
    pub total_uptime_sec: u32,
    pub boot_count: u32,
    pub mode: OperatingMode,
    pub sensor_failures: u32,
    pub cloud_failures: u32,
    /// Seconds since the last location fix, if one was seen this session.
    pub last_fix_age_sec: Option<u32>,
}

/// One unit of outbound data.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundRecord {
    Track(TrackRecord),
    Alert(AlertRecord),
    CommandAck(CommandAck),
    Health(HealthRecord),
}

impl OutboundRecord {
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            OutboundRecord::Track(_) => RecordKind::Track,
            OutboundRecord::Alert(_) => RecordKind::Alert,
            OutboundRecord::CommandAck(_) => RecordKind::CommandAck,
            OutboundRecord::Health(_) => RecordKind::Health,
        }
    }

    /// Whether the transport should sync right after queuing the record.
    #[must_use]
    pub const fn force_sync(&self) -> bool {
        match self {
            OutboundRecord::Track(track) => track.force_sync,
            OutboundRecord::Alert(_) | OutboundRecord::CommandAck(_) => true,
            OutboundRecord::Health(_) => false,
        }
    }
}

/// Record category, used for logging and the delivery history.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RecordKind {
    Track,
    Alert,
    CommandAck,
    Health,
}

impl RecordKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::Track => "track",
            RecordKind::Alert => "alert",
            RecordKind::CommandAck => "command_ack",
            RecordKind::Health => "health",
        }
    }
}

/// Number of delivery attempts retained.
pub const DELIVERY_LOG_CAPACITY: usize = 32;

/// One delivery attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeliveryEntry {
    pub at: Uptime,
    pub kind: RecordKind,
    pub delivered: bool,
}

/// Fixed-capacity history of recent delivery attempts.
pub struct DeliveryLog {
    ring: HistoryBuf<DeliveryEntry, DELIVERY_LOG_CAPACITY>,
}

impl DeliveryLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
        }
    }

    pub fn record(&mut self, at: Uptime, kind: RecordKind, delivered: bool) {
        self.ring.write(DeliveryEntry {
            at,
            kind,
            delivered,
        });
    }

    #[must_use]
    pub fn latest(&self) -> Option<&DeliveryEntry> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Failed attempts among the retained history.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.ring
            .oldest_ordered()
            .filter(|entry| !entry.delivered)
            .count()
    }

    pub fn oldest_first(&self) -> OldestOrdered<'_, DeliveryEntry> {
        self.ring.oldest_ordered()
    }
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}
