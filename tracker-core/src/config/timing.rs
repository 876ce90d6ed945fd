//! Fixed timeouts and periods used by the task set.

use core::time::Duration;

/// Longest wait for the shared bus before a cycle is skipped.
pub const BUS_TIMEOUT: Duration = Duration::from_millis(1_000);
/// Longest wait for the shared configuration cell.
pub const CONFIG_LOCK_TIMEOUT: Duration = Duration::from_millis(100);
/// Upper bound on the start-up connectivity handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Poll period while waiting for connectivity.
pub const CONNECT_POLL: Duration = Duration::from_millis(500);
/// Rendezvous window for every task to report sleep readiness.
pub const SLEEP_COORDINATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Orchestrator loop period.
pub const ORCHESTRATOR_PERIOD: Duration = Duration::from_millis(100);
/// Remote configuration poll period.
pub const CONFIG_POLL_PERIOD: Duration = Duration::from_secs(30);
/// Location freshness and demo-mode sync check period.
pub const LOCATION_CHECK_PERIOD: Duration = Duration::from_secs(5);
/// Outbound record dequeue timeout.
pub const RECORD_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);
/// Health log period.
pub const HEALTH_LOG_PERIOD: Duration = Duration::from_secs(60);
/// Fallback delay for tasks whose mode interval is zero.
pub const IDLE_PERIOD: Duration = Duration::from_secs(1);
/// Gap between locate beeps.
pub const LOCATE_BEEP_GAP: Duration = Duration::from_millis(850);
/// Audio queue poll period while a locate pattern runs.
pub const LOCATE_POLL: Duration = Duration::from_millis(50);
/// Audio queue wait while idle; bounds how long a sleep request goes unseen.
pub const AUDIO_IDLE_WAIT: Duration = Duration::from_millis(250);
/// Poll period for parked tasks waiting for a sleep request to clear.
pub const PARK_POLL: Duration = Duration::from_millis(100);
/// Time a sleep-capable mode stays awake before requesting sleep.
pub const AWAKE_WINDOW: Duration = Duration::from_secs(120);
/// A location fix younger than this counts as fresh.
pub const FRESH_FIX_AGE: Duration = Duration::from_secs(10);
