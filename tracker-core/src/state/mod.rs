//! Cross-sleep persistent state and its checksummed frame encoding.
//!
//! A frame is laid out as
//!
//! ```text
//! +-------------------+-----------------------------+----------------+
//! | header (postcard) | PersistentState (postcard)  | CRC-32 (LE u32) |
//! +-------------------+-----------------------------+----------------+
//! ```
//!
//! The checksum covers everything before it. Decoding checks the checksum,
//! then the magic, then the version, and only then the body; any failure is
//! reported as a [`StateError`] and the caller falls back to a cold boot.

use core::fmt;
use core::time::Duration;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::alerts::AlertSet;
use crate::config::OperatingMode;
use crate::drivers::{DriverError, PersistenceBackend};
use crate::gps::GpsPowerState;
use crate::mode::{LockState, ModeController};
use crate::time::Uptime;

mod crc;

pub use crc::crc32;

/// Frame identifier.
pub const STATE_MAGIC: u32 = 0x4154_524B;
/// Layout version. Frames from any other version are discarded.
pub const STATE_VERSION: u8 = 1;
/// Upper bound on an encoded frame.
pub const STATE_FRAME_CAPACITY: usize = 96;

const CHECKSUM_LEN: usize = 4;

/// Encoded persistent-state frame.
pub type StateFrame = Vec<u8, STATE_FRAME_CAPACITY>;

#[derive(Serialize, Deserialize)]
struct FrameHeader {
    magic: u32,
    version: u8,
}

/// Why a frame could not be produced or accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateError {
    /// No frame has been saved yet.
    Missing,
    TooShort { len: usize },
    ChecksumMismatch { stored: u32, computed: u32 },
    BadMagic { found: u32 },
    VersionMismatch { found: u8 },
    Malformed,
    Encode,
    Backend(DriverError),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Missing => f.write_str("no saved state"),
            StateError::TooShort { len } => write!(f, "frame too short ({len} bytes)"),
            StateError::ChecksumMismatch { stored, computed } => write!(
                f,
                "checksum mismatch (stored {stored:#010x}, computed {computed:#010x})"
            ),
            StateError::BadMagic { found } => write!(f, "bad magic {found:#010x}"),
            StateError::VersionMismatch { found } => {
                write!(f, "version {found} does not match {STATE_VERSION}")
            }
            StateError::Malformed => f.write_str("malformed state body"),
            StateError::Encode => f.write_str("state does not fit in a frame"),
            StateError::Backend(err) => write!(f, "persistence backend: {err}"),
        }
    }
}

/// State that must survive deep sleep.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    pub boot_count: u32,
    pub last_sync: Option<Uptime>,
    pub last_gps_fix: Option<Uptime>,
    pub last_pressure_hpa: Option<f32>,
    pub mode: OperatingMode,
    pub alerts: AlertSet,
    /// Motion was observed but has not been carried by a track record yet.
    pub motion_pending: bool,
    pub uptime_at_sleep: Uptime,
    pub total_uptime_sec: u32,
    pub locks: LockState,
    pub gps: GpsPowerState,
}

impl PersistentState {
    /// Defaults used on cold boot.
    #[must_use]
    pub const fn cold() -> Self {
        Self {
            boot_count: 1,
            last_sync: None,
            last_gps_fix: None,
            last_pressure_hpa: None,
            mode: OperatingMode::Demo,
            alerts: AlertSet::EMPTY,
            motion_pending: false,
            uptime_at_sleep: Uptime::ZERO,
            total_uptime_sec: 0,
            locks: LockState::UNLOCKED,
            gps: GpsPowerState::new(),
        }
    }

    /// Mode/lock state machine over this state's mode and locks.
    pub fn mode_controller(&mut self) -> ModeController<'_> {
        ModeController::new(&mut self.mode, &mut self.locks)
    }

    /// Returns and clears the pending-motion flag.
    pub fn take_motion(&mut self) -> bool {
        core::mem::take(&mut self.motion_pending)
    }

    /// Encodes the state into a checksummed frame.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Encode`] if the frame exceeds
    /// [`STATE_FRAME_CAPACITY`].
    pub fn encode(&self) -> Result<StateFrame, StateError> {
        let mut buf = [0u8; STATE_FRAME_CAPACITY];
        let header = FrameHeader {
            magic: STATE_MAGIC,
            version: STATE_VERSION,
        };
        let header_len = postcard::to_slice(&header, &mut buf)
            .map_err(|_| StateError::Encode)?
            .len();
        let body_len = postcard::to_slice(self, &mut buf[header_len..])
            .map_err(|_| StateError::Encode)?
            .len();

        let payload_len = header_len + body_len;
        let frame_len = payload_len + CHECKSUM_LEN;
        if frame_len > STATE_FRAME_CAPACITY {
            return Err(StateError::Encode);
        }
        let checksum = crc32(&buf[..payload_len]);
        buf[payload_len..frame_len].copy_from_slice(&checksum.to_le_bytes());
        StateFrame::from_slice(&buf[..frame_len]).map_err(|_| StateError::Encode)
    }

    /// Validates and decodes a frame produced by [`PersistentState::encode`].
    ///
    /// # Errors
    ///
    /// Any checksum, magic, version, or body failure is reported; partial
    /// data is never returned.
    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        if bytes.len() <= CHECKSUM_LEN {
            return Err(StateError::TooShort { len: bytes.len() });
        }
        let (payload, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let mut stored = [0u8; CHECKSUM_LEN];
        stored.copy_from_slice(trailer);
        let stored = u32::from_le_bytes(stored);
        let computed = crc32(payload);
        if stored != computed {
            return Err(StateError::ChecksumMismatch { stored, computed });
        }

        let (header, body): (FrameHeader, &[u8]) =
            postcard::take_from_bytes(payload).map_err(|_| StateError::Malformed)?;
        if header.magic != STATE_MAGIC {
            return Err(StateError::BadMagic {
                found: header.magic,
            });
        }
        if header.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                found: header.version,
            });
        }

        let (state, rest): (PersistentState, &[u8]) =
            postcard::take_from_bytes(body).map_err(|_| StateError::Malformed)?;
        if !rest.is_empty() {
            return Err(StateError::Malformed);
        }
        Ok(state)
    }
}

impl Default for PersistentState {
    fn default() -> Self {
        Self::cold()
    }
}

/// How the current wake session started.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootKind {
    Cold,
    Warm,
}

/// Persistent state plus the accounting for the current wake session.
#[derive(Clone, Debug)]
pub struct StateStore {
    state: PersistentState,
    session_started: Uptime,
    boot: BootKind,
}

impl StateStore {
    /// Starts from cold-boot defaults.
    #[must_use]
    pub const fn cold(now: Uptime) -> Self {
        Self {
            state: PersistentState::cold(),
            session_started: now,
            boot: BootKind::Cold,
        }
    }

    /// Resumes from a validated frame.
    ///
    /// # Errors
    ///
    /// Propagates any [`PersistentState::decode`] failure.
    pub fn restore(bytes: &[u8], now: Uptime) -> Result<Self, StateError> {
        let mut state = PersistentState::decode(bytes)?;
        state.boot_count = state.boot_count.saturating_add(1);
        state.gps.rebase(now);
        // Both are stamped on the previous session's clock.
        state.last_gps_fix = None;
        state.last_sync = None;
        Ok(Self {
            state,
            session_started: now,
            boot: BootKind::Warm,
        })
    }

    /// Loads and restores the frame held by `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Missing`] when nothing was saved, a backend
    /// error, or any validation failure. Callers fall back to [`StateStore::cold`].
    pub fn load<B: PersistenceBackend>(backend: &mut B, now: Uptime) -> Result<Self, StateError> {
        let mut buf = [0u8; STATE_FRAME_CAPACITY];
        let len = backend
            .load(&mut buf)
            .map_err(StateError::Backend)?
            .ok_or(StateError::Missing)?;
        let frame = buf.get(..len).ok_or(StateError::Malformed)?;
        Self::restore(frame, now)
    }

    #[must_use]
    pub const fn boot_kind(&self) -> BootKind {
        self.boot
    }

    #[must_use]
    pub const fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PersistentState {
        &mut self.state
    }

    #[must_use]
    pub fn session_uptime(&self, now: Uptime) -> Duration {
        now.saturating_duration_since(self.session_started)
    }

    /// Age of the last location fix, if one was taken during this session.
    #[must_use]
    pub fn last_fix_age(&self, now: Uptime) -> Option<Duration> {
        self.state
            .last_gps_fix
            .map(|fix| now.saturating_duration_since(fix))
    }

    /// Uptime accumulated across every wake session, including this one.
    #[must_use]
    pub fn total_uptime_sec(&self, now: Uptime) -> u32 {
        let session = u32::try_from(self.session_uptime(now).as_secs()).unwrap_or(u32::MAX);
        self.state.total_uptime_sec.saturating_add(session)
    }

    /// Folds the session into the running totals. Safe to call more than once.
    pub fn prepare_for_sleep(&mut self, now: Uptime) {
        self.state.total_uptime_sec = self.total_uptime_sec(now);
        self.state.uptime_at_sleep = now;
        self.session_started = now;
    }

    /// Finalizes uptime accounting and hands the encoded frame to `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Encode`] or the backend's failure.
    pub fn save<B: PersistenceBackend>(&mut self, backend: &mut B, now: Uptime) -> Result<(), StateError> {
        self.prepare_for_sleep(now);
        let frame = self.state.encode()?;
        backend.save(&frame).map_err(StateError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;
    use crate::mode::Lock;

    struct MemoryBackend {
        frame: Option<StateFrame>,
    }

    impl PersistenceBackend for MemoryBackend {
        fn save(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
            self.frame = Some(StateFrame::from_slice(bytes).map_err(|_| DriverError::Rejected)?);
            Ok(())
        }

        fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
            match &self.frame {
                Some(frame) => {
                    buf[..frame.len()].copy_from_slice(frame);
                    Ok(Some(frame.len()))
                }
                None => Ok(None),
            }
        }
    }

    fn busy_state() -> PersistentState {
        let mut state = PersistentState::cold();
        state.boot_count = 7;
        state.last_sync = Some(Uptime::from_secs(90));
        state.last_gps_fix = Some(Uptime::from_millis(123_456));
        state.last_pressure_hpa = Some(1008.25);
        state.alerts.insert(AlertKind::HumidityLow);
        state.alerts.insert(AlertKind::LowBattery);
        state.motion_pending = true;
        state.total_uptime_sec = 86_400;
        state.mode = OperatingMode::Storage;
        state.mode_controller().toggle(Lock::Transit);
        state
    }

    #[test]
    fn frame_round_trips() {
        let state = busy_state();
        let frame = state.encode().expect("state fits in a frame");
        assert!(frame.len() <= STATE_FRAME_CAPACITY);
        assert_eq!(PersistentState::decode(&frame), Ok(state));
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let frame = busy_state().encode().expect("encode");
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    PersistentState::decode(&corrupted).is_err(),
                    "flip of byte {byte} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn version_mismatch_is_rejected_even_with_valid_checksum() {
        let mut buf = [0u8; STATE_FRAME_CAPACITY];
        let header = FrameHeader {
            magic: STATE_MAGIC,
            version: STATE_VERSION + 1,
        };
        let header_len = postcard::to_slice(&header, &mut buf).expect("header").len();
        let body_len = postcard::to_slice(&PersistentState::cold(), &mut buf[header_len..])
            .expect("body")
            .len();
        let payload_len = header_len + body_len;
        let checksum = crc32(&buf[..payload_len]);
        buf[payload_len..payload_len + 4].copy_from_slice(&checksum.to_le_bytes());

        assert_eq!(
            PersistentState::decode(&buf[..payload_len + 4]),
            Err(StateError::VersionMismatch {
                found: STATE_VERSION + 1
            })
        );
    }

    #[test]
    fn short_frames_are_rejected() {
        assert_eq!(
            PersistentState::decode(&[1, 2, 3]),
            Err(StateError::TooShort { len: 3 })
        );
    }

    #[test]
    fn warm_boot_increments_counter_and_carries_uptime() {
        let mut backend = MemoryBackend { frame: None };
        assert_eq!(
            StateStore::load(&mut backend, Uptime::ZERO).err(),
            Some(StateError::Missing)
        );

        let mut store = StateStore::cold(Uptime::ZERO);
        assert_eq!(store.state().boot_count, 1);
        store.save(&mut backend, Uptime::from_secs(100)).expect("save");

        let restored = StateStore::load(&mut backend, Uptime::ZERO).expect("restore");
        assert_eq!(restored.boot_kind(), BootKind::Warm);
        assert_eq!(restored.state().boot_count, 2);
        assert_eq!(restored.state().total_uptime_sec, 100);
        assert_eq!(restored.total_uptime_sec(Uptime::from_secs(20)), 120);
    }

    #[test]
    fn prepare_for_sleep_is_idempotent() {
        let mut store = StateStore::cold(Uptime::ZERO);
        store.prepare_for_sleep(Uptime::from_secs(50));
        store.prepare_for_sleep(Uptime::from_secs(50));
        assert_eq!(store.state().total_uptime_sec, 50);
        assert_eq!(store.state().uptime_at_sleep, Uptime::from_secs(50));
    }

    #[test]
    fn fix_age_ignores_previous_sessions() {
        let mut backend = MemoryBackend { frame: None };
        let mut store = StateStore::cold(Uptime::ZERO);
        store.state_mut().last_gps_fix = Some(Uptime::from_secs(30));
        assert_eq!(
            store.last_fix_age(Uptime::from_secs(45)),
            Some(Duration::from_secs(15))
        );
        store.save(&mut backend, Uptime::from_secs(60)).expect("save");

        let restored = StateStore::load(&mut backend, Uptime::from_secs(5)).expect("restore");
        assert_eq!(restored.last_fix_age(Uptime::from_secs(40)), None);
    }

    #[test]
    fn motion_flag_is_taken_once() {
        let mut state = PersistentState::cold();
        state.motion_pending = true;
        assert!(state.take_motion());
        assert!(!state.take_motion());
    }
}
