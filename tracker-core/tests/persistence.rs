use core::time::Duration;

use tracker_core::alerts::AlertKind;
use tracker_core::config::OperatingMode;
use tracker_core::drivers::{DriverError, PersistenceBackend};
use tracker_core::mode::Lock;
use tracker_core::state::{BootKind, PersistentState, StateError, StateFrame, StateStore};
use tracker_core::time::Uptime;

#[derive(Default)]
struct Retained {
    frame: Option<StateFrame>,
}

impl PersistenceBackend for Retained {
    fn save(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        self.frame = Some(StateFrame::from_slice(bytes).map_err(|_| DriverError::Rejected)?);
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        let Some(frame) = &self.frame else {
            return Ok(None);
        };
        buf[..frame.len()].copy_from_slice(frame);
        Ok(Some(frame.len()))
    }
}

fn secs(s: u64) -> Uptime {
    Uptime::from_secs(s)
}

#[test]
fn first_boot_has_nothing_to_restore() {
    let mut backend = Retained::default();
    assert_eq!(
        StateStore::load(&mut backend, Uptime::ZERO).err(),
        Some(StateError::Missing)
    );

    let store = StateStore::cold(Uptime::ZERO);
    assert_eq!(store.boot_kind(), BootKind::Cold);
    assert_eq!(store.state().boot_count, 1);
    assert_eq!(store.state().mode, OperatingMode::Demo);
}

#[test]
fn sleep_cycles_carry_locks_alerts_and_uptime() {
    let mut backend = Retained::default();
    let mut store = StateStore::cold(Uptime::ZERO);
    {
        let state = store.state_mut();
        state.mode = OperatingMode::Storage;
        state.mode_controller().toggle(Lock::Transit);
        state.alerts.insert(AlertKind::HumidityHigh);
        state.last_pressure_hpa = Some(1_002.5);
        state.motion_pending = true;
    }
    store.save(&mut backend, secs(90)).expect("first sleep");

    let mut store = StateStore::load(&mut backend, Uptime::ZERO).expect("first wake");
    assert_eq!(store.boot_kind(), BootKind::Warm);
    assert_eq!(store.state().boot_count, 2);
    assert_eq!(store.state().mode, OperatingMode::Transit);
    assert!(store.state().locks.is_transit_locked());
    assert_eq!(
        store.state().locks.restore_mode(Lock::Transit),
        Some(OperatingMode::Storage)
    );
    assert!(store.state().alerts.contains(AlertKind::HumidityHigh));
    assert_eq!(store.state().last_pressure_hpa, Some(1_002.5));
    assert!(store.state_mut().take_motion());
    assert!(!store.state().motion_pending);

    store.save(&mut backend, secs(30)).expect("second sleep");
    let store = StateStore::load(&mut backend, Uptime::ZERO).expect("second wake");
    assert_eq!(store.state().boot_count, 3);
    assert_eq!(store.total_uptime_sec(secs(5)), 125);
    assert_eq!(store.session_uptime(secs(5)), Duration::from_secs(5));
}

#[test]
fn every_single_bit_flip_is_rejected() {
    let mut state = PersistentState::cold();
    state.mode = OperatingMode::Transit;
    state.total_uptime_sec = 86_400;
    let frame = state.encode().expect("frame fits");

    for bit in 0..frame.len() * 8 {
        let mut corrupted = frame.clone();
        corrupted[bit / 8] ^= 1 << (bit % 8);
        assert!(
            PersistentState::decode(&corrupted).is_err(),
            "flipping bit {bit} went unnoticed"
        );
    }
    assert_eq!(PersistentState::decode(&frame), Ok(state));
}

#[test]
fn truncated_frames_fall_back_to_cold_boot() {
    let frame = PersistentState::cold().encode().expect("frame fits");
    let mut backend = Retained {
        frame: Some(StateFrame::from_slice(&frame[..3]).expect("short")),
    };
    let error = StateStore::load(&mut backend, Uptime::ZERO).err();
    assert_eq!(error, Some(StateError::TooShort { len: 3 }));

    let store = StateStore::cold(Uptime::ZERO);
    assert_eq!(store.state().boot_count, 1);
    assert!(!store.state().locks.is_locked());
}

#[test]
fn wake_forgets_timestamps_from_the_previous_session() {
    let mut backend = Retained::default();
    let mut store = StateStore::cold(Uptime::ZERO);
    store.state_mut().last_gps_fix = Some(secs(30));
    store.state_mut().last_sync = Some(secs(40));
    store.save(&mut backend, secs(60)).expect("sleep");

    let store = StateStore::load(&mut backend, secs(5)).expect("wake");
    assert_eq!(store.last_fix_age(secs(40)), None);
    assert_eq!(store.state().last_sync, None);
}
