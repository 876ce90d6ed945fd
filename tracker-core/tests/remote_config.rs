use core::time::Duration;

use tracker_core::config::{
    ConfigError, ConfigField, Configuration, MotionSensitivity, OperatingMode,
};

#[test]
fn remote_values_are_clamped_into_range() {
    let mut config = Configuration::new();

    assert_eq!(config.apply_remote("gps_interval_min", "0"), Ok(true));
    assert_eq!(config.gps_interval_min, 1);
    assert_eq!(config.apply_remote("audio_volume", "250"), Ok(true));
    assert_eq!(config.audio.volume, 100);
    assert_eq!(config.apply_remote("locate_duration_sec", "2"), Ok(true));
    assert_eq!(config.locate_duration_sec, 5);
    assert_eq!(config.apply_remote("voltage_alert_low", "9.5"), Ok(true));
    assert!((config.thresholds.voltage_low_v - 4.2).abs() < f32::EPSILON);
}

#[test]
fn remote_values_fall_back_or_fail_cleanly() {
    let mut config = Configuration::new();

    assert_eq!(config.apply_remote("mode", "warp"), Ok(false), "unknown modes fall back to demo");
    assert_eq!(config.mode, OperatingMode::Demo);
    assert_eq!(config.apply_remote("motion_sensitivity", "HIGH"), Ok(true));
    assert_eq!(config.motion_sensitivity, MotionSensitivity::High);
    assert_eq!(config.apply_remote("debug_mode", "1"), Ok(true));
    assert!(config.debug_mode);

    assert_eq!(
        config.apply_remote("gps_interval_min", "often"),
        Err(ConfigError::InvalidValue)
    );
    assert_eq!(
        config.apply_remote("colour", "blue"),
        Err(ConfigError::UnknownKey)
    );
}

#[test]
fn rewriting_the_same_value_is_not_a_change() {
    let mut config = Configuration::new();
    assert_eq!(config.apply_remote("audio_volume", "80"), Ok(false));

    let before = config;
    assert_eq!(config.apply_remote("temp_alert_high_c", "30"), Ok(true));
    assert_eq!(config.apply_remote("mode", "transit"), Ok(true));
    let changes = before.changes(&config);
    assert_eq!(changes.as_slice(), &[ConfigField::Mode, ConfigField::TempHigh]);
    assert!(config.changes(&config).is_empty());
}

#[test]
fn every_field_round_trips_through_its_key() {
    for field in ConfigField::ALL {
        assert_eq!(ConfigField::from_key(field.key()), Some(field));
    }
}

#[test]
fn sleep_plans_follow_the_mode() {
    let mut config = Configuration::new();
    assert_eq!(config.sleep_plan(), None, "demo never sleeps");

    config.mode = OperatingMode::Storage;
    config.gps_interval_min = 240;
    let plan = config.sleep_plan().expect("storage sleeps");
    assert_eq!(plan.duration, Some(Duration::from_secs(240 * 60)));
    assert!(plan.wake_on_command);

    config.mode = OperatingMode::Sleep;
    config.motion_wake_enabled = false;
    let plan = config.sanitized().sleep_plan().expect("sleep mode sleeps");
    assert_eq!(plan.duration, None);
    assert!(plan.wake_on_motion, "sleep mode always wakes on motion");
}
