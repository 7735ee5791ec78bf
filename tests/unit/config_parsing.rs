//! Unit tests for TOML configuration parsing.

use stepper_planner::config::units::Axis;
use stepper_planner::config::{parse_config, JunctionStrategy, PlannerConfig};

const AXES: &str = r#"
[axes.x]
steps_per_mm = 80.0
max_feedrate_mm_s = 500.0
max_acceleration_mm_s2 = 3000.0

[axes.y]
steps_per_mm = 80.0
max_feedrate_mm_s = 500.0
max_acceleration_mm_s2 = 3000.0

[axes.z]
steps_per_mm = 400.0
max_feedrate_mm_s = 5.0
max_acceleration_mm_s2 = 100.0
max_jerk_mm_s = 0.4

[axes.e]
steps_per_mm = 93.0
max_feedrate_mm_s = 25.0
max_acceleration_mm_s2 = 10000.0
max_jerk_mm_s = 5.0
"#;

/// Axis tables land on the matching axis.
#[test]
fn test_parse_axes() {
    let config: PlannerConfig = toml::from_str(AXES).expect("Failed to parse TOML");

    assert_eq!(config.axes[Axis::X].steps_per_mm, 80.0);
    assert_eq!(config.axes[Axis::Z].max_feedrate.0, 5.0);
    assert_eq!(config.axes[Axis::Z].max_jerk.0, 0.4);
    assert_eq!(config.axes[Axis::E].max_acceleration.0, 10000.0);
    // Jerk defaults when omitted.
    assert_eq!(config.axes[Axis::Y].max_jerk.0, 8.0);
}

/// Every optional section falls back to its defaults.
#[test]
fn test_sections_default() {
    let config = parse_config(AXES).expect("Failed to parse config");

    assert_eq!(config.name.as_str(), "printer");
    assert_eq!(config.motion.min_segment_steps, 6);
    assert_eq!(config.motion.step_timer_hz, 1_000_000);
    assert_eq!(config.junction.strategy, JunctionStrategy::ClassicJerk);
    assert_eq!(config.extrusion.max_length_mm, 200.0);
    assert!(!config.extrusion.allow_cold_extrusion);
    assert_eq!(config.stealth.max_acceleration_mm_s2, 2500.0);
}

/// Motion, junction, stealth and extrusion sections.
#[test]
fn test_parse_full_config() {
    let toml = format!(
        r#"
name = "core-one"
{AXES}
[motion]
acceleration_mm_s2 = 1500.0
retract_acceleration_mm_s2 = 800.0
travel_acceleration_mm_s2 = 2000.0
min_feedrate_mm_s = 0.5
min_travel_feedrate_mm_s = 1.0
min_segment_time_us = 15000
min_segment_steps = 4
minimum_planner_speed_mm_s = 0.1
step_timer_hz = 2000000

[junction]
strategy = "junction_deviation"
deviation_mm = 0.02

[stealth]
max_feedrate_mm_s = {{ x = 100.0, y = 100.0, z = 5.0, e = 20.0 }}
max_acceleration_mm_s2 = 1200.0
max_jerk_mm_s = 6.0

[extrusion]
max_length_mm = 120.0
allow_cold_extrusion = true
"#
    );

    let config = parse_config(&toml).expect("Failed to parse config");

    assert_eq!(config.name.as_str(), "core-one");
    assert_eq!(config.motion.acceleration.0, 1500.0);
    assert_eq!(config.motion.retract_acceleration.0, 800.0);
    assert_eq!(config.motion.travel_acceleration.0, 2000.0);
    assert_eq!(config.motion.min_feedrate.0, 0.5);
    assert_eq!(config.motion.min_travel_feedrate.0, 1.0);
    assert_eq!(config.motion.min_segment_time_us, 15_000);
    assert_eq!(config.motion.min_segment_steps, 4);
    assert_eq!(config.motion.step_timer_hz, 2_000_000);
    assert_eq!(config.junction.strategy, JunctionStrategy::JunctionDeviation);
    assert_eq!(config.stealth.max_feedrate_mm_s[Axis::Z], 5.0);
    assert_eq!(config.stealth.max_jerk_mm_s, 6.0);
    assert_eq!(config.extrusion.max_length_mm, 120.0);
    assert!(config.extrusion.allow_cold_extrusion);
}

/// The configuration produces the user limit table.
#[test]
fn test_user_settings_from_config() {
    let config = parse_config(AXES).expect("Failed to parse config");
    let user = config.user_settings();
    let settings = user.settings();

    assert_eq!(settings.axis_steps_per_mm[Axis::E], 93.0);
    assert_eq!(settings.max_feedrate_mm_s[Axis::X], 500.0);
    assert_eq!(settings.max_jerk_mm_s[Axis::Z], 0.4);
    assert_eq!(settings.acceleration, 1250.0);
    assert!((settings.junction_deviation_mm - 0.013).abs() < 1e-6);
}

/// An unknown junction strategy is a parse error.
#[test]
fn test_unknown_strategy_rejected() {
    let toml = format!("{AXES}\n[junction]\nstrategy = \"s_curve\"\n");
    assert!(parse_config(&toml).is_err());
}

/// Loading a file that does not exist reports an I/O error.
#[test]
fn test_load_missing_file() {
    use stepper_planner::config::load_config;
    use stepper_planner::error::{ConfigError, Error};

    let result = load_config("/nonexistent/printer.toml");
    assert!(matches!(result, Err(Error::Config(ConfigError::IoError(_)))));
}
