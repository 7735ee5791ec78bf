//! Unit tests for configuration validation.

use stepper_planner::config::units::Axis;
use stepper_planner::config::{validate_config, validate_settings, PlannerConfig, PlannerSettings};
use stepper_planner::error::{ConfigError, Error};

/// The default configuration is valid.
#[test]
fn test_default_config_passes_validation() {
    assert!(validate_config(&PlannerConfig::default()).is_ok());
}

/// Zero steps per mm would divide by zero everywhere.
#[test]
fn test_zero_steps_per_mm() {
    let mut config = PlannerConfig::default();
    config.axes[Axis::Y].steps_per_mm = 0.0;

    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidStepsPerMm { axis: Axis::Y, .. }))
    ));
}

/// Non-finite limits are rejected.
#[test]
fn test_non_finite_feedrate() {
    let mut settings = PlannerSettings::default();
    settings.max_feedrate_mm_s[Axis::X] = f32::INFINITY;

    assert!(matches!(
        validate_settings(&settings),
        Err(Error::Config(ConfigError::InvalidMaxFeedrate { axis: Axis::X, .. }))
    ));
}

/// Negative acceleration ceiling.
#[test]
fn test_negative_max_acceleration() {
    let mut settings = PlannerSettings::default();
    settings.max_acceleration_mm_s2[Axis::E] = -1.0;

    assert!(matches!(
        validate_settings(&settings),
        Err(Error::Config(ConfigError::InvalidMaxAcceleration { axis: Axis::E, .. }))
    ));
}

/// Zero jerk is allowed; negative jerk is not.
#[test]
fn test_jerk_bounds() {
    let mut settings = PlannerSettings::default();
    settings.max_jerk_mm_s[Axis::Z] = 0.0;
    assert!(validate_settings(&settings).is_ok());

    settings.max_jerk_mm_s[Axis::Z] = -0.1;
    assert!(matches!(
        validate_settings(&settings),
        Err(Error::Config(ConfigError::InvalidJerk { axis: Axis::Z, .. }))
    ));
}

/// Default accelerations must be positive.
#[test]
fn test_zero_travel_acceleration() {
    let mut settings = PlannerSettings::default();
    settings.travel_acceleration = 0.0;

    assert!(matches!(
        validate_settings(&settings),
        Err(Error::Config(ConfigError::InvalidAcceleration(_)))
    ));
}

/// Junction deviation must be positive.
#[test]
fn test_zero_junction_deviation() {
    let mut config = PlannerConfig::default();
    config.junction.deviation_mm = 0.0;

    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidJunctionDeviation(_)))
    ));
}

/// Structural checks beyond the limit table.
#[test]
fn test_structural_checks() {
    let mut config = PlannerConfig::default();
    config.motion.min_segment_steps = 0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidMinSegmentSteps(0)))
    ));

    let mut config = PlannerConfig::default();
    config.motion.step_timer_hz = 0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidStepTimerFrequency(0)))
    ));

    let mut config = PlannerConfig::default();
    config.extrusion.max_length_mm = f32::NAN;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidExtrudeLength(_)))
    ));
}
