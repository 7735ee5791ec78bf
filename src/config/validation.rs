//! Configuration validation.

use crate::error::{ConfigError, Error, Result};

use super::limits::PlannerSettings;
use super::units::Axis;
use super::PlannerConfig;

/// Validate a planner configuration.
///
/// Checks:
/// - Every axis has positive, finite calibration and limits
/// - Default accelerations are positive
/// - Junction deviation is positive
/// - Segment floor, timer frequency and extrusion guard are usable
pub fn validate_config(config: &PlannerConfig) -> Result<()> {
    validate_settings(config.user_settings().settings())?;

    if config.motion.min_segment_steps == 0 {
        return Err(Error::Config(ConfigError::InvalidMinSegmentSteps(
            config.motion.min_segment_steps,
        )));
    }

    if config.motion.step_timer_hz == 0 {
        return Err(Error::Config(ConfigError::InvalidStepTimerFrequency(
            config.motion.step_timer_hz,
        )));
    }

    let max_length = config.extrusion.max_length_mm;
    if !(max_length.is_finite() && max_length > 0.0) {
        return Err(Error::Config(ConfigError::InvalidExtrudeLength(max_length)));
    }

    Ok(())
}

/// Validate a limit table before it may become the working table.
///
/// A zero or negative steps/mm would make every conversion divide by zero,
/// so it is a fatal configuration fault rather than something to clamp.
pub fn validate_settings(settings: &PlannerSettings) -> Result<()> {
    for axis in Axis::ALL {
        let steps_per_mm = settings.axis_steps_per_mm[axis];
        if !is_positive(steps_per_mm) {
            return Err(Error::Config(ConfigError::InvalidStepsPerMm {
                axis,
                value: steps_per_mm,
            }));
        }

        let feedrate = settings.max_feedrate_mm_s[axis];
        if !is_positive(feedrate) {
            return Err(Error::Config(ConfigError::InvalidMaxFeedrate {
                axis,
                value: feedrate,
            }));
        }

        let acceleration = settings.max_acceleration_mm_s2[axis];
        if !is_positive(acceleration) {
            return Err(Error::Config(ConfigError::InvalidMaxAcceleration {
                axis,
                value: acceleration,
            }));
        }

        let jerk = settings.max_jerk_mm_s[axis];
        if !(jerk.is_finite() && jerk >= 0.0) {
            return Err(Error::Config(ConfigError::InvalidJerk { axis, value: jerk }));
        }
    }

    for acceleration in [
        settings.acceleration,
        settings.retract_acceleration,
        settings.travel_acceleration,
    ] {
        if !is_positive(acceleration) {
            return Err(Error::Config(ConfigError::InvalidAcceleration(acceleration)));
        }
    }

    if !is_positive(settings.junction_deviation_mm) {
        return Err(Error::Config(ConfigError::InvalidJunctionDeviation(
            settings.junction_deviation_mm,
        )));
    }

    Ok(())
}

#[inline]
fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
