//! Per-axis scaling constants derived from the working limit table.

use super::limits::PlannerSettings;
use super::units::{Axis, AxisArray, Millimeters, Steps};
use crate::error::PlannerError;

/// Derived conversion constants.
///
/// Recomputed whenever the working table changes and used for every
/// admitted move.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisScaling {
    /// Steps per millimeter.
    pub steps_per_mm: AxisArray<f32>,

    /// Millimeters per step (reciprocal of `steps_per_mm`).
    pub mm_per_step: AxisArray<f32>,

    /// Maximum acceleration in steps per second squared.
    pub max_acceleration_steps_per_s2: AxisArray<f32>,
}

impl AxisScaling {
    /// Compute scaling constants from a settings table.
    ///
    /// The table must have passed validation (all steps/mm > 0).
    pub fn from_settings(settings: &PlannerSettings) -> Self {
        let steps_per_mm = settings.axis_steps_per_mm;
        let mm_per_step = steps_per_mm.map(|_, s| 1.0 / s);
        let max_acceleration_steps_per_s2 = settings
            .max_acceleration_mm_s2
            .map(|axis, a| a * steps_per_mm[axis]);

        Self {
            steps_per_mm,
            mm_per_step,
            max_acceleration_steps_per_s2,
        }
    }

    /// Convert a millimeter position to the nearest step.
    pub fn mm_to_steps(&self, axis: Axis, mm: f32) -> Result<Steps, PlannerError> {
        if !mm.is_finite() {
            return Err(PlannerError::NonFiniteTarget { axis });
        }
        Steps::from_mm(Millimeters(mm), self.steps_per_mm[axis])
            .ok_or(PlannerError::StepOverflow { axis })
    }

    /// Convert a step position to millimeters.
    #[inline]
    pub fn steps_to_mm(&self, axis: Axis, steps: Steps) -> Millimeters {
        steps.to_mm(self.mm_per_step[axis])
    }

    /// Convert a full millimeter position to steps.
    pub fn position_to_steps(&self, mm: &AxisArray<f32>) -> Result<AxisArray<i32>, PlannerError> {
        let mut steps = AxisArray::splat(0);
        for axis in Axis::ALL {
            steps[axis] = self.mm_to_steps(axis, mm[axis])?.value();
        }
        Ok(steps)
    }

    /// Convert a full step position to millimeters.
    pub fn position_to_mm(&self, steps: &AxisArray<i32>) -> AxisArray<f32> {
        steps.map(|axis, s| self.steps_to_mm(axis, Steps(s)).value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_acceleration_in_steps() {
        let scaling = AxisScaling::from_settings(&PlannerSettings::default());

        // 4000 mm/s² * 100 steps/mm
        assert!((scaling.max_acceleration_steps_per_s2[Axis::X] - 400_000.0).abs() < 1.0);
        // 200 mm/s² * 400 steps/mm
        assert!((scaling.max_acceleration_steps_per_s2[Axis::Z] - 80_000.0).abs() < 1.0);
    }

    #[test]
    fn test_round_trip_position() {
        let scaling = AxisScaling::from_settings(&PlannerSettings::default());
        let mm = AxisArray::new(10.05, -3.2, 0.25, 1.0);

        let steps = scaling.position_to_steps(&mm).unwrap();
        assert_eq!(steps, AxisArray::new(1005, -320, 100, 325));

        let back = scaling.position_to_mm(&steps);
        for axis in Axis::ALL {
            assert!((back[axis] - mm[axis]).abs() < 0.005);
        }
    }

    #[test]
    fn test_non_finite_target_rejected() {
        let scaling = AxisScaling::from_settings(&PlannerSettings::default());
        assert_eq!(
            scaling.mm_to_steps(Axis::Y, f32::INFINITY),
            Err(PlannerError::NonFiniteTarget { axis: Axis::Y })
        );
    }
}
