//! Limit tables: the user-requested table and the working table the
//! planner actually plans with.

use serde::Deserialize;

use super::units::{Axis, AxisArray};

/// Kinematic limits and calibration the planner plans with.
///
/// Feedrates in mm/s, accelerations in mm/s², jerk in mm/s.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlannerSettings {
    /// Calibration ratio per axis.
    pub axis_steps_per_mm: AxisArray<f32>,
    /// Per-axis feedrate ceiling.
    pub max_feedrate_mm_s: AxisArray<f32>,
    /// Per-axis acceleration ceiling.
    pub max_acceleration_mm_s2: AxisArray<f32>,
    /// Per-axis instantaneous speed change allowed by the classic jerk model.
    pub max_jerk_mm_s: AxisArray<f32>,
    /// Acceleration for moves that extrude.
    pub acceleration: f32,
    /// Acceleration for extruder-only moves.
    pub retract_acceleration: f32,
    /// Acceleration for moves that do not extrude.
    pub travel_acceleration: f32,
    /// Feedrate floor for extruding moves.
    pub min_feedrate_mm_s: f32,
    /// Feedrate floor for travel moves.
    pub min_travel_feedrate_mm_s: f32,
    /// Short extruding segments are slowed to last at least this long while
    /// the queue is running low.
    pub min_segment_time_us: u32,
    /// Centripetal deviation used by the junction deviation model.
    pub junction_deviation_mm: f32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            axis_steps_per_mm: AxisArray::new(100.0, 100.0, 400.0, 325.0),
            max_feedrate_mm_s: AxisArray::new(300.0, 300.0, 12.0, 80.0),
            max_acceleration_mm_s2: AxisArray::new(4000.0, 4000.0, 200.0, 2500.0),
            max_jerk_mm_s: AxisArray::new(8.0, 8.0, 2.0, 10.0),
            acceleration: 1250.0,
            retract_acceleration: 1250.0,
            travel_acceleration: 1250.0,
            min_feedrate_mm_s: 0.0,
            min_travel_feedrate_mm_s: 0.0,
            min_segment_time_us: 20_000,
            junction_deviation_mm: 0.013,
        }
    }
}

/// Settings as requested by the user, before any mode-dependent caps.
///
/// Changes should always start from the user table: the working table may
/// be capped and reading it back would make the caps permanent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UserSettings(pub PlannerSettings);

impl UserSettings {
    /// Wrap a settings table.
    pub const fn new(settings: PlannerSettings) -> Self {
        Self(settings)
    }

    /// Borrow the underlying table.
    #[inline]
    pub fn settings(&self) -> &PlannerSettings {
        &self.0
    }

    /// Mutably borrow the underlying table.
    #[inline]
    pub fn settings_mut(&mut self) -> &mut PlannerSettings {
        &mut self.0
    }

    /// Derive the working table, applying `stealth` caps when given.
    pub fn working_table(&self, stealth: Option<&StealthLimits>) -> PlannerSettings {
        let mut working = self.0;
        if let Some(caps) = stealth {
            for axis in Axis::ALL {
                working.max_feedrate_mm_s[axis] =
                    working.max_feedrate_mm_s[axis].min(caps.max_feedrate_mm_s[axis]);
                working.max_acceleration_mm_s2[axis] =
                    working.max_acceleration_mm_s2[axis].min(caps.max_acceleration_mm_s2);
                working.max_jerk_mm_s[axis] = working.max_jerk_mm_s[axis].min(caps.max_jerk_mm_s);
            }
            working.acceleration = working.acceleration.min(caps.max_acceleration_mm_s2);
            working.retract_acceleration =
                working.retract_acceleration.min(caps.max_acceleration_mm_s2);
            working.travel_acceleration =
                working.travel_acceleration.min(caps.max_acceleration_mm_s2);
        }
        working
    }
}

/// Every limit of a settings table except the calibration.
///
/// Take one before temporarily overriding limits (for a calibration move,
/// say) and hand it back to restore them.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionParameters {
    /// Per-axis feedrate ceiling.
    pub max_feedrate_mm_s: AxisArray<f32>,
    /// Per-axis acceleration ceiling.
    pub max_acceleration_mm_s2: AxisArray<f32>,
    /// Per-axis jerk.
    pub max_jerk_mm_s: AxisArray<f32>,
    /// Acceleration for moves that extrude.
    pub acceleration: f32,
    /// Acceleration for extruder-only moves.
    pub retract_acceleration: f32,
    /// Acceleration for moves that do not extrude.
    pub travel_acceleration: f32,
    /// Feedrate floor for extruding moves.
    pub min_feedrate_mm_s: f32,
    /// Feedrate floor for travel moves.
    pub min_travel_feedrate_mm_s: f32,
    /// Minimum extruding segment duration while the queue runs low.
    pub min_segment_time_us: u32,
    /// Junction deviation.
    pub junction_deviation_mm: f32,
}

impl MotionParameters {
    /// Copy the limits out of `settings`.
    pub fn from_settings(settings: &PlannerSettings) -> Self {
        Self {
            max_feedrate_mm_s: settings.max_feedrate_mm_s,
            max_acceleration_mm_s2: settings.max_acceleration_mm_s2,
            max_jerk_mm_s: settings.max_jerk_mm_s,
            acceleration: settings.acceleration,
            retract_acceleration: settings.retract_acceleration,
            travel_acceleration: settings.travel_acceleration,
            min_feedrate_mm_s: settings.min_feedrate_mm_s,
            min_travel_feedrate_mm_s: settings.min_travel_feedrate_mm_s,
            min_segment_time_us: settings.min_segment_time_us,
            junction_deviation_mm: settings.junction_deviation_mm,
        }
    }

    /// Write the limits into `settings`, keeping its calibration.
    pub fn apply_to(&self, settings: &mut PlannerSettings) {
        settings.max_feedrate_mm_s = self.max_feedrate_mm_s;
        settings.max_acceleration_mm_s2 = self.max_acceleration_mm_s2;
        settings.max_jerk_mm_s = self.max_jerk_mm_s;
        settings.acceleration = self.acceleration;
        settings.retract_acceleration = self.retract_acceleration;
        settings.travel_acceleration = self.travel_acceleration;
        settings.min_feedrate_mm_s = self.min_feedrate_mm_s;
        settings.min_travel_feedrate_mm_s = self.min_travel_feedrate_mm_s;
        settings.min_segment_time_us = self.min_segment_time_us;
        settings.junction_deviation_mm = self.junction_deviation_mm;
    }
}

/// Caps applied to the working table while reduced-noise (stealth) mode is on.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StealthLimits {
    /// Per-axis feedrate cap.
    #[serde(default = "default_stealth_feedrate")]
    pub max_feedrate_mm_s: AxisArray<f32>,
    /// Acceleration cap for every axis and every default acceleration.
    #[serde(default = "default_stealth_acceleration")]
    pub max_acceleration_mm_s2: f32,
    /// Jerk cap for every axis.
    #[serde(default = "default_stealth_jerk")]
    pub max_jerk_mm_s: f32,
}

fn default_stealth_feedrate() -> AxisArray<f32> {
    AxisArray::new(140.0, 140.0, 12.0, 100.0)
}

fn default_stealth_acceleration() -> f32 {
    2500.0
}

fn default_stealth_jerk() -> f32 {
    8.0
}

impl Default for StealthLimits {
    fn default() -> Self {
        Self {
            max_feedrate_mm_s: default_stealth_feedrate(),
            max_acceleration_mm_s2: default_stealth_acceleration(),
            max_jerk_mm_s: default_stealth_jerk(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_table_without_stealth_is_user_table() {
        let user = UserSettings::default();
        assert_eq!(user.working_table(None), *user.settings());
    }

    #[test]
    fn test_stealth_caps_only_lower_values() {
        let mut user = UserSettings::default();
        user.settings_mut().max_feedrate_mm_s[Axis::Z] = 5.0;
        user.settings_mut().acceleration = 3000.0;

        let working = user.working_table(Some(&StealthLimits::default()));

        assert_eq!(working.max_feedrate_mm_s[Axis::X], 140.0);
        assert_eq!(working.max_feedrate_mm_s[Axis::Z], 5.0);
        assert_eq!(working.max_acceleration_mm_s2[Axis::X], 2500.0);
        assert_eq!(working.max_acceleration_mm_s2[Axis::Z], 200.0);
        assert_eq!(working.acceleration, 2500.0);
        assert_eq!(working.travel_acceleration, 1250.0);
    }

    #[test]
    fn test_motion_parameters_keep_calibration() {
        let mut settings = PlannerSettings::default();
        let saved = MotionParameters::from_settings(&settings);

        settings.max_feedrate_mm_s[Axis::X] = 10.0;
        settings.axis_steps_per_mm[Axis::X] = 80.0;
        saved.apply_to(&mut settings);

        assert_eq!(settings.max_feedrate_mm_s[Axis::X], 300.0);
        assert_eq!(settings.axis_steps_per_mm[Axis::X], 80.0);
    }

    #[test]
    fn test_stealth_leaves_user_table_untouched() {
        let user = UserSettings::default();
        let _ = user.working_table(Some(&StealthLimits::default()));
        assert_eq!(user.settings().max_feedrate_mm_s[Axis::X], 300.0);
    }
}
