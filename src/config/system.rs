//! Planner configuration - root configuration structure.

use heapless::String;
use serde::Deserialize;

use super::axis::AxisConfig;
use super::limits::{PlannerSettings, StealthLimits, UserSettings};
use super::units::{AxisArray, MmPerSec, MmPerSecSquared};

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Machine name, used in log output.
    #[serde(default = "default_name")]
    pub name: String<32>,

    /// Calibration and limits for `x`, `y`, `z` and `e`.
    pub axes: AxisArray<AxisConfig>,

    /// Default accelerations, feedrate floors and segment handling.
    #[serde(default)]
    pub motion: MotionConfig,

    /// Cornering model.
    #[serde(default)]
    pub junction: JunctionConfig,

    /// Caps applied in reduced-noise mode.
    #[serde(default)]
    pub stealth: StealthLimits,

    /// Extrusion guards.
    #[serde(default)]
    pub extrusion: ExtrusionConfig,
}

fn default_name() -> String<32> {
    String::try_from("printer").unwrap_or_default()
}

/// Default accelerations and segment handling.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MotionConfig {
    /// Acceleration for extruding moves.
    #[serde(default = "default_acceleration", rename = "acceleration_mm_s2")]
    pub acceleration: MmPerSecSquared,

    /// Acceleration for extruder-only moves.
    #[serde(default = "default_acceleration", rename = "retract_acceleration_mm_s2")]
    pub retract_acceleration: MmPerSecSquared,

    /// Acceleration for non-extruding moves.
    #[serde(default = "default_acceleration", rename = "travel_acceleration_mm_s2")]
    pub travel_acceleration: MmPerSecSquared,

    /// Feedrate floor for extruding moves.
    #[serde(default, rename = "min_feedrate_mm_s")]
    pub min_feedrate: MmPerSec,

    /// Feedrate floor for travel moves.
    #[serde(default, rename = "min_travel_feedrate_mm_s")]
    pub min_travel_feedrate: MmPerSec,

    /// Minimum duration of an extruding segment while the queue runs low.
    #[serde(default = "default_min_segment_time_us")]
    pub min_segment_time_us: u32,

    /// Moves with fewer step events are folded into the next one.
    #[serde(default = "default_min_segment_steps")]
    pub min_segment_steps: u32,

    /// Speed the planner assumes at the start and end of the queue.
    #[serde(default = "default_minimum_planner_speed", rename = "minimum_planner_speed_mm_s")]
    pub minimum_planner_speed: MmPerSec,

    /// Frequency of the step generator's timer in Hz.
    #[serde(default = "default_step_timer_hz")]
    pub step_timer_hz: u32,
}

fn default_acceleration() -> MmPerSecSquared {
    MmPerSecSquared(1250.0)
}

fn default_min_segment_time_us() -> u32 {
    20_000
}

fn default_min_segment_steps() -> u32 {
    6
}

fn default_minimum_planner_speed() -> MmPerSec {
    MmPerSec(0.05)
}

fn default_step_timer_hz() -> u32 {
    1_000_000
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            acceleration: default_acceleration(),
            retract_acceleration: default_acceleration(),
            travel_acceleration: default_acceleration(),
            min_feedrate: MmPerSec(0.0),
            min_travel_feedrate: MmPerSec(0.0),
            min_segment_time_us: default_min_segment_time_us(),
            min_segment_steps: default_min_segment_steps(),
            minimum_planner_speed: default_minimum_planner_speed(),
            step_timer_hz: default_step_timer_hz(),
        }
    }
}

/// Which cornering model limits the speed at the junction of two moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum JunctionStrategy {
    /// Per-axis instantaneous speed change limit.
    #[default]
    ClassicJerk,
    /// Centripetal model bounded by a deviation distance.
    JunctionDeviation,
}

/// Cornering model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct JunctionConfig {
    /// Selected model.
    #[serde(default)]
    pub strategy: JunctionStrategy,

    /// Deviation distance for [`JunctionStrategy::JunctionDeviation`].
    #[serde(default = "default_deviation_mm")]
    pub deviation_mm: f32,
}

fn default_deviation_mm() -> f32 {
    0.013
}

impl Default for JunctionConfig {
    fn default() -> Self {
        Self {
            strategy: JunctionStrategy::default(),
            deviation_mm: default_deviation_mm(),
        }
    }
}

/// Extrusion guards.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ExtrusionConfig {
    /// Longest single extrusion accepted; longer E moves are dropped.
    #[serde(default = "default_max_length_mm")]
    pub max_length_mm: f32,

    /// Accept E moves while the hotend reports it is too cold.
    #[serde(default)]
    pub allow_cold_extrusion: bool,
}

fn default_max_length_mm() -> f32 {
    200.0
}

impl Default for ExtrusionConfig {
    fn default() -> Self {
        Self {
            max_length_mm: default_max_length_mm(),
            allow_cold_extrusion: false,
        }
    }
}

impl PlannerConfig {
    /// Build the user limit table described by this configuration.
    pub fn user_settings(&self) -> UserSettings {
        UserSettings(PlannerSettings {
            axis_steps_per_mm: self.axes.map(|_, a| a.steps_per_mm),
            max_feedrate_mm_s: self.axes.map(|_, a| a.max_feedrate.value()),
            max_acceleration_mm_s2: self.axes.map(|_, a| a.max_acceleration.value()),
            max_jerk_mm_s: self.axes.map(|_, a| a.max_jerk.value()),
            acceleration: self.motion.acceleration.value(),
            retract_acceleration: self.motion.retract_acceleration.value(),
            travel_acceleration: self.motion.travel_acceleration.value(),
            min_feedrate_mm_s: self.motion.min_feedrate.value(),
            min_travel_feedrate_mm_s: self.motion.min_travel_feedrate.value(),
            min_segment_time_us: self.motion.min_segment_time_us,
            junction_deviation_mm: self.junction.deviation_mm,
        })
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let d = PlannerSettings::default();
        let axes = d.axis_steps_per_mm.map(|axis, steps_per_mm| {
            AxisConfig::new(
                steps_per_mm,
                MmPerSec(d.max_feedrate_mm_s[axis]),
                MmPerSecSquared(d.max_acceleration_mm_s2[axis]),
                MmPerSec(d.max_jerk_mm_s[axis]),
            )
        });
        Self {
            name: default_name(),
            axes,
            motion: MotionConfig::default(),
            junction: JunctionConfig::default(),
            stealth: StealthLimits::default(),
            extrusion: ExtrusionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_default_settings() {
        let config = PlannerConfig::default();
        assert_eq!(*config.user_settings().settings(), PlannerSettings::default());
    }

    #[test]
    fn test_motion_defaults() {
        let motion = MotionConfig::default();
        assert_eq!(motion.min_segment_steps, 6);
        assert_eq!(motion.step_timer_hz, 1_000_000);
        assert!((motion.minimum_planner_speed.value() - 0.05).abs() < 1e-6);
    }
}
