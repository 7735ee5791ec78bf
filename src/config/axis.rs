//! Per-axis configuration from TOML.

use serde::Deserialize;

use super::units::{MmPerSec, MmPerSecSquared};

/// Calibration and limits for a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AxisConfig {
    /// Steps per millimeter of travel (or of filament for the extruder).
    pub steps_per_mm: f32,

    /// Maximum feedrate in millimeters per second.
    #[serde(rename = "max_feedrate_mm_s")]
    pub max_feedrate: MmPerSec,

    /// Maximum acceleration in millimeters per second squared.
    #[serde(rename = "max_acceleration_mm_s2")]
    pub max_acceleration: MmPerSecSquared,

    /// Maximum instantaneous speed change (classic jerk model).
    #[serde(default = "default_jerk", rename = "max_jerk_mm_s")]
    pub max_jerk: MmPerSec,
}

fn default_jerk() -> MmPerSec {
    MmPerSec(8.0)
}

impl AxisConfig {
    /// Create an axis configuration.
    pub const fn new(
        steps_per_mm: f32,
        max_feedrate: MmPerSec,
        max_acceleration: MmPerSecSquared,
        max_jerk: MmPerSec,
    ) -> Self {
        Self {
            steps_per_mm,
            max_feedrate,
            max_acceleration,
            max_jerk,
        }
    }

    /// Millimeters per step.
    pub fn mm_per_step(&self) -> f32 {
        1.0 / self.steps_per_mm
    }
}
