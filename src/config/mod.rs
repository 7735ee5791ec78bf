//! Configuration module for stepper-planner.
//!
//! Provides the machine calibration, the user and working limit tables and
//! the TOML loader (with `std` feature).

mod axis;
mod limits;
mod scaling;
mod system;
pub mod units;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use axis::AxisConfig;
pub use limits::{MotionParameters, PlannerSettings, StealthLimits, UserSettings};
pub use scaling::AxisScaling;
pub use system::{ExtrusionConfig, JunctionConfig, JunctionStrategy, MotionConfig, PlannerConfig};
pub use validation::{validate_config, validate_settings};

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Axis, AxisArray, Millimeters, MmPerSec, MmPerSecSquared, Steps, AXIS_COUNT};
