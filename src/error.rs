//! Error types for stepper-planner.
//!
//! Only configuration faults, unreachable targets and pin failures are
//! errors. Short segments, a full queue and lost recalculation races are
//! ordinary planner outcomes and never surface here.

use core::fmt;

use crate::config::units::Axis;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-planner operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Move admission or settings update error
    Planner(PlannerError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Steps per millimeter must be finite and > 0
    InvalidStepsPerMm {
        /// Offending axis
        axis: Axis,
        /// Configured value
        value: f32,
    },
    /// Max feedrate must be finite and > 0
    InvalidMaxFeedrate {
        /// Offending axis
        axis: Axis,
        /// Configured value
        value: f32,
    },
    /// Max acceleration must be finite and > 0
    InvalidMaxAcceleration {
        /// Offending axis
        axis: Axis,
        /// Configured value
        value: f32,
    },
    /// Jerk must be finite and >= 0
    InvalidJerk {
        /// Offending axis
        axis: Axis,
        /// Configured value
        value: f32,
    },
    /// Default printing/travel/retract acceleration must be finite and > 0
    InvalidAcceleration(f32),
    /// Junction deviation must be finite and > 0
    InvalidJunctionDeviation(f32),
    /// Minimum segment step floor must be >= 1
    InvalidMinSegmentSteps(u32),
    /// Step timer frequency must be > 0
    InvalidStepTimerFrequency(u32),
    /// Maximum single extrusion length must be > 0
    InvalidExtrudeLength(f32),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Move admission and runtime settings errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerError {
    /// Target coordinate is NaN or infinite
    NonFiniteTarget {
        /// Offending axis
        axis: Axis,
    },
    /// Target does not fit in the step counter range
    StepOverflow {
        /// Offending axis
        axis: Axis,
    },
    /// Per-axis limit update rejected
    InvalidAxisValue {
        /// Offending axis
        axis: Axis,
        /// Requested value
        value: f32,
    },
    /// A STEP or DIR pin refused a level change
    PinError {
        /// Axis the pin belongs to
        axis: Axis,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Planner(e) => write!(f, "Planner error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidStepsPerMm { axis, value } => {
                write!(f, "Invalid steps/mm on {}: {}. Must be > 0", axis, value)
            }
            ConfigError::InvalidMaxFeedrate { axis, value } => {
                write!(f, "Invalid max feedrate on {}: {}. Must be > 0", axis, value)
            }
            ConfigError::InvalidMaxAcceleration { axis, value } => {
                write!(f, "Invalid max acceleration on {}: {}. Must be > 0", axis, value)
            }
            ConfigError::InvalidJerk { axis, value } => {
                write!(f, "Invalid jerk on {}: {}. Must be >= 0", axis, value)
            }
            ConfigError::InvalidAcceleration(v) => write!(f, "Invalid acceleration: {}. Must be > 0", v),
            ConfigError::InvalidJunctionDeviation(v) => {
                write!(f, "Invalid junction deviation: {}. Must be > 0", v)
            }
            ConfigError::InvalidMinSegmentSteps(v) => {
                write!(f, "Invalid minimum segment steps: {}. Must be >= 1", v)
            }
            ConfigError::InvalidStepTimerFrequency(v) => {
                write!(f, "Invalid step timer frequency: {}. Must be > 0", v)
            }
            ConfigError::InvalidExtrudeLength(v) => {
                write!(f, "Invalid max extrusion length: {}. Must be > 0", v)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerError::NonFiniteTarget { axis } => write!(f, "Target on {} is not finite", axis),
            PlannerError::StepOverflow { axis } => {
                write!(f, "Target on {} exceeds the step counter range", axis)
            }
            PlannerError::InvalidAxisValue { axis, value } => {
                write!(f, "Rejected value {} for {}", value, axis)
            }
            PlannerError::PinError { axis } => write!(f, "Pin error on {}", axis),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<PlannerError> for Error {
    fn from(e: PlannerError) -> Self {
        Error::Planner(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for PlannerError {}
