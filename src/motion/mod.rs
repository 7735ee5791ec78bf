//! Motion module for stepper-planner.
//!
//! Junction limits, trapezoid generation and step-by-step block execution.

mod executor;
mod junction;
mod trapezoid;

pub use executor::{BlockExecutor, Direction, MotionPhase, StepPulse};
pub use junction::{ClassicJerk, JunctionDeviation, JunctionLimit, JunctionLimits, JunctionMove, JunctionPlanner};
pub use trapezoid::{
    calculate_trapezoid, estimate_acceleration_distance, final_speed, intersection_distance,
    max_allowable_speed_sqr, Trapezoid, MINIMAL_STEP_RATE,
};
