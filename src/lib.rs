//! # stepper-planner
//!
//! Lookahead motion planner for stepper-driven 3D printers, with a lock-free
//! block queue shared with a timer-driven step generator.
//!
//! ## Features
//!
//! - **Lock-free block queue**: one producer (the planner) and one consumer
//!   (the step interrupt), single writer per field, no `unsafe`
//! - **Lookahead**: reverse and forward passes over every queued move, so
//!   chains of short segments run at speed
//! - **Trapezoid generation**: integer rate profiles the step generator can
//!   execute without floating point
//! - **Junction strategies**: classic per-axis jerk or junction deviation,
//!   selectable at runtime
//! - **Quick stop**: abort from any context, resume with a resynchronised
//!   position
//! - **no_std compatible**: the queue can live in a `static`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_planner::{AxisArray, BlockQueue, ExtruderState, MmPerSec, MoveHints, Planner, StepGenerator};
//!
//! let config = stepper_planner::load_config("printer.toml")?;
//!
//! let mut queue: BlockQueue<16> = BlockQueue::new();
//! let (producer, mut consumer) = queue.split();
//! let mut planner = Planner::new(producer, &config, || {})?;
//!
//! // Planner side
//! let target = AxisArray::new(10.0, 20.0, 0.2, 1.5);
//! planner.append_linear_move(&target, MmPerSec(40.0), &ExtruderState::default(), MoveHints::new())?;
//!
//! // Step timer side
//! let mut stepper = StepGenerator::new(config.motion.step_timer_hz);
//! let event = stepper.tick(&mut consumer);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O and TOML parsing
//! - `alloc`: Enables heap allocation for no_std with allocator
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Must come first so the logging macros are visible everywhere
#[macro_use]
mod fmt;

// Core modules
pub mod config;
pub mod error;
pub mod motion;
pub mod planner;
pub mod queue;
pub mod stepper;

// Re-exports for ergonomic API
pub use config::{
    validate_config, JunctionStrategy, MotionParameters, PlannerConfig, PlannerSettings, StealthLimits,
    UserSettings,
};
pub use error::{Error, Result};
pub use motion::{Direction, MotionPhase, StepPulse, Trapezoid};
pub use planner::{DelayIdle, ExtruderState, Idle, MoveHints, Placement, Planner, QueueState};
pub use queue::{BlockAction, BlockQueue, Consumer, Producer, QuickStop};
pub use stepper::{StepEvent, StepGenerator};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{Axis, AxisArray, Millimeters, MmPerSec, MmPerSecSquared, Steps};
