//! Block execution - step pulse generation.
//!
//! Walks one block's trapezoid step by step using only integer math, the
//! way a step timer interrupt would: Bresenham across the axes, rate
//! interpolated from the elapsed time in the current phase.

use crate::config::units::{Axis, AxisArray};
use crate::queue::BlockSnapshot;

use super::trapezoid::{Trapezoid, MINIMAL_STEP_RATE};

/// Direction of one axis in a step pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Towards positive coordinates.
    Positive,
    /// Towards negative coordinates.
    Negative,
}

impl Direction {
    /// Direction of `axis` in a direction bitmask.
    #[inline]
    pub fn from_bits(direction_bits: u8, axis: Axis) -> Self {
        if direction_bits & axis.bit() != 0 {
            Direction::Negative
        } else {
            Direction::Positive
        }
    }

    /// Get the sign multiplier.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }
}

/// Current phase of block execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionPhase {
    /// Rate rising from the initial rate.
    Accelerating,
    /// Rate held at the cruise rate.
    Cruising,
    /// Rate falling towards the final rate.
    Decelerating,
    /// Every step has been issued.
    Complete,
}

/// One step event: which axes pulse, and the wait before the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepPulse {
    /// Axes to pulse, as a mask of [`Axis::bit`].
    pub axes: u8,
    /// Direction bits of the block.
    pub direction_bits: u8,
    /// Step rate this pulse was issued at, in steps/s.
    pub rate: u32,
    /// Timer ticks until the next pulse.
    pub interval_ticks: u32,
}

impl StepPulse {
    /// Whether `axis` pulses.
    #[inline]
    pub fn steps(&self, axis: Axis) -> bool {
        self.axes & axis.bit() != 0
    }

    /// Signed step count per axis (each 0 or ±1).
    pub fn deltas(&self) -> AxisArray<i32> {
        AxisArray::splat(0).map(|axis, _| {
            if self.steps(axis) {
                Direction::from_bits(self.direction_bits, axis).sign()
            } else {
                0
            }
        })
    }
}

/// Runtime state while executing one block.
#[derive(Debug, Clone)]
pub struct BlockExecutor {
    steps: AxisArray<u32>,
    direction_bits: u8,
    step_event_count: u32,
    trapezoid: Trapezoid,
    timer_hz: u32,

    /// Bresenham error terms.
    error: AxisArray<i64>,

    current_step: u32,
    phase: MotionPhase,
    acceleration_elapsed: u32,
    deceleration_elapsed: u32,
}

impl BlockExecutor {
    /// Create an executor for a claimed block.
    pub fn new(block: &BlockSnapshot, timer_hz: u32) -> Self {
        let half = -((block.step_event_count >> 1) as i64);
        let mut executor = Self {
            steps: block.steps,
            direction_bits: block.direction_bits,
            step_event_count: block.step_event_count,
            trapezoid: block.trapezoid,
            timer_hz: timer_hz.max(1),
            error: AxisArray::splat(half),
            current_step: 0,
            phase: MotionPhase::Complete,
            acceleration_elapsed: 0,
            deceleration_elapsed: 0,
        };
        executor.phase = executor.phase_at(0);
        executor
    }

    /// Check if every step has been issued.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.phase == MotionPhase::Complete
    }

    /// Steps issued so far.
    #[inline]
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Total step events of the block.
    #[inline]
    pub fn total_steps(&self) -> u32 {
        self.step_event_count
    }

    /// Get steps remaining.
    #[inline]
    pub fn steps_remaining(&self) -> u32 {
        self.step_event_count.saturating_sub(self.current_step)
    }

    /// Get the current phase.
    #[inline]
    pub fn phase(&self) -> MotionPhase {
        self.phase
    }

    /// The rate profile being executed.
    #[inline]
    pub fn trapezoid(&self) -> &Trapezoid {
        &self.trapezoid
    }

    /// Issue the next step event, or `None` once the block is done.
    pub fn next_pulse(&mut self) -> Option<StepPulse> {
        if self.is_complete() {
            return None;
        }

        let rate = self.current_rate().max(MINIMAL_STEP_RATE);
        let interval_ticks = (self.timer_hz / rate).max(1);

        let count = self.step_event_count as i64;
        let mut axes = 0u8;
        for axis in Axis::ALL {
            let error = &mut self.error[axis];
            *error += self.steps[axis] as i64;
            if *error > 0 {
                *error -= count;
                axes |= axis.bit();
            }
        }

        match self.phase {
            MotionPhase::Accelerating => {
                self.acceleration_elapsed = self.acceleration_elapsed.saturating_add(interval_ticks)
            }
            MotionPhase::Decelerating => {
                self.deceleration_elapsed = self.deceleration_elapsed.saturating_add(interval_ticks)
            }
            _ => {}
        }

        self.current_step += 1;
        self.phase = self.phase_at(self.current_step);

        Some(StepPulse {
            axes,
            direction_bits: self.direction_bits,
            rate,
            interval_ticks,
        })
    }

    fn phase_at(&self, step: u32) -> MotionPhase {
        let t = &self.trapezoid;
        if step >= self.step_event_count {
            MotionPhase::Complete
        } else if step < t.accelerate_until {
            MotionPhase::Accelerating
        } else if step >= t.decelerate_after {
            MotionPhase::Decelerating
        } else {
            MotionPhase::Cruising
        }
    }

    fn current_rate(&self) -> u32 {
        let t = &self.trapezoid;
        match self.phase {
            MotionPhase::Accelerating => {
                let gained = scale(
                    t.cruise_rate.saturating_sub(t.initial_rate),
                    self.acceleration_elapsed,
                    t.acceleration_time,
                    t.acceleration_time_inverse,
                );
                (t.initial_rate + gained).min(t.cruise_rate)
            }
            MotionPhase::Decelerating => {
                let lost = scale(
                    t.cruise_rate.saturating_sub(t.final_rate),
                    self.deceleration_elapsed,
                    t.deceleration_time,
                    t.deceleration_time_inverse,
                );
                t.cruise_rate.saturating_sub(lost).max(t.final_rate)
            }
            MotionPhase::Cruising => t.cruise_rate,
            MotionPhase::Complete => t.final_rate,
        }
    }
}

/// `range * elapsed / duration`, using the precomputed `u32::MAX / duration`.
#[inline]
fn scale(range: u32, elapsed: u32, duration: u32, inverse: u32) -> u32 {
    if elapsed >= duration {
        return range;
    }
    let fraction = (elapsed as u64 * inverse as u64) >> 32;
    ((range as u64 * fraction) >> 32) as u32
}
