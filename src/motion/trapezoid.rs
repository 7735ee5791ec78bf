//! Trapezoid generation.
//!
//! Turns a block's entry and exit speeds into the integer rate profile the
//! step generator runs: accelerate until `accelerate_until`, cruise, then
//! decelerate after `decelerate_after`. All float work happens here, on the
//! planner side.

use libm::{ceilf, floorf, sqrtf};

/// Lowest step rate handed to the step generator, in steps/s.
///
/// Below this the timer interval would overflow and the motion is too slow
/// to matter anyway.
pub const MINIMAL_STEP_RATE: u32 = 120;

/// Rate profile of one block, in steps and steps/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Trapezoid {
    /// Cruise rate requested by the feedrate.
    pub nominal_rate: u32,
    /// Rate at the first step.
    pub initial_rate: u32,
    /// Rate reached at the end of acceleration.
    pub cruise_rate: u32,
    /// Rate at the last step.
    pub final_rate: u32,
    /// Step index where acceleration ends.
    pub accelerate_until: u32,
    /// Step index where deceleration starts.
    pub decelerate_after: u32,
    /// Acceleration along the dominant axis.
    pub acceleration_steps_per_s2: u32,
    /// Duration of the acceleration phase in timer ticks.
    pub acceleration_time: u32,
    /// Duration of the deceleration phase in timer ticks.
    pub deceleration_time: u32,
    /// `u32::MAX / acceleration_time`, precomputed for curve evaluation.
    pub acceleration_time_inverse: u32,
    /// `u32::MAX / deceleration_time`, precomputed for curve evaluation.
    pub deceleration_time_inverse: u32,
}

impl Trapezoid {
    /// Steps spent accelerating.
    #[inline]
    pub fn accelerate_steps(&self) -> u32 {
        self.accelerate_until
    }

    /// Steps spent decelerating in a block of `step_event_count` steps.
    #[inline]
    pub fn decelerate_steps(&self, step_event_count: u32) -> u32 {
        step_event_count.saturating_sub(self.decelerate_after)
    }

    /// Steps spent at cruise rate.
    #[inline]
    pub fn plateau_steps(&self) -> u32 {
        self.decelerate_after.saturating_sub(self.accelerate_until)
    }
}

/// Distance (in steps) needed to go from `initial_rate` to `target_rate`
/// at constant `acceleration`.
#[inline]
pub fn estimate_acceleration_distance(initial_rate: f32, target_rate: f32, acceleration: f32) -> f32 {
    if acceleration == 0.0 {
        return 0.0;
    }
    (target_rate * target_rate - initial_rate * initial_rate) / (acceleration * 2.0)
}

/// Step at which to stop accelerating and start decelerating so that a
/// block of `distance` steps starts at `initial_rate` and ends at
/// `final_rate`, when the cruise rate cannot be reached.
#[inline]
pub fn intersection_distance(initial_rate: f32, final_rate: f32, acceleration: f32, distance: f32) -> f32 {
    if acceleration == 0.0 {
        return 0.0;
    }
    (acceleration * 2.0 * distance - initial_rate * initial_rate + final_rate * final_rate)
        / (acceleration * 4.0)
}

/// Speed reached after accelerating over `distance` from `initial_velocity`.
#[inline]
pub fn final_speed(initial_velocity: f32, acceleration: f32, distance: f32) -> f32 {
    sqrtf(initial_velocity * initial_velocity + 2.0 * acceleration * distance)
}

/// Largest speed² from which `distance` can still be covered while
/// changing speed at `acceleration` and ending at `target_velocity_sqr`.
///
/// Called with a negative acceleration to ask how fast a block may be
/// entered and still decelerate to its exit speed.
#[inline]
pub fn max_allowable_speed_sqr(acceleration: f32, target_velocity_sqr: f32, distance: f32) -> f32 {
    target_velocity_sqr - 2.0 * acceleration * distance
}

/// Compute the rate profile for a block.
///
/// `entry_factor` and `exit_factor` are the entry and exit speeds as a
/// fraction of the nominal speed. `timer_hz` is the step timer frequency
/// the duration fields are expressed in.
pub fn calculate_trapezoid(
    step_event_count: u32,
    nominal_rate: u32,
    acceleration_steps_per_s2: f32,
    entry_factor: f32,
    exit_factor: f32,
    timer_hz: u32,
) -> Trapezoid {
    let initial_rate = (ceilf(nominal_rate as f32 * entry_factor) as u32).max(MINIMAL_STEP_RATE);
    let final_rate = (ceilf(nominal_rate as f32 * exit_factor) as u32).max(MINIMAL_STEP_RATE);

    let accel = acceleration_steps_per_s2;
    let total = step_event_count as i64;

    let mut accelerate_steps = ceilf(estimate_acceleration_distance(
        initial_rate as f32,
        nominal_rate as f32,
        accel,
    ))
    .max(0.0) as i64;
    let decelerate_steps = floorf(estimate_acceleration_distance(
        nominal_rate as f32,
        final_rate as f32,
        -accel,
    ))
    .max(0.0) as i64;

    let mut plateau_steps = total - accelerate_steps - decelerate_steps;

    let cruise_rate = if plateau_steps < 0 {
        // Cruise rate is unreachable: meet the exit speed exactly by
        // switching from acceleration to deceleration part way through.
        let intersection = ceilf(intersection_distance(
            initial_rate as f32,
            final_rate as f32,
            accel,
            total as f32,
        ));
        accelerate_steps = (intersection.max(0.0) as i64).min(total);
        plateau_steps = 0;
        let reached = final_speed(initial_rate as f32, accel, accelerate_steps as f32) as u32;
        reached.max(initial_rate).max(final_rate)
    } else {
        nominal_rate.max(initial_rate).max(final_rate)
    };

    let accelerate_until = accelerate_steps as u32;
    let decelerate_after = (accelerate_steps + plateau_steps) as u32;

    let acceleration_time = phase_ticks(cruise_rate - initial_rate, accel, timer_hz);
    let deceleration_time = phase_ticks(cruise_rate - final_rate, accel, timer_hz);

    Trapezoid {
        nominal_rate,
        initial_rate,
        cruise_rate,
        final_rate,
        accelerate_until,
        decelerate_after,
        acceleration_steps_per_s2: accel.max(0.0) as u32,
        acceleration_time,
        deceleration_time,
        acceleration_time_inverse: period_inverse(acceleration_time),
        deceleration_time_inverse: period_inverse(deceleration_time),
    }
}

fn phase_ticks(rate_change: u32, acceleration: f32, timer_hz: u32) -> u32 {
    if acceleration <= 0.0 {
        return 0;
    }
    let ticks = rate_change as f32 / acceleration * timer_hz as f32;
    if ticks >= u32::MAX as f32 {
        u32::MAX
    } else {
        ticks as u32
    }
}

#[inline]
fn period_inverse(ticks: u32) -> u32 {
    if ticks == 0 {
        u32::MAX
    } else {
        u32::MAX / ticks
    }
}
