//! Junction speed limits.
//!
//! Two models bound the speed at the corner between consecutive moves:
//! the classic per-axis jerk model and the centripetal junction deviation
//! model. Which one runs is picked at startup from configuration.

use libm::{fabsf, sqrtf};

use crate::config::units::{Axis, AxisArray};
use crate::config::JunctionStrategy;

/// Below this, a previous nominal speed² counts as "starting from rest".
const NEAR_ZERO: f32 = 0.000_001;

/// The move whose entry junction is being limited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JunctionMove {
    /// Signed per-axis speed at nominal feedrate, mm/s.
    pub axis_speed: AxisArray<f32>,
    /// Unit vector of the move.
    pub unit_vec: AxisArray<f32>,
    /// Square of the nominal speed.
    pub nominal_speed_sqr: f32,
    /// Length of the move.
    pub millimeters: f32,
    /// Acceleration along the move, mm/s².
    pub acceleration: f32,
}

/// Machine limits the junction models read.
#[derive(Debug, Clone, Copy)]
pub struct JunctionLimits<'a> {
    /// Per-axis jerk, mm/s.
    pub max_jerk: &'a AxisArray<f32>,
    /// Per-axis acceleration, mm/s².
    pub max_acceleration: &'a AxisArray<f32>,
    /// Junction deviation, mm.
    pub junction_deviation_mm: f32,
    /// Speed blocks may always enter and leave at, mm/s.
    pub minimum_planner_speed: f32,
}

/// A cornering model.
///
/// Implementations remember the previous move; call
/// [`max_entry_speed_sqr`](JunctionLimit::max_entry_speed_sqr) exactly once
/// per queued move, in order.
pub trait JunctionLimit {
    /// Largest speed² at which `current` may be entered from the previous
    /// move. `moves_queued` is false when the queue is empty, in which case
    /// the move starts from rest as far as the previous move is concerned.
    fn max_entry_speed_sqr(
        &mut self,
        current: &JunctionMove,
        moves_queued: bool,
        limits: &JunctionLimits<'_>,
    ) -> f32;

    /// Forget the previous move.
    fn reset(&mut self);
}

/// Per-axis jerk model.
///
/// Each axis may change speed instantly by up to its jerk setting. Handles
/// an axis coasting in the same direction differently from one reversing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassicJerk {
    previous_speed: AxisArray<f32>,
    previous_nominal_speed_sqr: f32,
    previous_safe_speed: f32,
}

impl ClassicJerk {
    /// A model with no previous move.
    pub const fn new() -> Self {
        Self {
            previous_speed: AxisArray::splat(0.0),
            previous_nominal_speed_sqr: 0.0,
            previous_safe_speed: 0.0,
        }
    }

    /// Speed from which the move could stop dead without exceeding any
    /// axis jerk.
    fn safe_speed(current: &JunctionMove, nominal_speed: f32, max_jerk: &AxisArray<f32>) -> f32 {
        let mut safe_speed = nominal_speed;
        let mut limited = false;
        for axis in Axis::ALL {
            let jerk = fabsf(current.axis_speed[axis]);
            let max = max_jerk[axis];
            if jerk > max {
                if limited {
                    let mjerk = nominal_speed * max;
                    if jerk * safe_speed > mjerk {
                        safe_speed = mjerk / jerk;
                    }
                } else {
                    safe_speed *= max / jerk;
                    limited = true;
                }
            }
        }
        safe_speed
    }
}

/// Speed change of one axis across a junction.
#[inline]
fn axis_jerk(v_exit: f32, v_entry: f32) -> f32 {
    if v_exit > v_entry {
        if v_entry > 0.0 || v_exit < 0.0 {
            v_exit - v_entry
        } else {
            v_exit.max(-v_entry)
        }
    } else if v_entry < 0.0 || v_exit > 0.0 {
        v_entry - v_exit
    } else {
        (-v_exit).max(v_entry)
    }
}

impl JunctionLimit for ClassicJerk {
    fn max_entry_speed_sqr(
        &mut self,
        current: &JunctionMove,
        moves_queued: bool,
        limits: &JunctionLimits<'_>,
    ) -> f32 {
        let nominal_speed = sqrtf(current.nominal_speed_sqr);
        let safe_speed = Self::safe_speed(current, nominal_speed, limits.max_jerk);

        let vmax_junction = if moves_queued && self.previous_nominal_speed_sqr > NEAR_ZERO {
            let previous_nominal_speed = sqrtf(self.previous_nominal_speed_sqr);
            let shared = nominal_speed.min(previous_nominal_speed);
            let smaller_speed_factor = shared / previous_nominal_speed;

            let mut v_factor = 1.0f32;
            let mut limited = false;
            for axis in Axis::ALL {
                let mut v_exit = self.previous_speed[axis] * smaller_speed_factor;
                let mut v_entry = current.axis_speed[axis];
                if limited {
                    v_exit *= v_factor;
                    v_entry *= v_factor;
                }
                let jerk = axis_jerk(v_exit, v_entry);
                if jerk > limits.max_jerk[axis] {
                    v_factor *= limits.max_jerk[axis] / jerk;
                    limited = true;
                }
            }

            let mut vmax = if limited { shared * v_factor } else { shared };

            // Both neighbours could stop dead from their safe speeds, so
            // the junction may run at the safe speed even if the shared
            // component-wise limit came out lower.
            let threshold = vmax * 0.99;
            if self.previous_safe_speed > threshold && safe_speed > threshold {
                vmax = safe_speed;
            }
            vmax.min(shared)
        } else {
            safe_speed
        };

        self.previous_speed = current.axis_speed;
        self.previous_nominal_speed_sqr = current.nominal_speed_sqr;
        self.previous_safe_speed = safe_speed;

        vmax_junction * vmax_junction
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Centripetal junction deviation model.
///
/// Treats the corner as a circular arc tangent to both moves whose distance
/// from the corner is the junction deviation, and limits the speed so the
/// centripetal acceleration along that arc stays within the acceleration
/// limit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JunctionDeviation {
    previous_unit_vec: AxisArray<f32>,
    previous_nominal_speed_sqr: f32,
}

impl JunctionDeviation {
    /// A model with no previous move.
    pub const fn new() -> Self {
        Self {
            previous_unit_vec: AxisArray::splat(0.0),
            previous_nominal_speed_sqr: 0.0,
        }
    }
}

/// Scale `vector` to unit length. The zero vector is left alone.
fn normalize(vector: &mut AxisArray<f32>) {
    let magnitude_sqr: f32 = vector.0.iter().map(|v| v * v).sum();
    if magnitude_sqr > 0.0 {
        let inverse = 1.0 / sqrtf(magnitude_sqr);
        for v in vector.0.iter_mut() {
            *v *= inverse;
        }
    }
}

/// `max_value`, reduced so no axis of `unit_vec` exceeds its own limit.
fn limit_by_axis_maximum(max_value: f32, unit_vec: &AxisArray<f32>, axis_max: &AxisArray<f32>) -> f32 {
    let mut limit = max_value;
    for (axis, component) in unit_vec.iter() {
        if component != 0.0 {
            limit = limit.min(fabsf(axis_max[axis] / component));
        }
    }
    limit
}

impl JunctionLimit for JunctionDeviation {
    fn max_entry_speed_sqr(
        &mut self,
        current: &JunctionMove,
        moves_queued: bool,
        limits: &JunctionLimits<'_>,
    ) -> f32 {
        let unit_vec = current.unit_vec;

        let vmax_junction_sqr = if moves_queued && self.previous_nominal_speed_sqr > NEAR_ZERO {
            // Cosine of the angle between the reversed previous direction
            // and the new one: -1 is straight on, 1 a full reversal.
            let mut cos_theta: f32 = Axis::ALL
                .iter()
                .map(|&axis| -self.previous_unit_vec[axis] * unit_vec[axis])
                .sum();

            let vmax_sqr = if cos_theta > 0.999_999 {
                limits.minimum_planner_speed * limits.minimum_planner_speed
            } else {
                cos_theta = cos_theta.max(-0.999_999);

                let mut junction_unit_vec = unit_vec.map(|axis, v| v - self.previous_unit_vec[axis]);
                normalize(&mut junction_unit_vec);

                let junction_acceleration =
                    limit_by_axis_maximum(current.acceleration, &junction_unit_vec, limits.max_acceleration);
                let sin_theta_d2 = sqrtf(0.5 * (1.0 - cos_theta));

                let mut vmax_sqr = (junction_acceleration * limits.junction_deviation_mm * sin_theta_d2)
                    / (1.0 - sin_theta_d2);

                if current.millimeters < 1.0 {
                    // Fast acos approximation minus an error bar; beyond
                    // 135 degrees treat the corner as an arc of this length.
                    let theta = (-40.0f32.to_radians() * cos_theta * cos_theta - 50.0f32.to_radians()) * cos_theta
                        + 90.0f32.to_radians()
                        - 0.18;
                    if theta > 135.0f32.to_radians() {
                        let limit_sqr =
                            current.millimeters / (180.0f32.to_radians() - theta) * junction_acceleration;
                        vmax_sqr = vmax_sqr.min(limit_sqr);
                    }
                }
                vmax_sqr
            };

            vmax_sqr
                .min(current.nominal_speed_sqr)
                .min(self.previous_nominal_speed_sqr)
        } else {
            0.0
        };

        self.previous_unit_vec = unit_vec;
        self.previous_nominal_speed_sqr = current.nominal_speed_sqr;

        vmax_junction_sqr
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// The cornering model selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JunctionPlanner {
    /// Per-axis jerk.
    ClassicJerk(ClassicJerk),
    /// Junction deviation.
    JunctionDeviation(JunctionDeviation),
}

impl JunctionPlanner {
    /// A fresh model of the given kind.
    pub const fn new(strategy: JunctionStrategy) -> Self {
        match strategy {
            JunctionStrategy::ClassicJerk => JunctionPlanner::ClassicJerk(ClassicJerk::new()),
            JunctionStrategy::JunctionDeviation => {
                JunctionPlanner::JunctionDeviation(JunctionDeviation::new())
            }
        }
    }

    /// Which model this is.
    pub fn strategy(&self) -> JunctionStrategy {
        match self {
            JunctionPlanner::ClassicJerk(_) => JunctionStrategy::ClassicJerk,
            JunctionPlanner::JunctionDeviation(_) => JunctionStrategy::JunctionDeviation,
        }
    }
}

impl JunctionLimit for JunctionPlanner {
    fn max_entry_speed_sqr(
        &mut self,
        current: &JunctionMove,
        moves_queued: bool,
        limits: &JunctionLimits<'_>,
    ) -> f32 {
        match self {
            JunctionPlanner::ClassicJerk(model) => model.max_entry_speed_sqr(current, moves_queued, limits),
            JunctionPlanner::JunctionDeviation(model) => {
                model.max_entry_speed_sqr(current, moves_queued, limits)
            }
        }
    }

    fn reset(&mut self) {
        match self {
            JunctionPlanner::ClassicJerk(model) => model.reset(),
            JunctionPlanner::JunctionDeviation(model) => model.reset(),
        }
    }
}
