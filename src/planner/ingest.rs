//! Move admission.
//!
//! Turns a target position into a block: step deltas, extrusion guards,
//! length, feedrate and acceleration limits, junction speed. Moves too
//! short to be worth a block are coalesced into the next one.

use libm::{ceilf, fabsf, roundf, sqrtf};

use crate::config::units::{Axis, AxisArray, MmPerSec};
use crate::error::Result;
use crate::motion::{max_allowable_speed_sqr, JunctionLimit, JunctionLimits, JunctionMove};
use crate::queue::{BlockAction, BlockKind, FreeSlot};

use super::idle::Idle;
use super::lookahead::recalculate;
use super::Planner;

/// How strictly a move must be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Placement {
    /// Moves below the segment floor may be folded into the next move.
    #[default]
    Coalesced,
    /// Every move that steps at all becomes a block of its own. For
    /// homing and calibration moves.
    Exact,
}

/// Optional extras for one move.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MoveHints {
    /// Length of the move when the caller knows it better than the
    /// straight line does (e.g. a segment of an arc).
    pub millimeters: Option<f32>,
    /// Coalescing policy.
    pub placement: Placement,
    /// Work reported by the step generator when the block retires.
    pub action: Option<BlockAction>,
}

impl MoveHints {
    /// No hints.
    pub const fn new() -> Self {
        Self {
            millimeters: None,
            placement: Placement::Coalesced,
            action: None,
        }
    }

    /// Set the move length.
    pub fn millimeters(mut self, millimeters: f32) -> Self {
        self.millimeters = Some(millimeters);
        self
    }

    /// Set the placement policy.
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Shorthand for [`Placement::Exact`].
    pub fn exact(self) -> Self {
        self.placement(Placement::Exact)
    }

    /// Attach an action to report when the block retires.
    pub fn action(mut self, action: BlockAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Extruder conditions for one move.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtruderState {
    /// The hotend is below its minimum extrusion temperature.
    pub too_cold: bool,
    /// Multiplier applied to E steps.
    pub flow_factor: f32,
}

impl Default for ExtruderState {
    fn default() -> Self {
        Self {
            too_cold: false,
            flow_factor: 1.0,
        }
    }
}

/// Per-move quantities shared by the limit stages.
struct Segment {
    steps: AxisArray<u32>,
    direction_bits: u8,
    delta_mm: AxisArray<f32>,
    step_event_count: u32,
    millimeters: f32,
}

impl Segment {
    #[inline]
    fn moves_xyz(&self) -> bool {
        Axis::XYZ.iter().any(|&axis| self.steps[axis] != 0)
    }

    #[inline]
    fn extrudes(&self) -> bool {
        self.steps[Axis::E] != 0
    }
}

impl<'q, I: Idle, const N: usize> Planner<'q, I, N> {
    /// Queue a linear move to `target`, in machine coordinates.
    ///
    /// Returns `Ok(true)` once the move is accounted for: queued, or folded
    /// into the tracked position to be carried by the next move. Returns
    /// `Ok(false)` if the move was dropped because a quick stop is in
    /// progress. Waits (calling the idle hook) while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns an error if a target coordinate is not finite or falls
    /// outside the step range. Nothing is queued in that case.
    pub fn append_linear_move(
        &mut self,
        target: &AxisArray<f32>,
        feedrate: MmPerSec,
        extruder: &ExtruderState,
        hints: MoveHints,
    ) -> Result<bool> {
        if self.producer.queue().is_draining() {
            return Ok(false);
        }
        let target_steps = self.scaling.position_to_steps(target)?;
        Ok(self.buffer_steps(&target_steps, target, feedrate.value(), extruder, &hints))
    }

    /// Queue a move to an absolute step position, never coalesced.
    ///
    /// Returns `false` if a quick stop is in progress.
    pub fn append_raw_move(
        &mut self,
        target: &AxisArray<i32>,
        feedrate: MmPerSec,
        extruder: &ExtruderState,
        hints: MoveHints,
    ) -> bool {
        if self.producer.queue().is_draining() {
            return false;
        }
        let target_mm = self.scaling.position_to_mm(target);
        self.buffer_steps(target, &target_mm, feedrate.value(), extruder, &hints.exact())
    }

    /// Queue a block that only overwrites the step generator's position
    /// with the tracked one, in order with the moves around it.
    ///
    /// Returns `false` if a quick stop is in progress.
    pub fn append_sync_block(&mut self) -> bool {
        let Some(index) = self.next_free_block() else {
            return false;
        };

        let side = self.producer.side();
        let block = self.producer.block(index);
        block.kind.set(side, BlockKind::Sync);
        for axis in Axis::ALL {
            block.sync_position[axis.index()].set(side, self.position.steps()[axis]);
        }
        self.producer.commit(index);

        trace!("sync block {} committed", index);
        true
    }

    /// Wait for a free slot. `None` if a quick stop started meanwhile.
    fn next_free_block(&mut self) -> Option<usize> {
        loop {
            match self.producer.try_next_free_block() {
                FreeSlot::Ready(index) => return Some(index),
                FreeSlot::Draining => return None,
                FreeSlot::Full => self.idle.idle(),
            }
        }
    }

    fn buffer_steps(
        &mut self,
        target: &AxisArray<i32>,
        target_mm: &AxisArray<f32>,
        feedrate: f32,
        extruder: &ExtruderState,
        hints: &MoveHints,
    ) -> bool {
        let Some(index) = self.next_free_block() else {
            return false;
        };

        if !self.populate_block(index, target, target_mm, feedrate, extruder, hints) {
            // Coalesced: accounted for, but nothing to queue.
            return true;
        }

        self.producer.commit(index);
        recalculate(
            &self.producer,
            self.options.minimum_planner_speed,
            self.options.step_timer_hz,
        );
        trace!("block {} committed, {} queued", index, self.producer.queue().moves_planned());
        true
    }

    /// Fill the free slot `index`. Returns `false` if the move is too short
    /// for a block, in which case only the millimeter position advances.
    fn populate_block(
        &mut self,
        index: usize,
        target: &AxisArray<i32>,
        target_mm: &AxisArray<f32>,
        feedrate: f32,
        extruder: &ExtruderState,
        hints: &MoveHints,
    ) -> bool {
        let mut delta = self.position.steps_to(target);

        if delta[Axis::E] != 0 {
            if extruder.too_cold && !self.options.allow_cold_extrusion {
                warn!("cold extrusion prevented");
                // Behave as if the E part happened.
                self.position.set_axis(Axis::E, target[Axis::E], target_mm[Axis::E]);
                delta[Axis::E] = 0;
            } else {
                let e_steps = fabsf(delta[Axis::E] as f32 * extruder.flow_factor);
                let max_e_steps = self.scaling.steps_per_mm[Axis::E] * self.options.max_extrude_length_mm;
                if e_steps > max_e_steps {
                    warn!("lengthy extrusion prevented, {} steps", e_steps);
                    self.position.set_axis(Axis::E, target[Axis::E], target_mm[Axis::E]);
                    delta[Axis::E] = 0;
                }
            }
        }

        let Some(segment) = self.segment(&delta, extruder, hints) else {
            self.position.advance_mm(*target_mm);
            return false;
        };

        // Feedrate floors.
        let mut feedrate = if feedrate > 0.0 {
            feedrate
        } else {
            self.options.minimum_planner_speed
        };
        feedrate = feedrate.max(if segment.extrudes() {
            self.settings.min_feedrate_mm_s
        } else {
            self.settings.min_travel_feedrate_mm_s
        });

        let inverse_millimeters = 1.0 / segment.millimeters;
        let mut inverse_secs = feedrate * inverse_millimeters;

        // Slow short extruding segments down while the queue runs low, so
        // it does not starve.
        let queued = self.producer.queue().moves_planned();
        if (2..N / 2).contains(&queued) && segment.extrudes() {
            let segment_time_us = roundf(1_000_000.0 / inverse_secs);
            let min_segment_time_us = self.settings.min_segment_time_us as f32;
            if segment_time_us < min_segment_time_us {
                let stretched = segment_time_us
                    + roundf(2.0 * (min_segment_time_us - segment_time_us) / queued as f32);
                inverse_secs = 1_000_000.0 / stretched;
            }
        }

        let mut nominal_speed = segment.millimeters * inverse_secs;
        let mut nominal_rate = ceilf(segment.step_event_count as f32 * inverse_secs) as u32;

        let mut axis_speed = segment.delta_mm.map(|_, d| d * inverse_secs);
        let mut speed_factor = 1.0f32;
        for (axis, speed) in axis_speed.iter() {
            let max = self.settings.max_feedrate_mm_s[axis];
            if fabsf(speed) > max {
                speed_factor = speed_factor.min(max / fabsf(speed));
            }
        }
        if speed_factor < 1.0 {
            axis_speed = axis_speed.map(|_, v| v * speed_factor);
            nominal_rate = (nominal_rate as f32 * speed_factor) as u32;
            nominal_speed *= speed_factor;
        }
        let nominal_speed_sqr = nominal_speed * nominal_speed;

        let (acceleration_steps_per_s2, acceleration) = self.acceleration(&segment, inverse_millimeters);

        let min_speed = self.options.minimum_planner_speed;
        let min_speed_sqr = min_speed * min_speed;
        let current = JunctionMove {
            axis_speed,
            unit_vec: segment.delta_mm.map(|_, d| d * inverse_millimeters),
            nominal_speed_sqr,
            millimeters: segment.millimeters,
            acceleration,
        };
        let limits = JunctionLimits {
            max_jerk: &self.settings.max_jerk_mm_s,
            max_acceleration: &self.settings.max_acceleration_mm_s2,
            junction_deviation_mm: self.settings.junction_deviation_mm,
            minimum_planner_speed: min_speed,
        };
        let moves_queued = self.producer.queue().nonbusy_moves_planned() > 0;
        let vmax_junction_sqr = self.junction.max_entry_speed_sqr(&current, moves_queued, &limits);

        let max_entry_speed_sqr = vmax_junction_sqr.max(min_speed_sqr).min(nominal_speed_sqr);
        let v_allowable_sqr = max_allowable_speed_sqr(-acceleration, min_speed_sqr, segment.millimeters);

        let side = self.producer.side();
        let block = self.producer.block(index);
        block.direction_bits.set(side, segment.direction_bits);
        for axis in Axis::ALL {
            block.steps[axis.index()].set(side, segment.steps[axis]);
        }
        block.step_event_count.set(side, segment.step_event_count);
        block.action.set(side, hints.action);
        block.nominal_rate.set(side, nominal_rate);
        block.acceleration_steps_per_s2.set(side, acceleration_steps_per_s2);
        block.nominal_speed_sqr.set(side, nominal_speed_sqr);
        block.max_entry_speed_sqr.set(side, max_entry_speed_sqr);
        block.entry_speed_sqr.set(side, min_speed_sqr.min(max_entry_speed_sqr));
        block.millimeters.set(side, segment.millimeters);
        block.acceleration.set(side, acceleration);
        block.nominal_length.set(side, nominal_speed_sqr <= v_allowable_sqr);
        block.recalculate.set_sc(side, true);

        self.position.set(*target, *target_mm);
        true
    }

    /// Step counts and length of a move, or `None` if it is too short to
    /// become a block.
    fn segment(&self, delta: &AxisArray<i64>, extruder: &ExtruderState, hints: &MoveHints) -> Option<Segment> {
        let mut direction_bits = 0u8;
        for (axis, d) in delta.iter() {
            if d < 0 {
                direction_bits |= axis.bit();
            }
        }

        let e_steps_float = delta[Axis::E] as f32 * extruder.flow_factor;
        let e_steps = (fabsf(e_steps_float) + 0.5) as u32;

        let mut steps = delta.map(|_, d| d.unsigned_abs() as u32);
        steps[Axis::E] = e_steps;

        let mm_per_step = &self.scaling.mm_per_step;
        let mut delta_mm = delta.map(|axis, d| d as f32 * mm_per_step[axis]);
        delta_mm[Axis::E] = e_steps_float * mm_per_step[Axis::E];

        let exact = hints.placement == Placement::Exact;
        let floor = self.options.min_segment_steps;
        let step_event_count = steps.0.iter().copied().max().unwrap_or(0);

        let skip = if exact {
            step_event_count == 0
        } else {
            step_event_count < floor
        };
        if skip {
            trace!("coalesced {} step events", step_event_count);
            return None;
        }

        let below_floor_xyz = Axis::XYZ.iter().all(|&axis| steps[axis] < floor);
        let mut millimeters = if !exact && below_floor_xyz {
            fabsf(delta_mm[Axis::E])
        } else {
            match hints.millimeters {
                Some(mm) if mm > 0.0 => mm,
                _ => sqrtf(Axis::XYZ.iter().map(|&axis| delta_mm[axis] * delta_mm[axis]).sum()),
            }
        };
        if millimeters <= 0.0 {
            // Extruder-only exact move.
            millimeters = fabsf(delta_mm[Axis::E]);
        }

        Some(Segment {
            steps,
            direction_bits,
            delta_mm,
            step_event_count,
            millimeters,
        })
    }

    /// Acceleration along the move, in steps/s² of the dominant axis and in
    /// mm/s².
    fn acceleration(&self, segment: &Segment, inverse_millimeters: f32) -> (u32, f32) {
        let steps_per_mm = segment.step_event_count as f32 * inverse_millimeters;

        let accel = if !segment.moves_xyz() {
            ceilf(self.settings.retract_acceleration * steps_per_mm) as u32
        } else {
            let default = if segment.extrudes() {
                self.settings.acceleration
            } else {
                self.settings.travel_acceleration
            };
            let mut accel = ceilf(default * steps_per_mm) as u32;

            // No axis may exceed its own limit once the move is projected
            // on it.
            let count = segment.step_event_count as f32;
            for axis in Axis::ALL {
                let steps = segment.steps[axis];
                let max = self.scaling.max_acceleration_steps_per_s2[axis];
                if steps != 0 && max < accel as f32 {
                    let comp = max * count;
                    if accel as f32 * steps as f32 > comp {
                        accel = (comp / steps as f32) as u32;
                    }
                }
            }
            accel
        };

        (accel, accel as f32 / steps_per_mm)
    }
}

impl<'q, I: Idle, const N: usize> Planner<'q, I, N> {
    /// Free slots in the queue.
    #[inline]
    pub fn moves_free(&self) -> usize {
        self.producer.queue().moves_free()
    }

    /// Live blocks in the queue.
    #[inline]
    pub fn moves_planned(&self) -> usize {
        self.producer.queue().moves_planned()
    }

    /// Capacity of the queue, including the slot that always stays empty.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.producer.queue().capacity()
    }
}
