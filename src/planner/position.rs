//! Position tracking for the planner.
//!
//! The planner tracks where the queue will leave the machine, in steps and
//! in millimeters. The two normally agree to within one step; they differ
//! while short segments are being coalesced, where the millimeter position
//! runs ahead and the step position waits for the next real block.

use crate::config::units::{Axis, AxisArray};
use crate::error::{PlannerError, Result};

use super::idle::Idle;
use super::Planner;

/// Planner position tracker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Position at the end of the last queued block, in steps.
    steps: AxisArray<i32>,
    /// Position at the end of the last admitted move, in millimeters.
    mm: AxisArray<f32>,
    /// Logical minus machine coordinate, per axis.
    offset: AxisArray<f32>,
}

impl Position {
    /// Create a position tracker at a specific position.
    #[inline]
    pub fn at(steps: AxisArray<i32>, mm: AxisArray<f32>) -> Self {
        Self {
            steps,
            mm,
            offset: AxisArray::splat(0.0),
        }
    }

    /// Get current position in steps.
    #[inline]
    pub fn steps(&self) -> &AxisArray<i32> {
        &self.steps
    }

    /// Get current machine position in millimeters.
    #[inline]
    pub fn mm(&self) -> &AxisArray<f32> {
        &self.mm
    }

    /// Get current logical position in millimeters.
    pub fn logical_mm(&self) -> AxisArray<f32> {
        self.mm.map(|axis, v| v + self.offset[axis])
    }

    /// Logical minus machine coordinate on `axis`.
    #[inline]
    pub fn offset(&self, axis: Axis) -> f32 {
        self.offset[axis]
    }

    /// Convert a logical position to machine coordinates.
    pub fn logical_to_machine(&self, logical: &AxisArray<f32>) -> AxisArray<f32> {
        logical.map(|axis, v| v - self.offset[axis])
    }

    /// Set both representations.
    #[inline]
    pub fn set(&mut self, steps: AxisArray<i32>, mm: AxisArray<f32>) {
        self.steps = steps;
        self.mm = mm;
    }

    /// Set one axis in both representations.
    #[inline]
    pub fn set_axis(&mut self, axis: Axis, steps: i32, mm: f32) {
        self.steps[axis] = steps;
        self.mm[axis] = mm;
    }

    /// Move the millimeter position only; the step position catches up
    /// with the next block.
    #[inline]
    pub fn advance_mm(&mut self, mm: AxisArray<f32>) {
        self.mm = mm;
    }

    /// Set the logical offset on one axis.
    #[inline]
    pub fn set_offset(&mut self, axis: Axis, offset: f32) {
        self.offset[axis] = offset;
    }

    /// Signed steps needed to reach `target` on each axis.
    pub fn steps_to(&self, target: &AxisArray<i32>) -> AxisArray<i64> {
        target.map(|axis, t| t as i64 - self.steps[axis] as i64)
    }
}

impl<'q, I: Idle, const N: usize> Planner<'q, I, N> {
    /// Planner position in steps.
    #[inline]
    pub fn position_steps(&self) -> &AxisArray<i32> {
        self.position.steps()
    }

    /// Planner position in machine coordinates.
    ///
    /// This is where the queue will leave the machine, not where it is now;
    /// see [`get_axis_position_mm`](Self::get_axis_position_mm) for that.
    #[inline]
    pub fn machine_position_mm(&self) -> &AxisArray<f32> {
        self.position.mm()
    }

    /// Planner position in logical coordinates.
    #[inline]
    pub fn logical_position_mm(&self) -> AxisArray<f32> {
        self.position.logical_mm()
    }

    /// Convert logical coordinates to machine coordinates.
    #[inline]
    pub fn logical_to_machine(&self, logical: &AxisArray<f32>) -> AxisArray<f32> {
        self.position.logical_to_machine(logical)
    }

    /// Logical offset of `axis`.
    #[inline]
    pub fn axis_offset(&self, axis: Axis) -> f32 {
        self.position.offset(axis)
    }

    /// Shift the logical coordinate system of `axis` so that logical =
    /// machine + `offset`. Does not move anything.
    pub fn set_axis_offset(&mut self, axis: Axis, offset: f32) -> Result<()> {
        if !offset.is_finite() {
            return Err(PlannerError::InvalidAxisValue { axis, value: offset }.into());
        }
        self.position.set_offset(axis, offset);
        Ok(())
    }

    /// Force the tracked position, in machine coordinates.
    ///
    /// Nothing moves. If blocks are still queued a sync block carries the
    /// new position to the step generator in order; otherwise the step
    /// counters are overwritten directly.
    pub fn set_machine_position(&mut self, mm: &AxisArray<f32>) -> Result<()> {
        let steps = self.scaling.position_to_steps(mm)?;
        self.anchor_position(steps, *mm);
        Ok(())
    }

    /// Force the tracked position, in logical coordinates.
    pub fn set_logical_position(&mut self, logical: &AxisArray<f32>) -> Result<()> {
        let machine = self.position.logical_to_machine(logical);
        self.set_machine_position(&machine)
    }

    /// Current machine position of `axis`, from the step generator's
    /// counters.
    pub fn get_axis_position_mm(&self, axis: Axis) -> f32 {
        let steps = self.producer.queue().step_position();
        steps[axis] as f32 * self.scaling.mm_per_step[axis]
    }

    /// Current machine position of every axis, sampled coherently.
    pub fn get_position_mm(&self) -> AxisArray<f32> {
        let steps = self.producer.queue().step_position();
        self.scaling.position_to_mm(&steps)
    }

    /// Reload the tracked position from the step generator's counters.
    pub(crate) fn reset_position(&mut self) {
        let steps = self.producer.queue().step_position();
        let mm = self.scaling.position_to_mm(&steps);
        self.position.set(steps, mm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units::MmPerSec;
    use crate::config::PlannerConfig;
    use crate::planner::{ExtruderState, MoveHints};
    use crate::queue::BlockQueue;
    use crate::stepper::StepGenerator;

    fn noop() {}

    #[test]
    fn test_logical_offsets() {
        let mut pos = Position::at(AxisArray::splat(0), AxisArray::new(10.0, 20.0, 0.0, 0.0));
        pos.set_offset(Axis::X, 5.0);

        assert_eq!(pos.logical_mm()[Axis::X], 15.0);
        assert_eq!(pos.logical_mm()[Axis::Y], 20.0);
        assert_eq!(pos.logical_to_machine(&AxisArray::new(15.0, 0.0, 0.0, 0.0))[Axis::X], 10.0);
    }

    #[test]
    fn test_steps_to_target() {
        let pos = Position::at(AxisArray::new(900, -5, 0, i32::MAX), AxisArray::splat(0.0));
        let deltas = pos.steps_to(&AxisArray::new(1800, 5, 0, i32::MIN));

        assert_eq!(deltas[Axis::X], 900);
        assert_eq!(deltas[Axis::Y], 10);
        assert_eq!(deltas[Axis::E], i32::MIN as i64 - i32::MAX as i64);
    }

    #[test]
    fn test_advance_mm_leaves_steps() {
        let mut pos = Position::at(AxisArray::new(1000, 0, 0, 0), AxisArray::new(10.0, 0.0, 0.0, 0.0));
        pos.advance_mm(AxisArray::new(10.05, 0.0, 0.0, 0.0));

        assert_eq!(pos.steps()[Axis::X], 1000);
        assert_eq!(pos.mm()[Axis::X], 10.05);
    }

    #[test]
    fn test_logical_position_presets_idle_counters() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, _consumer) = queue.split();
        let mut planner = Planner::new(producer, &PlannerConfig::default(), noop as fn()).unwrap();

        planner.set_axis_offset(Axis::X, 5.0).unwrap();
        planner.set_logical_position(&AxisArray::new(15.0, 0.0, 0.0, 0.0)).unwrap();

        assert_eq!(planner.axis_offset(Axis::X), 5.0);
        assert_eq!(planner.machine_position_mm()[Axis::X], 10.0);
        assert_eq!(planner.logical_position_mm()[Axis::X], 15.0);
        assert_eq!(planner.position_steps()[Axis::X], 1000);
        // Nothing queued: the counters are overwritten directly.
        assert_eq!(planner.moves_planned(), 0);
        assert_eq!(planner.queue().step_position()[Axis::X], 1000);
    }

    #[test]
    fn test_logical_position_queues_sync_behind_moves() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, mut consumer) = queue.split();
        let mut planner = Planner::new(producer, &PlannerConfig::default(), noop as fn()).unwrap();
        let mut stepper = StepGenerator::new(1_000_000);

        let target = AxisArray::new(10.0, 0.0, 0.0, 0.0);
        planner
            .append_linear_move(&target, MmPerSec(50.0), &ExtruderState::default(), MoveHints::new())
            .unwrap();

        planner.set_axis_offset(Axis::Y, -2.0).unwrap();
        planner.set_logical_position(&AxisArray::new(28.0, 3.0, 0.0, 0.0)).unwrap();

        assert_eq!(*planner.position_steps(), AxisArray::new(2800, 500, 0, 0));
        assert_eq!(planner.moves_planned(), 2);
        assert!(planner.queue().block(1).is_sync());
        // The counters wait for the sync block.
        assert_eq!(planner.queue().step_position(), AxisArray::new(0, 0, 0, 0));

        stepper.run_until_idle(&mut consumer, 10_000);
        assert_eq!(planner.queue().step_position(), AxisArray::new(2800, 500, 0, 0));
    }

    #[test]
    fn test_non_finite_offset_rejected() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, _consumer) = queue.split();
        let mut planner = Planner::new(producer, &PlannerConfig::default(), noop as fn()).unwrap();

        assert!(planner.set_axis_offset(Axis::Z, f32::NAN).is_err());
        assert_eq!(planner.axis_offset(Axis::Z), 0.0);
    }
}
