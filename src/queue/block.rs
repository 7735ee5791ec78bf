//! Queue blocks.
//!
//! A block is one linear move (or one position sync) in step units. Blocks
//! live in the queue's fixed array and are addressed by index only.

use crate::config::units::{Axis, AxisArray, AXIS_COUNT};
use crate::motion::Trapezoid;

use super::cell::{Cell, ConsumerSide, ProducerSide, Word};

/// What a block asks the step generator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockKind {
    /// Step the axes along a line.
    #[default]
    Move,
    /// Overwrite the step counters with the block's position; no motion.
    Sync,
}

impl Word for BlockKind {
    #[inline]
    fn into_word(self) -> u32 {
        match self {
            BlockKind::Move => 0,
            BlockKind::Sync => 1,
        }
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        if word == 1 {
            BlockKind::Sync
        } else {
            BlockKind::Move
        }
    }
}

/// Work handed back to the caller when a block retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockAction {
    /// Re-arm endstop checking on the given axes (bitmask of [`Axis::bit`])
    /// once the move is done, typically after a homing back-off.
    ReenableEndstops {
        /// Axis mask
        axes: u8,
    },
}

const ACTION_REENABLE_ENDSTOPS: u32 = 1 << 8;

impl Word for Option<BlockAction> {
    #[inline]
    fn into_word(self) -> u32 {
        match self {
            None => 0,
            Some(BlockAction::ReenableEndstops { axes }) => ACTION_REENABLE_ENDSTOPS | axes as u32,
        }
    }

    #[inline]
    fn from_word(word: u32) -> Self {
        match word & !0xFF {
            ACTION_REENABLE_ENDSTOPS => Some(BlockAction::ReenableEndstops { axes: word as u8 }),
            _ => None,
        }
    }
}

/// Integer-only copy of what the step generator needs from a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockSnapshot {
    /// Move or sync.
    pub kind: BlockKind,
    /// Absolute step count per axis.
    pub steps: AxisArray<u32>,
    /// Bit set means the axis moves in the negative direction.
    pub direction_bits: u8,
    /// Steps of the dominant axis.
    pub step_event_count: u32,
    /// Absolute step position written by a sync block.
    pub sync_position: AxisArray<i32>,
    /// Rate profile.
    pub trapezoid: Trapezoid,
    /// Work to report when the block retires.
    pub action: Option<BlockAction>,
}

impl BlockSnapshot {
    /// Signed step delta on one axis.
    pub fn signed_steps(&self, axis: Axis) -> i64 {
        let steps = self.steps[axis] as i64;
        if self.direction_bits & axis.bit() != 0 {
            -steps
        } else {
            steps
        }
    }
}

/// Planner-side speeds of a block, in mm/s and mm/s².
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockSpeeds {
    /// Square of the cruise speed.
    pub nominal_speed_sqr: f32,
    /// Square of the planned entry speed.
    pub entry_speed_sqr: f32,
    /// Square of the junction speed limit.
    pub max_entry_speed_sqr: f32,
    /// Length of the move.
    pub millimeters: f32,
    /// Acceleration along the move.
    pub acceleration: f32,
    /// Long enough to reach nominal speed from the minimum planner speed.
    pub nominal_length: bool,
}

/// One slot of the block queue.
///
/// `busy` belongs to the consumer. Everything else belongs to the producer,
/// which may only change it while the block is not busy. The trapezoid
/// fields are valid iff `recalculate` is clear.
pub struct Block {
    pub(crate) busy: Cell<bool, ConsumerSide>,

    pub(crate) recalculate: Cell<bool, ProducerSide>,
    pub(crate) kind: Cell<BlockKind, ProducerSide>,
    pub(crate) steps: [Cell<u32, ProducerSide>; AXIS_COUNT],
    pub(crate) sync_position: [Cell<i32, ProducerSide>; AXIS_COUNT],
    pub(crate) direction_bits: Cell<u8, ProducerSide>,
    pub(crate) step_event_count: Cell<u32, ProducerSide>,
    pub(crate) action: Cell<Option<BlockAction>, ProducerSide>,

    // trapezoid
    pub(crate) nominal_rate: Cell<u32, ProducerSide>,
    pub(crate) initial_rate: Cell<u32, ProducerSide>,
    pub(crate) cruise_rate: Cell<u32, ProducerSide>,
    pub(crate) final_rate: Cell<u32, ProducerSide>,
    pub(crate) accelerate_until: Cell<u32, ProducerSide>,
    pub(crate) decelerate_after: Cell<u32, ProducerSide>,
    pub(crate) acceleration_steps_per_s2: Cell<u32, ProducerSide>,
    pub(crate) acceleration_time: Cell<u32, ProducerSide>,
    pub(crate) deceleration_time: Cell<u32, ProducerSide>,
    pub(crate) acceleration_time_inverse: Cell<u32, ProducerSide>,
    pub(crate) deceleration_time_inverse: Cell<u32, ProducerSide>,

    // planner-only
    pub(crate) nominal_length: Cell<bool, ProducerSide>,
    pub(crate) nominal_speed_sqr: Cell<f32, ProducerSide>,
    pub(crate) entry_speed_sqr: Cell<f32, ProducerSide>,
    pub(crate) max_entry_speed_sqr: Cell<f32, ProducerSide>,
    pub(crate) millimeters: Cell<f32, ProducerSide>,
    pub(crate) acceleration: Cell<f32, ProducerSide>,
}

impl Block {
    /// An empty block.
    pub const fn new() -> Self {
        Self {
            busy: Cell::zeroed(),
            recalculate: Cell::zeroed(),
            kind: Cell::zeroed(),
            steps: [Cell::zeroed(), Cell::zeroed(), Cell::zeroed(), Cell::zeroed()],
            sync_position: [Cell::zeroed(), Cell::zeroed(), Cell::zeroed(), Cell::zeroed()],
            direction_bits: Cell::zeroed(),
            step_event_count: Cell::zeroed(),
            action: Cell::zeroed(),
            nominal_rate: Cell::zeroed(),
            initial_rate: Cell::zeroed(),
            cruise_rate: Cell::zeroed(),
            final_rate: Cell::zeroed(),
            accelerate_until: Cell::zeroed(),
            decelerate_after: Cell::zeroed(),
            acceleration_steps_per_s2: Cell::zeroed(),
            acceleration_time: Cell::zeroed(),
            deceleration_time: Cell::zeroed(),
            acceleration_time_inverse: Cell::zeroed(),
            deceleration_time_inverse: Cell::zeroed(),
            nominal_length: Cell::zeroed(),
            nominal_speed_sqr: Cell::zeroed(),
            entry_speed_sqr: Cell::zeroed(),
            max_entry_speed_sqr: Cell::zeroed(),
            millimeters: Cell::zeroed(),
            acceleration: Cell::zeroed(),
        }
    }

    /// Claimed by the step generator.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.get_sc()
    }

    /// Trapezoid is stale and must not be executed yet.
    #[inline]
    pub fn needs_recalculation(&self) -> bool {
        self.recalculate.get_sc()
    }

    /// Block kind.
    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind.get()
    }

    /// Shorthand for `kind() == BlockKind::Sync`.
    #[inline]
    pub fn is_sync(&self) -> bool {
        self.kind() == BlockKind::Sync
    }

    /// Planner-side speeds.
    pub fn speeds(&self) -> BlockSpeeds {
        BlockSpeeds {
            nominal_speed_sqr: self.nominal_speed_sqr.get(),
            entry_speed_sqr: self.entry_speed_sqr.get(),
            max_entry_speed_sqr: self.max_entry_speed_sqr.get(),
            millimeters: self.millimeters.get(),
            acceleration: self.acceleration.get(),
            nominal_length: self.nominal_length.get(),
        }
    }

    /// Rate profile as last computed.
    pub fn trapezoid(&self) -> Trapezoid {
        Trapezoid {
            nominal_rate: self.nominal_rate.get(),
            initial_rate: self.initial_rate.get(),
            cruise_rate: self.cruise_rate.get(),
            final_rate: self.final_rate.get(),
            accelerate_until: self.accelerate_until.get(),
            decelerate_after: self.decelerate_after.get(),
            acceleration_steps_per_s2: self.acceleration_steps_per_s2.get(),
            acceleration_time: self.acceleration_time.get(),
            deceleration_time: self.deceleration_time.get(),
            acceleration_time_inverse: self.acceleration_time_inverse.get(),
            deceleration_time_inverse: self.deceleration_time_inverse.get(),
        }
    }

    /// Copy the consumer-visible fields.
    pub fn snapshot(&self) -> BlockSnapshot {
        let mut steps = AxisArray::splat(0u32);
        let mut sync_position = AxisArray::splat(0i32);
        for axis in Axis::ALL {
            steps[axis] = self.steps[axis.index()].get();
            sync_position[axis] = self.sync_position[axis.index()].get();
        }

        BlockSnapshot {
            kind: self.kind(),
            steps,
            direction_bits: self.direction_bits.get(),
            step_event_count: self.step_event_count.get(),
            sync_position,
            trapezoid: self.trapezoid(),
            action: self.action.get(),
        }
    }

    /// Clear a slot taken from the free region.
    pub(crate) fn reset(&self, side: &ProducerSide) {
        self.busy.reclaim(side, false);
        self.recalculate.set(side, false);
        self.kind.set(side, BlockKind::Move);
        for axis in 0..AXIS_COUNT {
            self.steps[axis].set(side, 0);
            self.sync_position[axis].set(side, 0);
        }
        self.direction_bits.set(side, 0);
        self.step_event_count.set(side, 0);
        self.action.set(side, None);
        self.store_trapezoid(side, &Trapezoid::default());
        self.nominal_length.set(side, false);
        self.nominal_speed_sqr.set(side, 0.0);
        self.entry_speed_sqr.set(side, 0.0);
        self.max_entry_speed_sqr.set(side, 0.0);
        self.millimeters.set(side, 0.0);
        self.acceleration.set(side, 0.0);
    }

    pub(crate) fn store_trapezoid(&self, side: &ProducerSide, t: &Trapezoid) {
        self.nominal_rate.set(side, t.nominal_rate);
        self.initial_rate.set(side, t.initial_rate);
        self.cruise_rate.set(side, t.cruise_rate);
        self.final_rate.set(side, t.final_rate);
        self.accelerate_until.set(side, t.accelerate_until);
        self.decelerate_after.set(side, t.decelerate_after);
        self.acceleration_steps_per_s2.set(side, t.acceleration_steps_per_s2);
        self.acceleration_time.set(side, t.acceleration_time);
        self.deceleration_time.set(side, t.deceleration_time);
        self.acceleration_time_inverse.set(side, t.acceleration_time_inverse);
        self.deceleration_time_inverse.set(side, t.deceleration_time_inverse);
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block")
            .field("kind", &self.kind())
            .field("busy", &self.is_busy())
            .field("recalculate", &self.needs_recalculation())
            .field("step_event_count", &self.step_event_count.get())
            .field("speeds", &self.speeds())
            .finish()
    }
}
