//! Reference step generator.
//!
//! [`StepGenerator`] is the consumer side of the block queue: it claims
//! blocks, issues their step events one tick at a time and retires them.
//! It works from [`BlockSnapshot`](crate::queue::BlockSnapshot) integers
//! only, so it can run from a timer interrupt. [`StepPins`] turns its
//! pulses into STEP/DIR pin levels.

mod pins;

pub use pins::{AxisPins, StepPins};

use crate::config::units::AxisArray;
use crate::motion::{BlockExecutor, MotionPhase, StepPulse};
use crate::queue::{BlockAction, BlockKind, Consumer};

/// Outcome of one [`StepGenerator::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepEvent {
    /// Nothing to execute this tick.
    Idle,
    /// A quick stop is in progress; every block was dropped.
    Aborted,
    /// A sync block overwrote the step counters with this position.
    Synced(AxisArray<i32>),
    /// One step event of the current block.
    Step(StepPulse),
    /// The current block finished. Carries its last pulse, if any, and the
    /// action attached to it.
    Retired {
        /// Last step event of the block
        pulse: Option<StepPulse>,
        /// Action to carry out now that the block is done
        action: Option<BlockAction>,
    },
}

/// Executes queued blocks step by step.
#[derive(Debug, Clone)]
pub struct StepGenerator {
    timer_hz: u32,
    executor: Option<BlockExecutor>,
    action: Option<BlockAction>,
}

impl StepGenerator {
    /// Create a generator for a step timer running at `timer_hz`.
    pub const fn new(timer_hz: u32) -> Self {
        Self {
            timer_hz,
            executor: None,
            action: None,
        }
    }

    /// Step timer frequency.
    #[inline]
    pub fn timer_hz(&self) -> u32 {
        self.timer_hz
    }

    /// A block is being executed.
    #[inline]
    pub fn is_executing(&self) -> bool {
        self.executor.is_some()
    }

    /// Phase of the block being executed.
    pub fn phase(&self) -> MotionPhase {
        self.executor
            .as_ref()
            .map(|e| e.phase())
            .unwrap_or(MotionPhase::Complete)
    }

    /// Run one step event.
    ///
    /// Never waits: with nothing claimable this tick (empty queue, or a
    /// block the planner is still rewriting) it returns
    /// [`StepEvent::Idle`].
    pub fn tick<const N: usize>(&mut self, consumer: &mut Consumer<'_, N>) -> StepEvent {
        let acknowledging = consumer.queue().abort_pending();
        if consumer.flush_for_abort() {
            self.executor = None;
            self.action = None;
            if acknowledging {
                info!("quick stop acknowledged");
            }
            return StepEvent::Aborted;
        }

        if self.executor.is_none() {
            let Some((index, snapshot)) = consumer.claim_next_block() else {
                return StepEvent::Idle;
            };
            match snapshot.kind {
                BlockKind::Sync => {
                    consumer.apply_sync(&snapshot.sync_position);
                    consumer.discard_current_block();
                    trace!("sync block {} applied", index);
                    return StepEvent::Synced(snapshot.sync_position);
                }
                BlockKind::Move => {
                    trace!("block {} claimed, {} events", index, snapshot.step_event_count);
                    self.action = snapshot.action;
                    self.executor = Some(BlockExecutor::new(&snapshot, self.timer_hz));
                }
            }
        }

        let Some(executor) = self.executor.as_mut() else {
            return StepEvent::Idle;
        };

        let pulse = executor.next_pulse();
        if let Some(pulse) = &pulse {
            consumer.record_steps(&pulse.deltas());
        }

        if executor.is_complete() {
            self.executor = None;
            consumer.discard_current_block();
            return StepEvent::Retired {
                pulse,
                action: self.action.take(),
            };
        }

        pulse.map_or(StepEvent::Idle, StepEvent::Step)
    }

    /// Tick until the queue is empty, at most `max_ticks` times. Returns the
    /// number of ticks that did something.
    ///
    /// Host-side helper for simulations and tests.
    pub fn run_until_idle<const N: usize>(&mut self, consumer: &mut Consumer<'_, N>, max_ticks: usize) -> usize {
        let mut busy = 0;
        for _ in 0..max_ticks {
            match self.tick(consumer) {
                StepEvent::Idle | StepEvent::Aborted => {
                    if !consumer.queue().has_blocks_queued() {
                        break;
                    }
                }
                _ => busy += 1,
            }
        }
        busy
    }
}
