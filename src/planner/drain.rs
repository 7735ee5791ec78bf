//! Quick stop and the drain lifecycle.
//!
//! A quick stop is requested through the queue (from the planner or from a
//! [`QuickStop`] handle held elsewhere) and carried out by the step
//! generator on its next tick. Until [`Planner::resume_queuing`] is called
//! every new move is dropped.

use crate::motion::JunctionLimit;
use crate::queue::QuickStop;

use super::idle::Idle;
use super::Planner;

/// Admission state of the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueState {
    /// Moves are queued normally.
    Normal,
    /// A quick stop is in progress; moves are dropped.
    Draining,
    /// The queue is being run empty on purpose.
    EmptyWait,
}

impl<'q, I: Idle, const N: usize> Planner<'q, I, N> {
    /// Current admission state.
    pub fn queue_state(&self) -> QueueState {
        let queue = self.producer.queue();
        if queue.is_draining() {
            QueueState::Draining
        } else if queue.is_emptying() {
            QueueState::EmptyWait
        } else {
            QueueState::Normal
        }
    }

    /// Abort all motion as soon as possible.
    ///
    /// The step generator drops every queued block on its next tick. The
    /// planner drops new moves until [`resume_queuing`](Self::resume_queuing).
    pub fn quick_stop(&mut self) {
        self.producer.quick_stop_handle().trigger();
        warn!("quick stop requested");
    }

    /// A handle that can trigger a quick stop without access to the planner.
    pub fn quick_stop_handle(&self) -> QuickStop<'q, N> {
        self.producer.quick_stop_handle()
    }

    /// Leave the draining state once the step generator has flushed.
    ///
    /// Waits (calling the idle hook) for the stop to be acknowledged. The
    /// tracked position is reloaded from the step counters, unless it was
    /// set explicitly while draining, in which case the counters are
    /// overwritten with it. The next move starts from rest.
    pub fn resume_queuing(&mut self) {
        let queue = self.producer.queue();
        if !queue.is_draining() {
            return;
        }

        while queue.abort_pending() || queue.has_blocks_queued() {
            self.idle.idle();
        }

        self.junction.reset();
        if self.position_override {
            self.producer.preset_step_position(self.position.steps());
            self.position_override = false;
        } else {
            self.reset_position();
        }
        self.producer.clear_draining();

        info!("queue resumed after {} quick stops", queue.quick_stop_count());
    }

    /// Wait until every queued block has been executed.
    ///
    /// Returns at once while draining: the position is meaningless until
    /// the queue has been resumed.
    pub fn synchronize(&mut self) {
        while self.is_busy() {
            self.idle.idle();
        }
    }

    /// Motion is queued or in progress, and no quick stop is running.
    #[inline]
    pub fn is_busy(&self) -> bool {
        !self.is_draining() && self.is_processing()
    }

    /// A quick stop is in progress.
    #[inline]
    pub fn is_draining(&self) -> bool {
        self.producer.queue().is_draining()
    }

    /// Blocks are queued, or a quick stop has not been acknowledged yet.
    #[inline]
    pub fn is_processing(&self) -> bool {
        self.producer.queue().is_processing()
    }

    /// Mark the queue as being emptied on purpose.
    pub fn set_emptying(&mut self, emptying: bool) {
        self.producer.set_emptying(emptying);
    }

    /// The queue is draining or being emptied on purpose.
    #[inline]
    pub fn is_emptying(&self) -> bool {
        self.producer.queue().is_emptying()
    }

    /// Quick stops requested since the queue was split.
    #[inline]
    pub fn quick_stop_count(&self) -> u32 {
        self.producer.queue().quick_stop_count()
    }

    /// Run the queue empty, without aborting anything.
    pub fn wait_for_empty_queue(&mut self) {
        self.set_emptying(true);
        self.synchronize();
        self.set_emptying(false);
    }
}
