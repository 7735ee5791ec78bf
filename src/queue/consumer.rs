//! Step generator endpoint of the block queue.

use core::sync::atomic::Ordering;

use crate::config::units::AxisArray;

use super::block::BlockSnapshot;
use super::cell::ConsumerSide;
use super::ring::BlockQueue;

/// Consumer endpoint of a split [`BlockQueue`].
///
/// Meant to be driven from the step timer interrupt (or a dedicated
/// thread). Every method is wait-free.
pub struct Consumer<'q, const N: usize> {
    queue: &'q BlockQueue<N>,
    side: ConsumerSide,
}

impl<'q, const N: usize> Consumer<'q, N> {
    pub(crate) fn new(queue: &'q BlockQueue<N>, side: ConsumerSide) -> Self {
        Self { queue, side }
    }

    /// The shared queue.
    #[inline]
    pub fn queue(&self) -> &'q BlockQueue<N> {
        self.queue
    }

    /// Index of the block being executed, if any.
    pub fn current_block(&self) -> Option<usize> {
        let tail = self.queue.tail.get();
        (tail != self.queue.nonbusy.get()).then_some(tail)
    }

    /// Claim the next committed block for execution.
    ///
    /// Returns `None` when the queue is empty, a quick stop is running, or
    /// the planner is still rewriting the block's trapezoid. In the last
    /// case simply try again on the next tick.
    pub fn claim_next_block(&mut self) -> Option<(usize, BlockSnapshot)> {
        if self.queue.is_draining() {
            return None;
        }

        let index = self.queue.nonbusy.get();
        if index == self.queue.head.get_sc() {
            return None;
        }

        let block = self.queue.block(index);
        block.busy.set_sc(&self.side, true);
        if block.recalculate.get_sc() {
            block.busy.set_sc(&self.side, false);
            return None;
        }

        let snapshot = block.snapshot();
        let next = BlockQueue::<N>::next_block_index(index);
        // The planner may have moved `planned` already; only push it if it
        // still points at the block just claimed.
        let _ = self
            .queue
            .planned
            .compare_exchange(index, next, Ordering::SeqCst, Ordering::SeqCst);
        self.queue.nonbusy.set_sc(&self.side, next);

        Some((index, snapshot))
    }

    /// Retire the block being executed, freeing its slot.
    ///
    /// Returns `false` if no block was claimed.
    pub fn discard_current_block(&mut self) -> bool {
        let tail = self.queue.tail.get();
        if tail == self.queue.nonbusy.get() {
            return false;
        }
        self.queue
            .tail
            .set_sc(&self.side, BlockQueue::<N>::next_block_index(tail));
        true
    }

    /// Add signed step deltas to the step counters.
    pub fn record_steps(&mut self, deltas: &AxisArray<i32>) {
        self.queue.counters.add(&self.side, deltas);
    }

    /// Overwrite the step counters, as a sync block does.
    pub fn apply_sync(&mut self, position: &AxisArray<i32>) {
        self.queue.counters.overwrite(&self.side, position);
    }

    /// Carry out a pending quick stop.
    ///
    /// While the queue is draining every live block is dropped and the
    /// request is acknowledged. Returns `true` if the caller must abandon
    /// whatever block it was executing.
    pub fn flush_for_abort(&mut self) -> bool {
        if !self.queue.is_draining() {
            return false;
        }

        let head = self.queue.head.get_sc();
        self.queue.planned.store(head, Ordering::SeqCst);
        self.queue.nonbusy.set_sc(&self.side, head);
        self.queue.tail.set_sc(&self.side, head);
        self.queue
            .stop_acks
            .set_sc(&self.side, self.queue.quick_stop_count());
        true
    }
}
