//! Fixed-capacity block ring shared by the planner and the step generator.
//!
//! Four indices partition the ring:
//!
//! ```text
//!  tail ........ nonbusy ........ planned ........ head
//!  |  executing  |  committed,    |  entry speed   |  free
//!  |  (busy)     |  settled       |  may change    |
//! ```
//!
//! `tail` and `nonbusy` are advanced only by the consumer, `head` only by
//! the producer. `planned` is pushed forward by both: by the producer when
//! a block's entry speed can no longer change, and by the consumer when it
//! claims the block `planned` points at. One slot always stays empty so a
//! full ring can be told apart from an empty one.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::config::units::{Axis, AxisArray, AXIS_COUNT};

use super::block::Block;
use super::cell::{Cell, ConsumerSide, ProducerSide};
use super::consumer::Consumer;

/// The block ring and its shared control state.
///
/// Create it once (it can live in a `static` since [`BlockQueue::new`] is
/// `const`), then [`split`](BlockQueue::split) it into the planner's
/// [`Producer`] and the step generator's [`Consumer`]. Both handles borrow
/// the queue; dropping them releases it, after which it can be split again
/// to start over from an empty ring.
pub struct BlockQueue<const N: usize> {
    blocks: [Block; N],
    pub(crate) head: Cell<usize, ProducerSide>,
    pub(crate) tail: Cell<usize, ConsumerSide>,
    pub(crate) nonbusy: Cell<usize, ConsumerSide>,
    pub(crate) planned: AtomicUsize,
    pub(crate) emptying: Cell<bool, ProducerSide>,
    draining: AtomicBool,
    stop_requests: AtomicU32,
    pub(crate) stop_acks: Cell<u32, ConsumerSide>,
    pub(crate) counters: StepCounters,
}

impl<const N: usize> BlockQueue<N> {
    const VALID_CAPACITY: () = assert!(
        N.is_power_of_two() && N >= 4,
        "block queue capacity must be a power of two >= 4"
    );

    const MASK: usize = N - 1;

    /// An empty queue.
    pub const fn new() -> Self {
        let () = Self::VALID_CAPACITY;
        Self {
            blocks: [const { Block::new() }; N],
            head: Cell::zeroed(),
            tail: Cell::zeroed(),
            nonbusy: Cell::zeroed(),
            planned: AtomicUsize::new(0),
            emptying: Cell::zeroed(),
            draining: AtomicBool::new(false),
            stop_requests: AtomicU32::new(0),
            stop_acks: Cell::zeroed(),
            counters: StepCounters::new(),
        }
    }

    /// Reset to empty and hand out the two endpoint handles.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        *self = Self::new();
        let queue: &Self = self;
        (
            Producer {
                queue,
                side: ProducerSide::new(),
            },
            Consumer::new(queue, ConsumerSide::new()),
        )
    }

    /// Number of slots, one of which is always empty.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Index following `index`, with wraparound.
    #[inline]
    pub const fn next_block_index(index: usize) -> usize {
        (index + 1) & Self::MASK
    }

    /// Index preceding `index`, with wraparound.
    #[inline]
    pub const fn prev_block_index(index: usize) -> usize {
        index.wrapping_sub(1) & Self::MASK
    }

    /// Block at `index` (taken modulo the capacity).
    #[inline]
    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index & Self::MASK]
    }

    /// Next free slot.
    #[inline]
    pub fn head(&self) -> usize {
        self.head.get_sc()
    }

    /// Oldest live block.
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail.get_sc()
    }

    /// First block not yet claimed by the consumer.
    #[inline]
    pub fn nonbusy(&self) -> usize {
        self.nonbusy.get_sc()
    }

    /// First block whose entry speed may still change.
    #[inline]
    pub fn planned(&self) -> usize {
        self.planned.load(Ordering::SeqCst)
    }

    /// Live blocks, busy ones included.
    #[inline]
    pub fn moves_planned(&self) -> usize {
        self.head().wrapping_sub(self.tail()) & Self::MASK
    }

    /// Blocks the consumer has not claimed yet.
    #[inline]
    pub fn nonbusy_moves_planned(&self) -> usize {
        self.head().wrapping_sub(self.nonbusy()) & Self::MASK
    }

    /// Free slots.
    #[inline]
    pub fn moves_free(&self) -> usize {
        N - 1 - self.moves_planned()
    }

    /// No free slot left.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.tail() == Self::next_block_index(self.head())
    }

    /// At least one live block.
    #[inline]
    pub fn has_blocks_queued(&self) -> bool {
        self.head() != self.tail()
    }

    /// At least one block the consumer has not claimed.
    #[inline]
    pub fn has_unprocessed_blocks_queued(&self) -> bool {
        self.head() != self.nonbusy()
    }

    /// A quick stop is in progress.
    #[inline]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Draining, or deliberately waiting for the queue to run empty.
    #[inline]
    pub fn is_emptying(&self) -> bool {
        self.emptying.get() || self.is_draining()
    }

    /// Quick stops requested since the queue was split.
    #[inline]
    pub fn quick_stop_count(&self) -> u32 {
        self.stop_requests.load(Ordering::SeqCst)
    }

    /// A quick stop the consumer has not acknowledged yet.
    #[inline]
    pub fn abort_pending(&self) -> bool {
        self.stop_requests.load(Ordering::SeqCst) != self.stop_acks.get_sc()
    }

    /// Blocks queued, or a stop still being carried out.
    #[inline]
    pub fn is_processing(&self) -> bool {
        self.has_blocks_queued() || self.abort_pending()
    }

    /// Step counters of the consumer, sampled coherently.
    pub fn step_position(&self) -> AxisArray<i32> {
        self.counters.sample()
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        self.draining.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_draining(&self, _side: &ProducerSide) {
        self.draining.store(false, Ordering::SeqCst);
    }
}

impl<const N: usize> Default for BlockQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of asking for the slot at `head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FreeSlot {
    Ready(usize),
    Full,
    Draining,
}

/// Planner endpoint of a split [`BlockQueue`].
pub struct Producer<'q, const N: usize> {
    queue: &'q BlockQueue<N>,
    side: ProducerSide,
}

impl<'q, const N: usize> Producer<'q, N> {
    /// The shared queue.
    #[inline]
    pub fn queue(&self) -> &'q BlockQueue<N> {
        self.queue
    }

    /// A handle that can trigger a quick stop from any context.
    pub fn quick_stop_handle(&self) -> QuickStop<'q, N> {
        QuickStop { queue: self.queue }
    }

    #[inline]
    pub(crate) fn side(&self) -> &ProducerSide {
        &self.side
    }

    #[inline]
    pub(crate) fn block(&self, index: usize) -> &'q Block {
        self.queue.block(index)
    }

    /// The slot at `head`, cleared, if one is free and no stop is running.
    pub(crate) fn try_next_free_block(&self) -> FreeSlot {
        if self.queue.is_draining() {
            return FreeSlot::Draining;
        }
        if self.queue.moves_free() == 0 {
            return FreeSlot::Full;
        }
        let index = self.queue.head();
        self.queue.block(index).reset(&self.side);
        FreeSlot::Ready(index)
    }

    /// Hand a populated block to the consumer.
    pub(crate) fn commit(&self, index: usize) {
        self.queue
            .head
            .set_sc(&self.side, BlockQueue::<N>::next_block_index(index));
    }

    /// Flag `index` for trapezoid recalculation before touching the block
    /// after it.
    ///
    /// Returns `false` if the consumer already owns the block; the caller
    /// must then leave its neighbour alone, and the flag is cleared again
    /// since the block runs with the trapezoid it was claimed with.
    ///
    /// A block whose flag was already set cannot have been claimed: the
    /// consumer backs off a flagged block. A busy bit seen then belongs to a
    /// claim that is about to back off, so the block stays ours.
    pub(crate) fn mark_for_recalculation(&self, index: usize) -> bool {
        let block = self.queue.block(index);
        if block.recalculate.swap_sc(&self.side, true) {
            return true;
        }
        if block.busy.get_sc() {
            block.recalculate.set_sc(&self.side, false);
            false
        } else {
            true
        }
    }

    /// Move `planned` forward to `index`.
    ///
    /// Ignored if the consumer has already pushed `planned` to or past it.
    pub(crate) fn advance_planned(&self, index: usize) {
        let head = self.queue.head();
        let _ = self
            .queue
            .planned
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let ahead = index.wrapping_sub(current) & BlockQueue::<N>::MASK;
                let window = head.wrapping_sub(current) & BlockQueue::<N>::MASK;
                (ahead != 0 && ahead <= window).then_some(index)
            });
    }

    pub(crate) fn set_emptying(&self, emptying: bool) {
        self.queue.emptying.set(&self.side, emptying);
    }

    pub(crate) fn clear_draining(&self) {
        self.queue.clear_draining(&self.side);
    }

    /// Overwrite the step counters. Only valid while nothing is queued.
    pub(crate) fn preset_step_position(&self, position: &AxisArray<i32>) {
        self.queue.counters.preset(&self.side, position);
    }
}

/// Triggers a quick stop.
///
/// Cheap to copy and safe to use from any context, including an interrupt
/// handler watching an endstop.
#[derive(Clone, Copy)]
pub struct QuickStop<'q, const N: usize> {
    queue: &'q BlockQueue<N>,
}

impl<const N: usize> QuickStop<'_, N> {
    /// Ask the step generator to abort and the planner to stop queuing.
    pub fn trigger(&self) {
        self.queue.request_stop();
    }

    /// A quick stop is in progress.
    pub fn is_draining(&self) -> bool {
        self.queue.is_draining()
    }
}

/// Consumer step counters, readable from the producer without tearing.
///
/// The sequence word is odd while a write is in progress.
pub(crate) struct StepCounters {
    seq: Cell<u32, ConsumerSide>,
    position: [Cell<i32, ConsumerSide>; AXIS_COUNT],
}

impl StepCounters {
    const fn new() -> Self {
        Self {
            seq: Cell::zeroed(),
            position: [Cell::zeroed(), Cell::zeroed(), Cell::zeroed(), Cell::zeroed()],
        }
    }

    pub(crate) fn add(&self, side: &ConsumerSide, deltas: &AxisArray<i32>) {
        let seq = self.seq.get();
        self.seq.set_sc(side, seq.wrapping_add(1));
        for axis in Axis::ALL {
            let cell = &self.position[axis.index()];
            cell.set_sc(side, cell.get().wrapping_add(deltas[axis]));
        }
        self.seq.set_sc(side, seq.wrapping_add(2));
    }

    pub(crate) fn overwrite(&self, side: &ConsumerSide, position: &AxisArray<i32>) {
        let seq = self.seq.get();
        self.seq.set_sc(side, seq.wrapping_add(1));
        for axis in Axis::ALL {
            self.position[axis.index()].set_sc(side, position[axis]);
        }
        self.seq.set_sc(side, seq.wrapping_add(2));
    }

    fn preset(&self, side: &ProducerSide, position: &AxisArray<i32>) {
        let seq = self.seq.get();
        self.seq.reclaim(side, seq.wrapping_add(1));
        for axis in Axis::ALL {
            self.position[axis.index()].reclaim(side, position[axis]);
        }
        self.seq.reclaim(side, seq.wrapping_add(2));
    }

    fn sample(&self) -> AxisArray<i32> {
        loop {
            let before = self.seq.get_sc();
            if before & 1 == 1 {
                core::hint::spin_loop();
                continue;
            }
            let mut position = AxisArray::splat(0);
            for axis in Axis::ALL {
                position[axis] = self.position[axis.index()].get_sc();
            }
            if self.seq.get_sc() == before {
                return position;
            }
        }
    }
}
