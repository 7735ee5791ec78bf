//! Lookahead: entry speed optimisation over the unsettled part of the queue.
//!
//! Runs after every committed move. The reverse pass walks from the newest
//! block back to `planned`, raising each entry speed as far as the block can
//! still brake to its successor's entry speed. The forward pass walks back
//! up, lowering entry speeds the previous block cannot accelerate to, and
//! moves `planned` past blocks that can no longer improve. Finally the
//! trapezoids of every block whose entry or exit speed changed are rebuilt.
//!
//! The step generator claims blocks concurrently. Before a block's entry
//! speed changes, the block before it (whose exit speed that is) is flagged
//! for recalculation; if the step generator got to it first, the change is
//! dropped and the flag cleared. Losing that race only costs speed, never
//! safety. A block still flagged from its commit cannot be lost this way,
//! which is what lets the newest block always get its trapezoid.

use libm::sqrtf;

use crate::motion::{calculate_trapezoid, max_allowable_speed_sqr};
use crate::queue::{Block, BlockQueue, Producer};

/// Re-plan the queue after a block has been committed.
pub(crate) fn recalculate<const N: usize>(producer: &Producer<'_, N>, minimum_planner_speed: f32, timer_hz: u32) {
    let queue = producer.queue();
    // With a single unsettled block there is no junction to optimise.
    if BlockQueue::<N>::prev_block_index(queue.head()) != queue.planned() {
        reverse_pass(producer, minimum_planner_speed * minimum_planner_speed);
        forward_pass(producer);
    }
    recalculate_trapezoids(producer, minimum_planner_speed, timer_hz);
}

/// Raise the entry speed of `current` as far as it can still brake to the
/// entry speed of `next` (or to the minimum planner speed at the end of the
/// queue). `previous` is the move block before `current`.
fn reverse_kernel<const N: usize>(
    producer: &Producer<'_, N>,
    previous: usize,
    current: usize,
    next: Option<usize>,
    min_speed_sqr: f32,
) {
    let block = producer.block(current);
    let next = next.map(|index| producer.block(index));

    let entry_speed_sqr = block.entry_speed_sqr.get();
    let max_entry_speed_sqr = block.max_entry_speed_sqr.get();
    if entry_speed_sqr == max_entry_speed_sqr && !next.is_some_and(Block::needs_recalculation) {
        return;
    }

    // A nominal-length block reaches its maximum junction speed whatever
    // its neighbours do.
    let new_entry_speed_sqr = if block.nominal_length.get() {
        max_entry_speed_sqr
    } else {
        let exit_speed_sqr = next.map_or(min_speed_sqr, |b| b.entry_speed_sqr.get());
        max_entry_speed_sqr.min(max_allowable_speed_sqr(
            -block.acceleration.get(),
            exit_speed_sqr,
            block.millimeters.get(),
        ))
    };

    if entry_speed_sqr != new_entry_speed_sqr {
        if producer.mark_for_recalculation(previous) {
            block.recalculate.set_sc(producer.side(), true);
            block.entry_speed_sqr.set(producer.side(), new_entry_speed_sqr);
        } else {
            trace!("reverse pass lost block {} to the step generator", previous);
        }
    }
}

fn reverse_pass<const N: usize>(producer: &Producer<'_, N>, min_speed_sqr: f32) {
    let queue = producer.queue();

    let mut current_index = queue.head();
    let mut prev_index = BlockQueue::<N>::prev_block_index(current_index);
    // The step generator may push `planned` while we walk; follow it.
    let mut planned_index = queue.planned();

    let mut next: Option<usize> = None;
    let mut current: Option<usize> = None;
    while current_index != planned_index {
        let previous = producer.block(prev_index);

        if !previous.is_sync() {
            // A busy previous block has a fixed exit speed, so `current`
            // cannot change its entry speed either.
            if let Some(current) = current {
                if !previous.is_busy() {
                    reverse_kernel(producer, prev_index, current, next, min_speed_sqr);
                }
            }
            next = current;
            current = Some(prev_index);
            current_index = prev_index;
        }

        if prev_index == planned_index {
            break;
        }
        prev_index = BlockQueue::<N>::prev_block_index(prev_index);

        while planned_index != queue.planned() {
            // The block the step generator claimed is busy: nothing left
            // to change.
            if prev_index == planned_index {
                return;
            }
            planned_index = BlockQueue::<N>::next_block_index(planned_index);
        }
    }
}

/// Cap the entry speed of `current` to what `previous` can accelerate to,
/// and settle `planned` where nothing can improve any more.
fn forward_kernel<const N: usize>(producer: &Producer<'_, N>, previous: usize, current: usize) {
    let prev = producer.block(previous);
    let block = producer.block(current);

    let prev_entry_speed_sqr = prev.entry_speed_sqr.get();
    if !prev.nominal_length.get() && prev_entry_speed_sqr < block.entry_speed_sqr.get() {
        let new_entry_speed_sqr = max_allowable_speed_sqr(
            -prev.acceleration.get(),
            prev_entry_speed_sqr,
            prev.millimeters.get(),
        );

        if new_entry_speed_sqr < block.entry_speed_sqr.get() {
            if producer.mark_for_recalculation(previous) {
                block.recalculate.set_sc(producer.side(), true);
                // Never above the maximum; the reverse pass started there.
                block.entry_speed_sqr.set(producer.side(), new_entry_speed_sqr);
                producer.advance_planned(previous);
            } else {
                trace!("forward pass lost block {} to the step generator", previous);
            }
        }
    }

    // A block entered at its maximum speed brackets an optimal plan.
    if block.entry_speed_sqr.get() == block.max_entry_speed_sqr.get() {
        producer.advance_planned(previous);
    }
}

fn forward_pass<const N: usize>(producer: &Producer<'_, N>) {
    let queue = producer.queue();
    let head = queue.head();

    let mut index = queue.planned();
    let mut previous: Option<usize> = None;
    while index != head {
        if !producer.block(index).is_sync() {
            if let Some(previous) = previous {
                if !producer.block(previous).is_busy() {
                    forward_kernel(producer, previous, index);
                }
            }
            previous = Some(index);
        }
        index = BlockQueue::<N>::next_block_index(index);
    }
}

/// Rebuild the rate profile of every block flagged for recalculation, and
/// always of the newest block, which ends at the minimum planner speed.
fn recalculate_trapezoids<const N: usize>(producer: &Producer<'_, N>, minimum_planner_speed: f32, timer_hz: u32) {
    let queue = producer.queue();
    // Tail first: it never passes nonbusy, so the walk below stays inside
    // the live window.
    let tail = queue.tail();
    let mut index = queue.nonbusy();
    let mut head = queue.head();

    // Start from the running move, if any, to know the first entry speed.
    while index != tail {
        index = BlockQueue::<N>::prev_block_index(index);
        let block = producer.block(index);
        if block.is_busy() && !block.is_sync() {
            break;
        }
    }

    // Trailing sync blocks do not count as the newest move.
    while head != index {
        let prev = BlockQueue::<N>::prev_block_index(head);
        if !producer.block(prev).is_sync() {
            break;
        }
        head = prev;
    }

    let mut current: Option<&Block> = None;
    let mut current_entry_speed = 0.0f32;
    while index != head {
        let next = producer.block(index);
        if !next.is_sync() {
            let next_entry_speed = sqrtf(next.entry_speed_sqr.get());
            if let Some(block) = current {
                if block.needs_recalculation() {
                    rebuild_trapezoid(producer, block, current_entry_speed, next_entry_speed, timer_hz);
                    // From here on the step generator may take it.
                    block.recalculate.set_sc(producer.side(), false);
                }
            }
            current = Some(next);
            current_entry_speed = next_entry_speed;
        }
        index = BlockQueue::<N>::next_block_index(index);
    }

    if let Some(block) = current {
        let newest = BlockQueue::<N>::prev_block_index(head);
        if producer.mark_for_recalculation(newest) {
            rebuild_trapezoid(producer, block, current_entry_speed, minimum_planner_speed, timer_hz);
            block.recalculate.set_sc(producer.side(), false);
        } else {
            trace!("newest block {} already running", newest);
        }
    }
}

fn rebuild_trapezoid<const N: usize>(
    producer: &Producer<'_, N>,
    block: &Block,
    entry_speed: f32,
    exit_speed: f32,
    timer_hz: u32,
) {
    let inverse_nominal = 1.0 / sqrtf(block.nominal_speed_sqr.get());
    let trapezoid = calculate_trapezoid(
        block.step_event_count.get(),
        block.nominal_rate.get(),
        block.acceleration_steps_per_s2.get() as f32,
        entry_speed * inverse_nominal,
        exit_speed * inverse_nominal,
        timer_hz,
    );
    block.store_trapezoid(producer.side(), &trapezoid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::cell::ConsumerSide;
    use crate::queue::FreeSlot;

    const MIN_SPEED: f32 = 0.05;
    const TIMER_HZ: u32 = 1_000_000;

    /// Commit a 100 steps/mm X move the way ingestion would and re-plan.
    fn push<const N: usize>(producer: &Producer<'_, N>, millimeters: f32, speed: f32, max_entry_speed_sqr: f32) {
        commit(producer, millimeters, speed, max_entry_speed_sqr);
        recalculate(producer, MIN_SPEED, TIMER_HZ);
    }

    /// Commit a 100 steps/mm X move, flagged for recalculation, without
    /// re-planning.
    fn commit<const N: usize>(producer: &Producer<'_, N>, millimeters: f32, speed: f32, max_entry_speed_sqr: f32) {
        let index = match producer.try_next_free_block() {
            FreeSlot::Ready(index) => index,
            other => panic!("unexpected {:?}", other),
        };
        let side = producer.side();
        let block = producer.block(index);
        let acceleration = 1000.0;
        let steps = (millimeters * 100.0) as u32;

        block.steps[0].set(side, steps);
        block.step_event_count.set(side, steps);
        block.nominal_rate.set(side, (speed * 100.0) as u32);
        block.acceleration_steps_per_s2.set(side, (acceleration * 100.0) as u32);
        block.acceleration.set(side, acceleration);
        block.millimeters.set(side, millimeters);
        block.nominal_speed_sqr.set(side, speed * speed);
        block.max_entry_speed_sqr.set(side, max_entry_speed_sqr);
        block
            .entry_speed_sqr
            .set(side, (MIN_SPEED * MIN_SPEED).min(max_entry_speed_sqr));
        let v_allowable = max_allowable_speed_sqr(-acceleration, MIN_SPEED * MIN_SPEED, millimeters);
        block.nominal_length.set(side, speed * speed <= v_allowable);
        block.recalculate.set(side, true);

        producer.commit(index);
    }

    fn entry_speeds<const N: usize>(producer: &Producer<'_, N>, count: usize) -> [f32; 8] {
        let mut speeds = [0.0; 8];
        for (i, speed) in speeds.iter_mut().enumerate().take(count) {
            *speed = producer.block(i).speeds().entry_speed_sqr;
        }
        speeds
    }

    #[test]
    fn test_colinear_moves_enter_at_nominal() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, _consumer) = queue.split();

        push(&producer, 10.0, 100.0, MIN_SPEED * MIN_SPEED);
        push(&producer, 10.0, 100.0, 10_000.0);
        push(&producer, 10.0, 100.0, 10_000.0);

        let speeds = entry_speeds(&producer, 3);
        assert_eq!(speeds[1], 10_000.0);
        assert_eq!(speeds[2], 10_000.0);
        for i in 0..3 {
            assert!(!producer.block(i).needs_recalculation());
        }
        // The last block brakes to the minimum planner speed.
        assert_eq!(producer.block(2).trapezoid().final_rate, crate::motion::MINIMAL_STEP_RATE);
    }

    #[test]
    fn test_short_moves_limited_by_braking_distance() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, _consumer) = queue.split();

        push(&producer, 0.5, 100.0, MIN_SPEED * MIN_SPEED);
        push(&producer, 0.5, 100.0, 10_000.0);

        // v² = 0.0025 + 2 * 1000 * 0.5
        let speeds = entry_speeds(&producer, 2);
        assert!((speeds[1] - 1000.0025).abs() < 0.01);
        assert!(speeds[1] <= producer.block(1).speeds().max_entry_speed_sqr);
    }

    #[test]
    fn test_replanning_is_idempotent() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, _consumer) = queue.split();

        push(&producer, 0.4, 80.0, MIN_SPEED * MIN_SPEED);
        push(&producer, 2.0, 120.0, 3_000.0);
        push(&producer, 0.2, 60.0, 3_600.0);
        push(&producer, 5.0, 100.0, 900.0);

        let before = entry_speeds(&producer, 4);
        recalculate(&producer, MIN_SPEED, TIMER_HZ);
        recalculate(&producer, MIN_SPEED, TIMER_HZ);
        assert_eq!(entry_speeds(&producer, 4), before);
    }

    #[test]
    fn test_busy_previous_block_freezes_entry_speed() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, mut consumer) = queue.split();

        push(&producer, 10.0, 100.0, MIN_SPEED * MIN_SPEED);
        assert!(consumer.claim_next_block().is_some());
        push(&producer, 10.0, 100.0, 10_000.0);

        // The running block was planned to stop, so the next one must
        // start from the minimum speed.
        assert_eq!(entry_speeds(&producer, 2)[1], MIN_SPEED * MIN_SPEED);
        assert!(!producer.block(1).needs_recalculation());
        assert!(consumer.claim_next_block().is_some());
    }

    #[test]
    fn test_entry_speeds_never_exceed_maximum() {
        let mut queue: BlockQueue<16> = BlockQueue::new();
        let (producer, _consumer) = queue.split();

        push(&producer, 1.0, 50.0, MIN_SPEED * MIN_SPEED);
        for (mm, speed, max) in [(3.0, 150.0, 2_500.0), (0.1, 20.0, 400.0), (7.0, 90.0, 400.0), (0.3, 90.0, 8_100.0)] {
            push(&producer, mm, speed, max);
        }

        for i in 0..5 {
            let s = producer.block(i).speeds();
            assert!(s.entry_speed_sqr >= 0.0);
            assert!(s.entry_speed_sqr <= s.max_entry_speed_sqr);
            assert!(s.max_entry_speed_sqr <= s.nominal_speed_sqr);
        }
    }

    #[test]
    fn test_newest_block_released_after_concurrent_claim_attempt() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, mut consumer) = queue.split();
        let consumer_side = ConsumerSide::new();

        commit(&producer, 10.0, 100.0, MIN_SPEED * MIN_SPEED);

        // The step generator raised busy and has not yet read the flag.
        producer.block(0).busy.set_sc(&consumer_side, true);
        recalculate(&producer, MIN_SPEED, TIMER_HZ);
        // It reads the flag, backs off and lowers busy.
        producer.block(0).busy.set_sc(&consumer_side, false);

        assert!(!producer.block(0).needs_recalculation());
        assert_eq!(producer.block(0).trapezoid().final_rate, crate::motion::MINIMAL_STEP_RATE);
        let (index, snapshot) = consumer.claim_next_block().expect("newest block claimable");
        assert_eq!(index, 0);
        assert_eq!(snapshot.step_event_count, 1000);
    }

    #[test]
    fn test_running_block_never_left_flagged() {
        let mut queue: BlockQueue<8> = BlockQueue::new();
        let (producer, mut consumer) = queue.split();

        push(&producer, 10.0, 100.0, MIN_SPEED * MIN_SPEED);
        assert!(consumer.claim_next_block().is_some());
        push(&producer, 10.0, 100.0, 10_000.0);
        push(&producer, 10.0, 100.0, 10_000.0);

        // No block is left with a flag the step generator would wait on.
        for i in 0..3 {
            assert!(!producer.block(i).needs_recalculation());
        }
        assert!(consumer.claim_next_block().is_some());
    }
}
