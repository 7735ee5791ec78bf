//! Integration tests for stepper-planner.
//!
//! These tests drive the planner and the reference step generator together,
//! from TOML configuration to retired blocks.

use std::sync::atomic::{AtomicBool, Ordering};

use proptest::prelude::*;
use stepper_planner::config::parse_config;
use stepper_planner::{
    Axis, AxisArray, BlockQueue, ExtruderState, JunctionStrategy, MmPerSec, MoveHints, Planner, PlannerConfig,
    QueueState, StepEvent, StepGenerator,
};

// =============================================================================
// Test configuration data
// =============================================================================

const CARTESIAN_CONFIG: &str = r#"
name = "bench"

[axes.x]
steps_per_mm = 100.0
max_feedrate_mm_s = 300.0
max_acceleration_mm_s2 = 4000.0
max_jerk_mm_s = 8.0

[axes.y]
steps_per_mm = 100.0
max_feedrate_mm_s = 300.0
max_acceleration_mm_s2 = 4000.0
max_jerk_mm_s = 8.0

[axes.z]
steps_per_mm = 400.0
max_feedrate_mm_s = 12.0
max_acceleration_mm_s2 = 200.0
max_jerk_mm_s = 2.0

[axes.e]
steps_per_mm = 325.0
max_feedrate_mm_s = 80.0
max_acceleration_mm_s2 = 2500.0
max_jerk_mm_s = 10.0

[motion]
acceleration_mm_s2 = 1250.0
travel_acceleration_mm_s2 = 1250.0
min_segment_steps = 6
minimum_planner_speed_mm_s = 0.05
"#;

const DEVIATION_SECTION: &str = r#"
[junction]
strategy = "junction_deviation"
deviation_mm = 0.013
"#;

fn config() -> PlannerConfig {
    parse_config(CARTESIAN_CONFIG).expect("Should parse bench config")
}

fn deviation_config() -> PlannerConfig {
    parse_config(&format!("{CARTESIAN_CONFIG}{DEVIATION_SECTION}")).expect("Should parse deviation config")
}

fn xy(x: f32, y: f32) -> AxisArray<f32> {
    AxisArray::new(x, y, 0.0, 0.0)
}

fn noop() {}

fn travel<const N: usize>(planner: &mut Planner<'_, fn(), N>, x: f32, y: f32, feedrate: f32) -> bool {
    planner
        .append_linear_move(&xy(x, y), MmPerSec(feedrate), &ExtruderState::default(), MoveHints::new())
        .expect("Target should be reachable")
}

/// Live block indices, oldest first.
fn live_blocks<const N: usize>(queue: &BlockQueue<N>) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut index = queue.tail();
    while index != queue.head() {
        indices.push(index);
        index = BlockQueue::<N>::next_block_index(index);
    }
    indices
}

// =============================================================================
// Segment coalescing
// =============================================================================

#[test]
fn short_segment_is_folded_into_next_move() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, mut consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

    assert!(travel(&mut planner, 10.0, 0.0, 50.0));
    // 5 steps: below the 6-step floor.
    assert!(travel(&mut planner, 10.05, 0.0, 50.0));
    assert_eq!(planner.moves_planned(), 1);
    assert!((planner.machine_position_mm()[Axis::X] - 10.05).abs() < 1e-5);

    assert!(travel(&mut planner, 20.0, 0.0, 50.0));
    assert_eq!(planner.moves_planned(), 2);

    let mut stepper = StepGenerator::new(config.motion.step_timer_hz);
    stepper.run_until_idle(&mut consumer, 100_000);

    // Nothing lost: the folded steps went out with the last block.
    assert_eq!(planner.queue().step_position()[Axis::X], 2000);
}

#[test]
fn raw_move_is_never_coalesced() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, _consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

    let target = AxisArray::new(3, 0, 0, 0);
    assert!(planner.append_raw_move(&target, MmPerSec(5.0), &ExtruderState::default(), MoveHints::new()));

    assert_eq!(planner.moves_planned(), 1);
    assert_eq!(planner.queue().block(0).snapshot().step_event_count, 3);
    assert_eq!(planner.position_steps()[Axis::X], 3);
    assert!((planner.machine_position_mm()[Axis::X] - 0.03).abs() < 1e-6);
}

// =============================================================================
// Quick stop lifecycle
// =============================================================================

#[test]
fn quick_stop_then_resume_empties_queue() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, mut consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();
    let mut stepper = StepGenerator::new(config.motion.step_timer_hz);

    for i in 1..=5 {
        assert!(travel(&mut planner, 10.0 * i as f32, 0.0, 100.0));
    }
    assert_eq!(planner.moves_planned(), 5);

    planner.quick_stop();
    assert_eq!(planner.queue_state(), QueueState::Draining);
    assert!(!travel(&mut planner, 100.0, 0.0, 100.0));
    assert_eq!(stepper.tick(&mut consumer), StepEvent::Aborted);

    planner.resume_queuing();
    assert!(!planner.is_draining());
    assert_eq!(planner.moves_planned(), 0);
    // Nothing moved before the stop.
    assert_eq!(*planner.position_steps(), AxisArray::splat(0));

    assert!(travel(&mut planner, 5.0, 0.0, 100.0));
    assert_eq!(planner.moves_planned(), 1);
    stepper.run_until_idle(&mut consumer, 100_000);
    assert_eq!(planner.queue().step_position()[Axis::X], 500);
    assert!(!planner.is_busy());
}

#[test]
fn quick_stop_handle_from_elsewhere() {
    let config = config();
    let mut queue: BlockQueue<8> = BlockQueue::new();
    let (producer, mut consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();
    let mut stepper = StepGenerator::new(config.motion.step_timer_hz);

    let handle = planner.quick_stop_handle();
    assert!(travel(&mut planner, 10.0, 0.0, 100.0));
    for _ in 0..20 {
        stepper.tick(&mut consumer);
    }

    handle.trigger();
    assert!(handle.is_draining());
    assert_eq!(stepper.tick(&mut consumer), StepEvent::Aborted);

    planner.resume_queuing();
    assert_eq!(planner.position_steps()[Axis::X], 20);
    assert_eq!(planner.quick_stop_count(), 1);
}

// =============================================================================
// Lookahead
// =============================================================================

#[test]
fn colinear_moves_keep_nominal_speed_at_junctions() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, _consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

    for i in 1..=4 {
        assert!(travel(&mut planner, 10.0 * i as f32, 0.0, 50.0));
    }

    let queue = planner.queue();
    let blocks = live_blocks(queue);
    // The first move starts from rest.
    assert!(queue.block(blocks[0]).speeds().entry_speed_sqr < 1.0);
    for &index in &blocks[1..] {
        let speeds = queue.block(index).speeds();
        assert!((speeds.entry_speed_sqr - speeds.nominal_speed_sqr).abs() < 1e-2);
    }

    // The last block plans a full stop.
    let last = queue.block(*blocks.last().unwrap());
    let trapezoid = last.trapezoid();
    assert!(trapezoid.final_rate <= trapezoid.initial_rate);
}

#[test]
fn corner_speed_bounded_by_junction_deviation() {
    let config = deviation_config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, _consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();
    assert_eq!(planner.junction_strategy(), JunctionStrategy::JunctionDeviation);

    assert!(travel(&mut planner, 20.0, 0.0, 100.0));
    assert!(travel(&mut planner, 20.0, 20.0, 100.0));
    assert!(travel(&mut planner, 40.0, 20.0, 100.0));

    let queue = planner.queue();
    let corner = queue.block(1).speeds();
    assert!(corner.entry_speed_sqr < corner.nominal_speed_sqr);
    assert!(corner.entry_speed_sqr <= corner.max_entry_speed_sqr + 1e-3);
    // A right angle with a 0.013 mm deviation allows a few mm/s, not tens.
    assert!(corner.entry_speed_sqr.sqrt() < 20.0);
    assert!(corner.entry_speed_sqr.sqrt() > 0.05);
}

#[test]
fn reversal_drops_to_minimum_speed() {
    let config = deviation_config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, _consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

    assert!(travel(&mut planner, 20.0, 0.0, 100.0));
    assert!(travel(&mut planner, 0.0, 0.0, 100.0));

    let reversal = planner.queue().block(1).speeds();
    assert!(reversal.entry_speed_sqr <= 0.05 * 0.05 + 1e-6);
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn stealth_mode_caps_new_moves() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, _consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

    planner.set_stealth_mode(true);
    assert!(travel(&mut planner, 100.0, 0.0, 300.0));

    let speeds = planner.queue().block(0).speeds();
    assert!((speeds.nominal_speed_sqr.sqrt() - 140.0).abs() < 0.1);
    // The requested table is untouched.
    assert_eq!(planner.user_settings().settings().max_feedrate_mm_s[Axis::X], 300.0);

    planner.set_stealth_mode(false);
    assert_eq!(planner.settings().max_feedrate_mm_s[Axis::X], 300.0);
}

#[test]
fn temporary_limits_are_restored() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, _consumer) = queue.split();
    let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

    let saved = planner.motion_parameters();
    planner.set_max_feedrate(Axis::X, 10.0).unwrap();
    assert!(travel(&mut planner, 50.0, 0.0, 100.0));
    assert!((planner.queue().block(0).speeds().nominal_speed_sqr - 100.0).abs() < 0.1);

    planner.restore_motion_parameters(&saved).unwrap();
    assert_eq!(planner.settings().max_feedrate_mm_s[Axis::X], 300.0);
}

// =============================================================================
// Concurrent consumer
// =============================================================================

#[test]
fn concurrent_step_generator_executes_every_step() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, mut consumer) = queue.split();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let done = &done;
        let timer_hz = config.motion.step_timer_hz;
        scope.spawn(move || {
            let mut stepper = StepGenerator::new(timer_hz);
            while !done.load(Ordering::SeqCst) || consumer.queue().has_blocks_queued() {
                if stepper.tick(&mut consumer) == StepEvent::Idle {
                    std::thread::yield_now();
                }
            }
        });

        let mut planner = Planner::new(producer, &config, std::thread::yield_now as fn()).unwrap();
        for i in 0..60 {
            let x = if i % 2 == 0 { 5.0 } else { 0.0 };
            let y = i as f32 * 0.5;
            assert!(travel(&mut planner, x, y, 120.0));
        }
        planner.synchronize();
        done.store(true, Ordering::SeqCst);

        assert_eq!(planner.queue().step_position(), *planner.position_steps());
        assert_eq!(planner.position_steps()[Axis::Y], 2950);
    });
}

#[test]
fn wait_for_empty_queue_returns_to_normal() {
    let config = config();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (producer, mut consumer) = queue.split();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let done = &done;
        let timer_hz = config.motion.step_timer_hz;
        scope.spawn(move || {
            let mut stepper = StepGenerator::new(timer_hz);
            while !done.load(Ordering::SeqCst) || consumer.queue().has_blocks_queued() {
                if stepper.tick(&mut consumer) == StepEvent::Idle {
                    std::thread::yield_now();
                }
            }
        });

        let mut planner = Planner::new(producer, &config, std::thread::yield_now as fn()).unwrap();
        for i in 1..=20 {
            assert!(travel(&mut planner, i as f32, 0.0, 80.0));
        }
        planner.wait_for_empty_queue();

        assert_eq!(planner.queue_state(), QueueState::Normal);
        assert!(!planner.is_emptying());
        assert!(!planner.is_busy());
        assert_eq!(planner.queue().step_position()[Axis::X], 2000);

        // Moves are admitted again afterwards.
        assert!(travel(&mut planner, 25.0, 0.0, 80.0));
        planner.synchronize();
        done.store(true, Ordering::SeqCst);

        assert_eq!(planner.queue().step_position()[Axis::X], 2500);
    });
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Admit(i32, i32),
    Claim,
    Retire,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-400i32..400, -400i32..400).prop_map(|(x, y)| Op::Admit(x, y)),
        1 => Just(Op::Claim),
        1 => Just(Op::Retire),
    ]
}

/// Distance from `from` to `to` walking forward around a ring of `n`.
fn ahead(from: usize, to: usize, n: usize) -> usize {
    to.wrapping_sub(from) & (n - 1)
}

proptest! {
    #[test]
    fn indices_stay_ordered(ops in proptest::collection::vec(op(), 1..120)) {
        const N: usize = 8;
        let config = config();
        let mut queue: BlockQueue<N> = BlockQueue::new();
        let (producer, mut consumer) = queue.split();
        let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

        for op in ops {
            match op {
                Op::Admit(x, y) => {
                    if planner.moves_free() > 0 {
                        travel(&mut planner, x as f32 * 0.1, y as f32 * 0.1, 80.0);
                    }
                }
                Op::Claim => {
                    if consumer.current_block().is_none() {
                        let _ = consumer.claim_next_block();
                    }
                }
                Op::Retire => {
                    let _ = consumer.discard_current_block();
                }
            }

            let q = planner.queue();
            let (tail, nonbusy, planned, head) = (q.tail(), q.nonbusy(), q.planned(), q.head());
            prop_assert!(ahead(tail, nonbusy, N) <= ahead(tail, planned, N));
            prop_assert!(ahead(tail, planned, N) <= ahead(tail, head, N));
            prop_assert!(q.moves_planned() < N);
        }
    }

    #[test]
    fn planned_speeds_respect_limits(
        targets in proptest::collection::vec((-1000i32..1000, -1000i32..1000, 5u32..250), 1..15),
        deviation in any::<bool>(),
    ) {
        let config = if deviation { deviation_config() } else { config() };
        let min_speed_sqr = 0.05f32 * 0.05;
        let mut queue: BlockQueue<16> = BlockQueue::new();
        let (producer, _consumer) = queue.split();
        let mut planner = Planner::new(producer, &config, noop as fn()).unwrap();

        for (x, y, feedrate) in targets {
            travel(&mut planner, x as f32 * 0.1, y as f32 * 0.1, feedrate as f32);
        }

        let q = planner.queue();
        let blocks = live_blocks(q);
        for (i, &index) in blocks.iter().enumerate() {
            let block = q.block(index);
            let speeds = block.speeds();
            let tolerance = 1e-3 * speeds.nominal_speed_sqr.max(1.0);

            prop_assert!(!block.needs_recalculation());
            prop_assert!(speeds.entry_speed_sqr <= speeds.max_entry_speed_sqr + tolerance);
            prop_assert!(speeds.max_entry_speed_sqr <= speeds.nominal_speed_sqr + tolerance);
            prop_assert!(speeds.entry_speed_sqr >= min_speed_sqr - tolerance);

            // Every block can brake to whatever follows it.
            let exit_speed_sqr = blocks
                .get(i + 1)
                .map_or(min_speed_sqr, |&next| q.block(next).speeds().entry_speed_sqr);
            let reachable = exit_speed_sqr + 2.0 * speeds.acceleration * speeds.millimeters;
            prop_assert!(speeds.entry_speed_sqr <= reachable + tolerance);

            let snapshot = block.snapshot();
            prop_assert!(snapshot.trapezoid.accelerate_until <= snapshot.trapezoid.decelerate_after);
            prop_assert!(snapshot.trapezoid.decelerate_after <= snapshot.step_event_count);
        }
    }
}
