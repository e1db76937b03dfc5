//! Integration test: reward-epoch rollover.
//!
//! Exercises the reward-epoch half of the tick:
//! 1. The vote-power checkpoint always lies inside the previous reward epoch
//! 2. The checkpoint varies with chain entropy
//! 3. Every active feed receives each new checkpoint
//! 4. Expired reward epochs are closed in order, retried after a failure
//! 5. Cleanup hints follow the oldest unexpired reward epoch
//! 6. A duration change takes effect at the next boundary

use cadence_epoch::TickOutcome;
use cadence_integration_tests::{governance, settings, Harness, MockCleanupTarget, MockLedger};
use cadence_types::{Address, OrchestratorEvent};

/// Tick every 10s with OS entropy until `rollovers` reward epochs followed
/// the first one.
fn run_rollovers(h: &mut Harness, rollovers: u64) {
    run_between(h, 1_050, 1_050 + rollovers * 1_000);
}

fn run_between(h: &mut Harness, from: u64, to: u64) {
    let mut t = from;
    while t <= to {
        h.tick_with(t, rand::random()).expect("tick");
        t += 10;
    }
}

#[test]
fn checkpoint_lies_inside_previous_reward_epoch() {
    let mut h = Harness::new();
    run_rollovers(&mut h, 7);

    let epochs: Vec<_> = (0..=7)
        .map(|id| *h.orchestrator.reward_epoch(id).expect("reward epoch"))
        .collect();
    assert!(h.orchestrator.reward_epoch(8).is_none());
    assert_eq!(epochs[0].vote_power_block, epochs[0].start_block - 1);

    let mut offsets = Vec::new();
    for pair in epochs.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        assert!(
            current.vote_power_block >= previous.start_block,
            "checkpoint {} before previous start {}",
            current.vote_power_block,
            previous.start_block
        );
        assert!(
            current.vote_power_block < current.start_block,
            "checkpoint {} not before start {}",
            current.vote_power_block,
            current.start_block
        );
        offsets.push(current.start_block - current.vote_power_block);
    }

    offsets.sort_unstable();
    offsets.dedup();
    assert!(
        offsets.len() > 1,
        "checkpoint offset constant across rollovers: {offsets:?}"
    );
}

#[test]
fn checkpoint_window_is_recent_fraction() {
    let mut h = Harness::new();
    run_rollovers(&mut h, 5);

    // Fraction 2: the checkpoint is drawn from the most recent half.
    for id in 1..=5 {
        let previous = *h.orchestrator.reward_epoch(id - 1).expect("previous");
        let current = *h.orchestrator.reward_epoch(id).expect("current");
        let range = current.start_block - previous.start_block;
        let window = (range / 2).max(1);
        assert!(current.start_block - current.vote_power_block <= window);
    }
}

#[test]
fn feeds_receive_every_checkpoint() {
    let mut h = Harness::new();
    let early = h.add_feed(1, "XRP");
    run_rollovers(&mut h, 2);
    let late = h.add_feed(2, "LTC");
    run_between(&mut h, 3_060, 4_050);

    let all: Vec<u64> = (0..=3)
        .map(|id| h.orchestrator.reward_epoch(id).expect("epoch").vote_power_block)
        .collect();
    assert_eq!(early.lock().unwrap().vote_power_blocks, all);
    // Registered mid-epoch 2: gets epoch 2's checkpoint at once, then epoch 3's.
    assert_eq!(late.lock().unwrap().vote_power_blocks, all[2..].to_vec());
}

#[test]
fn inactive_feed_skips_checkpoint() {
    let mut h = Harness::new();
    let script = h.add_feed(1, "XRP");
    h.orchestrator
        .deactivate_feeds(&[Address::from_low_u64(1)])
        .expect("deactivate");
    run_rollovers(&mut h, 1);
    assert!(script.lock().unwrap().vote_power_blocks.is_empty());
    assert_eq!(script.lock().unwrap().count("initialize_for_reveal"), 0);
}

#[test]
fn expired_reward_epochs_closed_and_retried() {
    let mut params = governance();
    params.reward_expiry_offset_seconds = 1_500;
    let mut h = Harness::with(settings(), params);

    // Epoch 1 starts at 2050, epoch 2 at 3050: nothing is old enough yet.
    h.run_until(3_500, 10);
    assert!(h.ledger.lock().unwrap().closed.is_empty());
    assert_eq!(h.orchestrator.reward_epoch_to_expire_next(), 0);

    // Rollover at 4050 finds epoch 0 due (2050 + 1500 <= 4050) but the ledger fails.
    h.ledger.lock().unwrap().fail_close = true;
    h.events();
    let outcomes = h.run_until(4_100, 10);
    assert!(outcomes.contains(&TickOutcome::RewardEpochRolledOver(3)));
    assert!(h
        .events()
        .contains(&OrchestratorEvent::ClosingExpiredRewardEpochFailed { reward_epoch_id: 0 }));
    assert!(h.ledger.lock().unwrap().closed.is_empty());
    assert_eq!(h.orchestrator.reward_epoch_to_expire_next(), 0);
    assert_eq!(
        h.orchestrator.error_window(0, 10).contracts,
        vec![MockLedger::ADDRESS]
    );

    // Rollover at 5050 closes epoch 0 (retry) and epoch 1 (3050 + 1500 <= 5050).
    h.ledger.lock().unwrap().fail_close = false;
    h.run_until(5_100, 10);
    assert_eq!(h.ledger.lock().unwrap().closed, vec![0, 1]);
    assert_eq!(h.orchestrator.reward_epoch_to_expire_next(), 2);
}

#[test]
fn cleanup_block_follows_oldest_unexpired_epoch() {
    let mut params = governance();
    params.reward_expiry_offset_seconds = 1_500;
    let mut h = Harness::with(settings(), params);
    let (target, log) = MockCleanupTarget::create(0xC1);
    let (broken, broken_log) = MockCleanupTarget::create(0xC2);
    broken_log.lock().unwrap().fail = true;
    h.orchestrator.register_cleanup_target(target);
    h.orchestrator.register_cleanup_target(broken);

    h.run_until(4_100, 10);
    let vpb = |id| {
        h.orchestrator
            .reward_epoch(id)
            .expect("epoch")
            .vote_power_block
    };
    // Rollovers to 1 and 2 keep epoch 0; rollover to 3 closes it first.
    assert_eq!(log.lock().unwrap().blocks, vec![vpb(0), vpb(0), vpb(1)]);
    assert!(broken_log.lock().unwrap().blocks.is_empty());

    let failures = h
        .events()
        .into_iter()
        .filter(|e| matches!(e, OrchestratorEvent::CleanupBlockFailed { .. }))
        .count();
    assert_eq!(failures, 3);
}

#[test]
fn missing_cleanup_targets_reported() {
    let mut h = Harness::new();
    h.run_until(2_050, 10);
    assert!(h
        .events()
        .contains(&OrchestratorEvent::CleanupTargetsUnset));
}

#[test]
fn duration_change_applies_at_next_boundary() {
    let mut h = Harness::new();
    h.run_until(1_500, 10);
    h.orchestrator
        .set_reward_epoch_duration(500)
        .expect("duration");
    assert_eq!(h.orchestrator.current_reward_epoch_end(), 2_050);
    assert_eq!(h.orchestrator.reward_epoch_duration(), 500);

    let outcomes = h.run_until(3_100, 10);
    let rollovers: Vec<u64> = outcomes
        .into_iter()
        .filter_map(|o| match o {
            TickOutcome::RewardEpochRolledOver(id) => Some(id),
            _ => None,
        })
        .collect();
    // Boundaries at 2050, 2550 and 3050.
    assert_eq!(rollovers, vec![1, 2, 3]);
    assert_eq!(
        h.orchestrator.reward_epoch(2).expect("epoch 2").start_timestamp,
        2_550
    );
    assert_eq!(h.orchestrator.current_reward_epoch_end(), 3_550);
}

#[test]
fn rollover_events_pair_finalized_and_initialized() {
    let mut h = Harness::new();
    h.run_until(2_050, 10);
    let events = h.events();
    let finalized = events.iter().position(|e| {
        matches!(
            e,
            OrchestratorEvent::RewardEpochFinalized {
                reward_epoch_id: 0,
                ..
            }
        )
    });
    let initialized = events.iter().position(|e| {
        matches!(
            e,
            OrchestratorEvent::RewardEpochInitialized {
                reward_epoch_id: 1,
                ..
            }
        )
    });
    assert!(finalized.expect("finalized") < initialized.expect("initialized"));
}
