use std::sync::{Arc, Mutex};

use cadence_faults::{CallResult, Fault};
use cadence_gov::GovernanceParameters;
use cadence_registry::RegistryError;
use cadence_types::{
    Address, AssetId, BlockContext, BlockNumber, DistributionInstruction, FeedId,
    FinalizationTier, OrchestratorEvent, PriceEpochId, RewardData, RewardEpochId, Timestamp,
};

use super::*;
use crate::collaborators::{Feed, PricePoint, RewardLedger};
use crate::settings::{OrchestratorSettings, SettingsError};
use crate::EpochError;

#[derive(Default)]
struct FeedState {
    fail_init: bool,
    fail_finalize: bool,
    fail_fallback: bool,
    fail_forced: bool,
    reward: RewardData,
    initialized: Vec<bool>,
    configured: Vec<GovernanceParameters>,
    vote_power_blocks: Vec<BlockNumber>,
}

struct TestFeed {
    address: FeedId,
    state: Arc<Mutex<FeedState>>,
}

impl TestFeed {
    fn new(n: u64) -> (Box<dyn Feed>, Arc<Mutex<FeedState>>) {
        let state = Arc::new(Mutex::new(FeedState::default()));
        let feed = TestFeed {
            address: Address::from_low_u64(n),
            state: Arc::clone(&state),
        };
        (Box::new(feed), state)
    }
}

fn fail_if(flag: bool) -> CallResult<()> {
    if flag {
        Err(Fault::revert("scripted failure"))
    } else {
        Ok(())
    }
}

impl Feed for TestFeed {
    fn address(&self) -> FeedId {
        self.address
    }

    fn symbol(&self) -> String {
        "TST".to_string()
    }

    fn initialize_for_reveal(&mut self, _seed: [u8; 32], fallback: bool) -> CallResult<()> {
        let mut state = self.state.lock().expect("lock");
        fail_if(state.fail_init)?;
        state.initialized.push(fallback);
        Ok(())
    }

    fn finalize(&mut self, _epoch: PriceEpochId) -> CallResult<RewardData> {
        let state = self.state.lock().expect("lock");
        fail_if(state.fail_finalize)?;
        Ok(state.reward.clone())
    }

    fn fallback_finalize(&mut self, _epoch: PriceEpochId) -> CallResult<()> {
        fail_if(self.state.lock().expect("lock").fail_fallback)
    }

    fn force_finalize(&mut self, _epoch: PriceEpochId) -> CallResult<()> {
        fail_if(self.state.lock().expect("lock").fail_forced)
    }

    fn activate(&mut self) -> CallResult<()> {
        Ok(())
    }

    fn deactivate(&mut self) -> CallResult<()> {
        Ok(())
    }

    fn set_vote_power_block(&mut self, block: BlockNumber) -> CallResult<()> {
        self.state.lock().expect("lock").vote_power_blocks.push(block);
        Ok(())
    }

    fn set_asset_links(&mut self, _members: &[FeedId]) -> CallResult<()> {
        Ok(())
    }

    fn set_underlying(&mut self, _asset: AssetId) -> CallResult<()> {
        Ok(())
    }

    fn current_price(&self) -> CallResult<PricePoint> {
        Ok(PricePoint::default())
    }

    fn set_initial_price(&mut self, _point: PricePoint) -> CallResult<()> {
        Ok(())
    }

    fn configure(&mut self, params: &GovernanceParameters) -> CallResult<()> {
        self.state.lock().expect("lock").configured.push(params.clone());
        Ok(())
    }
}

#[derive(Default)]
struct LedgerState {
    distributions: Vec<DistributionInstruction>,
    accruals: Vec<PriceEpochId>,
    closed: Vec<RewardEpochId>,
}

struct TestLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl RewardLedger for TestLedger {
    fn address(&self) -> Address {
        Address::from_low_u64(0xFEED)
    }

    fn distribute_rewards(&mut self, instruction: &DistributionInstruction) -> CallResult<()> {
        self.state
            .lock()
            .expect("lock")
            .distributions
            .push(instruction.clone());
        Ok(())
    }

    fn accrue_unearned_rewards(
        &mut self,
        epoch: PriceEpochId,
        _duration_secs: u64,
        _end_time: Timestamp,
    ) -> CallResult<()> {
        self.state.lock().expect("lock").accruals.push(epoch);
        Ok(())
    }

    fn close_expired_reward_epoch(&mut self, reward_epoch: RewardEpochId) -> CallResult<()> {
        self.state.lock().expect("lock").closed.push(reward_epoch);
        Ok(())
    }
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        first_price_epoch_start: 1_000,
        price_epoch_duration_secs: 100,
        reveal_duration_secs: 50,
        reward_epoch_start: 1_050,
        reward_epoch_duration_secs: 1_000,
        vote_power_boundary_fraction: 2,
        error_ledger_capacity: 10,
    }
}

fn params() -> GovernanceParameters {
    GovernanceParameters {
        max_vote_power_nat_threshold_fraction: 5,
        max_vote_power_asset_threshold_fraction: 5,
        low_asset_usd_threshold: 50,
        high_asset_usd_threshold: 500,
        high_asset_turnout_threshold_bips: 500,
        low_nat_turnout_threshold_bips: 5_000,
        elastic_band_width_ppm: 0,
        reward_expiry_offset_seconds: 10 * 86_400,
        trusted_addresses: vec![],
    }
}

fn ctx(number: BlockNumber, timestamp: Timestamp) -> BlockContext {
    BlockContext::new(number, timestamp, [number as u8; 32])
}

fn orchestrator() -> (EpochOrchestrator, Arc<Mutex<LedgerState>>) {
    let ledger_state = Arc::new(Mutex::new(LedgerState::default()));
    let ledger = TestLedger {
        state: Arc::clone(&ledger_state),
    };
    let mut orchestrator =
        EpochOrchestrator::new(settings(), Box::new(ledger)).expect("orchestrator");
    orchestrator
        .set_governance_parameters(params())
        .expect("governance");
    orchestrator.activate();
    (orchestrator, ledger_state)
}

/// Drive to the point where price epoch 0 is initialized.
fn start(orchestrator: &mut EpochOrchestrator) {
    assert_eq!(
        orchestrator.tick(&ctx(11, 1_050)),
        Ok(TickOutcome::RewardEpochInitialized(0))
    );
    assert_eq!(
        orchestrator.tick(&ctx(12, 1_050)),
        Ok(TickOutcome::PriceEpochInitialized(0))
    );
}

fn participants(weights: &[u128]) -> RewardData {
    RewardData {
        participants: (100..100 + weights.len() as u64)
            .map(Address::from_low_u64)
            .collect(),
        weights: weights.to_vec(),
        total_weight: weights.iter().sum(),
    }
}

#[test]
fn test_new_rejects_invalid_settings() {
    let ledger = TestLedger {
        state: Arc::default(),
    };
    let mut bad = settings();
    bad.reveal_duration_secs = 0;
    assert!(matches!(
        EpochOrchestrator::new(bad, Box::new(ledger)),
        Err(EpochError::Settings(SettingsError::ZeroRevealDuration))
    ));
}

#[test]
fn test_inactive_tick_is_noop() {
    let ledger = TestLedger {
        state: Arc::default(),
    };
    let mut orchestrator = EpochOrchestrator::new(settings(), Box::new(ledger)).expect("new");
    assert_eq!(orchestrator.tick(&ctx(1, 5_000)), Ok(TickOutcome::Inactive));
    assert_eq!(orchestrator.phase(5_000), Phase::Inactive);
    assert!(orchestrator.current_reward_epoch().is_none());
}

#[test]
fn test_activate_is_idempotent() {
    let (mut orchestrator, _) = orchestrator();
    orchestrator.take_events();
    orchestrator.activate();
    assert!(orchestrator.take_events().is_empty());
    assert!(orchestrator.is_active());
}

#[test]
fn test_add_requires_governance() {
    let ledger = TestLedger {
        state: Arc::default(),
    };
    let mut orchestrator = EpochOrchestrator::new(settings(), Box::new(ledger)).expect("new");
    let (feed, _) = TestFeed::new(1);
    assert!(matches!(
        orchestrator.add_feed(feed),
        Err(EpochError::Registry(RegistryError::GovernanceNotInitialized))
    ));
}

#[test]
fn test_first_reward_epoch_waits_for_anchor() {
    let (mut orchestrator, _) = orchestrator();
    assert_eq!(orchestrator.tick(&ctx(10, 1_049)), Ok(TickOutcome::Idle));
    assert_eq!(orchestrator.phase(1_049), Phase::AwaitingFirstRewardEpoch);

    assert_eq!(
        orchestrator.tick(&ctx(11, 1_050)),
        Ok(TickOutcome::RewardEpochInitialized(0))
    );
    let epoch = orchestrator.current_reward_epoch().copied().expect("epoch 0");
    assert_eq!(epoch.vote_power_block, 10);
    assert_eq!(epoch.start_block, 11);
    assert_eq!(orchestrator.current_reward_epoch_end(), 2_050);
}

#[test]
fn test_one_transition_per_tick() {
    let (mut orchestrator, _) = orchestrator();
    // Both the reward epoch and price epoch 0 are due at 1_050.
    assert_eq!(
        orchestrator.tick(&ctx(11, 1_050)),
        Ok(TickOutcome::RewardEpochInitialized(0))
    );
    assert!(orchestrator.last_unprocessed_price_epoch().is_none());
    assert_eq!(
        orchestrator.tick(&ctx(11, 1_050)),
        Ok(TickOutcome::PriceEpochInitialized(0))
    );
    assert_eq!(orchestrator.tick(&ctx(11, 1_050)), Ok(TickOutcome::Idle));
}

#[test]
fn test_full_price_epoch_cycle() {
    let (mut orchestrator, ledger) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    state.lock().expect("lock").reward = participants(&[25, 75]);
    orchestrator.add_feed(feed).expect("add");

    start(&mut orchestrator);
    assert_eq!(orchestrator.phase(1_100), Phase::RevealWindow);
    assert_eq!(orchestrator.tick(&ctx(13, 1_149)), Ok(TickOutcome::Idle));
    assert_eq!(orchestrator.phase(1_150), Phase::PendingFinalize);
    assert_eq!(
        orchestrator.tick(&ctx(14, 1_150)),
        Ok(TickOutcome::PriceEpochFinalized(0))
    );

    let ledger = ledger.lock().expect("lock");
    assert_eq!(ledger.distributions.len(), 1);
    let instruction = &ledger.distributions[0];
    assert_eq!(instruction.feed, Address::from_low_u64(1));
    assert_eq!(instruction.weights, vec![25, 75]);
    assert_eq!(instruction.total_weight, 100);
    assert_eq!(instruction.price_epoch_id, 0);
    assert_eq!(instruction.price_epoch_end_time, 1_099);
    assert_eq!(instruction.price_epoch_duration_secs, 100);
    assert_eq!(instruction.reward_epoch_id, 0);
    assert_eq!(instruction.vote_power_block, 10);
    assert_eq!(instruction.shares(1_000), vec![250, 750]);
    assert!(ledger.accruals.is_empty());

    let finalized = orchestrator.last_finalized_price_epoch().expect("summary");
    assert_eq!(finalized.winner, Some(Address::from_low_u64(1)));
    assert_eq!(
        finalized.tier_of(Address::from_low_u64(1)),
        Some(FinalizationTier::Normal)
    );
    assert_eq!(orchestrator.phase(1_150), Phase::AwaitingPriceEpoch);
}

#[test]
fn test_no_participants_accrues_unearned() {
    let (mut orchestrator, ledger) = orchestrator();
    let (feed, _) = TestFeed::new(1);
    orchestrator.add_feed(feed).expect("add");
    start(&mut orchestrator);

    assert_eq!(
        orchestrator.tick(&ctx(14, 1_150)),
        Ok(TickOutcome::PriceEpochFinalized(0))
    );
    let ledger = ledger.lock().expect("lock");
    assert!(ledger.distributions.is_empty());
    assert_eq!(ledger.accruals, vec![0]);
    assert_eq!(
        orchestrator.last_finalized_price_epoch().and_then(|f| f.winner),
        None
    );
}

#[test]
fn test_tier_classification() {
    let (mut orchestrator, _) = orchestrator();
    let (forced, forced_state) = TestFeed::new(1);
    {
        let mut s = forced_state.lock().expect("lock");
        s.fail_finalize = true;
        s.fail_fallback = true;
    }
    let (normal, normal_state) = TestFeed::new(2);
    normal_state.lock().expect("lock").reward = participants(&[1]);
    orchestrator.add_feed(forced).expect("add");
    orchestrator.add_feed(normal).expect("add");
    start(&mut orchestrator);
    orchestrator.take_events();

    orchestrator.tick(&ctx(14, 1_150)).expect("finalize");
    let finalized = orchestrator.last_finalized_price_epoch().expect("summary");
    assert_eq!(
        finalized.tier_of(Address::from_low_u64(1)),
        Some(FinalizationTier::Forced)
    );
    assert_eq!(
        finalized.tier_of(Address::from_low_u64(2)),
        Some(FinalizationTier::Normal)
    );
    assert_eq!(finalized.winner, Some(Address::from_low_u64(2)));

    let failures: Vec<FinalizationTier> = orchestrator
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            OrchestratorEvent::FinalizingPriceEpochFailed { failed_tier, .. } => Some(failed_tier),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![FinalizationTier::Normal, FinalizationTier::Fallback]);
}

#[test]
fn test_terminal_fault_leaves_epoch_pending() {
    let (mut orchestrator, ledger) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    {
        let mut s = state.lock().expect("lock");
        s.fail_finalize = true;
        s.fail_fallback = true;
        s.fail_forced = true;
    }
    orchestrator.add_feed(feed).expect("add");
    start(&mut orchestrator);

    let fault = orchestrator.tick(&ctx(14, 1_150)).expect_err("terminal");
    assert_eq!(fault.feed, Address::from_low_u64(1));
    assert_eq!(fault.price_epoch_id, 0);
    assert_eq!(orchestrator.last_unprocessed_price_epoch(), Some(0));
    assert!(orchestrator.last_finalized_price_epoch().is_none());

    let ledger = ledger.lock().expect("lock");
    assert!(ledger.distributions.is_empty());
    assert!(ledger.accruals.is_empty());
    assert_eq!(orchestrator.error_window(0, 10).total_recorded, 3);
}

#[test]
fn test_malformed_reward_data_falls_back() {
    let (mut orchestrator, ledger) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    state.lock().expect("lock").reward = RewardData {
        participants: vec![Address::from_low_u64(7)],
        weights: vec![],
        total_weight: 0,
    };
    orchestrator.add_feed(feed).expect("add");
    start(&mut orchestrator);

    orchestrator.tick(&ctx(14, 1_150)).expect("finalize");
    assert_eq!(
        orchestrator
            .last_finalized_price_epoch()
            .and_then(|f| f.tier_of(Address::from_low_u64(1))),
        Some(FinalizationTier::Fallback)
    );
    assert!(ledger.lock().expect("lock").distributions.is_empty());
    assert_eq!(
        orchestrator.error_window(0, 1).messages,
        vec![MALFORMED_REWARD_DATA.to_string()]
    );
}

#[test]
fn test_global_fallback_accrues_instead_of_distributing() {
    let (mut orchestrator, ledger) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    state.lock().expect("lock").reward = participants(&[10]);
    orchestrator.add_feed(feed).expect("add");
    orchestrator.take_events();

    assert!(orchestrator.set_fallback_mode(true));
    assert!(!orchestrator.set_fallback_mode(true));
    let transitions = orchestrator
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, OrchestratorEvent::FallbackModeChanged { .. }))
        .count();
    assert_eq!(transitions, 1);

    start(&mut orchestrator);
    assert_eq!(state.lock().expect("lock").initialized, vec![true]);
    orchestrator.tick(&ctx(14, 1_150)).expect("finalize");

    let ledger = ledger.lock().expect("lock");
    assert!(ledger.distributions.is_empty());
    assert_eq!(ledger.accruals, vec![0]);
    assert_eq!(
        orchestrator
            .last_finalized_price_epoch()
            .and_then(|f| f.tier_of(Address::from_low_u64(1))),
        Some(FinalizationTier::Fallback)
    );
}

#[test]
fn test_init_failure_marks_feed() {
    let (mut orchestrator, _) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    state.lock().expect("lock").fail_init = true;
    orchestrator.add_feed(feed).expect("add");
    start(&mut orchestrator);

    assert!(!orchestrator.is_feed_initialized(Address::from_low_u64(1)));
    let failures = orchestrator
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, OrchestratorEvent::InitializingForRevealFailed { .. }))
        .count();
    assert_eq!(failures, 2);

    // A later successful initialize clears the mark.
    state.lock().expect("lock").fail_init = false;
    orchestrator.tick(&ctx(14, 1_150)).expect("finalize");
    assert_eq!(
        orchestrator.tick(&ctx(15, 1_150)),
        Ok(TickOutcome::PriceEpochInitialized(1))
    );
    assert!(orchestrator.is_feed_initialized(Address::from_low_u64(1)));
}

#[test]
fn test_governance_applied_at_price_epoch_init() {
    let (mut orchestrator, _) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    orchestrator.add_feed(feed).expect("add");
    start(&mut orchestrator);
    assert_eq!(state.lock().expect("lock").configured.len(), 2);

    let mut changed = params();
    changed.low_nat_turnout_threshold_bips = 1_500;
    orchestrator
        .set_governance_parameters(changed.clone())
        .expect("set");

    // Still inside price epoch 0: nothing pushed yet.
    orchestrator.tick(&ctx(13, 1_120)).expect("idle");
    assert_eq!(
        state.lock().expect("lock").configured.last(),
        Some(&params())
    );

    orchestrator.tick(&ctx(14, 1_150)).expect("finalize");
    orchestrator.tick(&ctx(15, 1_150)).expect("initialize");
    assert_eq!(state.lock().expect("lock").configured.last(), Some(&changed));
}

#[test]
fn test_feed_added_later_gets_vote_power_block() {
    let (mut orchestrator, _) = orchestrator();
    start(&mut orchestrator);
    let (feed, state) = TestFeed::new(5);
    orchestrator.add_feed(feed).expect("add");
    assert_eq!(state.lock().expect("lock").vote_power_blocks, vec![10]);
}

#[test]
fn test_rollover_selects_checkpoint() {
    let (mut orchestrator, _) = orchestrator();
    let (feed, state) = TestFeed::new(1);
    orchestrator.add_feed(feed).expect("add");
    start(&mut orchestrator);

    assert_eq!(orchestrator.phase(2_050), Phase::PendingRollover);
    assert_eq!(
        orchestrator.tick(&ctx(111, 2_050)),
        Ok(TickOutcome::RewardEpochRolledOver(1))
    );
    let epoch = orchestrator.reward_epoch(1).copied().expect("epoch 1");
    assert!(epoch.vote_power_block >= 11);
    assert!(epoch.vote_power_block < 111);
    assert_eq!(epoch.start_block, 111);
    assert_eq!(orchestrator.current_reward_epoch_end(), 3_050);
    assert_eq!(
        state.lock().expect("lock").vote_power_blocks.last(),
        Some(&epoch.vote_power_block)
    );
    assert!(orchestrator
        .take_events()
        .contains(&OrchestratorEvent::CleanupTargetsUnset));
}

#[test]
fn test_reward_epoch_duration_change_applies_next_boundary() {
    let (mut orchestrator, _) = orchestrator();
    start(&mut orchestrator);
    assert!(matches!(
        orchestrator.set_reward_epoch_duration(150),
        Err(EpochError::Settings(SettingsError::RewardEpochDurationNotMultiple { .. }))
    ));
    orchestrator.set_reward_epoch_duration(500).expect("duration");
    assert_eq!(orchestrator.current_reward_epoch_end(), 2_050);

    orchestrator.tick(&ctx(111, 2_050)).expect("rollover");
    assert_eq!(orchestrator.current_reward_epoch_end(), 2_550);
}

#[test]
fn test_feed_fallback_mode_unknown_feed() {
    let (mut orchestrator, _) = orchestrator();
    let unknown = Address::from_low_u64(99);
    assert!(matches!(
        orchestrator.set_feed_fallback_mode(unknown, true),
        Err(EpochError::Registry(RegistryError::NotFound(_)))
    ));
    assert!(orchestrator.feed_fallback_mode(unknown).is_err());
}
