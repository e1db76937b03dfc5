//! Integration test crate for the epoch orchestrator.
//!
//! The library half holds scriptable collaborators and a [`Harness`] that
//! owns a clock; the scenarios under `tests/` drive whole reward-epoch
//! lifecycles through them.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p cadence-integration-tests
//! ```

use std::sync::{Arc, Mutex};

use cadence_epoch::{
    CleanupTarget, EpochOrchestrator, Feed, OrchestratorSettings, PricePoint, RewardLedger,
    TerminalFault, TickOutcome,
};
use cadence_faults::{CallResult, Fault};
use cadence_gov::GovernanceParameters;
use cadence_types::entropy;
use cadence_types::{
    Address, AssetId, BlockContext, BlockNumber, DistributionInstruction, FeedId,
    OrchestratorEvent, PriceEpochId, RewardData, RewardEpochId, Timestamp,
};

// ----------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------

/// Price epochs of 100s starting at 1000, reveal 50s, reward epochs of 1000s
/// anchored at 1050.
pub fn settings() -> OrchestratorSettings {
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

pub fn governance() -> GovernanceParameters {
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

/// Participants `100..` with the given weights.
pub fn participants(weights: &[u128]) -> RewardData {
    RewardData {
        participants: (100..100 + weights.len() as u64)
            .map(Address::from_low_u64)
            .collect(),
        weights: weights.to_vec(),
        total_weight: weights.iter().sum(),
    }
}

// ----------------------------------------------------------------------
// Feed
// ----------------------------------------------------------------------

/// Scripted behaviour and call log of a [`MockFeed`].
#[derive(Default)]
pub struct FeedScript {
    pub fail_init: bool,
    pub fail_finalize: bool,
    pub fail_fallback: bool,
    pub fail_forced: bool,
    pub panic_on_finalize: bool,
    pub fail_activate: bool,
    pub fail_links: bool,
    pub reward: RewardData,
    pub price: PricePoint,
    pub active: bool,
    /// Operation names in call order.
    pub calls: Vec<&'static str>,
    /// `fallback` flag of every successful `initialize_for_reveal`.
    pub initialized: Vec<bool>,
    pub finalized: Vec<PriceEpochId>,
    pub configured: Vec<GovernanceParameters>,
    pub vote_power_blocks: Vec<BlockNumber>,
    pub links: Vec<FeedId>,
    pub underlying: Option<AssetId>,
}

impl FeedScript {
    pub fn count(&self, operation: &str) -> usize {
        self.calls.iter().filter(|c| **c == operation).count()
    }
}

pub type FeedHandle = Arc<Mutex<FeedScript>>;

pub struct MockFeed {
    address: FeedId,
    symbol: String,
    script: FeedHandle,
}

impl MockFeed {
    pub fn create(n: u64, symbol: &str) -> (Box<dyn Feed>, FeedHandle) {
        let script = FeedHandle::default();
        let feed = MockFeed {
            address: Address::from_low_u64(n),
            symbol: symbol.to_string(),
            script: Arc::clone(&script),
        };
        (Box::new(feed), script)
    }

    fn log(&self, operation: &'static str) -> std::sync::MutexGuard<'_, FeedScript> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(operation);
        script
    }
}

fn fail_if(flag: bool) -> CallResult<()> {
    if flag {
        Err(Fault::revert("scripted failure"))
    } else {
        Ok(())
    }
}

impl Feed for MockFeed {
    fn address(&self) -> FeedId {
        self.address
    }

    fn symbol(&self) -> String {
        self.symbol.clone()
    }

    fn initialize_for_reveal(&mut self, _seed: [u8; 32], fallback: bool) -> CallResult<()> {
        let mut script = self.log("initialize_for_reveal");
        fail_if(script.fail_init)?;
        script.initialized.push(fallback);
        Ok(())
    }

    fn finalize(&mut self, epoch: PriceEpochId) -> CallResult<RewardData> {
        let should_panic = {
            let mut script = self.log("finalize");
            script.finalized.push(epoch);
            script.panic_on_finalize
        };
        if should_panic {
            panic!("feed blew up");
        }
        let script = self.script.lock().unwrap();
        fail_if(script.fail_finalize)?;
        Ok(script.reward.clone())
    }

    fn fallback_finalize(&mut self, _epoch: PriceEpochId) -> CallResult<()> {
        fail_if(self.log("fallback_finalize").fail_fallback)
    }

    fn force_finalize(&mut self, _epoch: PriceEpochId) -> CallResult<()> {
        fail_if(self.log("force_finalize").fail_forced)
    }

    fn activate(&mut self) -> CallResult<()> {
        let mut script = self.log("activate");
        fail_if(script.fail_activate)?;
        script.active = true;
        Ok(())
    }

    fn deactivate(&mut self) -> CallResult<()> {
        self.log("deactivate").active = false;
        Ok(())
    }

    fn set_vote_power_block(&mut self, block: BlockNumber) -> CallResult<()> {
        self.log("set_vote_power_block").vote_power_blocks.push(block);
        Ok(())
    }

    fn set_asset_links(&mut self, members: &[FeedId]) -> CallResult<()> {
        let mut script = self.log("set_asset_links");
        fail_if(script.fail_links)?;
        script.links = members.to_vec();
        Ok(())
    }

    fn set_underlying(&mut self, asset: AssetId) -> CallResult<()> {
        self.log("set_underlying").underlying = Some(asset);
        Ok(())
    }

    fn current_price(&self) -> CallResult<PricePoint> {
        Ok(self.script.lock().unwrap().price)
    }

    fn set_initial_price(&mut self, point: PricePoint) -> CallResult<()> {
        self.log("set_initial_price").price = point;
        Ok(())
    }

    fn configure(&mut self, params: &GovernanceParameters) -> CallResult<()> {
        self.log("configure").configured.push(params.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Reward ledger
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct LedgerLog {
    pub fail_close: bool,
    pub fail_distribute: bool,
    pub distributions: Vec<DistributionInstruction>,
    /// `(price epoch, duration, end time)` of every accrual.
    pub accruals: Vec<(PriceEpochId, u64, Timestamp)>,
    pub closed: Vec<RewardEpochId>,
}

pub type LedgerHandle = Arc<Mutex<LedgerLog>>;

pub struct MockLedger {
    log: LedgerHandle,
}

impl MockLedger {
    pub const ADDRESS: Address = Address::from_low_u64(0xFEED);

    pub fn create() -> (Box<dyn RewardLedger>, LedgerHandle) {
        let log = LedgerHandle::default();
        (
            Box::new(MockLedger {
                log: Arc::clone(&log),
            }),
            log,
        )
    }
}

impl RewardLedger for MockLedger {
    fn address(&self) -> Address {
        Self::ADDRESS
    }

    fn distribute_rewards(&mut self, instruction: &DistributionInstruction) -> CallResult<()> {
        let mut log = self.log.lock().unwrap();
        fail_if(log.fail_distribute)?;
        log.distributions.push(instruction.clone());
        Ok(())
    }

    fn accrue_unearned_rewards(
        &mut self,
        epoch: PriceEpochId,
        duration_secs: u64,
        end_time: Timestamp,
    ) -> CallResult<()> {
        self.log
            .lock()
            .unwrap()
            .accruals
            .push((epoch, duration_secs, end_time));
        Ok(())
    }

    fn close_expired_reward_epoch(&mut self, reward_epoch: RewardEpochId) -> CallResult<()> {
        let mut log = self.log.lock().unwrap();
        fail_if(log.fail_close)?;
        log.closed.push(reward_epoch);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Cleanup target
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct CleanupLog {
    pub fail: bool,
    pub blocks: Vec<BlockNumber>,
}

pub type CleanupHandle = Arc<Mutex<CleanupLog>>;

pub struct MockCleanupTarget {
    address: Address,
    log: CleanupHandle,
}

impl MockCleanupTarget {
    pub fn create(n: u64) -> (Box<dyn CleanupTarget>, CleanupHandle) {
        let log = CleanupHandle::default();
        (
            Box::new(MockCleanupTarget {
                address: Address::from_low_u64(n),
                log: Arc::clone(&log),
            }),
            log,
        )
    }
}

impl CleanupTarget for MockCleanupTarget {
    fn address(&self) -> Address {
        self.address
    }

    fn set_cleanup_block(&mut self, block: BlockNumber) -> CallResult<()> {
        let mut log = self.log.lock().unwrap();
        fail_if(log.fail)?;
        log.blocks.push(block);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

/// An activated orchestrator with governance set, plus a block clock.
///
/// Every tick mines one block; the first tick is block 11.
pub struct Harness {
    pub orchestrator: EpochOrchestrator,
    pub ledger: LedgerHandle,
    pub block: BlockNumber,
    pub now: Timestamp,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(settings(), governance())
    }

    pub fn with(settings: OrchestratorSettings, params: GovernanceParameters) -> Self {
        let (ledger, log) = MockLedger::create();
        let mut orchestrator = EpochOrchestrator::new(settings, ledger).unwrap();
        orchestrator.set_governance_parameters(params).unwrap();
        orchestrator.activate();
        orchestrator.take_events();
        Self {
            orchestrator,
            ledger: log,
            block: 10,
            now: 0,
        }
    }

    /// Register a mock feed and hand back its script.
    pub fn add_feed(&mut self, n: u64, symbol: &str) -> FeedHandle {
        let (feed, handle) = MockFeed::create(n, symbol);
        self.orchestrator.add_feed(feed).unwrap();
        handle
    }

    /// Mine one block at `timestamp` with entropy derived from the block number.
    pub fn tick_at(&mut self, timestamp: Timestamp) -> Result<TickOutcome, TerminalFault> {
        let seed = entropy::derive_key(
            "cadence integration tests 2024-01-01 block entropy",
            &(self.block + 1).to_le_bytes(),
        );
        self.tick_with(timestamp, seed)
    }

    /// Mine one block at `timestamp` with explicit entropy.
    pub fn tick_with(
        &mut self,
        timestamp: Timestamp,
        entropy: [u8; 32],
    ) -> Result<TickOutcome, TerminalFault> {
        self.block += 1;
        self.now = timestamp;
        self.orchestrator
            .tick(&BlockContext::new(self.block, timestamp, entropy))
    }

    /// Tick every `step` seconds after the last tick (or from the first
    /// reward epoch anchor) up to and including `until`, returning every
    /// non-idle outcome.
    pub fn run_until(&mut self, until: Timestamp, step: u64) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        let mut t = if self.now == 0 {
            self.orchestrator.settings().reward_epoch_start
        } else {
            self.now + step
        };
        while t <= until {
            match self.tick_at(t) {
                Ok(TickOutcome::Idle) => {}
                Ok(outcome) => outcomes.push(outcome),
                Err(fault) => panic!("unexpected terminal fault: {fault}"),
            }
            t += step;
        }
        outcomes
    }

    pub fn events(&mut self) -> Vec<OrchestratorEvent> {
        self.orchestrator.take_events()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
