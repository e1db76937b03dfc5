//! In-process collaborators for running the orchestrator without a chain.
//!
//! [`SimulatedFeed`] walks a random price and reports random participant
//! weights, failing epoch calls at a configured rate. [`InMemoryRewardLedger`]
//! credits balances with [`DistributionInstruction::shares`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cadence_epoch::{CleanupTarget, EpochOrchestrator, Feed, PricePoint, RewardLedger};
use cadence_faults::{CallResult, Fault};
use cadence_gov::GovernanceParameters;
use cadence_types::{
    Address, AssetId, BlockNumber, DistributionInstruction, FeedId, PriceEpochId, RewardData,
    RewardEpochId, Timestamp,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DaemonConfig;

/// Derive a stable 20-byte address from a label.
pub fn address_of(label: &[u8]) -> Address {
    let digest = blake3::hash(label);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[..20]);
    Address(bytes)
}

// ----------------------------------------------------------------------
// Feeds
// ----------------------------------------------------------------------

/// A feed with a random-walk price and random failures.
pub struct SimulatedFeed {
    address: FeedId,
    symbol: String,
    rng: StdRng,
    failure_rate: f64,
    participants: Vec<Address>,
    price: PricePoint,
    active: bool,
    fallback_epoch: bool,
    vote_power_block: BlockNumber,
    trusted: Vec<Address>,
    links: Vec<FeedId>,
    underlying: Option<AssetId>,
}

impl SimulatedFeed {
    pub fn new(symbol: &str, participants: usize, failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let participants = (0..participants)
            .map(|i| address_of(format!("{symbol}/provider/{i}").as_bytes()))
            .collect();
        Self {
            address: address_of(format!("feed/{symbol}").as_bytes()),
            symbol: symbol.to_string(),
            rng,
            failure_rate,
            participants,
            price: PricePoint {
                price: 1_000_000,
                timestamp: 0,
            },
            active: false,
            fallback_epoch: false,
            vote_power_block: 0,
            trusted: Vec::new(),
            links: Vec::new(),
            underlying: None,
        }
    }

    fn maybe_fail(&mut self, operation: &str) -> CallResult<()> {
        if self.rng.gen_bool(self.failure_rate) {
            return Err(Fault::revert(format!("{} {operation} rejected", self.symbol)));
        }
        Ok(())
    }

    fn step_price(&mut self) {
        let drift: i64 = self.rng.gen_range(-500..=500);
        let scaled = self.price.price as i128 * (1_000_000 + drift as i128) / 1_000_000;
        self.price.price = scaled.max(1) as u128;
    }
}

impl Feed for SimulatedFeed {
    fn address(&self) -> FeedId {
        self.address
    }

    fn symbol(&self) -> String {
        self.symbol.clone()
    }

    fn initialize_for_reveal(&mut self, _seed: [u8; 32], fallback: bool) -> CallResult<()> {
        if !self.active {
            return Err(Fault::revert("feed inactive"));
        }
        self.maybe_fail("initialize_for_reveal")?;
        self.fallback_epoch = fallback;
        Ok(())
    }

    fn finalize(&mut self, epoch: PriceEpochId) -> CallResult<RewardData> {
        if self.fallback_epoch {
            return Err(Fault::revert("epoch opened in fallback mode"));
        }
        self.maybe_fail("finalize")?;
        self.step_price();

        let count = if self.participants.is_empty() {
            0
        } else {
            self.rng.gen_range(1..=self.participants.len())
        };
        let participants: Vec<Address> = self.participants[..count].to_vec();
        let weights: Vec<u128> = (0..count).map(|_| self.rng.gen_range(1..=100)).collect();
        let total_weight = weights.iter().sum();
        tracing::trace!(feed = %self.symbol, epoch, price = self.price.price, "finalized");
        Ok(RewardData {
            participants,
            weights,
            total_weight,
        })
    }

    fn fallback_finalize(&mut self, epoch: PriceEpochId) -> CallResult<()> {
        if self.trusted.is_empty() {
            return Err(Fault::revert("no trusted submissions"));
        }
        self.maybe_fail("fallback_finalize")?;
        self.step_price();
        tracing::trace!(feed = %self.symbol, epoch, "fallback finalized");
        Ok(())
    }

    fn force_finalize(&mut self, epoch: PriceEpochId) -> CallResult<()> {
        tracing::trace!(feed = %self.symbol, epoch, "price carried forward");
        Ok(())
    }

    fn activate(&mut self) -> CallResult<()> {
        self.active = true;
        Ok(())
    }

    fn deactivate(&mut self) -> CallResult<()> {
        self.active = false;
        Ok(())
    }

    fn set_vote_power_block(&mut self, block: BlockNumber) -> CallResult<()> {
        self.vote_power_block = block;
        Ok(())
    }

    fn set_asset_links(&mut self, members: &[FeedId]) -> CallResult<()> {
        self.links = members.to_vec();
        Ok(())
    }

    fn set_underlying(&mut self, asset: AssetId) -> CallResult<()> {
        self.underlying = Some(asset);
        Ok(())
    }

    fn current_price(&self) -> CallResult<PricePoint> {
        Ok(self.price)
    }

    fn set_initial_price(&mut self, point: PricePoint) -> CallResult<()> {
        self.price = point;
        Ok(())
    }

    fn configure(&mut self, params: &GovernanceParameters) -> CallResult<()> {
        self.trusted = params.trusted_addresses.clone();
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Reward ledger
// ----------------------------------------------------------------------

/// Balances credited by [`InMemoryRewardLedger`].
#[derive(Debug, Default)]
pub struct RewardBook {
    pub balances: HashMap<Address, u128>,
    /// Total credited to participants.
    pub distributed: u128,
    /// Total booked as unearned.
    pub unearned: u128,
    pub closed_reward_epochs: Vec<RewardEpochId>,
    pub last_end_time: Timestamp,
}

/// A reward ledger that pays a fixed amount per price epoch.
pub struct InMemoryRewardLedger {
    address: Address,
    reward_per_epoch: u128,
    book: Arc<Mutex<RewardBook>>,
}

impl InMemoryRewardLedger {
    pub fn new(reward_per_epoch: u128) -> Self {
        Self {
            address: address_of(b"reward-ledger"),
            reward_per_epoch,
            book: Arc::new(Mutex::new(RewardBook::default())),
        }
    }

    /// Shared handle to the balances.
    pub fn book(&self) -> Arc<Mutex<RewardBook>> {
        Arc::clone(&self.book)
    }
}

impl RewardLedger for InMemoryRewardLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn distribute_rewards(&mut self, instruction: &DistributionInstruction) -> CallResult<()> {
        let mut book = self
            .book
            .lock()
            .map_err(|_| Fault::revert("reward book poisoned"))?;
        let shares = instruction.shares(self.reward_per_epoch);
        for (participant, share) in instruction.participants.iter().zip(shares) {
            *book.balances.entry(*participant).or_default() += share;
            book.distributed += share;
        }
        book.last_end_time = instruction.price_epoch_end_time;
        Ok(())
    }

    fn accrue_unearned_rewards(
        &mut self,
        _epoch: PriceEpochId,
        _duration_secs: u64,
        end_time: Timestamp,
    ) -> CallResult<()> {
        let mut book = self
            .book
            .lock()
            .map_err(|_| Fault::revert("reward book poisoned"))?;
        book.unearned += self.reward_per_epoch;
        book.last_end_time = end_time;
        Ok(())
    }

    fn close_expired_reward_epoch(&mut self, reward_epoch: RewardEpochId) -> CallResult<()> {
        let mut book = self
            .book
            .lock()
            .map_err(|_| Fault::revert("reward book poisoned"))?;
        book.closed_reward_epochs.push(reward_epoch);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Cleanup target
// ----------------------------------------------------------------------

/// A vote-power token that only remembers its cleanup block.
pub struct SimulatedToken {
    address: Address,
    cleanup_block: Arc<AtomicU64>,
}

impl SimulatedToken {
    pub fn new(name: &str) -> Self {
        Self {
            address: address_of(format!("token/{name}").as_bytes()),
            cleanup_block: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cleanup_block(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.cleanup_block)
    }
}

impl CleanupTarget for SimulatedToken {
    fn address(&self) -> Address {
        self.address
    }

    fn set_cleanup_block(&mut self, block: BlockNumber) -> CallResult<()> {
        self.cleanup_block.store(block, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Wiring
// ----------------------------------------------------------------------

/// A configured orchestrator plus handles into its simulated collaborators.
pub struct Simulation {
    pub orchestrator: EpochOrchestrator,
    pub book: Arc<Mutex<RewardBook>>,
    pub cleanup_block: Arc<AtomicU64>,
}

/// Build and activate an orchestrator driving one simulated feed per symbol.
pub fn build(config: &DaemonConfig) -> anyhow::Result<Simulation> {
    let ledger = InMemoryRewardLedger::new(config.feeds.reward_per_epoch);
    let book = ledger.book();

    let mut orchestrator = EpochOrchestrator::new(config.epochs.clone(), Box::new(ledger))?;
    orchestrator.set_governance_parameters(config.governance.clone())?;

    let feeds: Vec<Box<dyn Feed>> = config
        .feeds
        .symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| {
            Box::new(SimulatedFeed::new(
                symbol,
                config.feeds.participants,
                config.feeds.failure_rate,
                config.chain.seed.map(|s| s.wrapping_add(i as u64 + 1)),
            )) as Box<dyn Feed>
        })
        .collect();
    orchestrator.bulk_add(feeds)?;

    let token = SimulatedToken::new("wnat");
    let cleanup_block = token.cleanup_block();
    orchestrator.register_cleanup_target(Box::new(token));

    orchestrator.activate();
    Ok(Simulation {
        orchestrator,
        book,
        cleanup_block,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SimulatedChain;
    use cadence_epoch::{OrchestratorSettings, TickOutcome};

    #[test]
    fn test_feed_address_is_stable() {
        let a = SimulatedFeed::new("XRP", 2, 0.0, Some(1));
        let b = SimulatedFeed::new("XRP", 2, 0.0, Some(2));
        let c = SimulatedFeed::new("LTC", 2, 0.0, Some(1));
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
    }

    #[test]
    fn test_feed_reports_well_formed_rewards() {
        let mut feed = SimulatedFeed::new("XRP", 3, 0.0, Some(7));
        feed.activate().expect("activate");
        feed.initialize_for_reveal([0u8; 32], false).expect("init");
        for epoch in 0..20 {
            let data = feed.finalize(epoch).expect("finalize");
            assert!(data.is_well_formed());
            assert!(data.has_participants());
            assert_eq!(data.total_weight, data.weights.iter().sum::<u128>());
        }
    }

    #[test]
    fn test_feed_failure_injection() {
        let mut feed = SimulatedFeed::new("XRP", 3, 1.0, Some(7));
        feed.activate().expect("activate");
        assert!(feed.initialize_for_reveal([0u8; 32], false).is_err());
        assert!(feed.finalize(0).is_err());
        feed.force_finalize(0).expect("force never fails");
    }

    #[test]
    fn test_fallback_finalize_needs_trusted_addresses() {
        let mut feed = SimulatedFeed::new("XRP", 1, 0.0, Some(7));
        assert!(feed.fallback_finalize(0).is_err());

        let mut params = DaemonConfig::default().governance;
        params.trusted_addresses = vec![Address::from_low_u64(1)];
        feed.configure(&params).expect("configure");
        feed.fallback_finalize(0).expect("fallback");
    }

    #[test]
    fn test_ledger_credits_shares() {
        let mut ledger = InMemoryRewardLedger::new(1_000);
        let book = ledger.book();
        let a = Address::from_low_u64(1);
        let b = Address::from_low_u64(2);
        ledger
            .distribute_rewards(&DistributionInstruction {
                participants: vec![a, b],
                weights: vec![25, 75],
                total_weight: 100,
                price_epoch_id: 0,
                feed: Address::from_low_u64(9),
                price_epoch_duration_secs: 180,
                reward_epoch_id: 0,
                price_epoch_end_time: 179,
                vote_power_block: 1,
            })
            .expect("distribute");

        let book = book.lock().expect("lock");
        assert_eq!(book.balances.get(&a), Some(&250));
        assert_eq!(book.balances.get(&b), Some(&750));
        assert_eq!(book.distributed, 1_000);
        assert_eq!(book.last_end_time, 179);
    }

    #[test]
    fn test_simulation_distributes_rewards() {
        let mut config = DaemonConfig::default();
        config.chain.seed = Some(11);
        config.feeds.failure_rate = 0.0;
        config.epochs = OrchestratorSettings {
            first_price_epoch_start: 0,
            price_epoch_duration_secs: 20,
            reveal_duration_secs: 10,
            reward_epoch_start: 10,
            reward_epoch_duration_secs: 200,
            vote_power_boundary_fraction: 4,
            error_ledger_capacity: 16,
        };

        let mut sim = build(&config).expect("build");
        let mut chain = SimulatedChain::new(&config.chain);
        let mut finalized = 0;
        let mut rollovers = 0;
        for _ in 0..600 {
            let ctx = chain.next_block();
            match sim.orchestrator.tick(&ctx).expect("tick") {
                TickOutcome::PriceEpochFinalized(_) => finalized += 1,
                TickOutcome::RewardEpochRolledOver(_) => rollovers += 1,
                _ => {}
            }
        }

        assert!(finalized > 10);
        assert!(rollovers >= 3);
        let book = sim.book.lock().expect("lock");
        assert!(book.distributed > 0);
        assert_eq!(book.unearned, 0);
        assert!(sim.orchestrator.error_window(0, 16).counts.is_empty());
    }
}
