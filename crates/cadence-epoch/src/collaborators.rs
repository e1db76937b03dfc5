//! Traits for the collaborators the orchestrator drives.
//!
//! Every method returns a [`CallResult`]; the orchestrator routes each call
//! through the fault-isolated invoker, so an implementation may fail (or
//! even panic) without taking the tick down with it.
//!
//! Implementations are expected to bound their own work and report
//! [`Fault::OutOfGas`](cadence_faults::Fault::OutOfGas) rather than block.

use cadence_faults::CallResult;
use cadence_gov::GovernanceParameters;
use cadence_types::{
    Address, AssetId, BlockNumber, DistributionInstruction, FeedId, PriceEpochId, RewardData,
    RewardEpochId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// A feed's last finalized price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: u128,
    pub timestamp: Timestamp,
}

/// A price-reporting feed.
pub trait Feed: Send {
    /// Stable handle of the feed.
    fn address(&self) -> FeedId;

    fn symbol(&self) -> String;

    /// Open the current epoch for submissions. `fallback` restricts the
    /// epoch to trusted addresses.
    fn initialize_for_reveal(&mut self, seed: [u8; 32], fallback: bool) -> CallResult<()>;

    /// Compute the epoch price and report rewardable participants.
    fn finalize(&mut self, epoch: PriceEpochId) -> CallResult<RewardData>;

    /// Finalize using only trusted-address submissions. Earns no rewards.
    fn fallback_finalize(&mut self, epoch: PriceEpochId) -> CallResult<()>;

    /// Carry the previous price forward. Earns no rewards.
    fn force_finalize(&mut self, epoch: PriceEpochId) -> CallResult<()>;

    fn activate(&mut self) -> CallResult<()>;

    fn deactivate(&mut self) -> CallResult<()>;

    fn set_vote_power_block(&mut self, block: BlockNumber) -> CallResult<()>;

    /// Set the constituent feeds of a multi-feed asset.
    fn set_asset_links(&mut self, members: &[FeedId]) -> CallResult<()>;

    fn set_underlying(&mut self, asset: AssetId) -> CallResult<()>;

    fn current_price(&self) -> CallResult<PricePoint>;

    /// Seed the price of a replacement feed.
    fn set_initial_price(&mut self, point: PricePoint) -> CallResult<()>;

    /// Apply a governance parameter generation.
    fn configure(&mut self, params: &GovernanceParameters) -> CallResult<()>;
}

/// Downstream reward accounting.
pub trait RewardLedger: Send {
    fn address(&self) -> Address;

    /// Credit the winning feed's participants for one price epoch.
    fn distribute_rewards(&mut self, instruction: &DistributionInstruction) -> CallResult<()>;

    /// Book a price epoch's reward as unearned.
    fn accrue_unearned_rewards(
        &mut self,
        epoch: PriceEpochId,
        duration_secs: u64,
        end_time: Timestamp,
    ) -> CallResult<()>;

    /// Stop accepting claims for an expired reward epoch.
    fn close_expired_reward_epoch(&mut self, reward_epoch: RewardEpochId) -> CallResult<()>;
}

/// A token that prunes vote-power history older than a cleanup block.
pub trait CleanupTarget: Send {
    fn address(&self) -> Address;

    fn set_cleanup_block(&mut self, block: BlockNumber) -> CallResult<()>;
}
