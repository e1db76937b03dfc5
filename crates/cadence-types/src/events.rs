//! Events emitted by the orchestrator.
//!
//! Collaborator failures never fail a tick; they surface as one of the
//! `*Failed` variants below (and as an entry in the error ledger).

use serde::{Deserialize, Serialize};

use crate::{AssetId, BlockNumber, FeedId, PriceEpochId, RewardEpochId};

/// Which finalization strategy produced a feed's price for an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationTier {
    /// Regular weighted-median finalize.
    Normal,
    /// Trusted-address-only finalize.
    Fallback,
    /// Previous price carried forward.
    Forced,
}

impl FinalizationTier {
    /// The tier to try after this one fails, if any.
    pub fn next(self) -> Option<FinalizationTier> {
        match self {
            FinalizationTier::Normal => Some(FinalizationTier::Fallback),
            FinalizationTier::Fallback => Some(FinalizationTier::Forced),
            FinalizationTier::Forced => None,
        }
    }
}

/// Everything observable the orchestrator does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    // Lifecycle
    Activated,

    // Registry
    FeedAdded {
        feed: FeedId,
        added: bool,
    },
    FeedActivationChanged {
        feed: FeedId,
        active: bool,
    },
    CompositeSet {
        feed: FeedId,
        members: Vec<FeedId>,
    },
    UnderlyingSet {
        feed: FeedId,
        asset: AssetId,
    },
    SettingAssetLinksFailed {
        feed: FeedId,
        members: Vec<FeedId>,
    },

    // Governance
    GovernanceParametersStaged {
        generation: u64,
    },
    GovernanceParametersApplied {
        generation: u64,
    },
    FallbackModeChanged {
        enabled: bool,
    },
    FeedFallbackModeChanged {
        feed: FeedId,
        enabled: bool,
    },
    RewardEpochDurationChanged {
        duration_secs: u64,
    },

    // Reward epochs
    RewardEpochInitialized {
        reward_epoch_id: RewardEpochId,
        vote_power_block: BlockNumber,
        start_block: BlockNumber,
    },
    RewardEpochFinalized {
        reward_epoch_id: RewardEpochId,
        vote_power_block: BlockNumber,
        start_block: BlockNumber,
    },
    ClosingExpiredRewardEpochFailed {
        reward_epoch_id: RewardEpochId,
    },
    CleanupBlockSet {
        target: FeedId,
        block: BlockNumber,
    },
    CleanupBlockFailed {
        target: FeedId,
        block: BlockNumber,
    },
    CleanupTargetsUnset,
    SettingVotePowerBlockFailed {
        feed: FeedId,
        block: BlockNumber,
    },

    // Price epochs
    PriceEpochInitialized {
        price_epoch_id: PriceEpochId,
    },
    InitializingForRevealFailed {
        feed: FeedId,
        price_epoch_id: PriceEpochId,
        fallback: bool,
    },
    ConfiguringFeedFailed {
        feed: FeedId,
        generation: u64,
    },
    FeedFinalized {
        feed: FeedId,
        price_epoch_id: PriceEpochId,
        tier: FinalizationTier,
    },
    FinalizingPriceEpochFailed {
        feed: FeedId,
        price_epoch_id: PriceEpochId,
        failed_tier: FinalizationTier,
    },
    PriceEpochFinalized {
        price_epoch_id: PriceEpochId,
        winner: Option<FeedId>,
        reward_epoch_id: RewardEpochId,
    },
    DistributingRewardsFailed {
        feed: FeedId,
        price_epoch_id: PriceEpochId,
    },
    AccruingUnearnedRewardsFailed {
        price_epoch_id: PriceEpochId,
    },
}

impl OrchestratorEvent {
    /// Stable snake_case name of the variant, used for logging and filtering.
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorEvent::Activated => "activated",
            OrchestratorEvent::FeedAdded { .. } => "feed_added",
            OrchestratorEvent::FeedActivationChanged { .. } => "feed_activation_changed",
            OrchestratorEvent::CompositeSet { .. } => "composite_set",
            OrchestratorEvent::UnderlyingSet { .. } => "underlying_set",
            OrchestratorEvent::SettingAssetLinksFailed { .. } => "setting_asset_links_failed",
            OrchestratorEvent::GovernanceParametersStaged { .. } => "governance_parameters_staged",
            OrchestratorEvent::GovernanceParametersApplied { .. } => {
                "governance_parameters_applied"
            }
            OrchestratorEvent::FallbackModeChanged { .. } => "fallback_mode_changed",
            OrchestratorEvent::FeedFallbackModeChanged { .. } => "feed_fallback_mode_changed",
            OrchestratorEvent::RewardEpochDurationChanged { .. } => "reward_epoch_duration_changed",
            OrchestratorEvent::RewardEpochInitialized { .. } => "reward_epoch_initialized",
            OrchestratorEvent::RewardEpochFinalized { .. } => "reward_epoch_finalized",
            OrchestratorEvent::ClosingExpiredRewardEpochFailed { .. } => {
                "closing_expired_reward_epoch_failed"
            }
            OrchestratorEvent::CleanupBlockSet { .. } => "cleanup_block_set",
            OrchestratorEvent::CleanupBlockFailed { .. } => "cleanup_block_failed",
            OrchestratorEvent::CleanupTargetsUnset => "cleanup_targets_unset",
            OrchestratorEvent::SettingVotePowerBlockFailed { .. } => {
                "setting_vote_power_block_failed"
            }
            OrchestratorEvent::PriceEpochInitialized { .. } => "price_epoch_initialized",
            OrchestratorEvent::InitializingForRevealFailed { .. } => {
                "initializing_for_reveal_failed"
            }
            OrchestratorEvent::ConfiguringFeedFailed { .. } => "configuring_feed_failed",
            OrchestratorEvent::FeedFinalized { .. } => "feed_finalized",
            OrchestratorEvent::FinalizingPriceEpochFailed { .. } => "finalizing_price_epoch_failed",
            OrchestratorEvent::PriceEpochFinalized { .. } => "price_epoch_finalized",
            OrchestratorEvent::DistributingRewardsFailed { .. } => "distributing_rewards_failed",
            OrchestratorEvent::AccruingUnearnedRewardsFailed { .. } => {
                "accruing_unearned_rewards_failed"
            }
        }
    }

    /// Whether the event reports a captured collaborator failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorEvent::SettingAssetLinksFailed { .. }
                | OrchestratorEvent::ClosingExpiredRewardEpochFailed { .. }
                | OrchestratorEvent::CleanupBlockFailed { .. }
                | OrchestratorEvent::SettingVotePowerBlockFailed { .. }
                | OrchestratorEvent::InitializingForRevealFailed { .. }
                | OrchestratorEvent::ConfiguringFeedFailed { .. }
                | OrchestratorEvent::FinalizingPriceEpochFailed { .. }
                | OrchestratorEvent::DistributingRewardsFailed { .. }
                | OrchestratorEvent::AccruingUnearnedRewardsFailed { .. }
        )
    }
}
