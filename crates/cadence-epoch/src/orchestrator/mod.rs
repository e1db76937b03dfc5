//! The tick handler.
//!
//! ```text
//!  Inactive ──activate()──► AwaitingFirstRewardEpoch
//!                                  │ now >= reward_epoch_start
//!                                  ▼
//!        ┌──────────────► AwaitingPriceEpoch ──initialize──► RevealWindow
//!        │                         ▲                              │ now >= reveal_end
//!        │                         │                              ▼
//!        └───── finalize ──────────┴──────────────────────── PendingFinalize
//!
//!  any Active sub-state ── now >= reward_epoch_end ──► PendingRollover ──► (back)
//! ```
//!
//! The orchestrator owns the registry, the governance store, the error
//! ledger and every collaborator handle. Privileged setters live in the
//! `admin` submodule, the tick rules in `tick`.

mod admin;
mod tick;

pub use tick::MALFORMED_REWARD_DATA;

use std::collections::{HashMap, HashSet};

use cadence_faults::{ErrorWindow, Fault, FaultIsolatedInvoker};
use cadence_gov::GovernanceParameterStore;
use cadence_registry::{AssetRegistry, RegistryError};
use cadence_types::{
    BlockNumber, FeedId, FinalizationTier, OrchestratorEvent, PriceEpochId, RewardEpochId,
    Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::checkpoint::VotePowerCheckpointSelector;
use crate::collaborators::{CleanupTarget, Feed, RewardLedger};
use crate::schedule::{PriceEpochInfo, PriceEpochSchedule};
use crate::settings::OrchestratorSettings;
use crate::Result;

/// Observable sub-state of the orchestrator at a given time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Inactive,
    AwaitingFirstRewardEpoch,
    /// Nothing pending; the next price epoch has not been initialized yet.
    AwaitingPriceEpoch,
    /// A price epoch is open for submissions or reveals.
    RevealWindow,
    /// The pending price epoch's reveal window has closed.
    PendingFinalize,
    /// The current reward epoch's end boundary has passed.
    PendingRollover,
}

/// One reward epoch. The vote-power block never changes once assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEpoch {
    pub id: RewardEpochId,
    pub start_block: BlockNumber,
    pub start_timestamp: Timestamp,
    pub vote_power_block: BlockNumber,
}

/// Summary of the most recently finalized price epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedPriceEpoch {
    pub price_epoch_id: PriceEpochId,
    /// The reward-bearing feed, if any feed reported participants.
    pub winner: Option<FeedId>,
    pub reward_epoch_id: RewardEpochId,
    /// Tier each active feed finalized at, in registration order.
    pub tiers: Vec<(FeedId, FinalizationTier)>,
}

impl FinalizedPriceEpoch {
    /// The tier `feed` finalized at, if it took part.
    pub fn tier_of(&self, feed: FeedId) -> Option<FinalizationTier> {
        self.tiers
            .iter()
            .find(|(f, _)| *f == feed)
            .map(|(_, tier)| *tier)
    }
}

/// What a tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The orchestrator has not been activated.
    Inactive,
    /// No transition was due.
    Idle,
    RewardEpochInitialized(RewardEpochId),
    RewardEpochRolledOver(RewardEpochId),
    PriceEpochFinalized(PriceEpochId),
    PriceEpochInitialized(PriceEpochId),
}

/// A feed failed every finalization tier. The only error a tick returns.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("feed {feed} failed every finalization tier for price epoch {price_epoch_id}: {last_fault}")]
pub struct TerminalFault {
    pub feed: FeedId,
    pub price_epoch_id: PriceEpochId,
    /// The forced-tier failure.
    pub last_fault: Fault,
}

/// One entry of a replace or bulk-replace request.
pub struct FeedReplacement {
    pub old: FeedId,
    pub new: Box<dyn Feed>,
    /// Seed the new feed with the old feed's current price.
    pub copy_price: bool,
    /// Carry over composite members and underlying asset.
    pub copy_links: bool,
}

/// Tick-driven epoch state machine.
pub struct EpochOrchestrator {
    settings: OrchestratorSettings,
    schedule: PriceEpochSchedule,
    checkpoint: VotePowerCheckpointSelector,
    active: bool,

    registry: AssetRegistry,
    feeds: HashMap<FeedId, Box<dyn Feed>>,
    governance: GovernanceParameterStore,
    invoker: FaultIsolatedInvoker,
    reward_ledger: Box<dyn RewardLedger>,
    cleanup_targets: Vec<Box<dyn CleanupTarget>>,

    fallback_mode: bool,
    /// Feeds whose last initialize failed in both modes.
    not_initialized: HashSet<FeedId>,

    reward_epochs: Vec<RewardEpoch>,
    reward_epoch_duration: u64,
    /// First second after the current reward epoch.
    reward_epoch_end: Timestamp,
    /// Next reward epoch to close at the reward ledger.
    expiry_cursor: RewardEpochId,

    pending_price_epoch: Option<tick::PendingPriceEpoch>,
    last_initialized_price_epoch: Option<PriceEpochId>,
    last_finalized: Option<FinalizedPriceEpoch>,

    /// Block of the latest tick, used to stamp ledger records from setters.
    last_block: BlockNumber,
    events: Vec<OrchestratorEvent>,
}

impl EpochOrchestrator {
    /// Build an inactive orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`EpochError::Settings`](crate::EpochError::Settings) for any
    /// rejected setting.
    pub fn new(settings: OrchestratorSettings, reward_ledger: Box<dyn RewardLedger>) -> Result<Self> {
        settings.validate()?;
        let checkpoint = VotePowerCheckpointSelector::new(settings.vote_power_boundary_fraction)?;
        tracing::info!(
            price_epoch_secs = settings.price_epoch_duration_secs,
            reveal_secs = settings.reveal_duration_secs,
            reward_epoch_secs = settings.reward_epoch_duration_secs,
            "epoch orchestrator created"
        );
        Ok(Self {
            schedule: PriceEpochSchedule::new(&settings),
            checkpoint,
            active: false,
            registry: AssetRegistry::new(),
            feeds: HashMap::new(),
            governance: GovernanceParameterStore::new(),
            invoker: FaultIsolatedInvoker::new(settings.error_ledger_capacity),
            reward_ledger,
            cleanup_targets: Vec::new(),
            fallback_mode: false,
            not_initialized: HashSet::new(),
            reward_epochs: Vec::new(),
            reward_epoch_duration: settings.reward_epoch_duration_secs,
            reward_epoch_end: 0,
            expiry_cursor: 0,
            pending_price_epoch: None,
            last_initialized_price_epoch: None,
            last_finalized: None,
            last_block: 0,
            events: Vec::new(),
            settings,
        })
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sub-state the next tick at `now` would act on.
    pub fn phase(&self, now: Timestamp) -> Phase {
        if !self.active {
            return Phase::Inactive;
        }
        if self.reward_epochs.is_empty() {
            return Phase::AwaitingFirstRewardEpoch;
        }
        if now >= self.reward_epoch_end {
            return Phase::PendingRollover;
        }
        match self.pending_price_epoch.as_ref().map(|pending| pending.id) {
            Some(id) if now >= self.schedule.info(id).reveal_end => Phase::PendingFinalize,
            Some(_) => Phase::RevealWindow,
            None => Phase::AwaitingPriceEpoch,
        }
    }

    /// Timing of the price epoch containing `now`.
    pub fn current_price_epoch(&self, now: Timestamp) -> PriceEpochInfo {
        self.schedule.info(self.schedule.epoch_at(now))
    }

    pub fn schedule(&self) -> &PriceEpochSchedule {
        &self.schedule
    }

    /// The price epoch initialized and awaiting finalization, if any.
    pub fn last_unprocessed_price_epoch(&self) -> Option<PriceEpochId> {
        self.pending_price_epoch.as_ref().map(|pending| pending.id)
    }

    pub fn last_finalized_price_epoch(&self) -> Option<&FinalizedPriceEpoch> {
        self.last_finalized.as_ref()
    }

    pub fn current_reward_epoch(&self) -> Option<&RewardEpoch> {
        self.reward_epochs.last()
    }

    pub fn reward_epoch(&self, id: RewardEpochId) -> Option<&RewardEpoch> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.reward_epochs.get(index))
    }

    /// First second after the current reward epoch (0 before the first one).
    pub fn current_reward_epoch_end(&self) -> Timestamp {
        self.reward_epoch_end
    }

    pub fn reward_epoch_duration(&self) -> u64 {
        self.reward_epoch_duration
    }

    /// Next reward epoch the reward ledger will be asked to close.
    pub fn reward_epoch_to_expire_next(&self) -> RewardEpochId {
        self.expiry_cursor
    }

    pub fn fallback_mode(&self) -> bool {
        self.fallback_mode
    }

    /// Per-feed fallback flag.
    pub fn feed_fallback_mode(&self, feed: FeedId) -> Result<bool> {
        self.registry
            .get(feed)
            .map(|entry| entry.fallback)
            .ok_or_else(|| RegistryError::NotFound(feed).into())
    }

    /// False while the feed's last initialize failed in both modes.
    pub fn is_feed_initialized(&self, feed: FeedId) -> bool {
        self.registry.contains(feed) && !self.not_initialized.contains(&feed)
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn governance(&self) -> &GovernanceParameterStore {
        &self.governance
    }

    /// Windowed read over the error ledger (offset 0 = oldest).
    pub fn error_window(&self, offset: usize, count: usize) -> ErrorWindow {
        self.invoker.window(offset, count)
    }

    /// Drain the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<OrchestratorEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: OrchestratorEvent) {
        tracing::trace!(event = event.name(), "orchestrator event");
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests;
