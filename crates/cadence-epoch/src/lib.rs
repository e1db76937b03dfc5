//! # cadence-epoch
//!
//! Tick-driven epoch state machine for a federated price-oracle network.
//!
//! A single externally triggered [`EpochOrchestrator::tick`] drives every
//! registered feed through submit, reveal and finalize cycles (price epochs),
//! rolls reward epochs over at a randomized vote-power checkpoint and hands
//! the winning feed's participants to the reward ledger. Collaborator
//! failures are isolated and logged; only a feed that fails every
//! finalization tier can fail a tick.
//!
//! ## Modules
//!
//! - [`checkpoint`]: Randomized vote-power block selection
//! - [`collaborators`]: Traits for feeds, the reward ledger and cleanup targets
//! - [`orchestrator`]: The tick handler and its privileged setters
//! - [`schedule`]: Price-epoch timing arithmetic
//! - [`settings`]: Construction-time settings and their validation
//!
//! ## Tick rules (at most one transition per tick)
//!
//! | Order | Condition | Transition |
//! |---|---|---|
//! | 1 | orchestrator inactive | none |
//! | 2 | no reward epoch yet, anchor reached | initialize reward epoch 0 |
//! | 3 | current reward epoch ended | roll over to the next reward epoch |
//! | 4 | pending price epoch past its reveal end | finalize it |
//! | 5 | current price epoch not initialized | initialize it for reveal |

pub mod checkpoint;
pub mod collaborators;
pub mod orchestrator;
pub mod schedule;
pub mod settings;

pub use checkpoint::VotePowerCheckpointSelector;
pub use collaborators::{CleanupTarget, Feed, PricePoint, RewardLedger};
pub use orchestrator::{
    EpochOrchestrator, FeedReplacement, FinalizedPriceEpoch, Phase, RewardEpoch, TerminalFault,
    TickOutcome, MALFORMED_REWARD_DATA,
};
pub use schedule::{PriceEpochInfo, PriceEpochSchedule};
pub use settings::{OrchestratorSettings, SettingsError};

use cadence_faults::Fault;
use cadence_types::Address;

/// Error types for privileged orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum EpochError {
    /// Construction or reconfiguration settings were rejected.
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),

    /// A governance parameter tuple was rejected.
    #[error("governance error: {0}")]
    Governance(#[from] cadence_gov::GovError),

    /// A registry mutation violated a membership invariant.
    #[error("registry error: {0}")]
    Registry(#[from] cadence_registry::RegistryError),

    /// A collaborator failed during a privileged operation.
    #[error("collaborator {target} failed: {fault}")]
    Collaborator {
        /// The failing feed or collaborator.
        target: Address,
        fault: Fault,
    },
}

/// Convenience result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, EpochError>;
