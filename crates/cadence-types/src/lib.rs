//! # cadence-types
//!
//! Shared domain types used across the Cadence workspace.
//!
//! ## Modules
//!
//! - [`address`]: 20-byte collaborator addresses (feeds, ledgers, tokens)
//! - [`block`]: Chain context observed by a tick
//! - [`entropy`]: Domain-separated draws from chain entropy
//! - [`events`]: Events emitted by the orchestrator
//! - [`rewards`]: Reward data returned by feeds and distribution instructions

pub mod address;
pub mod block;
pub mod entropy;
pub mod events;
pub mod rewards;

pub use address::{Address, AssetId, FeedId};
pub use block::BlockContext;
pub use events::{FinalizationTier, OrchestratorEvent};
pub use rewards::{DistributionInstruction, RewardData};

/// Price epoch identifier.
pub type PriceEpochId = u64;

/// Reward epoch identifier.
pub type RewardEpochId = u64;

/// Block height.
pub type BlockNumber = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Basis points denominator (100% = 10,000 bips).
pub const BIPS_DENOMINATOR: u64 = 10_000;

/// Parts-per-million denominator.
pub const PPM_DENOMINATOR: u64 = 1_000_000;

/// Error types for shared type parsing.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Address string was not valid hex.
    #[error("invalid address hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Address had the wrong number of bytes.
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// Convenience result type for shared type operations.
pub type Result<T> = std::result::Result<T, TypesError>;
