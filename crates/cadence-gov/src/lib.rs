//! # cadence-gov
//!
//! Governance parameters pushed to every feed, with deferred application.
//!
//! A privileged caller stages a new parameter tuple at any time. The tuple
//! only reaches feeds when the orchestrator initializes the next price epoch,
//! so every feed inside one epoch sees the same parameter generation.
//!
//! ## Modules
//!
//! - [`params`]: Parameter tuple and its validation table
//! - [`store`]: Staged/applied parameter store

pub mod params;
pub mod store;

pub use params::GovernanceParameters;
pub use store::GovernanceParameterStore;

/// Error types for governance operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GovError {
    /// A numeric bound is outside its acceptable range.
    #[error("governance parameter {name} invalid: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The reward expiry offset must be non-zero.
    #[error("reward expiry offset must be non-zero")]
    InvalidRewardExpiry,

    /// Too many trusted addresses.
    #[error("too many trusted addresses: have {actual}, maximum is {maximum}")]
    TooManyTrustedAddresses {
        /// Number supplied.
        actual: usize,
        /// Maximum allowed.
        maximum: usize,
    },

    /// Parameters were never set.
    #[error("governance parameters not initialized")]
    NotInitialized,
}

/// Convenience result type for governance operations.
pub type Result<T> = std::result::Result<T, GovError>;
