//! # cadence-faults
//!
//! Fault isolation for collaborator calls.
//!
//! Every call the orchestrator makes into a feed or a downstream ledger goes
//! through the [`invoker`]. A failing call is recorded in the [`ledger`] and
//! handed back as a [`Fault`] value; nothing a collaborator does can unwind
//! through a tick.
//!
//! ## Modules
//!
//! - [`invoker`]: Fault-isolated call wrapper
//! - [`ledger`]: Fixed-capacity ring of distinct failures

pub mod invoker;
pub mod ledger;

pub use invoker::FaultIsolatedInvoker;
pub use ledger::{ErrorLedger, ErrorRecord, ErrorWindow};

/// Message recorded for a revert that carried no reason.
pub const NO_REASON: &str = "reverted without reason";

/// Message recorded when a collaborator exhausts its resource budget.
pub const OUT_OF_GAS: &str = "out of gas";

/// How a collaborator call failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// Reverted with a reason string; the reason is kept verbatim.
    #[error("{0}")]
    Revert(String),

    /// Reverted without a reason (includes panics inside the collaborator).
    #[error("reverted without reason")]
    Silent,

    /// Ran out of its bounded resource budget.
    #[error("out of gas")]
    OutOfGas,
}

/// Outcome class of a failed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultClass {
    /// The collaborator gave a reason.
    RevertWithReason,
    /// No reason available; a generic marker is recorded.
    Generic,
}

impl Fault {
    /// Shorthand for a revert with a reason.
    pub fn revert(reason: impl Into<String>) -> Self {
        Fault::Revert(reason.into())
    }

    /// The outcome class of this fault.
    pub fn class(&self) -> FaultClass {
        match self {
            Fault::Revert(_) => FaultClass::RevertWithReason,
            Fault::Silent | Fault::OutOfGas => FaultClass::Generic,
        }
    }

    /// The message written to the error ledger.
    pub fn ledger_message(&self) -> &str {
        match self {
            Fault::Revert(reason) => reason,
            Fault::Silent => NO_REASON,
            Fault::OutOfGas => OUT_OF_GAS,
        }
    }
}

/// Result of a collaborator call.
pub type CallResult<T> = std::result::Result<T, Fault>;
