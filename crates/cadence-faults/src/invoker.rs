//! Fault-isolated call wrapper.
//!
//! ```text
//! call(f) ──► Ok(v)                   success, nothing recorded
//!         ──► Err(Fault::Revert(r))   recorded verbatim
//!         ──► Err(Fault::Silent)      recorded with generic marker
//!         ──► Err(Fault::OutOfGas)    recorded with generic marker
//!         ──► panic                   caught, recorded as Fault::Silent
//! ```
//!
//! Collaborators are expected to honour their own resource budget and report
//! [`Fault::OutOfGas`] instead of running forever; the invoker has no timer.

use std::panic::{self, AssertUnwindSafe};

use cadence_types::{Address, BlockNumber};

use crate::ledger::{ErrorLedger, ErrorWindow};
use crate::{CallResult, Fault};

/// Wraps collaborator calls and owns the ledger their failures land in.
#[derive(Clone, Debug, Default)]
pub struct FaultIsolatedInvoker {
    ledger: ErrorLedger,
}

impl FaultIsolatedInvoker {
    /// Create an invoker whose ledger retains `capacity` distinct records.
    pub fn new(capacity: usize) -> Self {
        Self {
            ledger: ErrorLedger::new(capacity),
        }
    }

    /// Run `f` against `target`, capturing any failure.
    ///
    /// `operation` names the call for logging only; it is not part of the
    /// ledger's failure signature.
    pub fn call<T, F>(
        &mut self,
        block: BlockNumber,
        target: Address,
        operation: &'static str,
        f: F,
    ) -> CallResult<T>
    where
        F: FnOnce() -> CallResult<T>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(_) => Err(Fault::Silent),
        };

        if let Err(ref fault) = result {
            tracing::warn!(
                block,
                contract = %target,
                operation,
                error = %fault,
                "collaborator call failed"
            );
            self.ledger.record(block, target, fault.ledger_message());
        }
        result
    }

    /// Record a failure that was detected outside a call (e.g. malformed data).
    pub fn record(&mut self, block: BlockNumber, target: Address, fault: &Fault) {
        tracing::warn!(block, contract = %target, error = %fault, "collaborator fault");
        self.ledger.record(block, target, fault.ledger_message());
    }

    /// Windowed read over the failure ledger.
    pub fn window(&self, offset: usize, count: usize) -> ErrorWindow {
        self.ledger.window(offset, count)
    }

    /// The underlying ledger.
    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }
}
