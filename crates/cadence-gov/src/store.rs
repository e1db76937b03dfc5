//! Staged/applied governance parameter store.
//!
//! The store keeps two slots:
//!
//! - **staged**: the most recent tuple accepted by [`GovernanceParameterStore::set`]
//! - **applied**: the tuple last handed out by [`GovernanceParameterStore::consume_if_changed`]
//!
//! `set` never touches the applied slot, so nothing a feed sees changes until
//! the orchestrator reaches its next commit point.

use crate::params::GovernanceParameters;
use crate::{GovError, Result};

/// A parameter tuple tagged with its generation number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    /// Monotonic generation, starting at 1 for the first accepted `set`.
    pub number: u64,
    pub params: GovernanceParameters,
}

/// Versioned governance parameters with deferred application.
#[derive(Clone, Debug, Default)]
pub struct GovernanceParameterStore {
    staged: Option<Generation>,
    applied: Option<Generation>,
    changed: bool,
    next_generation: u64,
}

impl GovernanceParameterStore {
    /// Create an empty store. Nothing is initialized until the first `set`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and stage a new parameter tuple.
    ///
    /// Returns the generation number assigned to the tuple and marks the
    /// store as changed.
    ///
    /// # Errors
    ///
    /// Any validation error from [`GovernanceParameters::validate`]; the store
    /// is left untouched in that case.
    pub fn set(&mut self, params: GovernanceParameters) -> Result<u64> {
        params.validate()?;
        self.next_generation += 1;
        let number = self.next_generation;
        tracing::info!(
            generation = number,
            trusted = params.trusted_addresses.len(),
            "governance parameters staged"
        );
        self.staged = Some(Generation { number, params });
        self.changed = true;
        Ok(number)
    }

    /// Take the staged tuple if it changed since the last call.
    ///
    /// The returned tuple becomes the applied generation and the changed flag
    /// is cleared. Returns `None` when nothing is pending.
    pub fn consume_if_changed(&mut self) -> Option<Generation> {
        if !self.changed {
            return None;
        }
        self.changed = false;
        let generation = self.staged.clone()?;
        tracing::debug!(generation = generation.number, "governance parameters applied");
        self.applied = Some(generation.clone());
        Some(generation)
    }

    /// Whether a staged tuple is waiting to be applied.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Whether `set` has succeeded at least once.
    pub fn is_initialized(&self) -> bool {
        self.staged.is_some()
    }

    /// The generation a newly registered feed should be configured with.
    ///
    /// That is the applied generation if one exists, otherwise the staged one.
    ///
    /// # Errors
    ///
    /// - [`GovError::NotInitialized`] if parameters were never set
    pub fn effective(&self) -> Result<&Generation> {
        self.applied
            .as_ref()
            .or(self.staged.as_ref())
            .ok_or(GovError::NotInitialized)
    }

    /// The generation last pushed to feeds, if any.
    pub fn applied(&self) -> Option<&Generation> {
        self.applied.as_ref()
    }

    /// The most recently staged generation, if any.
    pub fn staged(&self) -> Option<&Generation> {
        self.staged.as_ref()
    }
}
