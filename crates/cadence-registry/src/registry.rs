//! Registration order, activation and replacement.
//!
//! Entries are kept in registration order. That order is the iteration
//! order for every per-feed pass of the orchestrator, and a replacement
//! keeps the slot of the feed it replaces.

use cadence_types::{AssetId, FeedId};
use serde::{Deserialize, Serialize};

use crate::composite;
use crate::{RegistryError, Result};

/// One registered feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub feed: FeedId,
    pub symbol: String,
    pub active: bool,
    /// Per-feed fallback: only trusted addresses form the consensus.
    pub fallback: bool,
    /// Constituent feeds of a multi-feed asset; empty for a plain feed.
    pub composite: Vec<FeedId>,
    pub underlying: Option<AssetId>,
}

impl FeedEntry {
    fn new(feed: FeedId, symbol: String) -> Self {
        Self {
            feed,
            symbol,
            active: true,
            fallback: false,
            composite: Vec::new(),
            underlying: None,
        }
    }

    /// Whether this entry prices a basket of other feeds.
    pub fn is_composite(&self) -> bool {
        !self.composite.is_empty()
    }
}

/// The set of feeds driven by the orchestrator.
#[derive(Clone, Debug, Default)]
pub struct AssetRegistry {
    entries: Vec<FeedEntry>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, feed: FeedId) -> bool {
        self.position(feed).is_some()
    }

    /// Index of `feed` in registration order.
    pub fn position(&self, feed: FeedId) -> Option<usize> {
        self.entries.iter().position(|e| e.feed == feed)
    }

    pub fn get(&self, feed: FeedId) -> Option<&FeedEntry> {
        self.entries.iter().find(|e| e.feed == feed)
    }

    fn get_mut(&mut self, feed: FeedId) -> Result<&mut FeedEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.feed == feed)
            .ok_or(RegistryError::NotFound(feed))
    }

    /// All entries in registration order.
    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    /// Active feeds in registration order.
    pub fn active_feeds(&self) -> Vec<FeedId> {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.feed)
            .collect()
    }

    // ------------------------------------------------------------------
    // Add / remove
    // ------------------------------------------------------------------

    /// Check that `feed` may be added.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::GovernanceNotInitialized`] if governance was never set
    /// - [`RegistryError::AlreadyRegistered`] for a duplicate
    pub fn validate_add(&self, feed: FeedId, governance_initialized: bool) -> Result<()> {
        if !governance_initialized {
            return Err(RegistryError::GovernanceNotInitialized);
        }
        if self.contains(feed) {
            return Err(RegistryError::AlreadyRegistered(feed));
        }
        Ok(())
    }

    /// Validate a whole batch of adds before any of them is applied.
    pub fn validate_bulk_add(&self, feeds: &[FeedId], governance_initialized: bool) -> Result<()> {
        for (i, &feed) in feeds.iter().enumerate() {
            self.validate_add(feed, governance_initialized)?;
            if feeds[..i].contains(&feed) {
                return Err(RegistryError::DuplicateInBatch(feed));
            }
        }
        Ok(())
    }

    /// Register `feed` as active at the end of the registration order.
    pub fn add(
        &mut self,
        feed: FeedId,
        symbol: impl Into<String>,
        governance_initialized: bool,
    ) -> Result<()> {
        self.validate_add(feed, governance_initialized)?;
        let symbol = symbol.into();
        tracing::info!(feed = %feed, symbol = %symbol, "feed registered");
        self.entries.push(FeedEntry::new(feed, symbol));
        Ok(())
    }

    /// Check that `feed` may be removed.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if `feed` is not registered
    /// - [`RegistryError::MemberOfActiveComposite`] if an active composite lists it
    /// - [`RegistryError::LastCompositeMember`] if it is the only member of a composite
    pub fn validate_remove(&self, feed: FeedId) -> Result<()> {
        if !self.contains(feed) {
            return Err(RegistryError::NotFound(feed));
        }
        if let Some(owner) = composite::active_composite_containing(self, feed) {
            return Err(RegistryError::MemberOfActiveComposite {
                feed,
                composite: owner,
            });
        }
        if let Some(owner) = self.entries.iter().find(|e| e.composite == [feed]) {
            return Err(RegistryError::LastCompositeMember {
                feed,
                composite: owner.feed,
            });
        }
        Ok(())
    }

    /// Unregister `feed`, dropping it from any inactive composite that lists it.
    /// Such a composite always keeps at least one member.
    pub fn remove(&mut self, feed: FeedId) -> Result<FeedEntry> {
        self.validate_remove(feed)?;
        for entry in &mut self.entries {
            entry.composite.retain(|m| *m != feed);
        }
        let pos = self.position(feed).ok_or(RegistryError::NotFound(feed))?;
        tracing::info!(feed = %feed, "feed removed");
        Ok(self.entries.remove(pos))
    }

    // ------------------------------------------------------------------
    // Replace
    // ------------------------------------------------------------------

    /// Check that `new` (reporting `new_symbol`) may replace `old`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if `old` is not registered
    /// - [`RegistryError::AlreadyRegistered`] if `new` is already registered
    /// - [`RegistryError::SymbolMismatch`] if the symbols differ
    /// - [`RegistryError::MemberInactive`] if `copy_links` would make the
    ///   active replacement a composite over an inactive feed
    pub fn validate_replace(
        &self,
        old: FeedId,
        new: FeedId,
        new_symbol: &str,
        copy_links: bool,
    ) -> Result<()> {
        self.check_replace(old, new, new_symbol, copy_links, &[])
    }

    fn check_replace(
        &self,
        old: FeedId,
        new: FeedId,
        new_symbol: &str,
        copy_links: bool,
        replaced_in_batch: &[FeedId],
    ) -> Result<()> {
        let entry = self.get(old).ok_or(RegistryError::NotFound(old))?;
        if self.contains(new) {
            return Err(RegistryError::AlreadyRegistered(new));
        }
        if entry.symbol != new_symbol {
            return Err(RegistryError::SymbolMismatch {
                expected: entry.symbol.clone(),
                actual: new_symbol.to_string(),
            });
        }
        if copy_links {
            // A member replaced in the same batch comes back active.
            for &member in &entry.composite {
                let member_active = self.get(member).is_some_and(|e| e.active)
                    || replaced_in_batch.contains(&member);
                if !member_active {
                    return Err(RegistryError::MemberInactive { feed: new, member });
                }
            }
        }
        Ok(())
    }

    /// Validate a whole batch of replacements `(old, new, symbol, copy_links)`
    /// before any of them is applied.
    pub fn validate_bulk_replace(&self, pairs: &[(FeedId, FeedId, &str, bool)]) -> Result<()> {
        let replaced: Vec<FeedId> = pairs.iter().map(|&(old, ..)| old).collect();
        for (i, &(old, new, symbol, copy_links)) in pairs.iter().enumerate() {
            self.check_replace(old, new, symbol, copy_links, &replaced)?;
            for &(prev_old, prev_new, ..) in &pairs[..i] {
                if prev_old == old {
                    return Err(RegistryError::DuplicateInBatch(old));
                }
                if prev_new == new {
                    return Err(RegistryError::DuplicateInBatch(new));
                }
            }
        }
        Ok(())
    }

    /// Put `new` in the slot of `old`.
    ///
    /// The new entry is active. Composite memberships pointing at `old` are
    /// migrated to `new`; with `copy_links` the old composite list and
    /// underlying asset are carried over. Returns the removed entry.
    pub fn replace(
        &mut self,
        old: FeedId,
        new: FeedId,
        new_symbol: &str,
        copy_links: bool,
    ) -> Result<FeedEntry> {
        self.replace_in_batch(old, new, new_symbol, copy_links, &[])
    }

    /// [`replace`](Self::replace) for one entry of a batch already accepted by
    /// [`validate_bulk_replace`](Self::validate_bulk_replace). `batch` holds
    /// every feed the batch replaces.
    pub fn replace_in_batch(
        &mut self,
        old: FeedId,
        new: FeedId,
        new_symbol: &str,
        copy_links: bool,
        batch: &[FeedId],
    ) -> Result<FeedEntry> {
        self.check_replace(old, new, new_symbol, copy_links, batch)?;
        let pos = self.position(old).ok_or(RegistryError::NotFound(old))?;

        let mut entry = FeedEntry::new(new, new_symbol.to_string());
        if copy_links {
            entry.composite = self.entries[pos].composite.clone();
            entry.underlying = self.entries[pos].underlying;
        }
        let previous = std::mem::replace(&mut self.entries[pos], entry);

        for other in &mut self.entries {
            for member in other.composite.iter_mut() {
                if *member == old {
                    *member = new;
                }
            }
        }
        tracing::info!(old = %old, new = %new, copy_links, "feed replaced");
        Ok(previous)
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Check that every feed in `feeds` may be activated together.
    ///
    /// A composite's members must be active already or be part of the batch.
    pub fn validate_activate(&self, feeds: &[FeedId]) -> Result<()> {
        for &feed in feeds {
            let entry = self.get(feed).ok_or(RegistryError::NotFound(feed))?;
            for &member in &entry.composite {
                let member_entry = self
                    .get(member)
                    .ok_or(RegistryError::MemberNotRegistered { feed, member })?;
                if !member_entry.active && !feeds.contains(&member) {
                    return Err(RegistryError::MemberInactive { feed, member });
                }
            }
        }
        Ok(())
    }

    /// Check that every feed in `feeds` may be deactivated together.
    ///
    /// A member of an active composite may only go if the composite goes too.
    pub fn validate_deactivate(&self, feeds: &[FeedId]) -> Result<()> {
        for &feed in feeds {
            if !self.contains(feed) {
                return Err(RegistryError::NotFound(feed));
            }
            if let Some(owner) = self
                .entries
                .iter()
                .find(|e| e.active && e.composite.contains(&feed) && !feeds.contains(&e.feed))
            {
                return Err(RegistryError::MemberOfActiveComposite {
                    feed,
                    composite: owner.feed,
                });
            }
        }
        Ok(())
    }

    /// Flip the active flag of one feed without validation.
    pub fn set_active(&mut self, feed: FeedId, active: bool) -> Result<()> {
        let entry = self.get_mut(feed)?;
        if entry.active != active {
            entry.active = active;
            tracing::debug!(feed = %feed, active, "feed activation changed");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Links and flags
    // ------------------------------------------------------------------

    /// Validate and set the composite list of `feed`.
    pub fn set_composite(&mut self, feed: FeedId, members: Vec<FeedId>) -> Result<()> {
        composite::validate(self, feed, &members)?;
        self.get_mut(feed)?.composite = members;
        Ok(())
    }

    pub fn set_underlying(&mut self, feed: FeedId, asset: AssetId) -> Result<()> {
        self.get_mut(feed)?.underlying = Some(asset);
        Ok(())
    }

    /// Set the per-feed fallback flag. Returns whether the flag changed.
    pub fn set_fallback(&mut self, feed: FeedId, enabled: bool) -> Result<bool> {
        let entry = self.get_mut(feed)?;
        let changed = entry.fallback != enabled;
        entry.fallback = enabled;
        Ok(changed)
    }
}
