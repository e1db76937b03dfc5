//! Privileged setters.
//!
//! Registry mutators validate first, then make the feed-side calls, and
//! commit to the registry only when every call succeeded. A collaborator
//! fault here is returned to the caller as [`EpochError::Collaborator`]
//! (and still recorded in the error ledger).

use cadence_faults::{CallResult, FaultIsolatedInvoker};
use cadence_gov::GovernanceParameters;
use cadence_registry::{composite, RegistryError};
use cadence_types::{AssetId, BlockNumber, FeedId, OrchestratorEvent};

use super::{EpochOrchestrator, FeedReplacement};
use crate::collaborators::{CleanupTarget, Feed};
use crate::settings::validate_reward_epoch_duration;
use crate::{EpochError, Result};

/// Run a feed call through the invoker, surfacing a fault as an error.
fn invoke<T, F>(
    invoker: &mut FaultIsolatedInvoker,
    block: BlockNumber,
    feed: &mut F,
    operation: &'static str,
    call: impl FnOnce(&mut F) -> CallResult<T>,
) -> Result<T>
where
    F: Feed + ?Sized,
{
    let target = feed.address();
    invoker
        .call(block, target, operation, || call(feed))
        .map_err(|fault| EpochError::Collaborator { target, fault })
}

impl EpochOrchestrator {
    /// Start responding to ticks. Idempotent.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        tracing::info!("epoch orchestrator activated");
        self.emit(OrchestratorEvent::Activated);
    }

    // ------------------------------------------------------------------
    // Governance and modes
    // ------------------------------------------------------------------

    /// Stage a governance tuple; feeds see it from the next price epoch.
    pub fn set_governance_parameters(&mut self, params: GovernanceParameters) -> Result<u64> {
        let generation = self.governance.set(params)?;
        self.emit(OrchestratorEvent::GovernanceParametersStaged { generation });
        Ok(generation)
    }

    /// Switch global fallback mode. Returns whether the mode changed.
    pub fn set_fallback_mode(&mut self, enabled: bool) -> bool {
        if self.fallback_mode == enabled {
            return false;
        }
        self.fallback_mode = enabled;
        tracing::info!(enabled, "global fallback mode changed");
        self.emit(OrchestratorEvent::FallbackModeChanged { enabled });
        true
    }

    /// Switch one feed's fallback mode. Returns whether the flag changed.
    pub fn set_feed_fallback_mode(&mut self, feed: FeedId, enabled: bool) -> Result<bool> {
        let changed = self.registry.set_fallback(feed, enabled)?;
        if changed {
            tracing::info!(feed = %feed, enabled, "feed fallback mode changed");
            self.emit(OrchestratorEvent::FeedFallbackModeChanged { feed, enabled });
        }
        Ok(changed)
    }

    /// Change the reward-epoch duration from the next boundary on.
    pub fn set_reward_epoch_duration(&mut self, duration_secs: u64) -> Result<()> {
        validate_reward_epoch_duration(duration_secs, self.schedule.duration())?;
        self.reward_epoch_duration = duration_secs;
        tracing::info!(duration_secs, "reward epoch duration changed");
        self.emit(OrchestratorEvent::RewardEpochDurationChanged { duration_secs });
        Ok(())
    }

    pub fn register_cleanup_target(&mut self, target: Box<dyn CleanupTarget>) {
        tracing::info!(target = %target.address(), "cleanup target registered");
        self.cleanup_targets.push(target);
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register and activate a feed.
    ///
    /// The feed is configured with the effective governance generation and,
    /// if a reward epoch exists, receives its vote-power block.
    pub fn add_feed(&mut self, feed: Box<dyn Feed>) -> Result<()> {
        self.registry
            .validate_add(feed.address(), self.governance.is_initialized())?;
        self.register(feed)
    }

    /// Register a batch of feeds. The whole batch is validated first; a
    /// collaborator fault stops the batch with earlier feeds applied.
    pub fn bulk_add(&mut self, feeds: Vec<Box<dyn Feed>>) -> Result<()> {
        let ids: Vec<FeedId> = feeds.iter().map(|f| f.address()).collect();
        self.registry
            .validate_bulk_add(&ids, self.governance.is_initialized())?;
        for feed in feeds {
            self.register(feed)?;
        }
        Ok(())
    }

    fn register(&mut self, mut feed: Box<dyn Feed>) -> Result<()> {
        let id = feed.address();
        let symbol = feed.symbol();
        let params = self.governance.effective()?.params.clone();
        let vote_power_block = self.reward_epochs.last().map(|e| e.vote_power_block);
        let block = self.last_block;

        invoke(&mut self.invoker, block, feed.as_mut(), "configure", |f| {
            f.configure(&params)
        })?;
        if let Some(vpb) = vote_power_block {
            invoke(&mut self.invoker, block, feed.as_mut(), "set_vote_power_block", |f| {
                f.set_vote_power_block(vpb)
            })?;
        }
        invoke(&mut self.invoker, block, feed.as_mut(), "activate", |f| f.activate())?;

        self.registry.add(id, symbol, true)?;
        self.feeds.insert(id, feed);
        self.emit(OrchestratorEvent::FeedAdded { feed: id, added: true });
        Ok(())
    }

    /// Deactivate and unregister a feed.
    pub fn remove_feed(&mut self, feed: FeedId) -> Result<()> {
        self.registry.validate_remove(feed)?;
        let block = self.last_block;
        let handle = self
            .feeds
            .get_mut(&feed)
            .ok_or(RegistryError::NotFound(feed))?;
        invoke(&mut self.invoker, block, handle.as_mut(), "deactivate", |f| f.deactivate())?;

        let owners = composite::composites_containing(&self.registry, feed);
        self.registry.remove(feed)?;
        self.feeds.remove(&feed);
        self.not_initialized.remove(&feed);
        self.emit(OrchestratorEvent::FeedAdded { feed, added: false });
        self.push_asset_links(&owners, block);
        Ok(())
    }

    /// Replace a feed in place. See [`FeedReplacement`].
    pub fn replace_feed(&mut self, replacement: FeedReplacement) -> Result<()> {
        let symbol = replacement.new.symbol();
        self.registry.validate_replace(
            replacement.old,
            replacement.new.address(),
            &symbol,
            replacement.copy_links,
        )?;
        self.apply_replacement(replacement, symbol, &[])
    }

    /// Replace a batch of feeds. The whole batch is validated first.
    pub fn bulk_replace(&mut self, replacements: Vec<FeedReplacement>) -> Result<()> {
        let symbols: Vec<String> = replacements.iter().map(|r| r.new.symbol()).collect();
        let pairs: Vec<(FeedId, FeedId, &str, bool)> = replacements
            .iter()
            .zip(&symbols)
            .map(|(r, symbol)| (r.old, r.new.address(), symbol.as_str(), r.copy_links))
            .collect();
        self.registry.validate_bulk_replace(&pairs)?;
        let batch: Vec<FeedId> = pairs.iter().map(|&(old, ..)| old).collect();

        for (replacement, symbol) in replacements.into_iter().zip(symbols) {
            self.apply_replacement(replacement, symbol, &batch)?;
        }
        Ok(())
    }

    fn apply_replacement(
        &mut self,
        replacement: FeedReplacement,
        symbol: String,
        batch: &[FeedId],
    ) -> Result<()> {
        let FeedReplacement {
            old,
            mut new,
            copy_price,
            copy_links,
        } = replacement;
        let new_id = new.address();
        let block = self.last_block;
        let params = self.governance.effective()?.params.clone();
        let vote_power_block = self.reward_epochs.last().map(|e| e.vote_power_block);
        let entry = self
            .registry
            .get(old)
            .cloned()
            .ok_or(RegistryError::NotFound(old))?;
        let old_handle = self
            .feeds
            .get_mut(&old)
            .ok_or(RegistryError::NotFound(old))?;

        if copy_price {
            let point = invoke(&mut self.invoker, block, old_handle.as_mut(), "current_price", |f| {
                f.current_price()
            })?;
            invoke(&mut self.invoker, block, new.as_mut(), "set_initial_price", |f| {
                f.set_initial_price(point)
            })?;
        }
        if copy_links {
            if entry.is_composite() {
                invoke(&mut self.invoker, block, new.as_mut(), "set_asset_links", |f| {
                    f.set_asset_links(&entry.composite)
                })?;
            }
            if let Some(asset) = entry.underlying {
                invoke(&mut self.invoker, block, new.as_mut(), "set_underlying", |f| {
                    f.set_underlying(asset)
                })?;
            }
        }
        invoke(&mut self.invoker, block, new.as_mut(), "configure", |f| {
            f.configure(&params)
        })?;
        if let Some(vpb) = vote_power_block {
            invoke(&mut self.invoker, block, new.as_mut(), "set_vote_power_block", |f| {
                f.set_vote_power_block(vpb)
            })?;
        }
        invoke(&mut self.invoker, block, new.as_mut(), "activate", |f| f.activate())?;
        invoke(&mut self.invoker, block, old_handle.as_mut(), "deactivate", |f| {
            f.deactivate()
        })?;

        self.registry
            .replace_in_batch(old, new_id, &symbol, copy_links, batch)?;
        self.feeds.remove(&old);
        self.not_initialized.remove(&old);
        self.feeds.insert(new_id, new);
        self.emit(OrchestratorEvent::FeedAdded { feed: old, added: false });
        self.emit(OrchestratorEvent::FeedAdded { feed: new_id, added: true });

        // Composites that listed the old feed now list the new one.
        let owners = composite::composites_containing(&self.registry, new_id);
        self.push_asset_links(&owners, block);
        Ok(())
    }

    /// Send each owner its registry composite list after a membership change.
    /// The registry change is already committed, so a fault is reported and
    /// the owner's own links stay stale until the next `set_composite`.
    fn push_asset_links(&mut self, owners: &[FeedId], block: BlockNumber) {
        for &owner in owners {
            let members = self
                .registry
                .get(owner)
                .map(|e| e.composite.clone())
                .unwrap_or_default();
            let Some(handle) = self.feeds.get_mut(&owner) else {
                continue;
            };
            let result = self.invoker.call(block, owner, "set_asset_links", || {
                handle.set_asset_links(&members)
            });
            if result.is_err() {
                tracing::warn!(feed = %owner, "composite links out of sync with registry");
                self.emit(OrchestratorEvent::SettingAssetLinksFailed {
                    feed: owner,
                    members,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Re-activate registered feeds. A composite's members must be active
    /// already or be part of the same batch.
    pub fn activate_feeds(&mut self, feeds: &[FeedId]) -> Result<()> {
        self.registry.validate_activate(feeds)?;
        let params = self.governance.effective().ok().map(|g| g.params.clone());
        let block = self.last_block;

        for &feed in feeds {
            if self.registry.get(feed).is_some_and(|e| e.active) {
                continue;
            }
            let handle = self
                .feeds
                .get_mut(&feed)
                .ok_or(RegistryError::NotFound(feed))?;
            if let Some(params) = &params {
                invoke(&mut self.invoker, block, handle.as_mut(), "configure", |f| {
                    f.configure(params)
                })?;
            }
            invoke(&mut self.invoker, block, handle.as_mut(), "activate", |f| f.activate())?;
            self.registry.set_active(feed, true)?;
            self.emit(OrchestratorEvent::FeedActivationChanged { feed, active: true });
        }
        Ok(())
    }

    /// Deactivate registered feeds. A member of an active composite may only
    /// be deactivated together with that composite.
    pub fn deactivate_feeds(&mut self, feeds: &[FeedId]) -> Result<()> {
        self.registry.validate_deactivate(feeds)?;
        let block = self.last_block;

        for &feed in feeds {
            if !self.registry.get(feed).is_some_and(|e| e.active) {
                continue;
            }
            let handle = self
                .feeds
                .get_mut(&feed)
                .ok_or(RegistryError::NotFound(feed))?;
            invoke(&mut self.invoker, block, handle.as_mut(), "deactivate", |f| f.deactivate())?;
            self.registry.set_active(feed, false)?;
            self.not_initialized.remove(&feed);
            self.emit(OrchestratorEvent::FeedActivationChanged { feed, active: false });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Asset links
    // ------------------------------------------------------------------

    /// Make `feed` a multi-feed asset over `members`.
    pub fn set_composite(&mut self, feed: FeedId, members: Vec<FeedId>) -> Result<()> {
        composite::validate(&self.registry, feed, &members)?;
        let block = self.last_block;
        let handle = self
            .feeds
            .get_mut(&feed)
            .ok_or(RegistryError::NotFound(feed))?;
        invoke(&mut self.invoker, block, handle.as_mut(), "set_asset_links", |f| {
            f.set_asset_links(&members)
        })?;

        self.registry.set_composite(feed, members.clone())?;
        self.emit(OrchestratorEvent::CompositeSet { feed, members });
        Ok(())
    }

    pub fn set_underlying(&mut self, feed: FeedId, asset: AssetId) -> Result<()> {
        let block = self.last_block;
        let handle = self
            .feeds
            .get_mut(&feed)
            .ok_or(RegistryError::NotFound(feed))?;
        invoke(&mut self.invoker, block, handle.as_mut(), "set_underlying", |f| {
            f.set_underlying(asset)
        })?;

        self.registry.set_underlying(feed, asset)?;
        self.emit(OrchestratorEvent::UnderlyingSet { feed, asset });
        Ok(())
    }
}
