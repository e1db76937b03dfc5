//! Tick rules.
//!
//! Each tick performs at most one transition. Per-feed calls run
//! sequentially in registration order through the fault-isolated invoker.

use cadence_faults::Fault;
use cadence_types::entropy::{self, contexts};
use cadence_types::{
    BlockContext, BlockNumber, DistributionInstruction, FeedId, FinalizationTier,
    OrchestratorEvent, PriceEpochId, RewardData, RewardEpochId,
};

use super::{EpochOrchestrator, FinalizedPriceEpoch, RewardEpoch, TerminalFault, TickOutcome};

/// Ledger message for reward data whose lists do not line up.
pub const MALFORMED_REWARD_DATA: &str = "malformed reward data";

/// A price epoch that was initialized and not yet finalized.
pub(super) struct PendingPriceEpoch {
    pub(super) id: PriceEpochId,
    /// Reward epoch in force when the price epoch was initialized. Rewards
    /// are paid under it even if a rollover happens before finalization.
    reward_epoch_id: RewardEpochId,
    vote_power_block: BlockNumber,
    /// Feeds already finalized by an attempt that ended in a terminal fault.
    reports: Vec<FeedReport>,
}

/// One feed's finalization result.
struct FeedReport {
    feed: FeedId,
    tier: FinalizationTier,
    /// Present only for a normal-tier finalize.
    data: Option<RewardData>,
}

impl FeedReport {
    fn is_eligible(&self) -> bool {
        self.tier == FinalizationTier::Normal
            && self.data.as_ref().is_some_and(RewardData::has_participants)
    }
}

/// Index of the winning report: the drawn index if eligible, otherwise the
/// next eligible report, wrapping around.
fn select_winner(reports: &[FeedReport], draw: u64) -> Option<usize> {
    let n = reports.len();
    if n == 0 {
        return None;
    }
    let start = (draw % n as u64) as usize;
    (0..n)
        .map(|k| (start + k) % n)
        .find(|&i| reports[i].is_eligible())
}

impl EpochOrchestrator {
    /// Advance the state machine by at most one transition.
    ///
    /// # Errors
    ///
    /// [`TerminalFault`] if some feed fails every finalization tier. The
    /// price epoch then stays pending and no reward call is made.
    pub fn tick(&mut self, ctx: &BlockContext) -> Result<TickOutcome, TerminalFault> {
        self.last_block = ctx.number;
        if !self.active {
            return Ok(TickOutcome::Inactive);
        }

        if self.reward_epochs.is_empty() {
            if ctx.timestamp < self.settings.reward_epoch_start {
                return Ok(TickOutcome::Idle);
            }
            return Ok(self.initialize_first_reward_epoch(ctx));
        }

        if ctx.timestamp >= self.reward_epoch_end {
            return Ok(self.roll_over_reward_epoch(ctx));
        }

        if let Some(id) = self.pending_price_epoch.as_ref().map(|pending| pending.id) {
            if ctx.timestamp >= self.schedule.info(id).reveal_end {
                return self.finalize_price_epoch(ctx);
            }
            return Ok(TickOutcome::Idle);
        }

        let current = self.schedule.epoch_at(ctx.timestamp);
        let due = match self.last_initialized_price_epoch {
            Some(last) => current > last,
            None => true,
        };
        if due {
            return Ok(self.initialize_price_epoch(current, ctx));
        }
        Ok(TickOutcome::Idle)
    }

    // ------------------------------------------------------------------
    // Reward epochs
    // ------------------------------------------------------------------

    fn initialize_first_reward_epoch(&mut self, ctx: &BlockContext) -> TickOutcome {
        let epoch = RewardEpoch {
            id: 0,
            start_block: ctx.number,
            start_timestamp: ctx.timestamp,
            vote_power_block: ctx.number.saturating_sub(1),
        };
        self.reward_epochs.push(epoch);
        self.reward_epoch_end = self
            .settings
            .reward_epoch_start
            .saturating_add(self.reward_epoch_duration);

        tracing::info!(
            vote_power_block = epoch.vote_power_block,
            start_block = epoch.start_block,
            ends_at = self.reward_epoch_end,
            "first reward epoch initialized"
        );
        self.emit(OrchestratorEvent::RewardEpochInitialized {
            reward_epoch_id: epoch.id,
            vote_power_block: epoch.vote_power_block,
            start_block: epoch.start_block,
        });

        self.propagate_vote_power_block(epoch.vote_power_block, ctx.number);
        self.apply_pending_governance(ctx.number);
        TickOutcome::RewardEpochInitialized(epoch.id)
    }

    fn roll_over_reward_epoch(&mut self, ctx: &BlockContext) -> TickOutcome {
        self.close_expired_reward_epochs(ctx);

        let Some(previous) = self.reward_epochs.last().copied() else {
            return TickOutcome::Idle;
        };
        let epoch = RewardEpoch {
            id: previous.id + 1,
            start_block: ctx.number,
            start_timestamp: ctx.timestamp,
            vote_power_block: self.checkpoint.select(previous.start_block, ctx),
        };
        self.reward_epochs.push(epoch);
        self.reward_epoch_end = self
            .reward_epoch_end
            .saturating_add(self.reward_epoch_duration);

        tracing::info!(
            reward_epoch_id = epoch.id,
            vote_power_block = epoch.vote_power_block,
            start_block = epoch.start_block,
            ends_at = self.reward_epoch_end,
            "reward epoch rolled over"
        );
        self.emit(OrchestratorEvent::RewardEpochFinalized {
            reward_epoch_id: previous.id,
            vote_power_block: previous.vote_power_block,
            start_block: previous.start_block,
        });
        self.emit(OrchestratorEvent::RewardEpochInitialized {
            reward_epoch_id: epoch.id,
            vote_power_block: epoch.vote_power_block,
            start_block: epoch.start_block,
        });

        self.propagate_vote_power_block(epoch.vote_power_block, ctx.number);
        self.push_cleanup_block(ctx.number);
        TickOutcome::RewardEpochRolledOver(epoch.id)
    }

    /// Close reward epochs whose successor started more than the expiry
    /// offset ago, oldest first. Stops at the first failure.
    fn close_expired_reward_epochs(&mut self, ctx: &BlockContext) {
        let Ok(generation) = self.governance.effective() else {
            return;
        };
        let offset = generation.params.reward_expiry_offset_seconds;
        let target = self.reward_ledger.address();

        loop {
            let Some(next) = usize::try_from(self.expiry_cursor + 1)
                .ok()
                .and_then(|index| self.reward_epochs.get(index))
            else {
                break;
            };
            if next.start_timestamp.saturating_add(offset) > ctx.timestamp {
                break;
            }

            let id = self.expiry_cursor;
            let ledger = &mut self.reward_ledger;
            let result = self
                .invoker
                .call(ctx.number, target, "close_expired_reward_epoch", || {
                    ledger.close_expired_reward_epoch(id)
                });
            if result.is_err() {
                self.emit(OrchestratorEvent::ClosingExpiredRewardEpochFailed {
                    reward_epoch_id: id,
                });
                break;
            }
            tracing::info!(reward_epoch_id = id, "expired reward epoch closed");
            self.expiry_cursor += 1;
        }
    }

    fn propagate_vote_power_block(&mut self, vote_power_block: BlockNumber, block: BlockNumber) {
        for feed in self.registry.active_feeds() {
            let Some(handle) = self.feeds.get_mut(&feed) else {
                continue;
            };
            let result = self.invoker.call(block, feed, "set_vote_power_block", || {
                handle.set_vote_power_block(vote_power_block)
            });
            if result.is_err() {
                self.emit(OrchestratorEvent::SettingVotePowerBlockFailed {
                    feed,
                    block: vote_power_block,
                });
            }
        }
    }

    /// Tell every cleanup target it may prune history before the vote-power
    /// block of the oldest unexpired reward epoch.
    fn push_cleanup_block(&mut self, block: BlockNumber) {
        if self.cleanup_targets.is_empty() {
            self.emit(OrchestratorEvent::CleanupTargetsUnset);
            return;
        }
        let Some(cleanup_block) = usize::try_from(self.expiry_cursor)
            .ok()
            .and_then(|index| self.reward_epochs.get(index))
            .map(|epoch| epoch.vote_power_block)
        else {
            return;
        };

        for target in self.cleanup_targets.iter_mut() {
            let address = target.address();
            let result = self.invoker.call(block, address, "set_cleanup_block", || {
                target.set_cleanup_block(cleanup_block)
            });
            let event = match result {
                Ok(()) => OrchestratorEvent::CleanupBlockSet {
                    target: address,
                    block: cleanup_block,
                },
                Err(_) => OrchestratorEvent::CleanupBlockFailed {
                    target: address,
                    block: cleanup_block,
                },
            };
            self.events.push(event);
        }
    }

    /// Push a pending governance generation to every active feed.
    fn apply_pending_governance(&mut self, block: BlockNumber) {
        let Some(generation) = self.governance.consume_if_changed() else {
            return;
        };
        for feed in self.registry.active_feeds() {
            let Some(handle) = self.feeds.get_mut(&feed) else {
                continue;
            };
            let result = self
                .invoker
                .call(block, feed, "configure", || handle.configure(&generation.params));
            if result.is_err() {
                self.emit(OrchestratorEvent::ConfiguringFeedFailed {
                    feed,
                    generation: generation.number,
                });
            }
        }
        tracing::info!(generation = generation.number, "governance parameters applied");
        self.emit(OrchestratorEvent::GovernanceParametersApplied {
            generation: generation.number,
        });
    }

    // ------------------------------------------------------------------
    // Price epochs
    // ------------------------------------------------------------------

    fn initialize_price_epoch(&mut self, id: PriceEpochId, ctx: &BlockContext) -> TickOutcome {
        self.apply_pending_governance(ctx.number);

        let seed = entropy::derive_key(
            contexts::REVEAL_SEED,
            &entropy::encode_multi_field(&[&ctx.entropy, &id.to_le_bytes()]),
        );

        for feed in self.registry.active_feeds() {
            let fallback = self.fallback_mode
                || self.registry.get(feed).is_some_and(|entry| entry.fallback);
            let Some(handle) = self.feeds.get_mut(&feed) else {
                continue;
            };

            let mut initialized = self
                .invoker
                .call(ctx.number, feed, "initialize_for_reveal", || {
                    handle.initialize_for_reveal(seed, fallback)
                })
                .is_ok();
            if !initialized {
                self.events.push(OrchestratorEvent::InitializingForRevealFailed {
                    feed,
                    price_epoch_id: id,
                    fallback,
                });
                if !fallback {
                    initialized = self
                        .invoker
                        .call(ctx.number, feed, "initialize_for_reveal", || {
                            handle.initialize_for_reveal(seed, true)
                        })
                        .is_ok();
                    if !initialized {
                        self.events.push(OrchestratorEvent::InitializingForRevealFailed {
                            feed,
                            price_epoch_id: id,
                            fallback: true,
                        });
                    }
                }
            }

            if initialized {
                self.not_initialized.remove(&feed);
            } else {
                tracing::warn!(feed = %feed, price_epoch_id = id, "feed not initialized for reveal");
                self.not_initialized.insert(feed);
            }
        }

        let (reward_epoch_id, vote_power_block) = self
            .reward_epochs
            .last()
            .map(|epoch| (epoch.id, epoch.vote_power_block))
            .unwrap_or_default();
        self.pending_price_epoch = Some(PendingPriceEpoch {
            id,
            reward_epoch_id,
            vote_power_block,
            reports: Vec::new(),
        });
        self.last_initialized_price_epoch = Some(id);
        tracing::info!(price_epoch_id = id, "price epoch initialized");
        self.emit(OrchestratorEvent::PriceEpochInitialized { price_epoch_id: id });
        TickOutcome::PriceEpochInitialized(id)
    }

    fn finalize_price_epoch(&mut self, ctx: &BlockContext) -> Result<TickOutcome, TerminalFault> {
        let Some(mut pending) = self.pending_price_epoch.take() else {
            return Ok(TickOutcome::Idle);
        };
        let id = pending.id;
        let feeds = self.registry.active_feeds();
        for &feed in &feeds {
            if pending.reports.iter().any(|report| report.feed == feed) {
                continue;
            }
            let start = if self.fallback_mode
                || self.registry.get(feed).is_some_and(|entry| entry.fallback)
            {
                FinalizationTier::Fallback
            } else {
                FinalizationTier::Normal
            };

            match self.finalize_feed(feed, id, start, ctx.number) {
                Ok(Some(report)) => {
                    tracing::debug!(feed = %feed, price_epoch_id = id, tier = ?report.tier, "feed finalized");
                    self.emit(OrchestratorEvent::FeedFinalized {
                        feed,
                        price_epoch_id: id,
                        tier: report.tier,
                    });
                    pending.reports.push(report);
                }
                Ok(None) => {}
                Err(last_fault) => {
                    tracing::error!(
                        feed = %feed,
                        price_epoch_id = id,
                        error = %last_fault,
                        "every finalization tier failed"
                    );
                    self.pending_price_epoch = Some(pending);
                    return Err(TerminalFault {
                        feed,
                        price_epoch_id: id,
                        last_fault,
                    });
                }
            }
        }

        // Registration order, whichever attempt finalized the feed.
        let mut reports = pending.reports;
        reports.sort_by_key(|report| {
            feeds
                .iter()
                .position(|&feed| feed == report.feed)
                .unwrap_or(usize::MAX)
        });

        let draw = entropy::draw_u64(
            contexts::PRICE_EPOCH_WINNER,
            &ctx.entropy,
            &[&id.to_le_bytes()],
        );
        let winner = select_winner(&reports, draw);
        let reward_epoch_id = pending.reward_epoch_id;
        let vote_power_block = pending.vote_power_block;

        let info = self.schedule.info(id);
        let duration = self.schedule.duration();
        let end_time = info.inclusive_end();
        let ledger_address = self.reward_ledger.address();

        let winning_report = if self.fallback_mode {
            None
        } else {
            winner.and_then(|index| reports.get(index))
        };

        match winning_report {
            Some(report) => {
                let data = report.data.clone().unwrap_or_default();
                let instruction = DistributionInstruction {
                    participants: data.participants,
                    weights: data.weights,
                    total_weight: data.total_weight,
                    price_epoch_id: id,
                    feed: report.feed,
                    price_epoch_duration_secs: duration,
                    reward_epoch_id,
                    price_epoch_end_time: end_time,
                    vote_power_block,
                };
                let ledger = &mut self.reward_ledger;
                let result = self
                    .invoker
                    .call(ctx.number, ledger_address, "distribute_rewards", || {
                        ledger.distribute_rewards(&instruction)
                    });
                if result.is_err() {
                    self.events.push(OrchestratorEvent::DistributingRewardsFailed {
                        feed: report.feed,
                        price_epoch_id: id,
                    });
                }
            }
            None => {
                let ledger = &mut self.reward_ledger;
                let result = self
                    .invoker
                    .call(ctx.number, ledger_address, "accrue_unearned_rewards", || {
                        ledger.accrue_unearned_rewards(id, duration, end_time)
                    });
                if result.is_err() {
                    self.events
                        .push(OrchestratorEvent::AccruingUnearnedRewardsFailed { price_epoch_id: id });
                }
            }
        }

        let winner_feed = winning_report.map(|report| report.feed);
        self.last_finalized = Some(FinalizedPriceEpoch {
            price_epoch_id: id,
            winner: winner_feed,
            reward_epoch_id,
            tiers: reports.iter().map(|r| (r.feed, r.tier)).collect(),
        });

        tracing::info!(
            price_epoch_id = id,
            reward_epoch_id,
            winner = ?winner_feed,
            "price epoch finalized"
        );
        self.emit(OrchestratorEvent::PriceEpochFinalized {
            price_epoch_id: id,
            winner: winner_feed,
            reward_epoch_id,
        });
        Ok(TickOutcome::PriceEpochFinalized(id))
    }

    /// Walk the finalization tiers for one feed starting at `start`.
    ///
    /// Returns `Ok(None)` if the feed has no attached handle, and the
    /// forced-tier fault if every tier failed.
    fn finalize_feed(
        &mut self,
        feed: FeedId,
        id: PriceEpochId,
        start: FinalizationTier,
        block: BlockNumber,
    ) -> Result<Option<FeedReport>, Fault> {
        let Some(handle) = self.feeds.get_mut(&feed) else {
            tracing::warn!(feed = %feed, "registered feed has no handle");
            return Ok(None);
        };

        let mut tier = start;
        loop {
            let outcome = match tier {
                FinalizationTier::Normal => {
                    match self.invoker.call(block, feed, "finalize", || handle.finalize(id)) {
                        Ok(data) if data.is_well_formed() => Ok(Some(data)),
                        Ok(_) => {
                            let fault = Fault::revert(MALFORMED_REWARD_DATA);
                            self.invoker.record(block, feed, &fault);
                            Err(fault)
                        }
                        Err(fault) => Err(fault),
                    }
                }
                FinalizationTier::Fallback => self
                    .invoker
                    .call(block, feed, "fallback_finalize", || handle.fallback_finalize(id))
                    .map(|()| None),
                FinalizationTier::Forced => self
                    .invoker
                    .call(block, feed, "force_finalize", || handle.force_finalize(id))
                    .map(|()| None),
            };

            match outcome {
                Ok(data) => return Ok(Some(FeedReport { feed, tier, data })),
                Err(fault) => {
                    self.events.push(OrchestratorEvent::FinalizingPriceEpochFailed {
                        feed,
                        price_epoch_id: id,
                        failed_tier: tier,
                    });
                    match tier.next() {
                        Some(next) => tier = next,
                        None => return Err(fault),
                    }
                }
            }
        }
    }
}
