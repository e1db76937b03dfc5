//! Construction-time settings and their validation.
//!
//! | Setting | Default | Rule |
//! |---|---|---|
//! | `first_price_epoch_start` | 0 | anchor of price epoch 0 |
//! | `price_epoch_duration_secs` | 180 | > 0 |
//! | `reveal_duration_secs` | 90 | > 0 and < price-epoch duration |
//! | `reward_epoch_start` | 90 | >= first start + reveal, aligned to a reveal end |
//! | `reward_epoch_duration_secs` | 7,200 | > 0 and a multiple of the price-epoch duration |
//! | `vote_power_boundary_fraction` | 7 | > 0 |
//! | `error_ledger_capacity` | 100 | > 0 |

use cadence_types::Timestamp;
use serde::{Deserialize, Serialize};

/// Rejected settings, one variant per rule.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("price epoch duration must be non-zero")]
    ZeroPriceEpochDuration,

    #[error("reveal duration must be non-zero")]
    ZeroRevealDuration,

    #[error("reward epoch duration must be non-zero")]
    ZeroRewardEpochDuration,

    /// The reveal window must close before the next price epoch ends.
    #[error("reveal duration {reveal} must be shorter than price epoch duration {price_epoch}")]
    RevealTooLong { reveal: u64, price_epoch: u64 },

    /// The first reward epoch cannot start before the first reveal ends.
    #[error("reward epoch start {start} is before first reveal end {earliest}")]
    RewardEpochStartTooEarly { start: Timestamp, earliest: Timestamp },

    /// Reward epochs must start exactly at a price epoch's reveal end.
    #[error("reward epoch start {start} is not aligned to a reveal end")]
    RewardEpochStartMisaligned { start: Timestamp },

    #[error("reward epoch duration {duration} is not a multiple of price epoch duration {price_epoch}")]
    RewardEpochDurationNotMultiple { duration: u64, price_epoch: u64 },

    #[error("vote power boundary fraction must be non-zero")]
    ZeroBoundaryFraction,

    #[error("error ledger capacity must be non-zero")]
    ZeroLedgerCapacity,
}

/// Timing and sizing of the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Start of price epoch 0.
    #[serde(default = "default_first_price_epoch_start")]
    pub first_price_epoch_start: Timestamp,

    #[serde(default = "default_price_epoch_duration")]
    pub price_epoch_duration_secs: u64,

    #[serde(default = "default_reveal_duration")]
    pub reveal_duration_secs: u64,

    /// Earliest time reward epoch 0 may be initialized.
    #[serde(default = "default_reward_epoch_start")]
    pub reward_epoch_start: Timestamp,

    #[serde(default = "default_reward_epoch_duration")]
    pub reward_epoch_duration_secs: u64,

    /// The checkpoint is drawn from the last `1/fraction` of the reward epoch.
    #[serde(default = "default_vote_power_boundary_fraction")]
    pub vote_power_boundary_fraction: u64,

    /// Distinct failures retained by the error ledger.
    #[serde(default = "default_error_ledger_capacity")]
    pub error_ledger_capacity: usize,
}

fn default_first_price_epoch_start() -> Timestamp {
    0
}

fn default_price_epoch_duration() -> u64 {
    180
}

fn default_reveal_duration() -> u64 {
    90
}

fn default_reward_epoch_start() -> Timestamp {
    default_first_price_epoch_start() + default_reveal_duration()
}

fn default_reward_epoch_duration() -> u64 {
    7_200
}

fn default_vote_power_boundary_fraction() -> u64 {
    7
}

fn default_error_ledger_capacity() -> usize {
    100
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            first_price_epoch_start: default_first_price_epoch_start(),
            price_epoch_duration_secs: default_price_epoch_duration(),
            reveal_duration_secs: default_reveal_duration(),
            reward_epoch_start: default_reward_epoch_start(),
            reward_epoch_duration_secs: default_reward_epoch_duration(),
            vote_power_boundary_fraction: default_vote_power_boundary_fraction(),
            error_ledger_capacity: default_error_ledger_capacity(),
        }
    }
}

impl OrchestratorSettings {
    /// Reject any setting that would make the schedule inconsistent.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.price_epoch_duration_secs == 0 {
            return Err(SettingsError::ZeroPriceEpochDuration);
        }
        if self.reveal_duration_secs == 0 {
            return Err(SettingsError::ZeroRevealDuration);
        }
        if self.reveal_duration_secs >= self.price_epoch_duration_secs {
            return Err(SettingsError::RevealTooLong {
                reveal: self.reveal_duration_secs,
                price_epoch: self.price_epoch_duration_secs,
            });
        }

        let earliest = self
            .first_price_epoch_start
            .saturating_add(self.reveal_duration_secs);
        if self.reward_epoch_start < earliest {
            return Err(SettingsError::RewardEpochStartTooEarly {
                start: self.reward_epoch_start,
                earliest,
            });
        }
        if (self.reward_epoch_start - earliest) % self.price_epoch_duration_secs != 0 {
            return Err(SettingsError::RewardEpochStartMisaligned {
                start: self.reward_epoch_start,
            });
        }

        validate_reward_epoch_duration(
            self.reward_epoch_duration_secs,
            self.price_epoch_duration_secs,
        )?;

        if self.vote_power_boundary_fraction == 0 {
            return Err(SettingsError::ZeroBoundaryFraction);
        }
        if self.error_ledger_capacity == 0 {
            return Err(SettingsError::ZeroLedgerCapacity);
        }
        Ok(())
    }
}

/// A reward-epoch duration must be a non-zero multiple of the price-epoch duration.
pub fn validate_reward_epoch_duration(duration: u64, price_epoch: u64) -> Result<(), SettingsError> {
    if duration == 0 {
        return Err(SettingsError::ZeroRewardEpochDuration);
    }
    if price_epoch == 0 || duration % price_epoch != 0 {
        return Err(SettingsError::RewardEpochDurationNotMultiple {
            duration,
            price_epoch,
        });
    }
    Ok(())
}
