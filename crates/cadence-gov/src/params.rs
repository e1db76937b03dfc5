//! Governance parameter tuple and validation table.
//!
//! | Parameter                                 | Acceptable range          |
//! |-------------------------------------------|---------------------------|
//! | `max_vote_power_nat_threshold_fraction`   | > 0                       |
//! | `max_vote_power_asset_threshold_fraction` | > 0                       |
//! | `low_asset_usd_threshold`                 | <= `high_asset_usd_threshold` |
//! | `high_asset_turnout_threshold_bips`       | <= 10,000                 |
//! | `low_nat_turnout_threshold_bips`          | <= 10,000                 |
//! | `elastic_band_width_ppm`                  | <= 1,000,000              |
//! | `reward_expiry_offset_seconds`            | > 0                       |
//! | `trusted_addresses`                       | at most [`MAX_TRUSTED_ADDRESSES`] |

use cadence_types::{Address, BIPS_DENOMINATOR, PPM_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::{GovError, Result};

/// Maximum number of trusted addresses a feed may fall back to.
pub const MAX_TRUSTED_ADDRESSES: usize = 5;

/// Per-feed configuration pushed by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParameters {
    /// Divisor capping a single voter's native vote power share.
    pub max_vote_power_nat_threshold_fraction: u64,
    /// Divisor capping a single voter's asset vote power share.
    pub max_vote_power_asset_threshold_fraction: u64,
    pub low_asset_usd_threshold: u64,
    pub high_asset_usd_threshold: u64,
    pub high_asset_turnout_threshold_bips: u64,
    pub low_nat_turnout_threshold_bips: u64,
    /// Width of the rewarded band around the median, in ppm.
    pub elastic_band_width_ppm: u64,
    /// How long a reward epoch stays claimable after it ends.
    pub reward_expiry_offset_seconds: u64,
    /// Addresses whose submissions form the fallback consensus.
    #[serde(default)]
    pub trusted_addresses: Vec<Address>,
}

impl GovernanceParameters {
    /// Check every field against the validation table.
    ///
    /// # Errors
    ///
    /// - [`GovError::InvalidParameter`] for an out-of-range bound
    /// - [`GovError::InvalidRewardExpiry`] if the expiry offset is zero
    /// - [`GovError::TooManyTrustedAddresses`] if more than five addresses are given
    pub fn validate(&self) -> Result<()> {
        if self.max_vote_power_nat_threshold_fraction == 0 {
            return Err(GovError::InvalidParameter {
                name: "max_vote_power_nat_threshold_fraction",
                reason: "must be non-zero",
            });
        }
        if self.max_vote_power_asset_threshold_fraction == 0 {
            return Err(GovError::InvalidParameter {
                name: "max_vote_power_asset_threshold_fraction",
                reason: "must be non-zero",
            });
        }
        if self.high_asset_usd_threshold < self.low_asset_usd_threshold {
            return Err(GovError::InvalidParameter {
                name: "high_asset_usd_threshold",
                reason: "must not be below low_asset_usd_threshold",
            });
        }
        if self.high_asset_turnout_threshold_bips > BIPS_DENOMINATOR {
            return Err(GovError::InvalidParameter {
                name: "high_asset_turnout_threshold_bips",
                reason: "must not exceed 10000",
            });
        }
        if self.low_nat_turnout_threshold_bips > BIPS_DENOMINATOR {
            return Err(GovError::InvalidParameter {
                name: "low_nat_turnout_threshold_bips",
                reason: "must not exceed 10000",
            });
        }
        if self.elastic_band_width_ppm > PPM_DENOMINATOR {
            return Err(GovError::InvalidParameter {
                name: "elastic_band_width_ppm",
                reason: "must not exceed 1000000",
            });
        }
        if self.reward_expiry_offset_seconds == 0 {
            return Err(GovError::InvalidRewardExpiry);
        }
        if self.trusted_addresses.len() > MAX_TRUSTED_ADDRESSES {
            return Err(GovError::TooManyTrustedAddresses {
                actual: self.trusted_addresses.len(),
                maximum: MAX_TRUSTED_ADDRESSES,
            });
        }
        Ok(())
    }
}
