//! Reward data returned by feeds and the instructions handed to the reward ledger.
//!
//! A feed's `finalize` reports the participants that earned rewards in the
//! epoch together with their weights. The orchestrator forwards the winning
//! feed's report, unchanged, as a [`DistributionInstruction`]. Turning that
//! instruction into balances is the ledger's job; [`DistributionInstruction::shares`]
//! pins down the rounding rule every ledger must follow.

use serde::{Deserialize, Serialize};

use crate::{Address, BlockNumber, FeedId, PriceEpochId, RewardEpochId, Timestamp};

/// Rewardable participants reported by a feed when it finalizes an epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardData {
    /// Participants eligible for a reward.
    pub participants: Vec<Address>,
    /// Weight of each participant, parallel to `participants`.
    pub weights: Vec<u128>,
    /// Sum the weights are measured against.
    pub total_weight: u128,
}

impl RewardData {
    /// No rewardable participants.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the feed reported at least one rewardable participant.
    pub fn has_participants(&self) -> bool {
        !self.participants.is_empty()
    }

    /// Whether the participant and weight lists line up.
    pub fn is_well_formed(&self) -> bool {
        self.participants.len() == self.weights.len()
    }
}

/// Everything the reward ledger needs to distribute one price epoch's rewards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionInstruction {
    pub participants: Vec<Address>,
    pub weights: Vec<u128>,
    pub total_weight: u128,
    pub price_epoch_id: PriceEpochId,
    /// The feed whose participants are being rewarded.
    pub feed: FeedId,
    pub price_epoch_duration_secs: u64,
    pub reward_epoch_id: RewardEpochId,
    /// Last second included in the price epoch.
    pub price_epoch_end_time: Timestamp,
    pub vote_power_block: BlockNumber,
}

impl DistributionInstruction {
    /// Split `reward` across participants as `floor(reward * w_i / total_weight)`.
    ///
    /// The product is taken over 256 bits, so the floor is exact for any
    /// inputs. The remainder is never redistributed. A zero total weight
    /// yields all zero shares; a share above `u128::MAX` (only possible when
    /// a weight exceeds the total) saturates.
    pub fn shares(&self, reward: u128) -> Vec<u128> {
        if self.total_weight == 0 {
            return vec![0; self.weights.len()];
        }
        self.weights
            .iter()
            .map(|w| mul_div_floor(reward, *w, self.total_weight).unwrap_or(u128::MAX))
            .collect()
    }
}

const LOW_64: u128 = u64::MAX as u128;

/// Full 256-bit product of `a` and `b` as `(high, low)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_64);
    let (b1, b0) = (b >> 64, b & LOW_64);
    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & LOW_64) + (p10 & LOW_64);
    let low = (p00 & LOW_64) | ((mid & LOW_64) << 64);
    let high = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (high, low)
}

/// `floor(a * b / d)` for `d > 0`, or `None` if the quotient exceeds `u128`.
fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    let (high, low) = widening_mul(a, b);
    if high >= d {
        return None;
    }
    // Shift-subtract division; `rem < d` holds between steps.
    let mut rem = high;
    let mut quot = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    Some(quot)
}
