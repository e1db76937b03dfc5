//! Randomized vote-power block selection.
//!
//! At each reward-epoch rollover a historical block is drawn from the tail
//! of the epoch that just ended:
//!
//! ```text
//! range      = current_block - previous_start_block
//! window     = max(1, range / boundary_fraction)
//! blocks_ago = 1 + draw % window
//! checkpoint = current_block - blocks_ago
//! ```
//!
//! For any `range >= 1` the checkpoint lies in
//! `[previous_start_block, current_block)`.

use cadence_types::entropy::{self, contexts};
use cadence_types::{BlockContext, BlockNumber};

use crate::settings::SettingsError;

/// Draws the vote-power checkpoint for a new reward epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VotePowerCheckpointSelector {
    boundary_fraction: u64,
}

impl VotePowerCheckpointSelector {
    /// A zero fraction is rejected.
    pub fn new(boundary_fraction: u64) -> Result<Self, SettingsError> {
        if boundary_fraction == 0 {
            return Err(SettingsError::ZeroBoundaryFraction);
        }
        Ok(Self { boundary_fraction })
    }

    pub fn boundary_fraction(&self) -> u64 {
        self.boundary_fraction
    }

    /// Number of candidate blocks for a given range.
    pub fn window(&self, range: u64) -> u64 {
        (range / self.boundary_fraction).max(1)
    }

    /// Pick the checkpoint for a reward epoch starting at `ctx.number`.
    pub fn select(&self, previous_start_block: BlockNumber, ctx: &BlockContext) -> BlockNumber {
        let range = ctx.number.saturating_sub(previous_start_block);
        let window = self.window(range);
        let draw = entropy::draw_u64(
            contexts::VOTE_POWER_BLOCK,
            &ctx.entropy,
            &[&ctx.timestamp.to_le_bytes(), &ctx.number.to_le_bytes()],
        );
        let blocks_ago = 1 + draw % window;
        let checkpoint = ctx.number.saturating_sub(blocks_ago);
        tracing::debug!(
            range,
            window,
            blocks_ago,
            checkpoint,
            "vote power block selected"
        );
        checkpoint
    }
}
