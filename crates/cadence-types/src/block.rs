//! Chain context observed by a tick.

use serde::{Deserialize, Serialize};

use crate::{BlockNumber, Timestamp};

/// Snapshot of the chain at the moment a tick runs.
///
/// `entropy` is whatever chain-native unpredictability the host exposes
/// (block hash, beacon output). The orchestrator never draws randomness
/// from anywhere else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Current block height.
    pub number: BlockNumber,
    /// Current block timestamp in seconds.
    pub timestamp: Timestamp,
    /// Chain-supplied entropy for this block.
    pub entropy: [u8; 32],
}

impl BlockContext {
    /// Build a block context.
    pub fn new(number: BlockNumber, timestamp: Timestamp, entropy: [u8; 32]) -> Self {
        Self {
            number,
            timestamp,
            entropy,
        }
    }
}
