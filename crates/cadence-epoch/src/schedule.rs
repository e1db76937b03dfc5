//! Price-epoch timing arithmetic.
//!
//! ```text
//! start(id)     = first_start + id * duration
//! end(id)       = start(id) + duration            (exclusive)
//! reveal_end(id) = end(id) + reveal
//! ```

use cadence_types::{PriceEpochId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::settings::OrchestratorSettings;

/// Timing of one price epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEpochInfo {
    pub id: PriceEpochId,
    pub start: Timestamp,
    /// First second after the epoch.
    pub end: Timestamp,
    pub reveal_end: Timestamp,
}

impl PriceEpochInfo {
    /// Last second included in the epoch, as reported to the reward ledger.
    pub fn inclusive_end(&self) -> Timestamp {
        self.end.saturating_sub(1)
    }
}

/// Fixed price-epoch schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceEpochSchedule {
    first_start: Timestamp,
    duration: u64,
    reveal: u64,
}

impl PriceEpochSchedule {
    /// Build the schedule from validated settings.
    pub fn new(settings: &OrchestratorSettings) -> Self {
        Self {
            first_start: settings.first_price_epoch_start,
            duration: settings.price_epoch_duration_secs.max(1),
            reveal: settings.reveal_duration_secs,
        }
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn reveal(&self) -> u64 {
        self.reveal
    }

    /// Id of the epoch containing `now`. Times before the anchor map to epoch 0.
    pub fn epoch_at(&self, now: Timestamp) -> PriceEpochId {
        now.saturating_sub(self.first_start) / self.duration
    }

    /// Timing of epoch `id`.
    pub fn info(&self, id: PriceEpochId) -> PriceEpochInfo {
        let start = self
            .first_start
            .saturating_add(id.saturating_mul(self.duration));
        let end = start.saturating_add(self.duration);
        PriceEpochInfo {
            id,
            start,
            end,
            reveal_end: end.saturating_add(self.reveal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> PriceEpochSchedule {
        PriceEpochSchedule::new(&OrchestratorSettings {
            first_price_epoch_start: 1_000,
            price_epoch_duration_secs: 120,
            reveal_duration_secs: 30,
            reward_epoch_start: 1_030,
            ..OrchestratorSettings::default()
        })
    }

    #[test]
    fn test_epoch_at_boundaries() {
        let s = schedule();
        assert_eq!(s.epoch_at(999), 0);
        assert_eq!(s.epoch_at(1_000), 0);
        assert_eq!(s.epoch_at(1_119), 0);
        assert_eq!(s.epoch_at(1_120), 1);
    }

    #[test]
    fn test_info() {
        let info = schedule().info(2);
        assert_eq!(info.start, 1_240);
        assert_eq!(info.end, 1_360);
        assert_eq!(info.reveal_end, 1_390);
        assert_eq!(info.inclusive_end(), 1_359);
    }
}
