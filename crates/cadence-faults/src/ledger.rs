//! Fixed-capacity ring of distinct collaborator failures.
//!
//! Records are keyed by `(contract, message)`. A repeat of a retained record
//! bumps its counter and refreshes its block in place; a new distinct record
//! evicts the oldest one once the ring is full. The
//! ledger is read-only observability: nothing in the orchestrator branches
//! on its contents.

use std::collections::VecDeque;

use cadence_types::{Address, BlockNumber};
use serde::{Deserialize, Serialize};

/// Default number of distinct records retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// One distinct failure signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Block of the most recent occurrence.
    pub last_block: BlockNumber,
    /// How many times this signature occurred while retained.
    pub count: u64,
    pub message: String,
    /// The failing collaborator.
    pub contract: Address,
}

/// Windowed view over the ledger, as parallel arrays.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorWindow {
    pub last_blocks: Vec<BlockNumber>,
    pub counts: Vec<u64>,
    pub messages: Vec<String>,
    pub contracts: Vec<Address>,
    /// Every failure ever recorded, repeats included.
    pub total_recorded: u64,
}

/// Bounded log of distinct failures.
#[derive(Clone, Debug)]
pub struct ErrorLedger {
    capacity: usize,
    records: VecDeque<ErrorRecord>,
    total_recorded: u64,
}

impl ErrorLedger {
    /// Create a ledger retaining at most `capacity` distinct records.
    ///
    /// A zero capacity is bumped to one so the latest failure is always visible.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            total_recorded: 0,
        }
    }

    /// Record a failure of `contract` with `message` at `block`.
    pub fn record(&mut self, block: BlockNumber, contract: Address, message: &str) {
        self.total_recorded += 1;

        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.contract == contract && r.message == message)
        {
            existing.count += 1;
            existing.last_block = block;
            return;
        }

        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                tracing::trace!(
                    contract = %evicted.contract,
                    count = evicted.count,
                    "error ledger full, evicting oldest record"
                );
            }
        }
        self.records.push_back(ErrorRecord {
            last_block: block,
            count: 1,
            message: message.to_string(),
            contract,
        });
    }

    /// Read up to `count` records starting at `offset` (0 = oldest retained).
    pub fn window(&self, offset: usize, count: usize) -> ErrorWindow {
        let mut window = ErrorWindow {
            total_recorded: self.total_recorded,
            ..ErrorWindow::default()
        };
        for record in self.records.iter().skip(offset).take(count) {
            window.last_blocks.push(record.last_block);
            window.counts.push(record.count);
            window.messages.push(record.message.clone());
            window.contracts.push(record.contract);
        }
        window
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// Number of distinct records currently retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no failure is retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every failure ever recorded, repeats and evicted records included.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Maximum number of distinct records retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ErrorLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
