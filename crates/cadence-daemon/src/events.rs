//! Event fan-out.
//!
//! Orchestrator events drained after each tick are stamped with the block
//! they were produced in and broadcast to every subscriber. Slow
//! subscribers lag and lose the oldest events; the tick loop never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cadence_types::{BlockContext, OrchestratorEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An orchestrator event as seen by subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Position in the bus, starting at 1.
    pub sequence: u64,
    /// Block whose tick produced the event.
    pub block: u64,
    /// Chain timestamp of that block.
    pub timestamp: u64,
    pub event: OrchestratorEvent,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "lifecycle", "registry", "governance", "reward", "price".
    pub categories: Option<Vec<String>>,
    /// Only pass captured collaborator failures.
    #[serde(default)]
    pub failures_only: bool,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamp and broadcast one orchestrator event. Returns its sequence number.
    pub fn emit(&self, ctx: &BlockContext, event: OrchestratorEvent) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(Event {
            sequence,
            block: ctx.number,
            timestamp: ctx.timestamp,
            event,
        });
        sequence
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if self.failures_only && !event.event.is_failure() {
            return false;
        }
        if let Some(ref categories) = self.categories {
            let category = categorize_event(&event.event);
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }
        true
    }
}

/// Categorize an orchestrator event.
fn categorize_event(event: &OrchestratorEvent) -> &'static str {
    match event.name() {
        "activated" => "lifecycle",
        s if s.starts_with("feed_added")
            || s.starts_with("feed_activation")
            || s.starts_with("composite")
            || s.starts_with("underlying")
            || s.starts_with("setting_asset_links") =>
        {
            "registry"
        }
        s if s.starts_with("governance")
            || s.contains("fallback_mode")
            || s.starts_with("reward_epoch_duration") =>
        {
            "governance"
        }
        s if s.starts_with("reward_epoch")
            || s.starts_with("closing_expired")
            || s.starts_with("cleanup")
            || s.starts_with("setting_vote_power") =>
        {
            "reward"
        }
        _ => "price",
    }
}
