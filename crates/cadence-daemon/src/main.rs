//! cadence-daemon: drives the epoch orchestrator against a simulated chain.
//!
//! One block is mined per tick interval. Events drained from the
//! orchestrator after each tick are broadcast on the [`EventBus`] and
//! logged by a subscriber task.

mod chain;
mod config;
mod events;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use cadence_epoch::{EpochOrchestrator, TickOutcome};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::chain::SimulatedChain;
use crate::config::DaemonConfig;
use crate::events::{EventBus, EventFilter};

/// Daemon-wide shared state.
pub struct DaemonState {
    pub orchestrator: Arc<Mutex<EpochOrchestrator>>,
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("cadence={}", config.log.level).parse()?),
        )
        .init();

    info!(
        feeds = config.feeds.symbols.len(),
        price_epoch_secs = config.epochs.price_epoch_duration_secs,
        reward_epoch_secs = config.epochs.reward_epoch_duration_secs,
        "Cadence daemon starting"
    );

    // 3. Build the orchestrator and its simulated collaborators
    let sim::Simulation {
        orchestrator,
        book,
        cleanup_block,
    } = sim::build(&config)?;

    let state = Arc::new(DaemonState {
        orchestrator: Arc::new(Mutex::new(orchestrator)),
        config,
        event_bus: EventBus::new(1000),
    });

    // 4. Log every event from a subscriber task
    let mut events_rx = state.event_bus.subscribe();
    let filter = EventFilter::default();
    let logger = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) if filter.matches(&event) => {
                    let payload = serde_json::to_string(&event.event).unwrap_or_default();
                    if event.event.is_failure() {
                        warn!(seq = event.sequence, block = event.block, %payload, "{}", event.event.name());
                    } else {
                        info!(seq = event.sequence, block = event.block, %payload, "{}", event.event.name());
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // 5. Tick loop
    let mut chain = SimulatedChain::new(&state.config.chain);
    let mut interval =
        tokio::time::interval(Duration::from_millis(state.config.chain.tick_interval_ms.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let ctx = chain.next_block();
                let mut orchestrator = state.orchestrator.lock().await;
                match orchestrator.tick(&ctx) {
                    Ok(TickOutcome::Idle) | Ok(TickOutcome::Inactive) => {}
                    Ok(TickOutcome::PriceEpochFinalized(id)) => {
                        let (distributed, unearned) = book
                            .lock()
                            .map(|b| (b.distributed, b.unearned))
                            .unwrap_or_default();
                        info!(block = ctx.number, price_epoch = id, distributed, unearned, "price epoch finalized");
                    }
                    Ok(outcome) => debug!(block = ctx.number, ?outcome, "tick"),
                    Err(fault) => error!(block = ctx.number, %fault, "tick failed"),
                }
                for event in orchestrator.take_events() {
                    state.event_bus.emit(&ctx, event);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    // Graceful shutdown
    let orchestrator = state.orchestrator.lock().await;
    let errors = orchestrator.error_window(0, orchestrator.settings().error_ledger_capacity);
    info!(
        height = chain.height(),
        events = state.event_bus.sequence(),
        distinct_errors = errors.counts.len(),
        total_errors = errors.total_recorded,
        cleanup_block = cleanup_block.load(std::sync::atomic::Ordering::SeqCst),
        "Daemon stopped"
    );
    drop(orchestrator);
    logger.abort();
    Ok(())
}
