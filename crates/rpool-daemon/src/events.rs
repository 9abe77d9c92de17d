//! Fan-out of committed pool events.
//!
//! The simulation publishes each block's committed events; subscribers get
//! them over a `tokio` broadcast channel, numbered in publication order. A
//! subscriber that falls behind loses its oldest events instead of stalling
//! the simulation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rpool_types::{BlockNumber, PoolEvent};

/// A committed event with its publication number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 1 for the first event published on the bus.
    pub sequence: u64,
    /// Block whose transaction committed the event.
    pub committed_at: BlockNumber,
    #[serde(flatten)]
    pub event: PoolEvent,
}

/// Broadcasts committed events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    /// A bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish the events committed in `block`, in order.
    pub fn publish(&self, block: BlockNumber, events: impl IntoIterator<Item = PoolEvent>) {
        for event in events {
            let sequence = self.published.fetch_add(1, Ordering::SeqCst) + 1;
            // No subscribers is not an error.
            let _ = self.tx.send(Event {
                sequence,
                committed_at: block,
                event,
            });
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Events published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

/// Log every event as one JSON line until all buses are dropped.
pub async fn log_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!(target: "rpool_daemon::events", "{json}"),
                Err(e) => warn!(error = %e, "event not serializable"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for the spawned logger to finish. Returns `false` if it panicked or
/// was cancelled.
pub async fn join_logger(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!("event logger failed: {}", e);
            false
        }
    }
}
