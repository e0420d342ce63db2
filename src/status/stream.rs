// src/status/stream.rs

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{StatusEvent, StatusFilter, StatusUpdate};

struct Subscriber {
    filter: StatusFilter,
    tx: mpsc::UnboundedSender<StatusEvent>,
}

/// Multi-subscriber feed of state transitions.
///
/// Every subscriber gets its own unbounded queue, so a slow consumer never
/// loses a terminal event. Cloning the stream shares the subscriber list.
#[derive(Clone, Default)]
pub struct StatusStream {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl std::fmt::Debug for StatusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStream")
            .field("subscribers", &self.lock().len())
            .finish()
    }
}

impl StatusStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // Subscribers hold no invariants a panic could break.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, filter: StatusFilter) -> StatusSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(?filter, "new status subscriber");
        self.lock().push(Subscriber { filter, tx });
        StatusSubscription { rx }
    }

    /// Timestamp `update` and deliver it to every matching subscriber.
    ///
    /// Subscribers whose receiving end was dropped are pruned.
    pub fn publish(&self, update: StatusUpdate) -> StatusEvent {
        let event = update.stamp(Utc::now());
        let mut subscribers = self.lock();
        subscribers.retain(|sub| {
            if !sub.filter.matches(&event) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
        trace!(entity = %event.entity, state = %event.state, receivers = subscribers.len(), "published status");
        event
    }

    /// Drop every subscriber; their subscriptions end once drained.
    pub fn close(&self) {
        let mut subscribers = self.lock();
        debug!(count = subscribers.len(), "closing status stream");
        subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

/// Receiving end of a [`StatusStream`] subscription.
#[derive(Debug)]
pub struct StatusSubscription {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl StatusSubscription {
    /// Next matching event, or `None` once the stream is closed and drained.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
