//! Notification fan-out (mechanics only).
//!
//! The sink is fire-and-forget: the engine publishes after a transition has
//! been persisted and never waits for delivery. Subscribers must tolerate
//! duplicates: a retried engine operation may publish the same event twice.

use std::sync::{Mutex, mpsc};
use std::time::Duration;

use crate::event::BillingEvent;

/// A subscription to the billing event stream.
///
/// Each subscription receives a copy of every published event (broadcast
/// semantics). Designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<BillingEvent>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<BillingEvent>) -> Self {
        Self { receiver }
    }

    /// Block until the next event is available.
    pub fn recv(&self) -> Result<BillingEvent, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Result<BillingEvent, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for an event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<BillingEvent, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<BillingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

#[derive(Debug)]
pub enum SinkError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

/// Where the engine hands off notifications.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: BillingEvent) -> Result<(), SinkError>;
}

/// In-memory pub/sub sink.
///
/// - No IO / no async
/// - Best-effort fan-out
/// - Duplicates acceptable (subscribers must be idempotent)
#[derive(Debug, Default)]
pub struct InMemorySink {
    subscribers: Mutex<Vec<mpsc::Sender<BillingEvent>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive events until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

impl NotificationSink for InMemorySink {
    fn publish(&self, event: BillingEvent) -> Result<(), SinkError> {
        let mut subs = self.subscribers.lock().map_err(|_| SinkError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(event.clone()).is_ok());

        Ok(())
    }
}
