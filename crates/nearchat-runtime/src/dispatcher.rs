//! Delivery dispatcher
//!
//! Every outgoing chat message has exactly two fates: it is written to the
//! receiver's live connection right now, or its ownership moves to the queue
//! collaborator under the receiver's topic. Nothing is kept locally.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nearchat_core::{queue_topic, MessageQueue, ProximityPolicy, QueuedMessage, ServerMessage};
use tracing::{debug, error, info, warn};

use crate::managers::{ConnectionRegistry, Session};

// ----------------------------------------------------------------------------
// Dispatch Outcome
// ----------------------------------------------------------------------------

/// What happened to one outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written to the receiver's connection
    Delivered,
    /// Receiver was in range but the write failed; the message is dropped
    DeliveryFailed,
    /// Handed to the queue under the receiver's topic
    Queued,
    /// The queue refused the message; it is dropped
    QueueFailed,
    /// The sender has no session; the message is dropped
    UnknownSender,
}

// ----------------------------------------------------------------------------
// Delivery Dispatcher
// ----------------------------------------------------------------------------

/// Routes chat messages between direct delivery and the queue
pub struct DeliveryDispatcher {
    registry: Arc<ConnectionRegistry>,
    queue: Arc<dyn MessageQueue>,
    proximity: ProximityPolicy,
    stats: DispatchCounters,
}

impl DeliveryDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        queue: Arc<dyn MessageQueue>,
        proximity: ProximityPolicy,
    ) -> Self {
        Self {
            registry,
            queue,
            proximity,
            stats: DispatchCounters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<dyn MessageQueue> {
        &self.queue
    }

    pub fn proximity(&self) -> ProximityPolicy {
        self.proximity
    }

    /// Route one chat message from `sender` to `receiver`
    pub async fn dispatch(&self, sender: &str, receiver: &str, text: &str) -> DispatchOutcome {
        let (sender_session, receiver_session) = self.registry.lookup_pair(sender, receiver);

        let Some(sender_session) = sender_session else {
            debug!(sender, receiver, "Dropping message from unregistered sender");
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::UnknownSender;
        };

        let outcome = match receiver_session {
            Some(receiver_session)
                if self
                    .proximity
                    .within_range(sender_session.location, receiver_session.location) =>
            {
                if self.deliver(&receiver_session, sender, text).await {
                    DispatchOutcome::Delivered
                } else {
                    DispatchOutcome::DeliveryFailed
                }
            }
            _ => self.enqueue(sender, receiver, text).await,
        };

        match outcome {
            DispatchOutcome::Delivered => self.stats.delivered.fetch_add(1, Ordering::Relaxed),
            DispatchOutcome::Queued => self.stats.queued.fetch_add(1, Ordering::Relaxed),
            _ => self.stats.dropped.fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    /// Write a chat message to `receiver`'s connection; false when the write failed
    pub async fn deliver(&self, receiver: &Session, sender: &str, text: &str) -> bool {
        let message = ServerMessage::Message {
            sender: sender.to_string(),
            text: text.to_string(),
        };
        match receiver.handle.send(&message).await {
            Ok(()) => {
                debug!(sender, receiver = %receiver.username, "Message delivered");
                true
            }
            Err(e) => {
                warn!(
                    sender,
                    receiver = %receiver.username,
                    connection = %receiver.handle.id(),
                    "Failed to deliver message: {}",
                    e
                );
                false
            }
        }
    }

    async fn enqueue(&self, sender: &str, receiver: &str, text: &str) -> DispatchOutcome {
        let topic = queue_topic(receiver);
        match self
            .queue
            .publish(&topic, QueuedMessage::new(sender, text))
            .await
        {
            Ok(()) => {
                info!(sender, receiver, %topic, "Message stored for later delivery");
                DispatchOutcome::Queued
            }
            Err(e) => {
                error!(sender, receiver, %topic, "Failed to queue message: {}", e);
                DispatchOutcome::QueueFailed
            }
        }
    }

    pub fn statistics(&self) -> DispatchStatistics {
        DispatchStatistics {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            queued: self.stats.queued.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DispatchCounters {
    delivered: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of dispatcher activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatistics {
    /// Messages written directly to a receiver
    pub delivered: u64,
    /// Messages handed to the queue
    pub queued: u64,
    /// Messages dropped (unknown sender, failed write, failed publish)
    pub dropped: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
