//! In-process queue broker
//!
//! `MemoryQueue` implements the `MessageQueue` contract inside the router
//! process. Messages survive client disconnects but not a process restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{DeliveryReceipt, MessageQueue, PendingDelivery, QueuedMessage};
use crate::errors::QueueError;

/// A message sitting in a topic, ordered by `sequence`
#[derive(Debug, Clone)]
struct StoredMessage {
    sequence: u64,
    message: QueuedMessage,
}

#[derive(Debug, Default)]
struct Topic {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
}

impl Topic {
    /// Put a message back where its sequence number says it belongs
    fn restore(&mut self, stored: StoredMessage) {
        let position = self
            .ready
            .iter()
            .position(|m| m.sequence > stored.sequence)
            .unwrap_or(self.ready.len());
        self.ready.insert(position, stored);
    }

    fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.unacked.is_empty()
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    next_sequence: u64,
    next_tag: u64,
}

// ----------------------------------------------------------------------------
// Memory Queue
// ----------------------------------------------------------------------------

/// FIFO-per-topic broker with explicit ack / requeue settlement
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<BrokerState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting in `topic`, excluding ones handed out but unsettled
    pub fn ready_count(&self, topic: &str) -> usize {
        self.with_state(|state| state.topics.get(topic).map_or(0, |t| t.ready.len()))
    }

    /// Messages handed out from `topic` and not yet acked or requeued
    pub fn unacked_count(&self, topic: &str) -> usize {
        self.with_state(|state| state.topics.get(topic).map_or(0, |t| t.unacked.len()))
    }

    /// Topics currently holding ready or unsettled messages
    pub fn topic_count(&self) -> usize {
        self.with_state(|state| state.topics.len())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut BrokerState) -> R) -> R {
        // Every update leaves the state consistent, so poisoning is recoverable
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn settle(&self, receipt: &DeliveryReceipt) -> Result<StoredMessage, QueueError> {
        self.with_state(|state| {
            let topic = state.topics.get_mut(&receipt.topic);
            let stored = topic.and_then(|topic| {
                let stored = topic.unacked.remove(&receipt.tag)?;
                Some((stored, topic.is_empty()))
            });
            match stored {
                Some((stored, drained)) => {
                    if drained {
                        state.topics.remove(&receipt.topic);
                    }
                    Ok(stored)
                }
                None => Err(QueueError::UnknownReceipt {
                    topic: receipt.topic.clone(),
                    tag: receipt.tag,
                }),
            }
        })
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, topic: &str, message: QueuedMessage) -> Result<(), QueueError> {
        self.with_state(|state| {
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .ready
                .push_back(StoredMessage { sequence, message });
        });
        debug!(topic, "Message published");
        Ok(())
    }

    async fn next_pending(&self, topic: &str) -> Result<Option<PendingDelivery>, QueueError> {
        Ok(self.with_state(|state| {
            let tag = state.next_tag;
            let entry = state.topics.get_mut(topic)?;
            let Some(stored) = entry.ready.pop_front() else {
                if entry.is_empty() {
                    state.topics.remove(topic);
                }
                return None;
            };
            let message = stored.message.clone();
            entry.unacked.insert(tag, stored);
            state.next_tag += 1;
            Some(PendingDelivery {
                message,
                receipt: DeliveryReceipt {
                    topic: topic.to_string(),
                    tag,
                },
            })
        }))
    }

    async fn ack(&self, receipt: DeliveryReceipt) -> Result<(), QueueError> {
        self.settle(&receipt)?;
        debug!(topic = %receipt.topic, tag = receipt.tag, "Message acked");
        Ok(())
    }

    async fn requeue(&self, receipt: DeliveryReceipt) -> Result<(), QueueError> {
        let stored = self.settle(&receipt)?;
        self.with_state(|state| {
            state
                .topics
                .entry(receipt.topic.clone())
                .or_default()
                .restore(stored)
        });
        debug!(topic = %receipt.topic, tag = receipt.tag, "Message requeued");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
