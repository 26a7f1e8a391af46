//! Store-and-forward queue contract
//!
//! The router hands undeliverable messages to a durable, at-least-once queue
//! and drains them later. Consumption is pull-based: `next_pending` hands out
//! the head message of a topic together with a receipt, and the caller settles
//! it with exactly one of `ack` (delivered, remove it) or `requeue` (put it
//! back at the head for a later pass).
//!
//! While a message is pending settlement no other consumer can receive it, so
//! overlapping drains of one topic never deliver the same message twice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::QueueError;

pub mod memory;

pub use memory::MemoryQueue;

/// Topic that holds the pending messages of `username`
pub fn queue_topic(username: &str) -> String {
    format!("queue_{}", username)
}

// ----------------------------------------------------------------------------
// Queue Payloads
// ----------------------------------------------------------------------------

/// Payload stored in a receiver's topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub sender: String,
    pub text: String,
}

impl QueuedMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

/// Settlement handle for a message handed out by `next_pending`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub tag: u64,
}

/// A message taken from a topic and awaiting `ack` or `requeue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub message: QueuedMessage,
    pub receipt: DeliveryReceipt,
}

// ----------------------------------------------------------------------------
// Queue Trait
// ----------------------------------------------------------------------------

/// The durable queue collaborator the router depends on
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Durably append `message` to `topic`
    async fn publish(&self, topic: &str, message: QueuedMessage) -> Result<(), QueueError>;

    /// Take the head message of `topic`, or `None` when nothing is ready
    async fn next_pending(&self, topic: &str) -> Result<Option<PendingDelivery>, QueueError>;

    /// Remove a delivered message for good
    async fn ack(&self, receipt: DeliveryReceipt) -> Result<(), QueueError>;

    /// Return an undelivered message to the head of its topic
    async fn requeue(&self, receipt: DeliveryReceipt) -> Result<(), QueueError>;
}
