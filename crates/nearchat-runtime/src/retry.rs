//! Pending-delivery retry
//!
//! A drain pass pulls a user's queued messages one at a time and delivers the
//! leading run that is deliverable now. A message whose sender is online but
//! out of range goes back to the head of the queue and ends the pass, so
//! per-user order is preserved.
//!
//! `RetryScheduler` keeps at most one worker per username, bound to the
//! connection that owns the session. A worker runs a pass, then sleeps for
//! the retry interval or until triggered again, for as long as that
//! connection still owns the username. Triggers that arrive while a worker is
//! running are coalesced into a single extra pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use nearchat_core::{queue_topic, DeliveryReceipt, PendingDelivery};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dispatcher::DeliveryDispatcher;
use crate::managers::ConnectionId;

// ----------------------------------------------------------------------------
// Drain Pass
// ----------------------------------------------------------------------------

/// Why a drain pass stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEnd {
    /// The user's queue has nothing ready
    Empty,
    /// The head message's sender is online and out of range
    OutOfRange { sender: String },
    /// Writing to the user's connection failed
    WriteFailed,
    /// The user is no longer registered
    ReceiverOffline,
    /// The queue collaborator returned an error
    QueueFailed,
}

/// Result of one drain pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub requeued: usize,
    pub end: DrainEnd,
}

impl DrainReport {
    fn new() -> Self {
        Self {
            delivered: 0,
            requeued: 0,
            end: DrainEnd::Empty,
        }
    }
}

/// Run one drain pass over `username`'s pending queue
pub async fn drain_pending(dispatcher: &DeliveryDispatcher, username: &str) -> DrainReport {
    let topic = queue_topic(username);
    let queue = dispatcher.queue();
    let mut report = DrainReport::new();

    loop {
        if !dispatcher.registry().contains(username) {
            report.end = DrainEnd::ReceiverOffline;
            break;
        }

        let PendingDelivery { message, receipt } = match queue.next_pending(&topic).await {
            Ok(Some(pending)) => pending,
            Ok(None) => break,
            Err(e) => {
                error!(%topic, "Failed to consume pending message: {}", e);
                report.end = DrainEnd::QueueFailed;
                break;
            }
        };

        let (receiver, sender) = dispatcher.registry().lookup_pair(username, &message.sender);
        let Some(receiver) = receiver else {
            requeue(dispatcher, receipt, &mut report).await;
            report.end = DrainEnd::ReceiverOffline;
            break;
        };

        // A sender who went offline cannot move anymore; flush its messages
        if let Some(sender) = &sender {
            if !dispatcher
                .proximity()
                .within_range(receiver.location, sender.location)
            {
                requeue(dispatcher, receipt, &mut report).await;
                report.end = DrainEnd::OutOfRange {
                    sender: message.sender,
                };
                break;
            }
        }

        if dispatcher.deliver(&receiver, &message.sender, &message.text).await {
            if let Err(e) = queue.ack(receipt).await {
                error!(%topic, "Failed to ack delivered message: {}", e);
                report.end = DrainEnd::QueueFailed;
                break;
            }
            report.delivered += 1;
            info!(
                sender = %message.sender,
                receiver = username,
                sender_online = sender.is_some(),
                "Pending message delivered"
            );
        } else {
            requeue(dispatcher, receipt, &mut report).await;
            report.end = DrainEnd::WriteFailed;
            break;
        }
    }

    report
}

async fn requeue(dispatcher: &DeliveryDispatcher, receipt: DeliveryReceipt, report: &mut DrainReport) {
    let topic = receipt.topic.clone();
    match dispatcher.queue().requeue(receipt).await {
        Ok(()) => report.requeued += 1,
        Err(e) => error!(%topic, "Failed to requeue pending message: {}", e),
    }
}

// ----------------------------------------------------------------------------
// Retry Scheduler
// ----------------------------------------------------------------------------

struct DrainWorker {
    id: u64,
    owner: ConnectionId,
    trigger: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl DrainWorker {
    fn stop(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.trigger.notify_one();
    }
}

/// One coalesced, cancellable drain worker per username
pub struct RetryScheduler {
    dispatcher: Arc<DeliveryDispatcher>,
    interval: Duration,
    workers: Arc<DashMap<String, DrainWorker>>,
    next_worker_id: AtomicU64,
}

impl RetryScheduler {
    pub fn new(dispatcher: Arc<DeliveryDispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            workers: Arc::new(DashMap::new()),
            next_worker_id: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request a drain pass for `username`, owned by connection `owner`.
    ///
    /// Wakes the user's worker when it belongs to `owner`. A worker left
    /// behind by a superseded connection is stopped and replaced.
    pub fn trigger(&self, username: &str, owner: ConnectionId) {
        match self.workers.entry(username.to_string()) {
            Entry::Occupied(mut worker) => {
                if worker.get().owner == owner {
                    debug!(username, "Drain worker already running, waking it");
                    worker.get().trigger.notify_one();
                } else {
                    let stale = worker.insert(self.spawn_worker(username, owner));
                    debug!(username, worker = stale.id, "Stale drain worker replaced");
                    stale.stop();
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.spawn_worker(username, owner));
            }
        }
    }

    fn spawn_worker(&self, username: &str, owner: ConnectionId) -> DrainWorker {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let trigger = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_worker(
            self.dispatcher.clone(),
            username.to_string(),
            owner,
            self.interval,
            trigger.clone(),
            cancelled.clone(),
            WorkerSlot {
                workers: self.workers.clone(),
                id,
            },
        ));
        debug!(username, worker = id, %owner, "Drain worker started");
        DrainWorker {
            id,
            owner,
            trigger,
            cancelled,
            task,
        }
    }

    /// Stop `username`'s worker after its current message is settled.
    ///
    /// Only a worker started for `owner` is stopped; a successor started by a
    /// newer connection for the same username keeps running.
    pub fn cancel(&self, username: &str, owner: ConnectionId) {
        if let Some((_, worker)) = self
            .workers
            .remove_if(username, |_, worker| worker.owner == owner)
        {
            debug!(username, worker = worker.id, "Drain worker cancelled");
            worker.stop();
        }
    }

    pub fn is_active(&self, username: &str) -> bool {
        self.workers.contains_key(username)
    }

    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker and wait for them to finish
    pub async fn shutdown(&self) {
        let usernames: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        let mut tasks = Vec::with_capacity(usernames.len());
        for username in usernames {
            if let Some((_, worker)) = self.workers.remove(&username) {
                worker.stop();
                tasks.push(worker.task);
            }
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("Retry scheduler stopped");
    }
}

/// Lets a worker deregister itself without evicting a successor
struct WorkerSlot {
    workers: Arc<DashMap<String, DrainWorker>>,
    id: u64,
}

async fn run_worker(
    dispatcher: Arc<DeliveryDispatcher>,
    username: String,
    owner: ConnectionId,
    interval: Duration,
    trigger: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    slot: WorkerSlot,
) {
    while !cancelled.load(Ordering::Acquire)
        && dispatcher.registry().is_owned_by(&username, owner)
    {
        let report = drain_pending(&dispatcher, &username).await;
        if report.delivered > 0 || report.requeued > 0 {
            debug!(
                username = %username,
                delivered = report.delivered,
                requeued = report.requeued,
                end = ?report.end,
                "Drain pass finished"
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = trigger.notified() => {}
        }
    }

    slot.workers
        .remove_if(&username, |_, worker| worker.id == slot.id);
    debug!(username = %username, worker = slot.id, "Drain worker exited");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
