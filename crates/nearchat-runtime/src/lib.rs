//! NearChat Runtime
//!
//! The running half of the proximity router:
//! - `ConnectionRegistry`: who is online, where, and on which connection
//! - `DeliveryDispatcher`: direct delivery within range, queueing otherwise
//! - `RetryScheduler`: one coalesced drain worker per user for pending messages
//! - `Router`: turns decoded client requests into the above
//! - `RouterServer`: the TCP accept loop and per-connection read loops
//! - `RecordReader`: bounded newline framing for inbound records
//!
//! `nearchat-core` provides the protocol, proximity rules and queue contract.

pub mod dispatcher;
pub mod framing;
pub mod managers;
pub mod retry;
pub mod router;
pub mod server;
pub mod visibility;

pub use dispatcher::{DeliveryDispatcher, DispatchOutcome, DispatchStatistics};
pub use framing::{InboundRecord, RecordReader, MAX_RECORD_LEN};
pub use managers::*;
pub use retry::{drain_pending, DrainEnd, DrainReport, RetryScheduler};
pub use router::{ClientConnection, Router};
pub use server::RouterServer;
pub use visibility::visible_users;

// Re-export core types for convenience
pub use nearchat_core::{
    ClientRequest, Coordinates, MemoryQueue, MessageQueue, NearchatError, NearchatResult,
    RouterConfig, ServerMessage, VisibleUser,
};
