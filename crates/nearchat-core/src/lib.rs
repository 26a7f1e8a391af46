//! NearChat Core
//!
//! Foundational, I/O-free building blocks for the NearChat proximity router:
//! - `Coordinates` and the planar proximity evaluator
//! - The newline-delimited JSON wire protocol spoken by clients
//! - The `MessageQueue` contract for the store-and-forward collaborator,
//!   plus an in-process broker implementing it
//! - Router configuration and the unified error types
//!
//! The running pieces (registry, dispatcher, retry scheduler, server) live in
//! `nearchat-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod protocol;
pub mod proximity;
pub mod queue;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::RouterConfig;
pub use errors::{NearchatError, NearchatResult, ProtocolError, QueueError};
pub use protocol::{
    decode_request, decode_server_message, encode_message, encode_record, ClientRequest,
    ServerMessage, VisibleUser,
};
pub use proximity::{distance, ProximityPolicy, DEFAULT_RANGE};
pub use queue::{
    queue_topic, DeliveryReceipt, MemoryQueue, MessageQueue, PendingDelivery, QueuedMessage,
};
pub use types::Coordinates;
