//! Stateful managers for the NearChat runtime
//!
//! This module contains the connection handles and the registry that maps
//! usernames to live sessions.

pub mod connection;
pub mod registry;

pub use connection::{ConnectionHandle, ConnectionId};
pub use registry::{ConnectionRegistry, RegistryStats, Session};
