//! Connection registry
//!
//! The single source of truth for who is online and where. All reads and
//! writes go through one exclusive lock that is only held for map operations;
//! socket writes and queue calls always happen on cloned `Session`s outside it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use nearchat_core::Coordinates;
use tracing::{debug, info};

use super::connection::{ConnectionHandle, ConnectionId};

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// The live record of one connected username
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub location: Coordinates,
    pub handle: ConnectionHandle,
}

// ----------------------------------------------------------------------------
// Connection Registry
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryState {
    sessions: BTreeMap<String, Session>,
    stats: RegistryStats,
}

/// Thread-safe directory of username → live session
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert or replace the session for `username`.
    ///
    /// A superseded session on a different connection has its handle closed
    /// and is returned to the caller.
    pub async fn register(
        &self,
        username: &str,
        location: Coordinates,
        handle: ConnectionHandle,
    ) -> Option<Session> {
        let connection = handle.id();
        let previous = {
            let mut state = self.lock();
            state.stats.sessions_registered += 1;
            let previous = state.sessions.insert(
                username.to_string(),
                Session {
                    username: username.to_string(),
                    location,
                    handle,
                },
            );
            if matches!(&previous, Some(p) if p.handle.id() != connection) {
                state.stats.sessions_replaced += 1;
            }
            previous
        };

        match previous {
            Some(previous) if previous.handle.id() != connection => {
                info!(
                    username,
                    old = %previous.handle.id(),
                    new = %connection,
                    "Session replaced, closing superseded connection"
                );
                previous.handle.close().await;
                Some(previous)
            }
            _ => {
                debug!(username, %connection, "Session registered");
                None
            }
        }
    }

    /// Move `username` to `location`; returns false when it is not registered
    pub fn update_location(&self, username: &str, location: Coordinates) -> bool {
        let mut state = self.lock();
        match state.sessions.get_mut(username) {
            Some(session) => {
                session.location = location;
                true
            }
            None => false,
        }
    }

    /// Remove the session bound to `handle`'s connection, if any
    pub fn remove(&self, handle: &ConnectionHandle) -> Option<Session> {
        let connection = handle.id();
        let mut state = self.lock();
        let username = state
            .sessions
            .iter()
            .find(|(_, session)| session.handle.id() == connection)
            .map(|(username, _)| username.clone())?;
        let removed = state.sessions.remove(&username);
        state.stats.sessions_removed += 1;
        removed
    }

    pub fn lookup(&self, username: &str) -> Option<Session> {
        self.lock().sessions.get(username).cloned()
    }

    /// Look up two users under one lock acquisition
    pub fn lookup_pair(&self, first: &str, second: &str) -> (Option<Session>, Option<Session>) {
        let state = self.lock();
        (
            state.sessions.get(first).cloned(),
            state.sessions.get(second).cloned(),
        )
    }

    pub fn contains(&self, username: &str) -> bool {
        self.lock().sessions.contains_key(username)
    }

    /// Whether `username` is currently bound to `connection`
    pub fn is_owned_by(&self, username: &str, connection: ConnectionId) -> bool {
        self.lock()
            .sessions
            .get(username)
            .is_some_and(|session| session.handle.id() == connection)
    }

    /// Point-in-time copy of every session, ordered by username
    pub fn snapshot(&self) -> Vec<Session> {
        self.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    pub fn statistics(&self) -> RegistryStats {
        self.lock().stats.clone()
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Counters for registry activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of register operations
    pub sessions_registered: u64,
    /// Number of registrations that displaced another connection
    pub sessions_replaced: u64,
    /// Number of sessions removed on disconnect
    pub sessions_removed: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
