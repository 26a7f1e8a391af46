//! Request routing
//!
//! `Router` ties the registry, dispatcher and retry scheduler together and
//! turns decoded client requests into registry updates, deliveries and
//! replies. One `ClientConnection` tracks what a single connection has
//! registered as.

use std::sync::Arc;

use nearchat_core::{
    decode_request, ClientRequest, Coordinates, MessageQueue, NearchatResult, RouterConfig,
    ServerMessage,
};
use tracing::{debug, info, warn};

use crate::dispatcher::{DeliveryDispatcher, DispatchOutcome};
use crate::managers::{ConnectionHandle, ConnectionRegistry};
use crate::retry::RetryScheduler;
use crate::visibility::visible_users;

// ----------------------------------------------------------------------------
// Client Connection
// ----------------------------------------------------------------------------

/// Per-connection state kept by the read loop
#[derive(Debug)]
pub struct ClientConnection {
    handle: ConnectionHandle,
    username: Option<String>,
}

impl ClientConnection {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            username: None,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// The username this connection last registered as
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

// ----------------------------------------------------------------------------
// Router
// ----------------------------------------------------------------------------

/// Shared routing state for every connection of one server
pub struct Router {
    config: RouterConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<DeliveryDispatcher>,
    scheduler: RetryScheduler,
}

impl Router {
    /// Build a router around one process-wide queue collaborator
    pub fn new(config: RouterConfig, queue: Arc<dyn MessageQueue>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            registry.clone(),
            queue,
            config.proximity(),
        ));
        let scheduler = RetryScheduler::new(dispatcher.clone(), config.retry_interval);
        Self {
            config,
            registry,
            dispatcher,
            scheduler,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<DeliveryDispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// Decode and handle one inbound line.
    ///
    /// Blank lines, malformed records and unknown actions are dropped
    /// without a reply; handler failures are logged.
    pub async fn handle_line(&self, connection: &mut ClientConnection, line: &str) {
        let request = match decode_request(line) {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                debug!(connection = %connection.handle.id(), "Dropping inbound record: {}", e);
                return;
            }
        };

        let action = request.action();
        if let Err(e) = self.handle_request(connection, request).await {
            warn!(connection = %connection.handle.id(), action, "Request failed: {}", e);
        }
    }

    /// Apply one decoded request on behalf of `connection`
    pub async fn handle_request(
        &self,
        connection: &mut ClientConnection,
        request: ClientRequest,
    ) -> NearchatResult<()> {
        match request {
            ClientRequest::Register { username, lat, lon } => {
                let location = Coordinates::new(lat, lon)?;
                self.register(connection, username, location).await
            }
            ClientRequest::UpdateLocation { username, lat, lon } => {
                let location = Coordinates::new(lat, lon)?;
                self.update_location(connection, &username, location);
                Ok(())
            }
            ClientRequest::Refresh { username } => self.refresh(connection, &username).await,
            ClientRequest::Message {
                sender,
                receiver,
                text,
            } => {
                self.message(connection, &sender, &receiver, &text).await;
                Ok(())
            }
        }
    }

    async fn register(
        &self,
        connection: &mut ClientConnection,
        username: String,
        location: Coordinates,
    ) -> NearchatResult<()> {
        // A connection holds one identity; switching names releases the old one
        if let Some(previous) = connection.username.take() {
            if previous != username && self.registry.remove(&connection.handle).is_some() {
                self.scheduler.cancel(&previous, connection.handle.id());
                info!(old = %previous, new = %username, "Connection switched username");
            }
        }

        self.registry
            .register(&username, location, connection.handle.clone())
            .await;
        connection.username = Some(username.clone());
        info!(
            username = %username,
            connection = %connection.handle.id(),
            %location,
            "User registered"
        );

        let ack = ServerMessage::RegisterAck {
            message: self.config.register_ack_message.clone(),
        };
        let sent = connection.handle.send(&ack).await;
        self.scheduler.trigger(&username, connection.handle.id());
        sent
    }

    /// Route a send whose sender is the session this connection owns
    async fn message(
        &self,
        connection: &ClientConnection,
        sender: &str,
        receiver: &str,
        text: &str,
    ) {
        if !self.registry.contains(sender) {
            debug!(connection = %connection.handle.id(), sender, "Send from unregistered user ignored");
            return;
        }
        if !self.registry.is_owned_by(sender, connection.handle.id()) {
            warn!(
                sender,
                connection = %connection.handle.id(),
                "Ignoring send as a user this connection does not own"
            );
            return;
        }

        let outcome = self.dispatcher.dispatch(sender, receiver, text).await;
        if outcome == DispatchOutcome::UnknownSender {
            debug!(connection = %connection.handle.id(), sender, "Sender left before dispatch");
        }
    }

    fn update_location(&self, connection: &ClientConnection, username: &str, location: Coordinates) {
        if !self.registry.is_owned_by(username, connection.handle.id()) {
            debug!(
                username,
                connection = %connection.handle.id(),
                "Ignoring location update for a session this connection does not own"
            );
            return;
        }
        if self.registry.update_location(username, location) {
            debug!(username, %location, "Location updated");
            self.scheduler.trigger(username, connection.handle.id());
        }
    }

    async fn refresh(&self, connection: &ClientConnection, username: &str) -> NearchatResult<()> {
        let owned = self.registry.is_owned_by(username, connection.handle.id());
        let visible = if owned {
            visible_users(&self.registry, self.dispatcher.proximity(), username)
        } else {
            Vec::new()
        };

        let sent = connection
            .handle
            .send(&ServerMessage::RefreshAck {
                visible_users: visible,
            })
            .await;
        if owned {
            self.scheduler.trigger(username, connection.handle.id());
        }
        sent
    }

    /// Tear down a connection's session once its read loop has ended
    pub async fn disconnect(&self, connection: &ClientConnection) {
        if let Some(session) = self.registry.remove(&connection.handle) {
            self.scheduler.cancel(&session.username, connection.handle.id());
            info!(username = %session.username, connection = %connection.handle.id(), "User disconnected");
        }
        connection.handle.close().await;
    }

    /// Stop background work; connections are left to their read loops
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        let stats = self.dispatcher.statistics();
        info!(
            delivered = stats.delivered,
            queued = stats.queued,
            dropped = stats.dropped,
            "Router stopped"
        );
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
