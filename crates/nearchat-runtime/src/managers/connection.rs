//! Connection handles
//!
//! A `ConnectionHandle` is the router's write side of one client connection.
//! Cloning a handle is cheap; all clones share one writer and one close signal.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nearchat_core::{encode_message, NearchatError, NearchatResult, ServerMessage};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ----------------------------------------------------------------------------
// Connection Identity
// ----------------------------------------------------------------------------

/// Unique identity of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

struct HandleInner {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    writer: Mutex<BoxedWriter>,
    close_signal: Notify,
    closed: AtomicBool,
}

/// Shared write side of a client connection
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Wrap any async writer, typically the write half of a TCP stream
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::build(Box::new(writer), None)
    }

    /// Wrap a writer and remember the remote address for logging
    pub fn with_peer<W>(writer: W, peer: SocketAddr) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::build(Box::new(writer), Some(peer))
    }

    fn build(writer: BoxedWriter, peer: Option<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: ConnectionId::new(),
                peer,
                writer: Mutex::new(writer),
                close_signal: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Write one record to the client and flush it.
    ///
    /// Fails once the handle has been closed or when the underlying write
    /// fails. A write stalled on a peer that stopped reading is abandoned
    /// as soon as the handle is closed.
    pub async fn send(&self, message: &ServerMessage) -> NearchatResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let line = encode_message(message)?;

        let mut writer = tokio::select! {
            writer = self.inner.writer.lock() => writer,
            _ = self.closed() => return Err(self.closed_error()),
        };
        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        tokio::select! {
            result = write => Ok(result?),
            _ = self.closed() => Err(self.closed_error()),
        }
    }

    /// Close the connection: wake its read loop and shut the writer down.
    ///
    /// Never waits on a send in progress; the shutdown is finished in the
    /// background once that send has let go of the writer.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.close_signal.notify_waiters();

        match self.inner.writer.try_lock() {
            Ok(mut writer) => shutdown_writer(self.id(), &mut writer).await,
            Err(_) => {
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let mut writer = inner.writer.lock().await;
                    shutdown_writer(inner.id, &mut writer).await;
                });
            }
        }
    }

    /// Resolves once `close` has been called on any clone of this handle
    pub async fn closed(&self) {
        let notified = self.inner.close_signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    fn closed_error(&self) -> NearchatError {
        NearchatError::ConnectionClosed {
            connection: self.id().to_string(),
        }
    }
}

async fn shutdown_writer(id: ConnectionId, writer: &mut BoxedWriter) {
    if let Err(e) = writer.shutdown().await {
        debug!(connection = %id, "Writer shutdown failed: {}", e);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let writer = tokio_test::io::Builder::new()
            .write(b"{\"action\":\"message\",\"sender\":\"alice\",\"text\":\"hi\"}\n")
            .build();
        let handle = ConnectionHandle::new(writer);

        handle
            .send(&ServerMessage::Message {
                sender: "alice".to_string(),
                text: "hi".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_fails_when_peer_is_gone() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let handle = ConnectionHandle::new(server);

        let result = handle
            .send(&ServerMessage::RegisterAck {
                message: "ok".to_string(),
            })
            .await;
        assert!(matches!(result, Err(NearchatError::Io(_))));
    }

    #[tokio::test]
    async fn test_close_wakes_waiters_and_rejects_sends() {
        let (client, server) = tokio::io::duplex(64);
        let handle = ConnectionHandle::new(server);
        let waiter = handle.clone();
        let wait_task = tokio::spawn(async move { waiter.closed().await });

        handle.close().await;
        tokio::time::timeout(Duration::from_secs(1), wait_task)
            .await
            .expect("closed() should resolve after close()")
            .unwrap();

        assert!(handle.is_closed());
        let result = handle
            .send(&ServerMessage::RegisterAck {
                message: "late".to_string(),
            })
            .await;
        assert!(matches!(result, Err(NearchatError::ConnectionClosed { .. })));

        // The client observes end-of-stream once the writer is shut down
        let mut lines = BufReader::new(client).lines();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_resolves_immediately_after_close() {
        let (_client, server) = tokio::io::duplex(64);
        let handle = ConnectionHandle::new(server);
        handle.close().await;
        handle.close().await;

        tokio::time::timeout(Duration::from_millis(100), handle.closed())
            .await
            .expect("already closed handle should resolve at once");
    }

    #[tokio::test]
    async fn test_close_does_not_wait_for_stalled_send() {
        // The peer never reads, so a large send fills the pipe and blocks
        let (client, server) = tokio::io::duplex(16);
        let handle = ConnectionHandle::new(server);
        let sender = handle.clone();
        let stalled = tokio::spawn(async move {
            sender
                .send(&ServerMessage::Message {
                    sender: "bob".to_string(),
                    text: "x".repeat(1024),
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stalled.is_finished());

        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close() must not wait for the stalled send");

        let result = tokio::time::timeout(Duration::from_secs(1), stalled)
            .await
            .expect("stalled send should be abandoned on close")
            .unwrap();
        assert!(matches!(result, Err(NearchatError::ConnectionClosed { .. })));
        drop(client);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
