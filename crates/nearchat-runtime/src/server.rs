//! TCP front end
//!
//! Accepts client connections and runs one read loop per connection. Each
//! loop feeds bounded newline-delimited records to the shared `Router` until the
//! peer hangs up, a read fails, or the connection is closed from the inside
//! (a newer registration took over its username).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nearchat_core::{NearchatError, NearchatResult};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::framing::{InboundRecord, RecordReader};
use crate::managers::ConnectionHandle;
use crate::router::{ClientConnection, Router};

/// Pause after a failed `accept` before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Listening router server
pub struct RouterServer {
    listener: TcpListener,
    router: Arc<Router>,
}

impl RouterServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, router: Arc<Router>) -> NearchatResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NearchatError::Bind { addr, source })?;
        Ok(Self { listener, router })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> NearchatResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Serve until the process is stopped
    pub async fn run(self) -> NearchatResult<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` resolves, then close every live session
    pub async fn run_until<F>(self, shutdown: F) -> NearchatResult<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.local_addr()?;
        info!(%local_addr, "Server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let router = self.router.clone();
                        tokio::spawn(serve_connection(router, stream, peer));
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.router.shutdown().await;
        for session in self.router.registry().snapshot() {
            session.handle.close().await;
        }
        Ok(())
    }
}

/// Read loop for one client connection
async fn serve_connection(router: Arc<Router>, stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, "Failed to set TCP_NODELAY: {}", e);
    }
    let (reader, writer) = stream.into_split();
    let handle = ConnectionHandle::with_peer(writer, peer);
    let mut connection = ClientConnection::new(handle.clone());
    info!(%peer, connection = %handle.id(), "Client connected");

    let mut records = RecordReader::new(BufReader::new(reader));
    loop {
        tokio::select! {
            record = records.next_record() => match record {
                Ok(Some(InboundRecord::Line(line))) => {
                    router.handle_line(&mut connection, &line).await;
                }
                Ok(Some(InboundRecord::Oversized { len })) => {
                    warn!(%peer, len, "Dropping oversized inbound record");
                }
                Ok(Some(InboundRecord::InvalidUtf8)) => {
                    debug!(%peer, "Dropping inbound record that is not UTF-8");
                }
                Ok(None) => {
                    debug!(%peer, "Client closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(%peer, "Error reading from client: {}", e);
                    break;
                }
            },
            _ = handle.closed() => {
                debug!(%peer, "Connection closed by the server");
                break;
            }
        }
    }

    router.disconnect(&connection).await;
    info!(%peer, connection = %handle.id(), "Client disconnected");
}
