//! TCP listener and per-connection supervision.
//!
//! Every accepted connection runs this state machine in its own task:
//!
//! ```text
//! Accepted -> HandshakeRead -> Routed -> Relaying -> Closed
//!     \____________\______________\__________________> Failed
//! ```
//!
//! - One bounded read is taken from the client and parsed as a handshake.
//! - The server address is resolved against one route table snapshot.
//! - The backend is dialled and the bytes already read are written to it
//!   verbatim before relaying starts, so the backend sees the client's own
//!   handshake.
//!
//! Any failure closes the client socket and ends only that connection.
//! Connections are not limited in number: there is no admission control.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcproxy_protocol::parse_handshake;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};

use super::relay::relay;
use super::router::{Endpoint, SharedRouteTable};
use crate::error::{ConnectionError, RouteError};

/// Default bind address: all interfaces, standard Minecraft port.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:25565";

/// Size of the single read the handshake is parsed from.
pub const DEFAULT_HANDSHAKE_BUFFER: usize = 8192;

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to (`host:port`).
    pub bind_addr: String,
    /// Capacity of the handshake read buffer.
    pub handshake_buffer: usize,
    /// Backend connect timeout. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
}

impl ListenerConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            handshake_buffer: DEFAULT_HANDSHAKE_BUFFER,
            connect_timeout: None,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND_ADDR)
    }
}

/// Statistics for a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being handled.
    pub connections_active: AtomicU64,
    /// Connections that reached `Closed`.
    pub connections_closed: AtomicU64,
    /// Connections that reached `Failed`.
    pub connections_failed: AtomicU64,
    /// First packets that did not decode as a handshake.
    pub handshakes_rejected: AtomicU64,
    /// Server addresses with no route and no default.
    pub routes_missing: AtomicU64,
    /// Backend dials that succeeded.
    pub backend_connected: AtomicU64,
    /// Backend dials that failed.
    pub backend_failed: AtomicU64,
    /// Bytes relayed to backends, handshake included.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed from backends.
    pub bytes_from_backend: AtomicU64,
}

/// Lifecycle of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    HandshakeRead,
    Routed,
    Relaying,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    fn advance(&mut self, next: ConnectionState) {
        debug!(from = %self, to = %next, "Connection state");
        *self = next;
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::HandshakeRead => "handshake_read",
            ConnectionState::Routed => "routed",
            ConnectionState::Relaying => "relaying",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        })
    }
}

/// A TCP listener routing Minecraft connections by virtual host.
pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    route_table: SharedRouteTable,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind a new listener on `config.bind_addr`.
    pub async fn bind(config: ListenerConfig, route_table: SharedRouteTable) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
        Self::from_tcp(listener, config, route_table)
    }

    /// Wrap an already bound listening socket.
    pub fn from_tcp(
        listener: TcpListener,
        config: ListenerConfig,
        route_table: SharedRouteTable,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            connect_timeout_ms = config.connect_timeout.map(|t| t.as_millis() as u64),
            "Listener bound"
        );

        Ok(Self {
            config,
            listener,
            route_table,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Run the accept loop. Per-connection failures never end it.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");
        if !self.route_table.is_loaded() {
            warn!("No routes loaded yet, connections will fail until the table is populated");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .connections_active
                        .fetch_add(1, Ordering::Relaxed);

                    let listener = Arc::clone(&self);

                    tokio::spawn(
                        async move {
                            let mut state = ConnectionState::Accepted;
                            let result = listener.handle_connection(stream, &mut state).await;
                            listener.finish(result, &mut state);
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Drive one connection up to a terminal state.
    ///
    /// Returning early drops `client`, which closes the inbound socket.
    async fn handle_connection(
        &self,
        mut client: TcpStream,
        state: &mut ConnectionState,
    ) -> Result<(), ConnectionError> {
        let mut buf = vec![0u8; self.config.handshake_buffer];
        let n = client.read(&mut buf).await?;
        if n == 0 {
            debug!("Client closed before sending a handshake");
            state.advance(ConnectionState::Closed);
            return Ok(());
        }
        buf.truncate(n);
        state.advance(ConnectionState::HandshakeRead);

        let handshake = parse_handshake(&buf)?;
        debug!(
            protocol_version = handshake.protocol_version,
            server_address = %handshake.server_address,
            "Handshake decoded"
        );

        let snapshot = self.route_table.snapshot()?;
        let resolved = snapshot.resolve(&handshake.server_address)?;
        let endpoint = resolved.endpoint.clone();
        debug!(
            server_address = %handshake.server_address,
            endpoint = %endpoint,
            fallback = resolved.fallback,
            "Route matched"
        );
        drop(snapshot);
        state.advance(ConnectionState::Routed);

        let mut backend = self.dial(&endpoint).await?;
        self.stats.backend_connected.fetch_add(1, Ordering::Relaxed);

        // The backend must see the handshake the client sent before anything else.
        backend.write_all(&buf).await?;
        self.stats
            .bytes_to_backend
            .fetch_add(buf.len() as u64, Ordering::Relaxed);

        state.advance(ConnectionState::Relaying);
        let relayed = relay(client, backend).await;

        self.stats
            .bytes_to_backend
            .fetch_add(relayed.bytes_to_backend, Ordering::Relaxed);
        self.stats
            .bytes_from_backend
            .fetch_add(relayed.bytes_from_backend, Ordering::Relaxed);

        debug!(
            endpoint = %endpoint,
            bytes_to_backend = relayed.bytes_to_backend + buf.len() as u64,
            bytes_from_backend = relayed.bytes_from_backend,
            "Connection closed"
        );
        state.advance(ConnectionState::Closed);

        Ok(())
    }

    /// Connect to the resolved backend.
    async fn dial(&self, endpoint: &Endpoint) -> Result<TcpStream, ConnectionError> {
        debug!(endpoint = %endpoint, "Connecting to backend");

        let connect = TcpStream::connect(endpoint.as_str());
        let result = match self.config.connect_timeout {
            Some(limit) => match timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
            },
            None => connect.await,
        };

        result.map_err(|source| ConnectionError::DialFailure {
            endpoint: endpoint.clone(),
            source,
        })
    }

    /// Record the outcome of a connection.
    fn finish(&self, result: Result<(), ConnectionError>, state: &mut ConnectionState) {
        self.stats
            .connections_active
            .fetch_sub(1, Ordering::Relaxed);

        let e = match result {
            Ok(()) => {
                debug_assert!(state.is_terminal(), "connection ended in state {state}");
                self.stats
                    .connections_closed
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) => e,
        };

        let failed_in = *state;
        state.advance(ConnectionState::Failed);
        self.stats
            .connections_failed
            .fetch_add(1, Ordering::Relaxed);

        match &e {
            ConnectionError::Protocol(_) => {
                self.stats
                    .handshakes_rejected
                    .fetch_add(1, Ordering::Relaxed);
                debug!(state = %failed_in, reason = e.reason_code(), error = %e, "Handshake rejected");
            }
            ConnectionError::Route(RouteError::NoRoute { .. }) => {
                self.stats.routes_missing.fetch_add(1, Ordering::Relaxed);
                info!(state = %failed_in, reason = e.reason_code(), error = %e, "No route match");
            }
            ConnectionError::Route(RouteError::ConfigUnavailable(_)) => {
                warn!(state = %failed_in, reason = e.reason_code(), error = %e, "Route table unavailable");
            }
            ConnectionError::DialFailure { .. } => {
                self.stats.backend_failed.fetch_add(1, Ordering::Relaxed);
                warn!(state = %failed_in, reason = e.reason_code(), error = %e, "Backend connection failed");
            }
            ConnectionError::Io(_) => {
                debug!(state = %failed_in, reason = e.reason_code(), error = %e, "Connection error");
            }
        }
    }
}
