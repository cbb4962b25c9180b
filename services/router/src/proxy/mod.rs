//! L4 TCP proxy routed by the Minecraft handshake.
//!
//! This module provides:
//! - TCP listener and per-connection supervision
//! - Route table with `default` fallback
//! - Bidirectional relay between client and backend
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Handshake Parser -> Router -> dial Backend
//!                                                        |
//!                                  handshake bytes, then Relay (two pumps)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{Listener, ListenerConfig, RouteTable};
//!
//! let route_table = Arc::new(RouteTable::with_routes(routes));
//! let listener = Listener::bind(ListenerConfig::new("0.0.0.0:25565"), route_table).await?;
//! Arc::new(listener).run().await?;
//! ```

mod listener;
mod relay;
mod router;

pub use listener::{
    ConnectionState, Listener, ListenerConfig, ListenerStats, DEFAULT_BIND_ADDR,
    DEFAULT_HANDSHAKE_BUFFER,
};
pub use relay::{relay, RelayStats, RELAY_BUFFER_SIZE};
pub use router::{
    Endpoint, Resolved, RouteMap, RouteSnapshot, RouteTable, SharedRouteTable, DEFAULT_ROUTE_KEY,
};
