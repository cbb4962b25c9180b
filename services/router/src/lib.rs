pub mod config;
pub mod error;
pub mod persistence;
pub mod proxy;
pub mod sync;

pub use error::{ConnectionError, RouteError};
pub use persistence::{JsonRouteFile, RouteFile, RouteSource};
pub use proxy::{
    relay, ConnectionState, Endpoint, Listener, ListenerConfig, ListenerStats, RelayStats,
    RouteMap, RouteSnapshot, RouteTable, SharedRouteTable,
};
