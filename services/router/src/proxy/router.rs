//! Route table and routing decisions.
//!
//! The route table maps the server address a client put in its handshake to
//! a backend endpoint:
//! - Exact, case-sensitive match on the address bytes (no normalization)
//! - Fallback to the reserved `default` key
//! - No wildcard or prefix matching
//!
//! Updates replace the whole table atomically. A connection loads one
//! snapshot and routes against it, so a reload never changes the answer
//! halfway through a lookup and never touches established connections.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RouteError;

/// Key used when no exact hostname match exists.
pub const DEFAULT_ROUTE_KEY: &str = "default";

/// A backend address as written in the route file (`host:port`).
///
/// The value is opaque to the router; it is handed to the resolver when the
/// backend is dialled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for Endpoint {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// Hostname to endpoint mapping, as stored on disk.
pub type RouteMap = BTreeMap<String, Endpoint>;

/// Outcome of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub endpoint: &'a Endpoint,
    /// True when the `default` entry was used.
    pub fallback: bool,
}

/// Immutable snapshot of route data for lock-free reads.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    routes: HashMap<String, Endpoint>,
}

impl RouteSnapshot {
    pub fn from_routes(routes: RouteMap) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// Resolve a server address to its backend.
    pub fn resolve(&self, server_address: &str) -> Result<Resolved<'_>, RouteError> {
        if let Some(endpoint) = self.routes.get(server_address) {
            return Ok(Resolved {
                endpoint,
                fallback: false,
            });
        }

        if let Some(endpoint) = self.routes.get(DEFAULT_ROUTE_KEY) {
            debug!(server_address = %server_address, "No exact route, using default");
            return Ok(Resolved {
                endpoint,
                fallback: true,
            });
        }

        Err(RouteError::NoRoute {
            server_address: server_address.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn has_default(&self) -> bool {
        self.routes.contains_key(DEFAULT_ROUTE_KEY)
    }
}

/// Route table shared by every connection task.
///
/// Uses ArcSwap so readers never block and writers swap in whole snapshots.
/// Before the first update the table is unloaded and lookups report
/// `ConfigUnavailable`.
pub struct RouteTable {
    snapshot: ArcSwapOption<RouteSnapshot>,
}

impl RouteTable {
    /// Create an unloaded route table.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// Create a route table already holding `routes`.
    pub fn with_routes(routes: RouteMap) -> Self {
        Self {
            snapshot: ArcSwapOption::new(Some(Arc::new(RouteSnapshot::from_routes(routes)))),
        }
    }

    /// Replace the routes atomically.
    ///
    /// Readers holding the previous snapshot keep using it until they drop it.
    pub fn update(&self, routes: RouteMap) {
        let snapshot = RouteSnapshot::from_routes(routes);
        let route_count = snapshot.len();
        let has_default = snapshot.has_default();

        self.snapshot.store(Some(Arc::new(snapshot)));

        info!(
            route_count = route_count,
            has_default = has_default,
            "Route table updated atomically"
        );
    }

    /// Load the current snapshot.
    pub fn snapshot(&self) -> Result<Arc<RouteSnapshot>, RouteError> {
        self.snapshot.load_full().ok_or_else(|| {
            RouteError::ConfigUnavailable("route table has not been loaded".to_string())
        })
    }

    /// Resolve against the current snapshot.
    pub fn resolve(&self, server_address: &str) -> Result<Endpoint, RouteError> {
        let snapshot = self.snapshot()?;
        let resolved = snapshot.resolve(server_address)?;
        Ok(resolved.endpoint.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.load().is_some()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared route table reference.
pub type SharedRouteTable = Arc<RouteTable>;
