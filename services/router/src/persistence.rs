//! Route file persistence.
//!
//! Routes live in a JSON file shared with the `add-server` / `del-server`
//! commands:
//!
//! ```json
//! {
//!     "Listen": ":25565",
//!     "Servers": {
//!         "play.example.com": "10.0.0.1:25565",
//!         "default": "10.0.0.2:25565"
//!     }
//! }
//! ```
//!
//! Writes go to a temp file that is renamed over the original, so a reader
//! never observes a half-written file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RouteError;
use crate::proxy::{Endpoint, RouteMap};

/// Source of route data for the route table.
///
/// `load` is synchronous and is called off the connection path, by the
/// reload loop and at startup.
pub trait RouteSource: Send + Sync {
    /// Load the full hostname to endpoint mapping.
    fn load(&self) -> Result<RouteMap, RouteError>;

    /// Change marker for the underlying data. `None` means unknown, in which
    /// case the reload loop loads on every tick.
    fn modified(&self) -> Option<SystemTime> {
        None
    }
}

impl RouteSource for RouteMap {
    fn load(&self) -> Result<RouteMap, RouteError> {
        Ok(self.clone())
    }
}

/// On-disk route file format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFile {
    /// Listen address (`host:port`, or `:port` for all interfaces).
    #[serde(
        rename = "Listen",
        alias = "listen",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub listen: Option<String>,

    /// Hostname to backend endpoint.
    #[serde(rename = "Servers", alias = "servers", default)]
    pub servers: RouteMap,
}

impl RouteFile {
    /// Listen address, ignoring an empty string.
    pub fn listen_addr(&self) -> Option<&str> {
        self.listen.as_deref().filter(|addr| !addr.trim().is_empty())
    }
}

/// JSON route file on disk.
#[derive(Debug, Clone)]
pub struct JsonRouteFile {
    path: PathBuf,
}

impl JsonRouteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the route file. A missing file is an error.
    pub fn read(&self) -> Result<RouteFile> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read route file: {}", self.path.display()))?;

        let file: RouteFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse route file: {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            route_count = file.servers.len(),
            "Loaded route file"
        );

        Ok(file)
    }

    /// Read the route file, or an empty one if it does not exist yet.
    fn read_or_default(&self) -> Result<RouteFile> {
        if !self.path.exists() {
            return Ok(RouteFile::default());
        }
        self.read()
    }

    /// Per-process temp path next to the route file.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    /// Save the route file atomically.
    ///
    /// Uses write-to-temp + rename pattern for atomicity.
    pub fn save(&self, file: &RouteFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let tmp_path = self.tmp_path();
        let content = serde_json::to_string_pretty(file).context("Failed to serialize routes")?;

        fs::write(&tmp_path, &content)
            .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        debug!(
            path = %self.path.display(),
            route_count = file.servers.len(),
            "Saved route file"
        );

        Ok(())
    }

    /// Add or replace the route for `hostname`. Returns the previous target.
    pub fn add_server(&self, hostname: &str, target: Endpoint) -> Result<Option<Endpoint>> {
        let mut file = self.read_or_default()?;
        let previous = file.servers.insert(hostname.to_string(), target.clone());
        self.save(&file)?;

        info!(hostname = %hostname, target = %target, "Route added");
        Ok(previous)
    }

    /// Remove the route for `hostname`. Returns the removed target, if any.
    pub fn del_server(&self, hostname: &str) -> Result<Option<Endpoint>> {
        let mut file = self.read_or_default()?;
        let removed = file.servers.remove(hostname);
        if removed.is_some() {
            self.save(&file)?;
            info!(hostname = %hostname, "Route removed");
        }
        Ok(removed)
    }
}

impl RouteSource for JsonRouteFile {
    fn load(&self) -> Result<RouteMap, RouteError> {
        self.read()
            .map(|file| file.servers)
            .map_err(|e| RouteError::ConfigUnavailable(format!("{e:#}")))
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}
