//! Router configuration.
//!
//! Process-level settings come from the environment; routes come from the
//! route file (see [`crate::persistence`]).

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};

use crate::proxy::DEFAULT_BIND_ADDR;

/// Default route file path, relative to the working directory.
pub const DEFAULT_ROUTE_FILE: &str = "config.json";

/// Router configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the JSON route file.
    pub route_file: PathBuf,

    /// Listen address override. Takes precedence over the route file.
    pub listen: Option<String>,

    /// How often the route file is checked for changes.
    pub reload_interval: Duration,

    /// Backend connect timeout. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let route_file = std::env::var("MCPROXY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROUTE_FILE));

        let listen = std::env::var("MCPROXY_LISTEN")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let reload_interval_ms: u64 = std::env::var("MCPROXY_RELOAD_INTERVAL_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("MCPROXY_RELOAD_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(1000);
        let reload_interval = Duration::from_millis(reload_interval_ms.max(50));

        let connect_timeout = std::env::var("MCPROXY_CONNECT_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("MCPROXY_CONNECT_TIMEOUT_MS must be an integer (milliseconds).")?
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis);

        let log_level = std::env::var("MCPROXY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            route_file,
            listen,
            reload_interval,
            connect_timeout,
            log_level,
        })
    }

    /// Pick the bind address: explicit override, then the route file's
    /// `Listen` field, then all interfaces on the standard port.
    pub fn bind_addr(&self, cli_listen: Option<&str>, file_listen: Option<&str>) -> String {
        let addr = cli_listen
            .or(self.listen.as_deref())
            .or(file_listen)
            .unwrap_or(DEFAULT_BIND_ADDR);
        normalize_bind_addr(addr)
    }
}

/// Expand a bare `:port` to all IPv4 interfaces.
pub fn normalize_bind_addr(addr: &str) -> String {
    let addr = addr.trim();
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    }
}
