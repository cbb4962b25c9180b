//! Route table reload.
//!
//! The route file is the only writer of routing state. This loop is the
//! single, serialized path from that file into the shared [`RouteTable`]:
//! it polls the source's change marker and swaps in a fresh snapshot when it
//! moves. If a reload fails the last applied routes stay in effect.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::RouteError;
use crate::persistence::RouteSource;
use crate::proxy::SharedRouteTable;

/// Load `source` into `table` once. Returns the number of routes applied.
pub fn load_routes<S>(source: &S, table: &SharedRouteTable) -> Result<usize, RouteError>
where
    S: RouteSource + ?Sized,
{
    let routes = source.load()?;
    let route_count = routes.len();
    table.update(routes);
    Ok(route_count)
}

/// Poll `source` every `interval` and apply changes to `table`.
///
/// `applied` is the change marker read *before* the routes currently in
/// `table` were loaded. Any later change is reloaded on the first tick.
///
/// Runs until the task is dropped.
pub async fn run_reload_loop<S>(
    source: Arc<S>,
    table: SharedRouteTable,
    interval: Duration,
    applied: Option<SystemTime>,
) where
    S: RouteSource + ?Sized,
{
    info!(interval_ms = interval.as_millis() as u64, "Route reload loop started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the caller has already loaded.
    ticker.tick().await;

    let mut last_seen = applied;
    let mut last_error: Option<String> = None;

    loop {
        ticker.tick().await;

        let current = source.modified();
        if current.is_some() && current == last_seen && last_error.is_none() {
            continue;
        }

        match load_routes(source.as_ref(), &table) {
            Ok(route_count) => {
                debug!(route_count = route_count, "Routes reloaded");
                last_seen = current;
                last_error = None;
            }
            Err(e) => {
                let message = e.to_string();
                // Only log when the failure changes, not on every tick.
                if last_error.as_deref() != Some(message.as_str()) {
                    warn!(error = %e, "Route reload failed, keeping last applied routes");
                }
                last_error = Some(message);
            }
        }
    }
}
