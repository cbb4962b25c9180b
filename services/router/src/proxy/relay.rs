//! Bidirectional byte relay between a client and its backend.
//!
//! Two pump tasks run per session, one per direction. Each copies chunks of
//! at most [`RELAY_BUFFER_SIZE`] bytes until its source reports end-of-stream
//! or an error. End-of-stream is passed on as a write shutdown of the
//! destination.
//!
//! As soon as either pump finishes, the other one is aborted. Dropping the
//! aborted pump releases its stream halves, which closes both sockets, so a
//! read blocked on the quiet side can never outlive the session.
//!
//! There is no idle timeout: if neither peer closes, the pumps run for as
//! long as the connection stays open.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::debug;

/// Size of each pump's copy buffer.
pub const RELAY_BUFFER_SIZE: usize = 8192;

/// Bytes copied in each direction over the lifetime of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub bytes_to_backend: u64,
    pub bytes_from_backend: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToBackend,
    FromBackend,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::ToBackend => "client->backend",
            Direction::FromBackend => "backend->client",
        }
    }
}

/// Relay bytes between `client` and `backend` until the session ends.
///
/// Returns once both pumps have terminated and both streams are dropped.
pub async fn relay<C, B>(client: C, backend: B) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let to_backend = Arc::new(AtomicU64::new(0));
    let from_backend = Arc::new(AtomicU64::new(0));

    let mut pumps = JoinSet::new();
    pumps.spawn(pump(
        Direction::ToBackend,
        client_read,
        backend_write,
        Arc::clone(&to_backend),
    ));
    pumps.spawn(pump(
        Direction::FromBackend,
        backend_read,
        client_write,
        Arc::clone(&from_backend),
    ));

    if let Some(first) = pumps.join_next().await {
        match first {
            Ok((direction, Ok(()))) => {
                debug!(direction = direction.as_str(), "Pump reached end of stream");
            }
            Ok((direction, Err(e))) => {
                debug!(direction = direction.as_str(), error = %e, "Pump failed");
            }
            Err(e) => {
                debug!(error = %e, "Pump task did not complete");
            }
        }
    }

    // Stop the paired pump; its halves are dropped with it.
    pumps.abort_all();
    while pumps.join_next().await.is_some() {}

    RelayStats {
        bytes_to_backend: to_backend.load(Ordering::Relaxed),
        bytes_from_backend: from_backend.load(Ordering::Relaxed),
    }
}

async fn pump<R, W>(
    direction: Direction,
    mut src: R,
    mut dst: W,
    copied: Arc<AtomicU64>,
) -> (Direction, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = async {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n]).await?;
            copied.fetch_add(n as u64, Ordering::Relaxed);
        }
        dst.shutdown().await
    }
    .await;

    (direction, result)
}
