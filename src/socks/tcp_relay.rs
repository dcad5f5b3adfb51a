//! Bidirectional relay between a client stream and an upstream stream
//!
//! Both directions are copied concurrently with independent loops. As soon as
//! one loop ends (EOF or I/O error) both streams are shut down and dropped.

use crate::helper::RELAY_BUFFER_SIZE;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Direction of a copy loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to upstream
    Upload,
    /// Upstream to client
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// Summary of a finished relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from client to upstream
    pub uploaded: u64,
    /// Bytes copied from upstream to client
    pub downloaded: u64,
    /// Direction whose loop ended first
    pub finished_first: Direction,
}

/// Relay data bidirectionally between two streams
///
/// Returns once either direction reaches EOF or fails; by then both
/// streams have been shut down. Shutdown errors are ignored since the peer
/// may already be gone.
pub async fn relay_tcp<A, B>(client: A, upstream: B) -> RelayStats
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let mut uploaded = 0u64;
    let mut downloaded = 0u64;

    let finished_first = {
        let upload = copy_loop(
            &mut client_read,
            &mut upstream_write,
            &mut uploaded,
            Direction::Upload,
        );
        let download = copy_loop(
            &mut upstream_read,
            &mut client_write,
            &mut downloaded,
            Direction::Download,
        );

        tokio::select! {
            _ = upload => Direction::Upload,
            _ = download => Direction::Download,
        }
    };

    let _ = upstream_write.shutdown().await;
    let _ = client_write.shutdown().await;

    debug!(
        "Relay finished ({} ended first): {} bytes up, {} bytes down",
        finished_first, uploaded, downloaded
    );

    RelayStats {
        uploaded,
        downloaded,
        finished_first,
    }
}

/// Copy from `reader` to `writer` with a fixed buffer until EOF or error
async fn copy_loop<R, W>(reader: &mut R, writer: &mut W, total: &mut u64, direction: Direction)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("{} reached EOF", direction);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("{} read error: {}", direction, e);
                return;
            }
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            debug!("{} write error: {}", direction, e);
            return;
        }
        if let Err(e) = writer.flush().await {
            debug!("{} flush error: {}", direction, e);
            return;
        }

        *total += n as u64;
    }
}
