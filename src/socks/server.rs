//! Local SOCKS5 listener
//!
//! Accepts client connections and runs each one on its own task: negotiate,
//! connect upstream, reply, relay.

use super::handshake::{negotiate_no_auth, read_connect_request, send_connect_reply};
use super::tcp_relay::{relay_tcp, RelayStats};
use crate::helper::with_timeout;
use crate::upstream::UpstreamConnector;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// SOCKS5 server bound to a local TCP port
#[derive(Debug)]
pub struct Socks5Server {
    listener: TcpListener,
    connector: Arc<dyn UpstreamConnector>,
    handshake_timeout: Duration,
}

impl Socks5Server {
    /// Bind the listener; port 0 picks an ephemeral port
    pub async fn bind(
        listen_addr: &str,
        connector: Arc<dyn UpstreamConnector>,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind SOCKS5 listener on {}", listen_addr))?;

        Ok(Socks5Server {
            listener,
            connector,
            handshake_timeout,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .with_context(|| "Failed to read SOCKS5 listener address")
    }

    /// Accept connections until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("SOCKS5 server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept SOCKS5 connection: {}", e);
                            continue;
                        }
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }

                    let connector = self.connector.clone();
                    let handshake_timeout = self.handshake_timeout;
                    tokio::spawn(async move {
                        match handle_connection(stream, connector.as_ref(), handshake_timeout).await {
                            Ok(stats) => debug!(
                                "SOCKS5 session from {} closed: {} bytes up, {} bytes down",
                                peer, stats.uploaded, stats.downloaded
                            ),
                            Err(e) => warn!("SOCKS5 session from {} failed: {:#}", peer, e),
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping SOCKS5 server");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Serve one SOCKS5 client connection to completion
///
/// Negotiation and the upstream connect must finish within
/// `handshake_timeout`. Any failure before the success reply drops the
/// connection without writing a SOCKS5 error reply.
pub async fn handle_connection<S>(
    mut stream: S,
    connector: &dyn UpstreamConnector,
    handshake_timeout: Duration,
) -> Result<RelayStats>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (target, upstream) = with_timeout(handshake_timeout, "SOCKS5 handshake", async {
        negotiate_no_auth(&mut stream)
            .await
            .with_context(|| "Method negotiation failed")?;

        let target = read_connect_request(&mut stream)
            .await
            .with_context(|| "Failed to parse CONNECT request")?;

        let upstream = connector
            .connect(&target)
            .await
            .with_context(|| format!("Upstream connect to {} failed", target))?;

        Ok((target, upstream))
    })
    .await?;

    send_connect_reply(&mut stream).await?;
    info!("Relaying to {}", target);

    Ok(relay_tcp(stream, upstream).await)
}
