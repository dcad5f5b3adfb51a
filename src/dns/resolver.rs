//! UDP DNS listener forwarding queries over TCP through SOCKS5
//!
//! Each valid query becomes a [`DnsTask`] on the worker pool. The worker
//! opens its own stream to the DNS server, exchanges one framed message,
//! restores the original transaction id and answers the UDP sender.

use super::framing::{read_framed, write_framed};
use super::header::{restore_transaction_id, DnsQuery};
use super::pool::WorkerPool;
use crate::helper::{with_timeout, MAX_UDP_DATAGRAM_SIZE};
use crate::socks::TargetAddr;
use crate::upstream::UpstreamConnector;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// One query waiting for resolution
#[derive(Debug, Clone)]
pub struct DnsTask {
    /// Validated query as received
    pub query: DnsQuery,
    /// Where the response goes
    pub reply_to: SocketAddr,
}

/// Settings shared by every worker
#[derive(Debug, Clone)]
struct WorkerContext {
    socket: Arc<UdpSocket>,
    connector: Arc<dyn UpstreamConnector>,
    server: TargetAddr,
    query_timeout: Duration,
}

/// DNS-over-SOCKS resolver bound to a local UDP port
#[derive(Debug)]
pub struct DnsResolver {
    context: WorkerContext,
    pool: WorkerPool,
}

impl DnsResolver {
    /// Bind the UDP socket; port 0 picks an ephemeral port
    ///
    /// `connector` reaches `server` (a TCP DNS server) through SOCKS5.
    pub async fn bind(
        listen_addr: &str,
        connector: Arc<dyn UpstreamConnector>,
        server: SocketAddr,
        workers: usize,
        query_timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind DNS listener on {}", listen_addr))?;

        Ok(DnsResolver {
            context: WorkerContext {
                socket: Arc::new(socket),
                connector,
                server: TargetAddr::from(server),
                query_timeout,
            },
            pool: WorkerPool::new(workers),
        })
    }

    /// Address the UDP socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.context
            .socket
            .local_addr()
            .with_context(|| "Failed to read DNS listener address")
    }

    /// Receive datagrams until shutdown, then abort in-flight queries
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!(
            "DNS resolver listening on {}, forwarding to {} with {} workers",
            self.local_addr()?,
            self.context.server,
            self.pool.size()
        );

        let socket = self.context.socket.clone();
        let mut buf = vec![0u8; MAX_UDP_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => self.dispatch(&buf[..len], peer),
                        Err(e) => warn!("DNS receive failed: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping DNS resolver");
                    break;
                }
            }
        }

        self.pool.shutdown();
        Ok(())
    }

    /// Validate one datagram and hand it to the pool
    fn dispatch(&mut self, datagram: &[u8], peer: SocketAddr) {
        let query = match DnsQuery::parse(datagram) {
            Ok(query) => query,
            Err(e) => {
                debug!("Dropping datagram from {}: {}", peer, e);
                return;
            }
        };

        let task = DnsTask {
            query,
            reply_to: peer,
        };
        let context = self.context.clone();

        if let Err(e) = self.pool.try_spawn(run_task(context, task)) {
            debug!("Dropping DNS query from {}: {}", peer, e);
        }
    }
}

async fn run_task(context: WorkerContext, task: DnsTask) {
    let id = task.query.transaction_id();
    let name = task
        .query
        .question_name()
        .unwrap_or_else(|_| "<malformed>".to_string());

    let exchange = resolve(context.connector.as_ref(), &context.server, &task.query);
    let response = match with_timeout(context.query_timeout, "DNS query", exchange).await {
        Ok(response) => response,
        Err(e) => {
            debug!("DNS query {:#06x} for {} failed: {:#}", id, name, e);
            return;
        }
    };

    match context.socket.send_to(&response, task.reply_to).await {
        Ok(_) => debug!(
            "Answered {} ({} bytes) to {}",
            name,
            response.len(),
            task.reply_to
        ),
        Err(e) => debug!("Failed to send DNS response to {}: {}", task.reply_to, e),
    }
}

/// Exchange one query with `server` over a fresh proxied stream
async fn resolve(
    connector: &dyn UpstreamConnector,
    server: &TargetAddr,
    query: &DnsQuery,
) -> Result<Vec<u8>> {
    let mut stream = connector.connect(server).await?;

    write_framed(&mut stream, query.as_bytes()).await?;
    let mut response = read_framed(&mut stream).await?;
    let _ = stream.shutdown().await;

    if !restore_transaction_id(&mut response, query.transaction_id()) {
        anyhow::bail!("DNS response too short ({} bytes)", response.len());
    }

    Ok(response)
}
