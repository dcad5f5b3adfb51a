//! Tunnel session
//!
//! A [`Tunnel`] owns the SOCKS5 server and the DNS resolver for one upstream
//! configuration. Both listeners are bound before `start` returns, so their
//! ephemeral ports can be handed to whoever routes traffic into them.

use crate::config::{parse_socket_addr, Config};
use crate::dns::DnsResolver;
use crate::error::RelayError;
use crate::socks::Socks5Server;
use crate::upstream::{build_connector, Socks5Connector};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Running SOCKS5 server and DNS resolver
#[derive(Debug)]
pub struct Tunnel {
    socks_addr: SocketAddr,
    dns_addr: Option<SocketAddr>,
    shutdown_tx: broadcast::Sender<bool>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl Tunnel {
    /// Bind both listeners and start serving
    pub async fn start(config: Config) -> Result<Self> {
        config.validate().map_err(RelayError::Config)?;

        let connector = build_connector(&config.upstream)?;
        let socks = Socks5Server::bind(
            &config.socks.listen_addr,
            connector,
            Duration::from_secs(config.socks.handshake_timeout),
        )
        .await?;
        let socks_addr = socks.local_addr()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::with_capacity(2);

        let dns_addr = if config.dns.enabled {
            let proxy = match config.dns.socks_proxy {
                Some(ref proxy) => proxy.clone(),
                None => reachable_addr(socks_addr).to_string(),
            };
            let server =
                parse_socket_addr("dns.server", &config.dns.server).map_err(RelayError::Config)?;
            let query_timeout = Duration::from_secs(config.dns.query_timeout);

            info!("DNS queries go through SOCKS5 proxy {}", proxy);
            let connector = Arc::new(Socks5Connector::new(proxy, query_timeout));
            let resolver = DnsResolver::bind(
                &config.dns.listen_addr,
                connector,
                server,
                config.dns.workers,
                query_timeout,
            )
            .await?;
            let dns_addr = resolver.local_addr()?;

            tasks.push(tokio::spawn(resolver.run(shutdown_tx.subscribe())));
            Some(dns_addr)
        } else {
            None
        };

        tasks.push(tokio::spawn(socks.run(shutdown_tx.subscribe())));

        info!(
            "Tunnel started via {} upstream {}",
            config.upstream.scheme,
            config.upstream.addr()
        );

        Ok(Tunnel {
            socks_addr,
            dns_addr,
            shutdown_tx,
            tasks,
        })
    }

    /// Bound address of the SOCKS5 listener
    pub fn socks_addr(&self) -> SocketAddr {
        self.socks_addr
    }

    /// Bound address of the DNS listener, if the resolver is enabled
    pub fn dns_addr(&self) -> Option<SocketAddr> {
        self.dns_addr
    }

    /// Stop both listeners and abort in-flight DNS queries
    ///
    /// Established SOCKS5 sessions keep running until either side closes.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            task.await.with_context(|| "Tunnel task panicked")??;
        }

        info!("Tunnel stopped");
        Ok(())
    }
}

/// Address a local client can use to reach a listener bound to `addr`
fn reachable_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

/// Run a tunnel until a shutdown signal arrives
pub async fn run_tunnel(config: Config, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let tunnel = Tunnel::start(config).await?;

    info!("SOCKS5 listening on {}", tunnel.socks_addr());
    if let Some(dns_addr) = tunnel.dns_addr() {
        info!("DNS resolver listening on {}", dns_addr);
    }

    let _ = shutdown_rx.recv().await;
    tunnel.shutdown().await
}
