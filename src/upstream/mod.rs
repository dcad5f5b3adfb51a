//! Upstream connectors
//!
//! An [`UpstreamConnector`] turns a parsed destination into a connected
//! stream by tunnelling through the configured proxy. The SOCKS5 server and
//! the DNS resolver only depend on this trait.

mod http;
mod socks5;
#[cfg(feature = "rustls-tls")]
mod tls;

pub use http::{http_connect_handshake, HttpConnectConnector, MAX_RESPONSE_HEADER_LEN};
pub use socks5::{socks5_connect_handshake, Socks5Connector};
#[cfg(feature = "rustls-tls")]
pub use tls::TlsConnectorBuilder;

use crate::config::{ProxyScheme, TcpConfig, UpstreamConfig};
use crate::socks::TargetAddr;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Dynamic stream trait for boxed streams
pub trait StreamDyn: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + Debug> StreamDyn for T {}

/// Capability that connects to a destination through an upstream proxy
#[async_trait]
pub trait UpstreamConnector: Debug + Send + Sync {
    /// Open a stream to `destination`
    ///
    /// On success the returned stream carries the destination's bytes in
    /// both directions. Any failure during connect or proxy handshake is
    /// reported as an error.
    async fn connect(&self, destination: &TargetAddr) -> Result<Box<dyn StreamDyn>>;
}

/// Build the connector selected by the upstream scheme
pub fn build_connector(config: &UpstreamConfig) -> Result<Arc<dyn UpstreamConnector>> {
    let connector: Arc<dyn UpstreamConnector> = match config.scheme {
        ProxyScheme::Https | ProxyScheme::Http => Arc::new(HttpConnectConnector::new(config)?),
        ProxyScheme::Socks5 => Arc::new(Socks5Connector::from_upstream(config)),
    };
    Ok(connector)
}

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Open a TCP connection to `addr` with a timeout and socket options applied
///
/// `addr` is a `host:port` string; name resolution goes through the system
/// resolver.
pub async fn connect_tcp(addr: &str, timeout: Duration, opts: &SocketOpts) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .with_context(|| format!("Connection timeout to {}", addr))?
        .with_context(|| format!("Failed to connect to {}", addr))?;

    if let Err(e) = opts.apply(&stream) {
        tracing::warn!("Failed to apply socket options to {}: {}", addr, e);
    }

    tracing::debug!("TCP connection established to {}", addr);

    Ok(stream)
}
