//! SOCKS5 client connector
//!
//! Speaks the client side of RFC 1928 with no authentication. Used for a
//! `socks5` upstream and by the DNS resolver to reach its TCP server.

use super::{connect_tcp, SocketOpts, StreamDyn, UpstreamConnector};
use crate::config::UpstreamConfig;
use crate::error::{RelayError, Socks5Error, Socks5ReplyCode};
use crate::socks::{
    TargetAddr, SOCKS5_AUTH_METHOD_NONE, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED,
    SOCKS5_VERSION,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Upstream connector that tunnels through a SOCKS5 proxy
#[derive(Debug, Clone)]
pub struct Socks5Connector {
    proxy_addr: String,
    connect_timeout: Duration,
    socket_opts: SocketOpts,
}

impl Socks5Connector {
    /// Create a connector for the proxy at `proxy_addr` (`host:port`)
    pub fn new(proxy_addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Socks5Connector {
            proxy_addr: proxy_addr.into(),
            connect_timeout,
            socket_opts: SocketOpts::default(),
        }
    }

    /// Create a connector from the upstream configuration
    pub fn from_upstream(config: &UpstreamConfig) -> Self {
        Socks5Connector {
            proxy_addr: config.addr(),
            connect_timeout: Duration::from_secs(config.connect_timeout),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
        }
    }

    /// Address of the proxy
    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }
}

#[async_trait]
impl UpstreamConnector for Socks5Connector {
    async fn connect(&self, destination: &TargetAddr) -> Result<Box<dyn StreamDyn>> {
        let mut stream = connect_tcp(&self.proxy_addr, self.connect_timeout, &self.socket_opts)
            .await
            .map_err(|e| RelayError::UpstreamConnect(format!("{:#}", e)))?;

        socks5_connect_handshake(&mut stream, destination)
            .await
            .with_context(|| {
                format!("SOCKS5 CONNECT {} via {} failed", destination, self.proxy_addr)
            })?;

        Ok(Box::new(stream))
    }
}

/// Negotiate no-auth and issue a CONNECT on an open proxy stream
///
/// Returns the bound address reported by the proxy.
pub async fn socks5_connect_handshake<S>(
    stream: &mut S,
    destination: &TargetAddr,
) -> Result<TargetAddr>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    let mut method_reply = [0u8; 2];
    stream
        .read_exact(&mut method_reply)
        .await
        .with_context(|| "Proxy closed connection during method selection")?;
    if method_reply[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(method_reply[0]).into());
    }
    if method_reply[1] != SOCKS5_AUTH_METHOD_NONE {
        return Err(Socks5Error::NoAcceptableMethod(method_reply[1]).into());
    }

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
    request.extend_from_slice(&destination.to_bytes()?);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut reply = [0u8; 4];
    stream
        .read_exact(&mut reply)
        .await
        .with_context(|| "Proxy closed connection before CONNECT reply")?;
    if reply[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(reply[0]).into());
    }
    if reply[1] != 0 {
        return Err(Socks5Error::ReplyFailure(Socks5ReplyCode::from(reply[1])).into());
    }

    let bound = TargetAddr::read_from(stream, reply[3]).await?;
    debug!("SOCKS5 proxy bound {} for {}", bound, destination);

    Ok(bound)
}
