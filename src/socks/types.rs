//! SOCKS5 type definitions
//!
//! Defines the destination address carried by CONNECT requests and replies,
//! together with its wire encoding. Both the server and the client side share
//! this codec.

use super::consts::*;
use crate::error::Socks5Error;
use anyhow::{Context, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Target address for SOCKS5 requests
///
/// Represents the destination address in a SOCKS5 request.
/// Can be an IP address (v4 or v6) or an unresolved domain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(domain.into(), port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            TargetAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Host part as used in an HTTP request target
    ///
    /// IPv6 literals are bracketed; domains are passed through unresolved.
    pub fn host(&self) -> String {
        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => addr.ip().to_string(),
            TargetAddr::Ip(SocketAddr::V6(addr)) => format!("[{}]", addr.ip()),
            TargetAddr::Domain(domain, _) => domain.clone(),
        }
    }

    /// Serialize the address to bytes for SOCKS5 protocol
    ///
    /// Layout is `ATYP ADDR PORT`. Fails for domains longer than 255 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Socks5Error> {
        let mut bytes = Vec::with_capacity(1 + 16 + 2);

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Domain(domain, port) => {
                if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
                    return Err(Socks5Error::InvalidDomain(domain.clone()));
                }
                bytes.push(SOCKS5_ADDR_TYPE_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
                bytes.extend_from_slice(&port.to_be_bytes());
            }
        }

        Ok(bytes)
    }

    /// Read `ADDR PORT` for the given address type from a stream
    ///
    /// The address type byte itself has already been consumed. A stream that
    /// ends mid-field is an error.
    pub async fn read_from<S>(stream: &mut S, addr_type: u8) -> Result<Self>
    where
        S: AsyncRead + Unpin,
    {
        let target = match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let mut addr = [0u8; 4];
                stream
                    .read_exact(&mut addr)
                    .await
                    .with_context(|| "Connection closed mid IPv4 address")?;
                let port = read_port(stream).await?;
                TargetAddr::ipv4(Ipv4Addr::from(addr), port)
            }

            SOCKS5_ADDR_TYPE_DOMAIN => {
                let mut len_buf = [0u8; 1];
                stream
                    .read_exact(&mut len_buf)
                    .await
                    .with_context(|| "Connection closed before domain length")?;
                let domain_len = len_buf[0] as usize;

                if domain_len == 0 {
                    return Err(Socks5Error::InvalidDomain(String::new()).into());
                }

                let mut domain_buf = vec![0u8; domain_len];
                stream
                    .read_exact(&mut domain_buf)
                    .await
                    .with_context(|| "Connection closed mid domain name")?;
                let domain = String::from_utf8(domain_buf).map_err(|e| {
                    Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })?;

                let port = read_port(stream).await?;
                TargetAddr::Domain(domain, port)
            }

            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut addr = [0u8; 16];
                stream
                    .read_exact(&mut addr)
                    .await
                    .with_context(|| "Connection closed mid IPv6 address")?;
                let port = read_port(stream).await?;
                TargetAddr::ipv6(Ipv6Addr::from(addr), port)
            }

            other => return Err(Socks5Error::AddressTypeNotSupported(other).into()),
        };

        Ok(target)
    }
}

async fn read_port<S>(stream: &mut S) -> Result<u16>
where
    S: AsyncRead + Unpin,
{
    let mut port_buf = [0u8; 2];
    stream
        .read_exact(&mut port_buf)
        .await
        .with_context(|| "Connection closed mid port")?;
    Ok(u16::from_be_bytes(port_buf))
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}
