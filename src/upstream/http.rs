//! HTTP CONNECT upstream connector
//!
//! Opens a connection to the proxy (TLS for `https`, plain TCP for `http`),
//! sends a `CONNECT host:port HTTP/1.1` request and reads the response header
//! up to the blank line. The stream that remains is the tunnel.

use super::{connect_tcp, SocketOpts, StreamDyn, UpstreamConnector};
use crate::config::{ProxyScheme, UpstreamConfig};
use crate::error::{HttpConnectError, RelayError};
use crate::socks::TargetAddr;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

#[cfg(feature = "rustls-tls")]
use super::TlsConnectorBuilder;

/// Upper bound on the size of the proxy's response header
pub const MAX_RESPONSE_HEADER_LEN: usize = 8192;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Upstream connector that tunnels through an HTTP(S) proxy
#[derive(Debug, Clone)]
pub struct HttpConnectConnector {
    /// `host:port` of the proxy
    proxy_addr: String,
    /// Precomputed `Proxy-Authorization` value
    authorization: Option<String>,
    /// Reject non-2xx responses
    require_success_status: bool,
    connect_timeout: Duration,
    socket_opts: SocketOpts,
    #[cfg(feature = "rustls-tls")]
    tls: Option<TlsConnectorBuilder>,
}

impl HttpConnectConnector {
    /// Create a connector from the upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let authorization = if config.has_credentials() {
            Some(basic_authorization(
                config.username.as_deref().unwrap_or(""),
                config.password.as_deref().unwrap_or(""),
            ))
        } else {
            None
        };

        if !config.require_success_status {
            warn!("CONNECT responses from {} are accepted regardless of status", config.addr());
        }

        #[cfg(feature = "rustls-tls")]
        let tls = match config.scheme {
            ProxyScheme::Https => Some(TlsConnectorBuilder::new(&config.tls, &config.host)?),
            _ => None,
        };

        #[cfg(not(feature = "rustls-tls"))]
        if config.scheme == ProxyScheme::Https {
            anyhow::bail!("https upstream requires the rustls-tls feature");
        }

        Ok(HttpConnectConnector {
            proxy_addr: config.addr(),
            authorization,
            require_success_status: config.require_success_status,
            connect_timeout: Duration::from_secs(config.connect_timeout),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            #[cfg(feature = "rustls-tls")]
            tls,
        })
    }

    async fn open(&self) -> Result<Box<dyn StreamDyn>> {
        let tcp_stream = connect_tcp(&self.proxy_addr, self.connect_timeout, &self.socket_opts).await?;

        #[cfg(feature = "rustls-tls")]
        if let Some(ref tls) = self.tls {
            let tls_stream = tokio::time::timeout(
                self.connect_timeout,
                tls.connector().connect(tls.server_name(), tcp_stream),
            )
            .await
            .with_context(|| format!("TLS handshake timeout with {}", self.proxy_addr))?
            .with_context(|| format!("TLS handshake failed with {}", self.proxy_addr))?;

            debug!("TLS connection established to {}", self.proxy_addr);
            return Ok(Box::new(tls_stream));
        }

        Ok(Box::new(tcp_stream))
    }
}

#[async_trait]
impl UpstreamConnector for HttpConnectConnector {
    async fn connect(&self, destination: &TargetAddr) -> Result<Box<dyn StreamDyn>> {
        let mut stream = self
            .open()
            .await
            .map_err(|e| RelayError::UpstreamConnect(format!("{:#}", e)))?;

        http_connect_handshake(
            &mut stream,
            destination,
            self.authorization.as_deref(),
            self.require_success_status,
        )
        .await
        .with_context(|| format!("CONNECT {} via {} failed", destination, self.proxy_addr))?;

        Ok(stream)
    }
}

/// `Basic` credentials for the `Proxy-Authorization` header
fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
}

/// Build the CONNECT request for `destination`
fn build_connect_request(destination: &TargetAddr, authorization: Option<&str>) -> String {
    let target = format!("{}:{}", destination.host(), destination.port());
    let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
    if let Some(auth) = authorization {
        request.push_str("Proxy-Authorization: ");
        request.push_str(auth);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// Perform the CONNECT exchange on an already open proxy stream
///
/// Reads the response one byte at a time so that no tunnel payload sent
/// right after the header is consumed. When `require_success_status` is
/// false any response ending in a blank line is accepted.
pub async fn http_connect_handshake<S>(
    stream: &mut S,
    destination: &TargetAddr,
    authorization: Option<&str>,
    require_success_status: bool,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let request = build_connect_request(destination, authorization);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let header = read_response_header(stream).await?;
    let status_line = first_line(&header);
    debug!("CONNECT {} answered: {}", destination, status_line);

    if require_success_status {
        let code = parse_status_code(&status_line)?;
        if !(200..300).contains(&code) {
            return Err(HttpConnectError::Refused(status_line).into());
        }
    }

    Ok(())
}

async fn read_response_header<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut header = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    while !header.ends_with(HEADER_TERMINATOR) {
        if header.len() >= MAX_RESPONSE_HEADER_LEN {
            return Err(HttpConnectError::HeaderTooLarge(MAX_RESPONSE_HEADER_LEN).into());
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(HttpConnectError::UnexpectedEof.into());
        }
        header.push(byte[0]);
    }

    Ok(header)
}

fn first_line(header: &[u8]) -> String {
    let end = header
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(header.len());
    String::from_utf8_lossy(&header[..end]).into_owned()
}

/// Extract the status code from `HTTP/1.x NNN reason`
fn parse_status_code(status_line: &str) -> Result<u16, HttpConnectError> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(HttpConnectError::MalformedStatus(status_line.to_string()));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| HttpConnectError::MalformedStatus(status_line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio_test::io::Builder;

    #[test]
    fn test_build_connect_request_ipv4() {
        let request =
            build_connect_request(&TargetAddr::ipv4(Ipv4Addr::new(93, 184, 216, 34), 443), None);
        assert_eq!(
            request,
            "CONNECT 93.184.216.34:443 HTTP/1.1\r\nHost: 93.184.216.34:443\r\n\r\n"
        );
    }

    #[test]
    fn test_build_connect_request_ipv6_bracketed() {
        let request = build_connect_request(&TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 80), None);
        assert!(request.starts_with("CONNECT [::1]:80 HTTP/1.1\r\n"));
    }

    #[test]
    fn test_build_connect_request_domain_with_auth() {
        let auth = basic_authorization("user", "pass");
        let request =
            build_connect_request(&TargetAddr::domain("example.com", 443), Some(&auth));
        assert_eq!(
            request,
            "CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\
             Proxy-Authorization: Basic dXNlcjpwYXNz\r\n\r\n"
        );
    }

    #[test]
    fn test_basic_authorization_missing_half() {
        assert_eq!(basic_authorization("user", ""), "Basic dXNlcjo=");
        assert_eq!(basic_authorization("", "pass"), "Basic OnBhc3M=");
    }

    #[test]
    fn test_parse_status_code() {
        assert_eq!(parse_status_code("HTTP/1.1 200 Connection established"), Ok(200));
        assert_eq!(parse_status_code("HTTP/1.0 407 Proxy Authentication Required"), Ok(407));
        assert!(parse_status_code("garbage").is_err());
        assert!(parse_status_code("HTTP/1.1 abc").is_err());
        assert!(parse_status_code("").is_err());
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 200 Connection established\r\nVia: test\r\n\r\n")
            .build();

        http_connect_handshake(&mut stream, &TargetAddr::domain("example.com", 443), None, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handshake_leaves_tunnel_bytes_unread() {
        let mut stream = Builder::new()
            .write(b"CONNECT 10.0.0.1:22 HTTP/1.1\r\nHost: 10.0.0.1:22\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\n\r\nSSH-2.0-server\r\n")
            .build();

        let target = TargetAddr::ipv4(Ipv4Addr::new(10, 0, 0, 1), 22);
        http_connect_handshake(&mut stream, &target, None, true)
            .await
            .unwrap();

        let mut banner = [0u8; 16];
        stream.read_exact(&mut banner).await.unwrap();
        assert_eq!(&banner, b"SSH-2.0-server\r\n");
    }

    #[tokio::test]
    async fn test_handshake_rejects_error_status() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n")
            .build();

        let err = http_connect_handshake(
            &mut stream,
            &TargetAddr::domain("example.com", 443),
            None,
            true,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<HttpConnectError>(),
            Some(HttpConnectError::Refused(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_lenient_accepts_error_status() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
            .build();

        http_connect_handshake(&mut stream, &TargetAddr::domain("example.com", 443), None, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handshake_eof_before_terminator() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\n")
            .build();

        let err = http_connect_handshake(
            &mut stream,
            &TargetAddr::domain("example.com", 443),
            None,
            false,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<HttpConnectError>(),
            Some(&HttpConnectError::UnexpectedEof)
        );
    }

    #[tokio::test]
    async fn test_read_response_header_too_large() {
        let oversized = vec![b'x'; MAX_RESPONSE_HEADER_LEN];
        let mut stream = Builder::new().read(&oversized).build();

        let err = read_response_header(&mut stream).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<HttpConnectError>(),
            Some(&HttpConnectError::HeaderTooLarge(MAX_RESPONSE_HEADER_LEN))
        );
    }

    #[test]
    fn test_connector_precomputes_authorization() {
        let mut config = UpstreamConfig::new(ProxyScheme::Http, "127.0.0.1", 3128);
        config.username = Some("user".to_string());
        let connector = HttpConnectConnector::new(&config).unwrap();
        assert_eq!(connector.authorization.as_deref(), Some("Basic dXNlcjo="));
        assert_eq!(connector.proxy_addr, "127.0.0.1:3128");
    }
}
