//! Test utilities and fakes for Tunrelay
//!
//! This module provides loopback listeners, a fake HTTP CONNECT proxy and a
//! fake SOCKS5 proxy that answers DNS-over-TCP queries.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tunrelay::config::{Config, ProxyScheme, UpstreamConfig};

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Create a connected TCP stream pair for testing
pub async fn create_tcp_stream_pair() -> (TcpStream, TcpStream) {
    let (listener, addr) = create_test_listener().await;

    let connect_fut = TcpStream::connect(addr);
    let accept_fut = listener.accept();

    let (client_stream, accepted) = tokio::join!(connect_fut, accept_fut);
    let (server_stream, _) = accepted.unwrap();

    (client_stream.unwrap(), server_stream)
}

/// Read from `stream` until the blank line ending an HTTP header
pub async fn read_http_header<S>(stream: &mut S) -> String
where
    S: AsyncRead + Unpin,
{
    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    while !header.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            break;
        }
        header.push(byte[0]);
    }
    String::from_utf8(header).unwrap()
}

/// HTTP proxy that answers every CONNECT with a fixed response
///
/// After the response it writes `greeting`, then echoes whatever the client
/// sends. Each request header is recorded.
pub struct FakeHttpProxy {
    /// Address the proxy listens on
    pub addr: SocketAddr,
    /// Request headers received so far
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHttpProxy {
    /// Start a proxy answering with `status_line`
    pub async fn spawn(status_line: &'static str, greeting: &'static [u8]) -> Self {
        let (listener, addr) = create_test_listener().await;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let seen = seen.clone();
                tokio::spawn(serve_connect(stream, status_line, greeting, seen));
            }
        });

        FakeHttpProxy { addr, requests }
    }

    /// Request headers received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Answer one CONNECT on `stream`, then echo until the client closes
pub async fn serve_connect<S>(
    mut stream: S,
    status_line: &'static str,
    greeting: &'static [u8],
    seen: Arc<Mutex<Vec<String>>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = read_http_header(&mut stream).await;
    seen.lock().unwrap().push(header);

    let response = format!("{}\r\nProxy-Agent: fake\r\n\r\n", status_line);
    if stream.write_all(response.as_bytes()).await.is_err() {
        return;
    }
    if stream.write_all(greeting).await.is_err() {
        return;
    }
    if stream.flush().await.is_err() {
        return;
    }

    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    return;
                }
                if stream.flush().await.is_err() {
                    return;
                }
            }
        }
    }
}

/// SOCKS5 proxy whose every CONNECT lands on a canned DNS-over-TCP server
///
/// The first two bytes of each received query are recorded, and `answer` is
/// returned framed.
pub struct FakeSocksDnsBackend {
    /// Address the proxy listens on
    pub addr: SocketAddr,
    /// Destination bytes of each CONNECT request (`ATYP ADDR PORT`)
    pub destinations: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeSocksDnsBackend {
    /// Start a backend answering with `answer`
    pub async fn spawn(answer: Vec<u8>) -> Self {
        let (listener, addr) = create_test_listener().await;
        let destinations = Arc::new(Mutex::new(Vec::new()));

        let seen = destinations.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let seen = seen.clone();
                let answer = answer.clone();
                tokio::spawn(async move {
                    let mut greeting = [0u8; 3];
                    stream.read_exact(&mut greeting).await.unwrap();
                    assert_eq!(greeting, [0x05, 0x01, 0x00]);
                    stream.write_all(&[0x05, 0x00]).await.unwrap();

                    let mut request = [0u8; 4];
                    stream.read_exact(&mut request).await.unwrap();
                    assert_eq!(&request[..3], &[0x05, 0x01, 0x00]);
                    let addr_len = match request[3] {
                        0x01 => 4,
                        0x04 => 16,
                        other => panic!("unexpected address type {}", other),
                    };
                    let mut destination = vec![0u8; addr_len + 2];
                    stream.read_exact(&mut destination).await.unwrap();
                    let mut recorded = vec![request[3]];
                    recorded.extend_from_slice(&destination);
                    seen.lock().unwrap().push(recorded);

                    stream
                        .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                        .await
                        .unwrap();

                    let len = stream.read_u16().await.unwrap() as usize;
                    let mut query = vec![0u8; len];
                    stream.read_exact(&mut query).await.unwrap();

                    stream
                        .write_all(&(answer.len() as u16).to_be_bytes())
                        .await
                        .unwrap();
                    stream.write_all(&answer).await.unwrap();
                });
            }
        });

        FakeSocksDnsBackend { addr, destinations }
    }
}

/// A 29-byte `example.com A` query with RD set
pub fn example_query(id: u16) -> Vec<u8> {
    let mut query = id.to_be_bytes().to_vec();
    query.extend_from_slice(&[0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    query.push(7);
    query.extend_from_slice(b"example");
    query.push(3);
    query.extend_from_slice(b"com");
    query.push(0);
    query.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    query
}

/// A 40-byte answer to [`example_query`] carrying `id`
pub fn example_answer(id: u16) -> Vec<u8> {
    let mut answer = id.to_be_bytes().to_vec();
    answer.extend_from_slice(&[0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    answer.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
    answer.extend_from_slice(&[0x00, 0x00, 0x0E, 0x10, 0x00, 0x04]);
    answer.extend_from_slice(&[93, 184, 216, 34]);
    answer.resize(40, 0);
    answer
}

/// Test configuration builder
pub struct TestConfigBuilder {
    scheme: ProxyScheme,
    upstream: SocketAddr,
    require_success_status: bool,
    dns_enabled: bool,
    dns_socks_proxy: Option<SocketAddr>,
    username: Option<String>,
    password: Option<String>,
}

impl TestConfigBuilder {
    /// Create a builder for an upstream at `upstream`
    pub fn new(scheme: ProxyScheme, upstream: SocketAddr) -> Self {
        TestConfigBuilder {
            scheme,
            upstream,
            require_success_status: true,
            dns_enabled: false,
            dns_socks_proxy: None,
            username: None,
            password: None,
        }
    }

    /// Accept any CONNECT status
    pub fn lenient(mut self) -> Self {
        self.require_success_status = false;
        self
    }

    /// Enable the resolver, optionally with its own SOCKS5 proxy
    pub fn dns(mut self, socks_proxy: Option<SocketAddr>) -> Self {
        self.dns_enabled = true;
        self.dns_socks_proxy = socks_proxy;
        self
    }

    /// Set upstream credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let mut upstream = UpstreamConfig::new(
            self.scheme,
            &self.upstream.ip().to_string(),
            self.upstream.port(),
        );
        upstream.require_success_status = self.require_success_status;
        upstream.username = self.username;
        upstream.password = self.password;
        upstream.connect_timeout = 2;

        let mut config = Config::new(upstream);
        config.socks.handshake_timeout = 2;
        config.dns.enabled = self.dns_enabled;
        config.dns.socks_proxy = self.dns_socks_proxy.map(|addr| addr.to_string());
        config.dns.query_timeout = 2;
        config
    }
}
