//! Tunnel configuration types
//!
//! Defines the root configuration and the listener sections.

use super::UpstreamConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Local SOCKS5 listener
    #[serde(default)]
    pub socks: SocksConfig,

    /// Upstream proxy
    pub upstream: UpstreamConfig,

    /// DNS-over-SOCKS resolver
    #[serde(default)]
    pub dns: DnsConfig,
}

impl Config {
    /// Build a configuration with default listener sections
    pub fn new(upstream: UpstreamConfig) -> Self {
        Config {
            socks: SocksConfig::default(),
            upstream,
            dns: DnsConfig::default(),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.socks.validate()?;
        self.upstream.validate()?;
        self.dns.validate()
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:0".to_string()
}

/// Default handshake timeout in seconds
fn default_handshake_timeout() -> u64 {
    10
}

/// SOCKS5 listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Local listen address; port 0 picks an ephemeral port
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Time allowed for negotiation and upstream connect, in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,
}

impl Default for SocksConfig {
    fn default() -> Self {
        SocksConfig {
            listen_addr: default_listen_addr(),
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

impl SocksConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        parse_socket_addr("socks.listen_addr", &self.listen_addr)?;
        if self.handshake_timeout == 0 {
            return Err("socks.handshake_timeout must be positive".to_string());
        }
        Ok(())
    }
}

fn default_dns_enabled() -> bool {
    true
}

fn default_dns_server() -> String {
    "8.8.8.8:53".to_string()
}

/// Default number of concurrent DNS workers
fn default_workers() -> usize {
    10
}

/// Default per-query timeout in seconds
fn default_query_timeout() -> u64 {
    5
}

/// DNS-over-SOCKS resolver configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DnsConfig {
    /// Run the resolver
    #[serde(default = "default_dns_enabled")]
    pub enabled: bool,

    /// Local UDP listen address; port 0 picks an ephemeral port
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// DNS server queried over TCP through the SOCKS5 proxy
    #[serde(default = "default_dns_server")]
    pub server: String,

    /// Maximum number of queries in flight
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Time allowed for one query round trip, in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,

    /// SOCKS5 proxy for DNS traffic (defaults to the tunnel's own listener)
    #[serde(default)]
    pub socks_proxy: Option<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig {
            enabled: default_dns_enabled(),
            listen_addr: default_listen_addr(),
            server: default_dns_server(),
            workers: default_workers(),
            query_timeout: default_query_timeout(),
            socks_proxy: None,
        }
    }
}

impl DnsConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        parse_socket_addr("dns.listen_addr", &self.listen_addr)?;
        parse_socket_addr("dns.server", &self.server)?;
        if let Some(ref proxy) = self.socks_proxy {
            parse_socket_addr("dns.socks_proxy", proxy)?;
        }
        if self.workers == 0 {
            return Err("dns.workers must be at least 1".to_string());
        }
        if self.query_timeout == 0 {
            return Err("dns.query_timeout must be positive".to_string());
        }
        Ok(())
    }
}

/// Parse a socket address field, naming the field on failure
pub fn parse_socket_addr(field: &str, value: &str) -> Result<SocketAddr, String> {
    value
        .parse()
        .map_err(|e| format!("{} is not a socket address ({}): {}", field, value, e))
}
