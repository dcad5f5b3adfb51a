//! Upstream proxy configuration types
//!
//! Describes the proxy that all relayed traffic is forwarded through.

use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream proxy protocol
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyScheme {
    /// HTTP CONNECT over TLS
    #[default]
    #[serde(rename = "https")]
    Https,
    /// HTTP CONNECT over plain TCP
    #[serde(rename = "http")]
    Http,
    /// SOCKS5 without authentication
    #[serde(rename = "socks5")]
    Socks5,
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Https => write!(f, "https"),
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Socks5 => write!(f, "socks5"),
        }
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_require_success_status() -> bool {
    true
}

/// Upstream proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Proxy protocol
    #[serde(default)]
    pub scheme: ProxyScheme,

    /// Proxy host name or IP literal
    pub host: String,

    /// Proxy port
    pub port: u16,

    /// Username for Proxy-Authorization
    #[serde(default)]
    pub username: Option<String>,

    /// Password for Proxy-Authorization
    #[serde(default)]
    pub password: Option<String>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Reject CONNECT responses whose status is not 2xx
    #[serde(default = "default_require_success_status")]
    pub require_success_status: bool,

    /// TLS settings for the `https` scheme
    #[serde(default)]
    pub tls: TlsConfig,

    /// Socket options for the connection to the proxy
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl UpstreamConfig {
    /// Create a configuration with defaults for everything but the endpoint
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        UpstreamConfig {
            scheme,
            host: host.into(),
            port,
            username: None,
            password: None,
            connect_timeout: default_connect_timeout(),
            require_success_status: default_require_success_status(),
            tls: TlsConfig::default(),
            tcp: TcpConfig::default(),
        }
    }

    /// `host:port` of the proxy, IPv6 literals bracketed
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Check if any credential is configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Upstream host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("Upstream port must not be 0".to_string());
        }
        if self.scheme == ProxyScheme::Socks5 && self.has_credentials() {
            return Err("Credentials are not supported for a socks5 upstream".to_string());
        }
        Ok(())
    }
}

/// TLS configuration for the `https` upstream
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Name used for SNI and certificate verification (defaults to the proxy host)
    #[serde(default)]
    pub hostname: Option<String>,

    /// Additional PEM file with trusted root certificates
    #[serde(default)]
    pub trusted_root: Option<String>,

    /// Accept any server certificate
    #[serde(default)]
    pub skip_verify: bool,
}

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// TCP socket configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}
