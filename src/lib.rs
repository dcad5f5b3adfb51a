//! # Tunrelay - SOCKS5 relay over an upstream proxy
//!
//! Tunrelay exposes a local no-auth SOCKS5 server whose CONNECT requests are
//! forwarded through an upstream proxy (HTTPS or HTTP CONNECT, or SOCKS5),
//! together with a UDP DNS resolver that sends each query over TCP through
//! SOCKS5 to a fixed DNS server.
//!
//! ## Features
//!
//! - **Local SOCKS5 Server**: no-auth, CONNECT only, domains passed unresolved
//! - **HTTP CONNECT Upstream**: TLS with a configurable trust policy and Basic auth
//! - **DNS-over-SOCKS**: bounded worker pool, transaction ids preserved
//! - **Ephemeral Listeners**: both ports are reported once bound
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tunrelay::config::load_config;
//! use tunrelay::Tunnel;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let tunnel = Tunnel::start(config).await?;
//!     println!("SOCKS5 on {}", tunnel.socks_addr());
//!
//!     tokio::signal::ctrl_c().await?;
//!     tunnel.shutdown().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Tunrelay -> Upstream Proxy -> Target
//! DNS Client -(UDP)-> Tunrelay -(TCP via SOCKS5)-> DNS Server
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod dns;
pub mod error;
pub mod helper;
pub mod socks;
pub mod tunnel;
pub mod upstream;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{DnsError, HttpConnectError, RelayError, Socks5Error};
pub use tunnel::{run_tunnel, Tunnel};

/// Version of the Tunrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "tunrelay");
    }
}
