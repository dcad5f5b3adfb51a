//! SOCKS5 module for Tunrelay
//!
//! This module implements the server side of a no-auth, CONNECT-only
//! SOCKS5 subset together with the address codec and the byte relay that
//! runs once a session is established.

mod consts;
mod handshake;
mod server;
mod tcp_relay;
mod types;

pub use consts::*;
pub use handshake::{negotiate_no_auth, read_connect_request, send_connect_reply};
pub use server::{handle_connection, Socks5Server};
pub use tcp_relay::{relay_tcp, Direction, RelayStats};
pub use types::TargetAddr;
