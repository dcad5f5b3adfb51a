//! Error types for Tunrelay
//!
//! This module defines the error taxonomy used by the relay. Every failure is
//! scoped to a single connection or datagram; none of these are fatal to the
//! process once the listeners are bound.

use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream connection or handshake failed
    #[error("Upstream connect failed: {0}")]
    UpstreamConnect(String),

    /// All DNS workers are busy
    #[error("Worker pool saturated ({0} workers busy)")]
    PoolSaturated(usize),

    /// Worker pool was shut down
    #[error("Worker pool is shut down")]
    PoolClosed,

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// SOCKS5 specific errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Client offered a method list other than exactly one method
    #[error("Unsupported number of authentication methods: {0}")]
    UnsupportedMethodCount(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method: {0:#04x}")]
    NoAcceptableMethod(u8),

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Upstream SOCKS5 proxy answered with a non-zero reply code
    #[error("Proxy replied with failure: {0}")]
    ReplyFailure(Socks5ReplyCode),
}

/// DNS datagram errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DnsError {
    /// Datagram shorter than a DNS header
    #[error("Datagram too short for a DNS header: {0} bytes")]
    TooShort(usize),

    /// Header does not describe a forwardable query
    #[error("Not a DNS query: {0}")]
    NotAQuery(&'static str),

    /// Question name could not be decoded
    #[error("Malformed question name")]
    MalformedName,

    /// Message does not fit in a DNS-over-TCP frame
    #[error("Message too large for TCP framing: {0} bytes")]
    TooLarge(usize),
}

/// HTTP CONNECT handshake errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HttpConnectError {
    /// Proxy closed the connection before the header terminator
    #[error("Proxy closed connection during CONNECT response")]
    UnexpectedEof,

    /// Response header exceeded the read limit
    #[error("CONNECT response header exceeds {0} bytes")]
    HeaderTooLarge(usize),

    /// Status line could not be parsed
    #[error("Malformed CONNECT status line: {0}")]
    MalformedStatus(String),

    /// Proxy answered with a non-2xx status
    #[error("Proxy refused CONNECT: {0}")]
    Refused(String),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
    /// Any value outside RFC 1928
    Unassigned = 0xFF,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl From<u8> for Socks5ReplyCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Socks5ReplyCode::Succeeded,
            0x01 => Socks5ReplyCode::GeneralFailure,
            0x02 => Socks5ReplyCode::ConnectionNotAllowed,
            0x03 => Socks5ReplyCode::NetworkUnreachable,
            0x04 => Socks5ReplyCode::HostUnreachable,
            0x05 => Socks5ReplyCode::ConnectionRefused,
            0x06 => Socks5ReplyCode::TtlExpired,
            0x07 => Socks5ReplyCode::CommandNotSupported,
            0x08 => Socks5ReplyCode::AddressTypeNotSupported,
            _ => Socks5ReplyCode::Unassigned,
        }
    }
}

impl std::fmt::Display for Socks5ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Socks5ReplyCode::Succeeded => "succeeded",
            Socks5ReplyCode::GeneralFailure => "general SOCKS server failure",
            Socks5ReplyCode::ConnectionNotAllowed => "connection not allowed by ruleset",
            Socks5ReplyCode::NetworkUnreachable => "network unreachable",
            Socks5ReplyCode::HostUnreachable => "host unreachable",
            Socks5ReplyCode::ConnectionRefused => "connection refused",
            Socks5ReplyCode::TtlExpired => "TTL expired",
            Socks5ReplyCode::CommandNotSupported => "command not supported",
            Socks5ReplyCode::AddressTypeNotSupported => "address type not supported",
            Socks5ReplyCode::Unassigned => "unassigned reply code",
        };
        f.write_str(text)
    }
}
