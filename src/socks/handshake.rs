//! Server side of the SOCKS5 negotiation
//!
//! Only the no-authentication method and the CONNECT command are accepted.
//! A violation of either returns an error and the caller closes the
//! connection; no SOCKS5 failure reply is ever written.

use super::consts::*;
use super::types::TargetAddr;
use crate::error::Socks5Error;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Read the method selection message and answer `05 00`
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     |    1     |
/// +----+----------+----------+
/// ```
///
/// The client must offer exactly one method, and it must be `0x00`.
pub async fn negotiate_no_auth<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = read_u8(stream).await?;
    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let num_methods = read_u8(stream).await?;
    if num_methods != 1 {
        return Err(Socks5Error::UnsupportedMethodCount(num_methods).into());
    }

    let method = read_u8(stream).await?;
    if method != SOCKS5_AUTH_METHOD_NONE {
        return Err(Socks5Error::NoAcceptableMethod(method).into());
    }

    stream.write_all(&SOCKS5_AUTH_REPLY).await?;
    stream.flush().await?;

    Ok(())
}

/// Parse a CONNECT request from the stream
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Domains are returned unresolved.
pub async fn read_connect_request<S>(stream: &mut S) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    let version = read_u8(stream).await?;
    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let command = read_u8(stream).await?;
    if command != SOCKS5_CMD_TCP_CONNECT {
        return Err(Socks5Error::CommandNotSupported(command).into());
    }

    let _reserved = read_u8(stream).await?;
    let addr_type = read_u8(stream).await?;

    let target = TargetAddr::read_from(stream, addr_type).await?;
    debug!("Parsed SOCKS5 CONNECT to {}", target);

    Ok(target)
}

/// Write the fixed CONNECT success reply
///
/// The bound address is always reported as `0.0.0.0:0`.
pub async fn send_connect_reply<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&SOCKS5_CONNECT_REPLY).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_u8<S>(stream: &mut S) -> Result<u8>
where
    S: AsyncRead + Unpin,
{
    stream
        .read_u8()
        .await
        .with_context(|| "Connection closed during SOCKS5 negotiation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio_test::io::Builder;

    const CMD_TCP_BIND: u8 = 0x02;
    const CMD_UDP_ASSOCIATE: u8 = 0x03;

    fn connect_request(addr: &TargetAddr) -> Vec<u8> {
        let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
        request.extend_from_slice(&addr.to_bytes().unwrap());
        request
    }

    #[tokio::test]
    async fn test_negotiate_no_auth_ok() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .build();

        negotiate_no_auth(&mut stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiate_rejects_wrong_version() {
        let mut stream = Builder::new().read(&[0x04]).build();
        let err = negotiate_no_auth(&mut stream).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Socks5Error>(),
            Some(&Socks5Error::UnsupportedVersion(4))
        );
    }

    #[tokio::test]
    async fn test_negotiate_rejects_multiple_methods() {
        let mut stream = Builder::new().read(&[0x05, 0x02]).build();
        let err = negotiate_no_auth(&mut stream).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Socks5Error>(),
            Some(&Socks5Error::UnsupportedMethodCount(2))
        );
    }

    #[tokio::test]
    async fn test_negotiate_rejects_password_method() {
        // No reply may be written when the method is refused
        let mut stream = Builder::new().read(&[0x05, 0x01, 0x02]).build();
        let err = negotiate_no_auth(&mut stream).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Socks5Error>(),
            Some(&Socks5Error::NoAcceptableMethod(2))
        );
    }

    #[tokio::test]
    async fn test_negotiate_eof() {
        let mut stream = Builder::new().read(&[0x05]).build();
        assert!(negotiate_no_auth(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn test_read_connect_request_ipv4() {
        let request = [0x05, 0x01, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50];
        let mut cursor = Cursor::new(request.to_vec());

        let target = read_connect_request(&mut cursor).await.unwrap();
        assert_eq!(target, TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 80));
    }

    #[tokio::test]
    async fn test_read_connect_request_domain_unresolved() {
        let addr = TargetAddr::domain("example.com", 443);
        let mut cursor = Cursor::new(connect_request(&addr));

        let target = read_connect_request(&mut cursor).await.unwrap();
        assert_eq!(target, addr);
    }

    #[tokio::test]
    async fn test_read_connect_request_ipv6() {
        let addr = TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 8080);
        let mut cursor = Cursor::new(connect_request(&addr));

        let target = read_connect_request(&mut cursor).await.unwrap();
        assert_eq!(target, addr);
    }

    #[tokio::test]
    async fn test_read_connect_request_ignores_reserved() {
        let mut request = connect_request(&TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 80));
        request[2] = 0xAA;
        let mut cursor = Cursor::new(request);
        assert!(read_connect_request(&mut cursor).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_connect_request_rejects_other_commands() {
        for command in [CMD_TCP_BIND, CMD_UDP_ASSOCIATE, 0x99] {
            let mut request = connect_request(&TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 80));
            request[1] = command;
            let mut cursor = Cursor::new(request);

            let err = read_connect_request(&mut cursor).await.unwrap_err();
            assert_eq!(
                err.downcast_ref::<Socks5Error>(),
                Some(&Socks5Error::CommandNotSupported(command))
            );
        }
    }

    #[tokio::test]
    async fn test_read_connect_request_invalid_version() {
        let mut request = connect_request(&TargetAddr::ipv4(Ipv4Addr::LOCALHOST, 80));
        request[0] = 4;
        let mut cursor = Cursor::new(request);
        assert!(read_connect_request(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_connect_request_truncated() {
        let mut cursor = Cursor::new(vec![0x05, 0x01, 0x00, 0x04, 0x00, 0x00]);
        assert!(read_connect_request(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_send_connect_reply() {
        let mut buffer = Vec::new();
        send_connect_reply(&mut buffer).await.unwrap();
        assert_eq!(buffer, vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}
