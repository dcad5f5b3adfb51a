//! DNS-over-TCP framing (RFC 1035 section 4.2.2)
//!
//! Each message is preceded by its length as a big-endian `u16`.

use crate::error::DnsError;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Write one length-prefixed message and flush
pub async fn write_framed<S>(stream: &mut S, message: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let len = u16::try_from(message.len()).map_err(|_| DnsError::TooLarge(message.len()))?;

    let mut frame = Vec::with_capacity(2 + message.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);

    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
///
/// EOF before the full message has arrived is an error.
pub async fn read_framed<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let len = stream
        .read_u16()
        .await
        .with_context(|| "Connection closed before DNS response length")?;

    let mut message = vec![0u8; len as usize];
    stream
        .read_exact(&mut message)
        .await
        .with_context(|| format!("Connection closed mid DNS response ({} bytes expected)", len))?;

    Ok(message)
}
