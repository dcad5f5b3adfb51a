//! Helper utilities for Tunrelay
//!
//! This module provides shared constants and small utility functions.

use crate::error::RelayError;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Buffer size of each relay copy loop
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Largest UDP payload the DNS listener accepts
pub const MAX_UDP_DATAGRAM_SIZE: usize = 65535;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Run `fut` with a deadline, turning expiry into an error naming `what`
pub async fn with_timeout<F, T>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| RelayError::Timeout(format!("{} timed out after {:?}", what, timeout)))?
}
