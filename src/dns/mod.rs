//! DNS-over-SOCKS resolver
//!
//! Bridges UDP DNS queries to a TCP DNS server that is only reachable
//! through a SOCKS5 proxy.

mod framing;
mod header;
mod pool;
mod resolver;

pub use framing::{read_framed, write_framed};
pub use header::{restore_transaction_id, DnsQuery, DNS_HEADER_SIZE, DNS_QR, DNS_Z};
pub use pool::WorkerPool;
pub use resolver::{DnsResolver, DnsTask};
