//! DNS header inspection
//!
//! Only as much of the message is decoded as is needed to decide whether a
//! datagram is a forwardable query and to name its first question in logs.

use crate::error::DnsError;

/// Size of the fixed DNS header
pub const DNS_HEADER_SIZE: usize = 12;

/// QR bit in the third header byte
pub const DNS_QR: u8 = 0x80;

/// Reserved Z bits in the fourth header byte
pub const DNS_Z: u8 = 0x70;

const FLAGS_OFFSET: usize = 2;
const RA_Z_RCODE_OFFSET: usize = 3;
const QDCOUNT_OFFSET: usize = 4;
const ANCOUNT_OFFSET: usize = 6;
const NSCOUNT_OFFSET: usize = 8;

/// Longest encoded name allowed by RFC 1035
const MAX_NAME_LEN: usize = 255;

/// A validated DNS query datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery {
    bytes: Vec<u8>,
}

impl DnsQuery {
    /// Validate `bytes` as a forwardable query and take a copy
    ///
    /// Accepted iff the datagram holds a full header, QR and Z are clear,
    /// at least one question is present and there are no answer or
    /// authority records.
    pub fn parse(bytes: &[u8]) -> Result<Self, DnsError> {
        if bytes.len() < DNS_HEADER_SIZE {
            return Err(DnsError::TooShort(bytes.len()));
        }
        if bytes[FLAGS_OFFSET] & DNS_QR != 0 {
            return Err(DnsError::NotAQuery("QR bit set"));
        }
        if bytes[RA_Z_RCODE_OFFSET] & DNS_Z != 0 {
            return Err(DnsError::NotAQuery("Z bits set"));
        }
        if read_u16(bytes, QDCOUNT_OFFSET) == 0 {
            return Err(DnsError::NotAQuery("no questions"));
        }
        if read_u16(bytes, ANCOUNT_OFFSET) != 0 {
            return Err(DnsError::NotAQuery("answer records present"));
        }
        if read_u16(bytes, NSCOUNT_OFFSET) != 0 {
            return Err(DnsError::NotAQuery("authority records present"));
        }

        Ok(DnsQuery {
            bytes: bytes.to_vec(),
        })
    }

    /// Transaction id from the first two header bytes
    pub fn transaction_id(&self) -> u16 {
        read_u16(&self.bytes, 0)
    }

    /// Number of questions
    pub fn question_count(&self) -> u16 {
        read_u16(&self.bytes, QDCOUNT_OFFSET)
    }

    /// Raw message bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the first question name as dotted labels
    ///
    /// Compression pointers are rejected since a query's first name never
    /// needs one.
    pub fn question_name(&self) -> Result<String, DnsError> {
        let mut labels: Vec<String> = Vec::new();
        let mut pos = DNS_HEADER_SIZE;
        let mut encoded_len = 0usize;

        loop {
            let len = *self.bytes.get(pos).ok_or(DnsError::MalformedName)? as usize;
            if len == 0 {
                break;
            }
            if len & 0xC0 != 0 {
                return Err(DnsError::MalformedName);
            }

            encoded_len += len + 1;
            if encoded_len > MAX_NAME_LEN {
                return Err(DnsError::MalformedName);
            }

            let label = self
                .bytes
                .get(pos + 1..pos + 1 + len)
                .ok_or(DnsError::MalformedName)?;
            labels.push(String::from_utf8_lossy(label).into_owned());
            pos += len + 1;
        }

        if labels.is_empty() {
            return Ok(".".to_string());
        }
        Ok(labels.join("."))
    }
}

/// Replace the first two bytes of `response` with `id`
///
/// Returns false when the response is too short to carry an id.
pub fn restore_transaction_id(response: &mut [u8], id: u16) -> bool {
    if response.len() < 2 {
        return false;
    }
    response[..2].copy_from_slice(&id.to_be_bytes());
    true
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}
