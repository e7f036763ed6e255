//! The 8-byte hello frame each side sends on link establishment.

use crate::constants::{HELLO_MAGIC, HELLO_SIZE};
use crate::error::{WireError, WireResult};

/// Advertised protocol capabilities: `[magic][version][minVersion][features][reserved]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub version: u8,
    pub min_version: u8,
    pub features: u16,
}

impl Hello {
    pub fn new(version: u8, min_version: u8, features: u16) -> Self {
        Self {
            version,
            min_version,
            features,
        }
    }

    pub fn encode(&self) -> [u8; HELLO_SIZE] {
        let mut out = [0u8; HELLO_SIZE];
        out[0..2].copy_from_slice(&HELLO_MAGIC.to_be_bytes());
        out[2] = self.version;
        out[3] = self.min_version;
        out[4..6].copy_from_slice(&self.features.to_be_bytes());
        // Bytes 6..8 reserved, zero.
        out
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        if bytes.len() != HELLO_SIZE {
            return Err(WireError::TruncatedPayload {
                needed: HELLO_SIZE,
                have: bytes.len(),
            });
        }
        let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
        if magic != HELLO_MAGIC {
            return Err(WireError::MalformedFrame("bad hello magic"));
        }
        Ok(Self {
            version: bytes[2],
            min_version: bytes[3],
            features: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }

    /// Whether a datagram looks like a hello frame.
    pub fn matches(bytes: &[u8]) -> bool {
        bytes.len() == HELLO_SIZE && u16::from_be_bytes([bytes[0], bytes[1]]) == HELLO_MAGIC
    }
}
