//! The versioned application-level frame carried over every mesh link.
//!
//! Frames are flat big-endian binary. Two versions exist on the air: v1 with
//! 16-bit payload lengths, and v2 which widens the length field, adds an
//! optional source route, and records the original size of compressed
//! payloads. After encoding, a frame is padded to the smallest block in
//! {256, 512, 1024, 2048} that fits so passive observers cannot read payload
//! sizes off the wire.

use crate::constants::*;
use crate::error::{WireError, WireResult};
use crate::{wire_newtype, PeerId};

wire_newtype!(
    PacketSignature,
    64,
    "A detached Ed25519 signature appended to a frame."
);

/// A single application-level datagram.
///
/// `ttl` and the RSR flag are mutable in flight (relays decrement and mark),
/// so both are excluded from the signing preimage; everything else is
/// covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub packet_type: u8,
    pub ttl: u8,
    /// Milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    pub is_compressed: bool,
    /// Relay-sender-receipt marker.
    pub is_rsr: bool,
    pub sender_id: PeerId,
    pub recipient_id: Option<PeerId>,
    /// v2 only; empty means no route.
    pub route: Vec<PeerId>,
    /// v2 only; size before compression. Defaults to the payload length when
    /// the compressed flag is set and no explicit value was recorded.
    pub original_size: Option<u32>,
    pub payload: Vec<u8>,
    pub signature: Option<PacketSignature>,
}

impl Packet {
    /// A v1 broadcast frame with no recipient, route, or signature.
    pub fn broadcast(
        packet_type: u8,
        sender_id: PeerId,
        payload: Vec<u8>,
        ttl: u8,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            version: VERSION_V1,
            packet_type,
            ttl,
            timestamp_ms,
            is_compressed: false,
            is_rsr: false,
            sender_id,
            recipient_id: None,
            route: Vec::new(),
            original_size: None,
            payload,
            signature: None,
        }
    }

    /// A v1 frame addressed to a single peer.
    pub fn unicast(
        packet_type: u8,
        sender_id: PeerId,
        recipient_id: PeerId,
        payload: Vec<u8>,
        ttl: u8,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            recipient_id: Some(recipient_id),
            ..Self::broadcast(packet_type, sender_id, payload, ttl, timestamp_ms)
        }
    }

    fn flags_byte(&self) -> u8 {
        let mut flags = 0u8;
        if self.recipient_id.is_some() {
            flags |= FLAG_HAS_RECIPIENT;
        }
        if self.signature.is_some() {
            flags |= FLAG_HAS_SIGNATURE;
        }
        if self.is_compressed {
            flags |= FLAG_IS_COMPRESSED;
        }
        if self.version == VERSION_V2 && !self.route.is_empty() {
            flags |= FLAG_HAS_ROUTE;
        }
        if self.is_rsr {
            flags |= FLAG_IS_RSR;
        }
        flags
    }

    fn encoded_len(&self) -> usize {
        let mut len = match self.version {
            VERSION_V2 => HEADER_SIZE_V2,
            _ => HEADER_SIZE_V1,
        };
        len += PEER_ID_SIZE;
        if self.recipient_id.is_some() {
            len += PEER_ID_SIZE;
        }
        if self.version == VERSION_V2 {
            if !self.route.is_empty() {
                len += 1 + self.route.len() * PEER_ID_SIZE;
            }
            if self.is_compressed {
                len += 4;
            }
        }
        len += self.payload.len();
        if self.signature.is_some() {
            len += SIGNATURE_SIZE;
        }
        len
    }

    /// Encodes the frame, optionally padding it to a traffic-analysis block.
    pub fn encode(&self, pad: bool) -> WireResult<Vec<u8>> {
        match self.version {
            VERSION_V1 | VERSION_V2 => {}
            v => return Err(WireError::UnknownVersion(v)),
        }
        if self.version == VERSION_V1 {
            if !self.route.is_empty() {
                return Err(WireError::MalformedFrame("source routes require v2"));
            }
            if self.payload.len() > u16::MAX as usize {
                return Err(WireError::MalformedFrame("payload exceeds v1 length field"));
            }
        } else if self.route.len() > MAX_ROUTE_HOPS {
            return Err(WireError::MalformedFrame("route exceeds 255 hops"));
        }

        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.version);
        out.push(self.packet_type);
        out.push(self.ttl);
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.push(self.flags_byte());
        match self.version {
            VERSION_V1 => out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes()),
            _ => out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes()),
        }
        out.extend_from_slice(self.sender_id.as_bytes());
        if let Some(recipient) = &self.recipient_id {
            out.extend_from_slice(recipient.as_bytes());
        }
        if self.version == VERSION_V2 {
            if !self.route.is_empty() {
                out.push(self.route.len() as u8);
                for hop in &self.route {
                    out.extend_from_slice(hop.as_bytes());
                }
            }
            if self.is_compressed {
                let original = self
                    .original_size
                    .unwrap_or(self.payload.len() as u32);
                out.extend_from_slice(&original.to_be_bytes());
            }
        }
        out.extend_from_slice(&self.payload);
        if let Some(sig) = &self.signature {
            out.extend_from_slice(sig.as_bytes());
        }

        if pad {
            out = pad_frame(out);
        }
        Ok(out)
    }

    /// Decodes a frame, transparently stripping block padding if present.
    pub fn decode(bytes: &[u8]) -> WireResult<Packet> {
        match Self::decode_exact(bytes) {
            Ok(packet) => Ok(packet),
            Err(first) => match unpad(bytes) {
                Ok(stripped) => Self::decode_exact(stripped),
                Err(_) => Err(first),
            },
        }
    }

    /// Decodes a frame that must span the buffer exactly.
    pub fn decode_exact(bytes: &[u8]) -> WireResult<Packet> {
        let mut r = Reader::new(bytes);
        let version = r.u8()?;
        if version != VERSION_V1 && version != VERSION_V2 {
            return Err(WireError::UnknownVersion(version));
        }
        let packet_type = r.u8()?;
        let ttl = r.u8()?;
        let timestamp_ms = r.u64_be()?;
        let flags = r.u8()?;
        let payload_len = match version {
            VERSION_V1 => r.u16_be()? as usize,
            _ => r.u32_be()? as usize,
        };

        let sender_id = PeerId::from(r.array::<PEER_ID_SIZE>()?);
        let recipient_id = if flags & FLAG_HAS_RECIPIENT != 0 {
            Some(PeerId::from(r.array::<PEER_ID_SIZE>()?))
        } else {
            None
        };

        let mut route = Vec::new();
        if flags & FLAG_HAS_ROUTE != 0 {
            if version != VERSION_V2 {
                return Err(WireError::MalformedFrame("route flag on v1 frame"));
            }
            let hops = r.u8()? as usize;
            route.reserve(hops);
            for _ in 0..hops {
                route.push(PeerId::from(r.array::<PEER_ID_SIZE>()?));
            }
        }

        let is_compressed = flags & FLAG_IS_COMPRESSED != 0;
        let original_size = if version == VERSION_V2 && is_compressed {
            Some(r.u32_be()?)
        } else {
            None
        };

        let payload = r.take(payload_len)?.to_vec();
        let signature = if flags & FLAG_HAS_SIGNATURE != 0 {
            Some(PacketSignature::from(r.array::<SIGNATURE_SIZE>()?))
        } else {
            None
        };

        if r.remaining() != 0 {
            return Err(WireError::MalformedFrame("trailing bytes after frame"));
        }

        Ok(Packet {
            version,
            packet_type,
            ttl,
            timestamp_ms,
            is_compressed,
            is_rsr: flags & FLAG_IS_RSR != 0,
            sender_id,
            recipient_id,
            route,
            original_size,
            payload,
            signature,
        })
    }

    /// The canonical message-authentication input: the frame re-encoded with
    /// `ttl = 0`, no signature, the RSR bit cleared, and no padding. Stable
    /// under everything a relay may legitimately mutate.
    pub fn signing_bytes(&self) -> WireResult<Vec<u8>> {
        let mut canonical = self.clone();
        canonical.ttl = 0;
        canonical.signature = None;
        canonical.is_rsr = false;
        canonical.encode(false)
    }

    /// The dedup key: `senderIdHex:timestamp:type`.
    pub fn message_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.sender_id.to_hex(),
            self.timestamp_ms,
            self.packet_type
        )
    }
}

/// Pads an encoded frame to the smallest traffic-analysis block that fits.
///
/// Frames at or past the largest block get a single 0x01 byte so that unpad
/// stays invertible. A pad of zero (exact block fit) or one that cannot be
/// expressed in a PKCS#7 length byte leaves the frame unchanged.
pub fn pad_frame(mut frame: Vec<u8>) -> Vec<u8> {
    let len = frame.len();
    if len >= MAX_PADDING_BLOCK {
        frame.push(1);
        return frame;
    }
    let target = PADDING_BLOCKS
        .iter()
        .copied()
        .find(|&block| block >= len)
        .unwrap_or(MAX_PADDING_BLOCK);
    let pad = target - len;
    if pad == 0 || pad > MAX_PAD_BYTES {
        return frame;
    }
    frame.resize(target, pad as u8);
    frame
}

/// Strips PKCS#7 padding, verifying every pad byte equals the pad length.
pub fn unpad(bytes: &[u8]) -> WireResult<&[u8]> {
    let &last = bytes.last().ok_or(WireError::BadPadding)?;
    let pad = last as usize;
    if pad == 0 || pad > bytes.len() {
        return Err(WireError::BadPadding);
    }
    if !bytes[bytes.len() - pad..].iter().all(|&b| b == last) {
        return Err(WireError::BadPadding);
    }
    Ok(&bytes[..bytes.len() - pad])
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::TruncatedPayload {
                needed: n,
                have: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16_be(&mut self) -> WireResult<u16> {
        Ok(u16::from_be_bytes(self.array::<2>()?))
    }

    fn u32_be(&mut self) -> WireResult<u32> {
        Ok(u32::from_be_bytes(self.array::<4>()?))
    }

    fn u64_be(&mut self) -> WireResult<u64> {
        Ok(u64::from_be_bytes(self.array::<8>()?))
    }
}
