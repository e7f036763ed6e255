//! Fundamental and derived constants for the bitmesh wire protocol.

use std::time::Duration;

// --- Frame layout ---

/// Original wire format with 16-bit payload lengths.
pub const VERSION_V1: u8 = 1;

/// Extended wire format: 32-bit payload lengths, source routes, original-size
/// field for compressed payloads.
pub const VERSION_V2: u8 = 2;

/// The size of the short peer identifier carried in every frame.
pub const PEER_ID_SIZE: usize = 8;

/// The size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Fixed header size for v1 frames: version, type, ttl, timestamp (8),
/// flags, payload length (2).
pub const HEADER_SIZE_V1: usize = 14;

/// Fixed header size for v2 frames: the payload length widens to 4 bytes.
pub const HEADER_SIZE_V2: usize = 16;

/// The maximum number of hops a v2 source route may carry (one length byte).
pub const MAX_ROUTE_HOPS: usize = 255;

// --- Flags ---

pub const FLAG_HAS_RECIPIENT: u8 = 0x01;
pub const FLAG_HAS_SIGNATURE: u8 = 0x02;
pub const FLAG_IS_COMPRESSED: u8 = 0x04;
/// v2 only.
pub const FLAG_HAS_ROUTE: u8 = 0x08;
/// Relay-sender-receipt marker. Mutable in flight, excluded from signatures.
pub const FLAG_IS_RSR: u8 = 0x10;

// --- Padding ---

/// Encoded frames are padded up to the smallest of these block sizes that
/// fits, hiding the true payload length from passive observers.
pub const PADDING_BLOCKS: [usize; 4] = [256, 512, 1024, 2048];

/// Frames at or above this size get a single 0x01 pad byte instead.
pub const MAX_PADDING_BLOCK: usize = 2048;

/// A PKCS#7 pad length must fit in one byte.
pub const MAX_PAD_BYTES: usize = 255;

// --- Fragmentation ---

/// First byte of every fragment datagram.
pub const FRAGMENT_MARKER: u8 = 0xBB;

/// Fragment header: marker (1), index (2), total (2), message id (4).
pub const FRAGMENT_HEADER_SIZE: usize = 9;

/// The smallest link MTU the fragmenter accepts: header plus one data byte.
pub const MIN_LINK_MTU: usize = FRAGMENT_HEADER_SIZE + 1;

/// Conservative default when the link has not reported a negotiated MTU.
pub const DEFAULT_LINK_MTU: usize = 182;

/// The MTU the connection manager requests from the radio.
pub const TARGET_LINK_MTU: usize = 512;

/// Reassembly slots are evicted after this much inactivity.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);

// --- Hello / negotiation ---

/// Magic prefix of the 8-byte hello frame exchanged on link establishment.
pub const HELLO_MAGIC: u16 = 0xBC01;

/// Hello frame: magic (2), version (1), min version (1), features (2),
/// reserved (2).
pub const HELLO_SIZE: usize = 8;

// --- Feature bits ---

pub const FEATURE_COMPRESSION: u16 = 1 << 0;
pub const FEATURE_NOISE: u16 = 1 << 1;
pub const FEATURE_MESH_RELAY: u16 = 1 << 2;
pub const FEATURE_STORE_FORWARD: u16 = 1 << 3;
pub const FEATURE_COVER_TRAFFIC: u16 = 1 << 4;
pub const FEATURE_RELAY_BRIDGE: u16 = 1 << 5;
pub const FEATURE_FILE_TRANSFER: u16 = 1 << 6;
pub const FEATURE_VOICE_NOTE: u16 = 1 << 7;

// --- Well-known packet types ---

/// Identity announcement: 32-byte public key followed by a UTF-8 nickname.
pub const TYPE_ANNOUNCE: u8 = 0x01;

/// A peer leaving the mesh.
pub const TYPE_LEAVE: u8 = 0x03;

/// An application chat message.
pub const TYPE_MESSAGE: u8 = 0x04;
