pub mod constants;
pub mod error;
pub mod fragment;
pub mod hello;
pub mod packet;

pub use error::{WireError, WireResult};
pub use fragment::{Fragmenter, Ingest, Reassembler};
pub use hello::Hello;
pub use packet::{Packet, PacketSignature};

/// Declares a fixed-size byte identifier with hex-rendered `Debug`/`Display`.
#[macro_export]
macro_rules! wire_newtype {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, ")")
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(inner: [u8; $len]) -> Self {
                Self(inner)
            }
        }

        impl AsRef<[u8; $len]> for $name {
            fn as_ref(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }
    };
}

wire_newtype!(
    PeerId,
    8,
    "The short peer identifier: the first 8 bytes of an Ed25519 public key."
);

impl PeerId {
    /// Builds a peer id from arbitrary bytes, zero-padding or truncating to 8.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut id = [0u8; 8];
        let n = bytes.len().min(8);
        id[..n].copy_from_slice(&bytes[..n]);
        Self(id)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
