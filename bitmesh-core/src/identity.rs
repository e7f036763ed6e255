//! The node's long-lived Ed25519 identity and the keys derived from it.
//!
//! The 32-byte Ed25519 seed is the only persistent secret. The short peer id
//! carried in every frame is the first 8 bytes of the public key; the
//! fingerprint shown to users is the SHA-256 of the full key. An X25519 key
//! pair for key exchange is derived deterministically from the same seed.

use bitmesh_wire::packet::PacketSignature;
use bitmesh_wire::PeerId;
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidKey,
}

/// Converts an Ed25519 secret seed to an X25519 secret scalar.
/// This follows the standard RFC 8032 and libsodium conversion: hash the
/// seed with SHA-512 and clamp the low 32 bytes.
fn x25519_scalar_from_seed(seed: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(seed);
    let hash = hasher.finalize();
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&hash[0..32]);

    // Clamping
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;

    scalar
}

/// Converts a peer's Ed25519 public key to its X25519 counterpart, for key
/// exchange with identities announced over the mesh.
pub fn ed25519_pk_to_x25519(ed_pk: &[u8; 32]) -> Option<[u8; 32]> {
    let ed_point = CompressedEdwardsY(*ed_pk).decompress()?;
    Some(ed_point.to_montgomery().0)
}

/// The local node identity.
pub struct MeshIdentity {
    signing: SigningKey,
    x25519: StaticSecret,
}

impl MeshIdentity {
    /// Generates a fresh identity from the system RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Restores an identity from a persisted 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let x25519 = StaticSecret::from(x25519_scalar_from_seed(&seed));
        Self { signing, x25519 }
    }

    /// The seed to persist in the host's secure store.
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// The derived X25519 public key.
    pub fn x25519_public(&self) -> [u8; 32] {
        XPublicKey::from(&self.x25519).to_bytes()
    }

    /// X25519 key agreement with a peer's X25519 public key.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> Zeroizing<[u8; 32]> {
        let shared = self
            .x25519
            .diffie_hellman(&XPublicKey::from(*their_public));
        Zeroizing::new(*shared.as_bytes())
    }

    /// The 8-byte short id carried in frames.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_slice(&self.public_key_bytes()[..8])
    }

    /// SHA-256 of the public key, rendered as colon-separated hex pairs.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.public_key_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> PacketSignature {
        PacketSignature::from(self.signing.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for MeshIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MeshIdentity({})", self.peer_id())
    }
}

/// Renders any Ed25519 public key as a user-facing fingerprint.
pub fn fingerprint_of(public_key: &[u8; 32]) -> String {
    let digest = Sha256::digest(public_key);
    let pairs: Vec<String> = digest.iter().map(|b| format!("{:02x}", b)).collect();
    pairs.join(":")
}

/// Verifies a detached signature against a peer's public key.
pub fn verify(
    message: &[u8],
    signature: &PacketSignature,
    public_key: &[u8; 32],
) -> Result<(), IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|_| IdentityError::InvalidKey)?;
    let signature = DalekSignature::from_bytes(signature.as_bytes());
    verifying_key
        .verify(message, &signature)
        .map_err(|_| IdentityError::InvalidSignature)
}
