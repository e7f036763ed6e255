//! The secp256k1 keypair used for relay event authorship and DMs.

use crate::error::{RelayError, RelayResult};
use crate::schnorr;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

pub struct RelayKeys {
    secret: [u8; 32],
    public_x: [u8; 32],
}

impl RelayKeys {
    pub fn generate() -> Self {
        loop {
            let mut secret = [0u8; 32];
            OsRng.fill_bytes(&mut secret);
            if let Ok(keys) = Self::from_secret(secret) {
                return keys;
            }
        }
    }

    /// Restores a keypair; fails on zero or out-of-range secrets.
    pub fn from_secret(secret: [u8; 32]) -> RelayResult<Self> {
        let public_x = schnorr::x_only_public_key(&secret)?;
        Ok(Self { secret, public_x })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The x-only public key.
    pub fn public_x(&self) -> &[u8; 32] {
        &self.public_x
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public_x)
    }

    /// BIP-340 signature over a 32-byte digest with fresh auxiliary
    /// randomness.
    pub fn sign(&self, message: &[u8; 32]) -> RelayResult<[u8; 64]> {
        let mut aux = [0u8; 32];
        OsRng.fill_bytes(&mut aux);
        schnorr::sign(message, &self.secret, &aux)
    }
}

impl Drop for RelayKeys {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for RelayKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RelayKeys({})", self.public_hex())
    }
}
