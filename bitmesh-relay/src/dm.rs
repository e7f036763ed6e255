//! End-to-end DM encryption over the relay transport.
//!
//! The shared secret is the x-coordinate of `priv * liftX(theirPub)` on
//! secp256k1. Content is AES-256-CBC with PKCS#7 over UTF-8, a random
//! 16-byte IV, and the transport encoding `base64(ct) + "?iv=" + base64(iv)`.

use crate::error::{RelayError, RelayResult};
use crate::schnorr::lift_x;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// ECDH: the x-coordinate of `secret * liftX(their_public)`.
pub fn shared_secret(secret: &[u8; 32], their_public_x: &[u8; 32]) -> RelayResult<[u8; 32]> {
    let d = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(*secret)))
        .filter(|scalar| *scalar != Scalar::ZERO)
        .ok_or(RelayError::InvalidKey)?;
    let their_point = lift_x(their_public_x)?;
    let shared = (ProjectivePoint::from(their_point) * d).to_affine();
    Ok(shared.x().into())
}

/// Encrypts `plaintext` for a peer. Returns the transport encoding.
pub fn encrypt(
    plaintext: &str,
    secret: &[u8; 32],
    their_public_x: &[u8; 32],
) -> RelayResult<String> {
    let key = shared_secret(secret, their_public_x)?;
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}?iv={}",
        BASE64.encode(ciphertext),
        BASE64.encode(iv)
    ))
}

/// Decrypts a transport-encoded DM payload.
pub fn decrypt(
    payload: &str,
    secret: &[u8; 32],
    their_public_x: &[u8; 32],
) -> RelayResult<String> {
    let (ciphertext_b64, iv_b64) = payload
        .split_once("?iv=")
        .ok_or(RelayError::DecryptFailed)?;
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|_| RelayError::DecryptFailed)?;
    let iv_bytes = BASE64
        .decode(iv_b64)
        .map_err(|_| RelayError::DecryptFailed)?;
    let iv: [u8; 16] = iv_bytes
        .try_into()
        .map_err(|_| RelayError::DecryptFailed)?;

    let key = shared_secret(secret, their_public_x)?;
    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| RelayError::DecryptFailed)?;
    String::from_utf8(plaintext).map_err(|_| RelayError::DecryptFailed)
}
