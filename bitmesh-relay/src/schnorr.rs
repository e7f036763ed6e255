//! BIP-340 Schnorr signatures over secp256k1.
//!
//! X-only public keys: a 32-byte x-coordinate whose point is taken with even
//! y (`lift_x`). Nonce and challenge come from the BIP-340 tagged hashes;
//! the secret and nonce scalars are negated when their points have odd y.

use crate::error::{RelayError, RelayResult};
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::FromEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// `SHA256(SHA256(tag) || SHA256(tag) || data...)`.
pub fn tagged_hash(tag: &str, chunks: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}

/// Decompresses an x-only public key to the curve point with even y.
pub fn lift_x(x: &[u8; 32]) -> RelayResult<AffinePoint> {
    let mut sec1 = [0u8; 33];
    sec1[0] = 0x02;
    sec1[1..].copy_from_slice(x);
    let encoded =
        EncodedPoint::from_bytes(sec1).map_err(|_| RelayError::InvalidKey)?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or(RelayError::InvalidKey)
}

fn scalar_from_bytes(bytes: &[u8; 32]) -> RelayResult<Scalar> {
    let scalar =
        Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(*bytes)))
            .ok_or(RelayError::InvalidKey)?;
    if scalar == Scalar::ZERO {
        return Err(RelayError::InvalidKey);
    }
    Ok(scalar)
}

fn reduce_hash(hash: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(*hash))
}

fn x_bytes(point: &AffinePoint) -> [u8; 32] {
    point.x().into()
}

/// The x-only public key for a secret scalar.
pub fn x_only_public_key(secret: &[u8; 32]) -> RelayResult<[u8; 32]> {
    let d = scalar_from_bytes(secret)?;
    let point = (ProjectivePoint::GENERATOR * d).to_affine();
    Ok(x_bytes(&point))
}

/// Signs a 32-byte message per BIP-340.
pub fn sign(message: &[u8; 32], secret: &[u8; 32], aux: &[u8; 32]) -> RelayResult<[u8; 64]> {
    let d0 = scalar_from_bytes(secret)?;
    let public = (ProjectivePoint::GENERATOR * d0).to_affine();
    let d = if bool::from(public.y_is_odd()) { -d0 } else { d0 };
    let px = x_bytes(&public);

    // t = d XOR taggedHash("BIP0340/aux", aux)
    let aux_hash = tagged_hash("BIP0340/aux", &[aux]);
    let d_bytes: [u8; 32] = d.to_bytes().into();
    let mut t = [0u8; 32];
    for (out, (a, b)) in t.iter_mut().zip(d_bytes.iter().zip(aux_hash.iter())) {
        *out = a ^ b;
    }

    let nonce_hash = tagged_hash("BIP0340/nonce", &[&t, &px, message]);
    let k0 = reduce_hash(&nonce_hash);
    if k0 == Scalar::ZERO {
        return Err(RelayError::SignatureInvalid);
    }

    let r_point = (ProjectivePoint::GENERATOR * k0).to_affine();
    let k = if bool::from(r_point.y_is_odd()) { -k0 } else { k0 };
    let rx = x_bytes(&r_point);

    let challenge = tagged_hash("BIP0340/challenge", &[&rx, &px, message]);
    let e = reduce_hash(&challenge);
    let s = k + e * d;

    let mut signature = [0u8; 64];
    signature[..32].copy_from_slice(&rx);
    signature[32..].copy_from_slice(&s.to_bytes());
    Ok(signature)
}

/// Verifies a BIP-340 signature: `R = s*G - e*P` must be a non-infinite
/// point with even y whose x-coordinate matches the signature's first half.
pub fn verify(message: &[u8; 32], signature: &[u8; 64], public_x: &[u8; 32]) -> bool {
    let Ok(p) = lift_x(public_x) else {
        return false;
    };
    let r_bytes: [u8; 32] = signature[..32].try_into().expect("32-byte half");
    let s_bytes: [u8; 32] = signature[32..].try_into().expect("32-byte half");
    let Some(s) = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(s_bytes))) else {
        return false;
    };

    let challenge = tagged_hash("BIP0340/challenge", &[&r_bytes, public_x, message]);
    let e = reduce_hash(&challenge);

    let r_point =
        ProjectivePoint::GENERATOR * s - ProjectivePoint::from(p) * e;
    if r_point == ProjectivePoint::IDENTITY {
        return false;
    }
    let r_affine = r_point.to_affine();
    if bool::from(r_affine.y_is_odd()) {
        return false;
    }
    bool::from(x_bytes(&r_affine).ct_eq(&r_bytes))
}
