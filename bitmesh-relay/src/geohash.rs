//! Base-32 geohash encoding for relay scoping.
//!
//! A geohash names a latitude/longitude rectangle; longer hashes are finer.
//! Scoped publishes match a relay when one geohash is a prefix of the other.

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Encodes a coordinate at the given precision (characters).
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> String {
    let mut lat = (-90.0f64, 90.0f64);
    let mut lon = (-180.0f64, 180.0f64);
    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut index = 0usize;
    let mut bit = 0u8;

    while hash.len() < precision {
        if even_bit {
            let mid = (lon.0 + lon.1) / 2.0;
            if longitude >= mid {
                index = (index << 1) | 1;
                lon.0 = mid;
            } else {
                index <<= 1;
                lon.1 = mid;
            }
        } else {
            let mid = (lat.0 + lat.1) / 2.0;
            if latitude >= mid {
                index = (index << 1) | 1;
                lat.0 = mid;
            } else {
                index <<= 1;
                lat.1 = mid;
            }
        }
        even_bit = !even_bit;
        bit += 1;
        if bit == 5 {
            hash.push(BASE32[index] as char);
            bit = 0;
            index = 0;
        }
    }
    hash
}

/// Decodes a geohash to the center of its rectangle. Returns `None` on
/// characters outside the base-32 alphabet.
pub fn decode(hash: &str) -> Option<(f64, f64)> {
    let mut lat = (-90.0f64, 90.0f64);
    let mut lon = (-180.0f64, 180.0f64);
    let mut even_bit = true;

    for ch in hash.bytes() {
        let index = BASE32.iter().position(|&c| c == ch.to_ascii_lowercase())?;
        for shift in (0..5).rev() {
            let bit = (index >> shift) & 1;
            if even_bit {
                let mid = (lon.0 + lon.1) / 2.0;
                if bit == 1 {
                    lon.0 = mid;
                } else {
                    lon.1 = mid;
                }
            } else {
                let mid = (lat.0 + lat.1) / 2.0;
                if bit == 1 {
                    lat.0 = mid;
                } else {
                    lat.1 = mid;
                }
            }
            even_bit = !even_bit;
        }
    }
    Some(((lat.0 + lat.1) / 2.0, (lon.0 + lon.1) / 2.0))
}

/// Whether a relay's advertised geohash intersects any of the target scopes.
///
/// An empty scope list means "everywhere"; otherwise prefix containment in
/// either direction counts (a city-level publish reaches a neighborhood
/// relay and vice versa).
pub fn scopes_intersect(relay_geohash: &str, scopes: &[&str]) -> bool {
    if scopes.is_empty() {
        return true;
    }
    scopes
        .iter()
        .any(|scope| relay_geohash.starts_with(scope) || scope.starts_with(relay_geohash))
}
