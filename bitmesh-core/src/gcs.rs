//! Golomb-coded set: a compact probabilistic set for sync reconciliation.
//!
//! Each element id is hashed into `[0, n*M)` where `M = 2^P`; the sorted
//! hashes are delta-encoded and each delta Rice-coded (unary quotient, `P`
//! binary remainder bits), packed MSB-first. Querying walks the bitstream
//! accumulating deltas, so membership costs one linear scan and false
//! positives occur at a rate of about `1/M`.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcsError {
    #[error("golomb parameter out of range (1..=32)")]
    InvalidParameter,
}

/// A built filter: parameter, element count, and the Rice-coded bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsFilter {
    p: u8,
    n: u32,
    data: Vec<u8>,
}

impl GcsFilter {
    /// Builds a filter over `ids` with false-positive rate ~= `1 / 2^p`.
    pub fn build<I, T>(ids: I, p: u8) -> Result<Self, GcsError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        if p == 0 || p > 32 {
            return Err(GcsError::InvalidParameter);
        }

        let ids: Vec<T> = ids.into_iter().collect();
        let n = ids.len() as u32;
        if n == 0 {
            return Ok(Self {
                p,
                n: 0,
                data: Vec::new(),
            });
        }

        let modulus = (n as u64) * (1u64 << p);
        let mut hashes: Vec<u64> = ids
            .iter()
            .map(|id| hash_to_range(id.as_ref(), modulus))
            .collect();
        hashes.sort_unstable();

        let mut writer = BitWriter::new();
        let mut previous = 0u64;
        for hash in hashes {
            let delta = hash - previous;
            previous = hash;
            writer.write_unary((delta >> p) as u32);
            writer.write_bits(delta & ((1u64 << p) - 1), p);
        }

        Ok(Self {
            p,
            n,
            data: writer.finish(),
        })
    }

    /// Reconstructs a filter received from a peer.
    pub fn from_parts(p: u8, n: u32, data: Vec<u8>) -> Result<Self, GcsError> {
        if p == 0 || p > 32 {
            return Err(GcsError::InvalidParameter);
        }
        Ok(Self { p, n, data })
    }

    /// Probabilistic membership: never false for an inserted id.
    pub fn might_contain(&self, id: &[u8]) -> bool {
        if self.n == 0 {
            return false;
        }
        let modulus = (self.n as u64) * (1u64 << self.p);
        let target = hash_to_range(id, modulus);

        let mut reader = BitReader::new(&self.data);
        let mut accumulated = 0u64;
        for _ in 0..self.n {
            let quotient = match reader.read_unary() {
                Some(q) => q,
                None => return false,
            };
            let remainder = match reader.read_bits(self.p) {
                Some(r) => r,
                None => return false,
            };
            accumulated += ((quotient as u64) << self.p) | remainder;
            if accumulated == target {
                return true;
            }
            if accumulated > target {
                return false;
            }
        }
        false
    }

    pub fn p(&self) -> u8 {
        self.p
    }

    pub fn len(&self) -> u32 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn false_positive_rate(&self) -> f64 {
        1.0 / (1u64 << self.p) as f64
    }
}

/// `u64(SHA256(id)[0..8]) mod modulus`, big-endian.
fn hash_to_range(id: &[u8], modulus: u64) -> u64 {
    let digest = Sha256::digest(id);
    let word = u64::from_be_bytes(digest[0..8].try_into().expect("8-byte slice"));
    word % modulus
}

struct BitWriter {
    out: Vec<u8>,
    current: u8,
    used: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            current: 0,
            used: 0,
        }
    }

    fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.used += 1;
        if self.used == 8 {
            self.out.push(self.current);
            self.current = 0;
            self.used = 0;
        }
    }

    /// `quotient` 1-bits followed by a terminating 0-bit.
    fn write_unary(&mut self, quotient: u32) {
        for _ in 0..quotient {
            self.write_bit(true);
        }
        self.write_bit(false);
    }

    /// The low `count` bits of `value`, most significant first.
    fn write_bits(&mut self, value: u64, count: u8) {
        for shift in (0..count).rev() {
            self.write_bit((value >> shift) & 1 == 1);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.out.push(self.current << (8 - self.used));
        }
        self.out
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Option<bool> {
        let byte = self.data.get(self.pos / 8)?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        Some(bit)
    }

    fn read_unary(&mut self) -> Option<u32> {
        let mut quotient = 0u32;
        while self.read_bit()? {
            quotient += 1;
        }
        Some(quotient)
    }

    fn read_bits(&mut self, count: u8) -> Option<u64> {
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Some(value)
    }
}
