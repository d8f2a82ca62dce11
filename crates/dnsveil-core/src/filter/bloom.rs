//! Pre-seeded Bloom index
//!
//! Approximate-membership structure over the bundled domain corpus. Built
//! once per install (or on demand), persisted to a small binary file, and
//! read-only at runtime. No false negatives; the false-positive rate is set
//! by the bits-per-entry ratio and hash count.

use crate::error::{Error, Result};
use crate::filter::normalize_host;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Default bits allocated per expected entry (~1% false positives at k=7)
pub const DEFAULT_BITS_PER_ENTRY: u32 = 10;

/// Default number of hash rounds
pub const DEFAULT_HASHES: u32 = 7;

/// Substitute for a zero second hash half, keeping the double-hash stride
/// nonzero and odd
const H2_FALLBACK: i32 = 0x9e3779b9u32 as i32;

/// Sanity ceiling when reading a persisted header (128 MiB of bits)
const MAX_BITS: i32 = 1 << 30;

/// Immutable Bloom filter over normalized domain names.
///
/// Persisted layout: `[i32 m][i32 k][i32 n]` big-endian, then `ceil(m/8)`
/// bytes of bit array; bit `i` lives at byte `i/8`, mask `1 << (i % 8)`.
#[derive(Debug)]
pub struct BloomIndex {
    m_bits: i32,
    k_hashes: i32,
    approx_count: i32,
    bits: Vec<u8>,
}

impl BloomIndex {
    /// Build an index from a domain iterator.
    ///
    /// `m_bits` defaults to `approx_count * DEFAULT_BITS_PER_ENTRY` and
    /// `k_hashes` to [`DEFAULT_HASHES`]. Entries are normalized before
    /// hashing; empty lines are skipped.
    pub fn build<I, S>(
        domains: I,
        approx_count: u32,
        m_bits: Option<u32>,
        k_hashes: Option<u32>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let m = m_bits.unwrap_or(approx_count.saturating_mul(DEFAULT_BITS_PER_ENTRY));
        let k = k_hashes.unwrap_or(DEFAULT_HASHES);

        if m == 0 || m as i64 > MAX_BITS as i64 {
            return Err(Error::config_value("m_bits", format!("out of range: {m}")));
        }
        if k == 0 {
            return Err(Error::config_value("k_hashes", "must be nonzero"));
        }

        let m = m as i32;
        let k = k as i32;
        let mut bits = vec![0u8; (m as usize + 7) / 8];

        let mut processed = 0u64;
        for raw in domains {
            let domain = normalize_host(raw.as_ref());
            if domain.is_empty() {
                continue;
            }
            let (h1, h2) = hash_pair(&domain);
            for i in 0..k {
                set_bit(&mut bits, index_for(h1, h2, i, m));
            }
            processed += 1;
            if processed % 50_000 == 0 {
                debug!(processed, "Bloom build progress");
            }
        }

        info!(
            m_bits = m,
            k_hashes = k,
            approx_count,
            inserted = processed,
            "Built Bloom index"
        );

        Ok(Self {
            m_bits: m,
            k_hashes: k,
            approx_count: approx_count as i32,
            bits,
        })
    }

    /// Load a persisted index.
    ///
    /// Fails on a missing file, truncated data, or an implausible header.
    /// The caller treats any error as "pre-listed tier disabled".
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let mut header = [0u8; 12];
        file.read_exact(&mut header)
            .map_err(|_| Error::BloomFormat("truncated header".to_string()))?;

        let m = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let k = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let n = i32::from_be_bytes([header[8], header[9], header[10], header[11]]);

        if m <= 0 || m > MAX_BITS {
            return Err(Error::BloomFormat(format!("implausible bit count: {m}")));
        }
        if k <= 0 {
            return Err(Error::BloomFormat(format!("implausible hash count: {k}")));
        }

        let byte_len = (m as usize + 7) / 8;
        let mut bits = vec![0u8; byte_len];
        file.read_exact(&mut bits)
            .map_err(|_| Error::BloomFormat("truncated bit array".to_string()))?;

        info!(
            path = %path.display(),
            m_bits = m,
            k_hashes = k,
            approx_count = n,
            "Loaded Bloom index"
        );

        Ok(Self {
            m_bits: m,
            k_hashes: k,
            approx_count: n,
            bits,
        })
    }

    /// Persist the index to `path` in the fixed binary layout.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path)?;
        file.write_all(&self.m_bits.to_be_bytes())?;
        file.write_all(&self.k_hashes.to_be_bytes())?;
        file.write_all(&self.approx_count.to_be_bytes())?;
        file.write_all(&self.bits)?;
        info!(path = %path.display(), bytes = self.bits.len(), "Persisted Bloom index");
        Ok(())
    }

    /// Test a host for possible membership.
    ///
    /// `false` means the host was definitely never inserted; `true` means it
    /// probably was, subject to the false-positive rate.
    pub fn query(&self, host: &str) -> bool {
        let h = normalize_host(host);
        if h.is_empty() {
            return false;
        }
        let (h1, h2) = hash_pair(&h);
        for i in 0..self.k_hashes {
            if !get_bit(&self.bits, index_for(h1, h2, i, self.m_bits)) {
                return false;
            }
        }
        true
    }

    /// Size of the bit array in bits
    pub fn bit_len(&self) -> usize {
        self.m_bits as usize
    }

    /// Number of hash rounds
    pub fn hash_count(&self) -> u32 {
        self.k_hashes as u32
    }

    /// Approximate number of entries inserted at build time
    pub fn approx_count(&self) -> u32 {
        self.approx_count.max(0) as u32
    }
}

/// Bit index for hash round `i`, using 32-bit wrapping double hashing.
fn index_for(h1: i32, h2: i32, i: i32, m: i32) -> usize {
    h1.wrapping_add(i.wrapping_mul(h2)).rem_euclid(m) as usize
}

/// Derive two 32-bit hashes from a SHA-256 digest of the host.
///
/// `h1` is bytes 0..4 and `h2` bytes 4..8, both big-endian. A zero `h2`
/// would degenerate every round to the same bit, so it is substituted.
fn hash_pair(host: &str) -> (i32, i32) {
    let digest = Sha256::digest(host.as_bytes());
    let h1 = i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let h2 = i32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
    (h1, if h2 == 0 { H2_FALLBACK } else { h2 })
}

fn get_bit(bits: &[u8], idx: usize) -> bool {
    bits[idx >> 3] & (1 << (idx & 7)) != 0
}

fn set_bit(bits: &mut [u8], idx: usize) {
    bits[idx >> 3] |= 1 << (idx & 7);
}
