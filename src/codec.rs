//! Wire primitives: little-endian integer helpers at explicit offsets and the
//! 16-byte sort-key derivation used to order records across tables.

use blake2::{Blake2b512, Digest};

use crate::errors::StoreError;
use crate::utils::num::{u16_to_usize, u32_to_usize};

/// First 16 bytes of blake2b-512 over the raw key. Stable across runs;
/// persisted tables lock the function in.
#[must_use]
pub fn sort_key16(key: &[u8]) -> [u8; 16] {
    let digest = Blake2b512::digest(key);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Bytewise lexicographic comparison of two 16-byte prefixes.
#[must_use]
pub fn cmp16(a: &[u8; 16], b: &[u8; 16]) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Borrow a 16-byte prefix out of an arbitrary slice.
///
/// # Errors
/// Returns `InvalidPrefixSize` when the slice is not exactly 16 bytes.
pub fn prefix16(bytes: &[u8]) -> Result<[u8; 16], StoreError> {
    <[u8; 16]>::try_from(bytes).map_err(|_| StoreError::InvalidPrefixSize(bytes.len()))
}

pub fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[must_use]
pub fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

#[must_use]
pub fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[must_use]
pub fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

/// `get_u16` widened for use as a length.
#[must_use]
pub fn get_u16_len(buf: &[u8], off: usize) -> usize {
    u16_to_usize(get_u16(buf, off))
}

/// `get_u32` widened for use as a length.
#[must_use]
pub fn get_u32_len(buf: &[u8], off: usize) -> usize {
    u32_to_usize(get_u32(buf, off))
}
