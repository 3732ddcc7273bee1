//! Manifest page: one block listing the sealed table blobs. The whole page is
//! rewritten on every admission; an all-zero page decodes as empty.

use crate::codec::{get_u16, get_u64, put_u16, put_u64};
use crate::codec::{get_u32, put_u32};
use crate::errors::StoreError;
use crate::layout::BLOCK_SIZE;
use crate::utils::num::{u16_to_usize, usize_to_u16};

pub const MANIFEST_HEADER_SIZE: usize = 16;
pub const MANIFEST_ENTRY_SIZE: usize = 48;

/// Entries per page: (B - 16) / 48.
pub const MANIFEST_CAP: usize = (BLOCK_SIZE - MANIFEST_HEADER_SIZE) / MANIFEST_ENTRY_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry {
    pub level: u16,
    pub meta_off: u64,
    pub meta_len: u32,
    pub min_prefix: [u8; 16],
    pub max_prefix: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPage {
    pub version: u16,
    pub epoch: u64,
    pub entries: Vec<ManifestEntry>,
}

impl ManifestPage {
    #[must_use]
    pub const fn empty() -> Self {
        Self { version: 0, epoch: 0, entries: Vec::new() }
    }

    #[must_use]
    pub fn new(version: u16, epoch: u64) -> Self {
        Self { version, epoch, entries: Vec::new() }
    }
}

/// Encode a full block image.
///
/// # Errors
/// Fails with `TooManyEntries` when the page exceeds [`MANIFEST_CAP`].
pub fn encode_page(page: &ManifestPage) -> Result<Vec<u8>, StoreError> {
    if page.entries.len() > MANIFEST_CAP {
        return Err(StoreError::TooManyEntries(page.entries.len()));
    }
    let count = usize_to_u16(page.entries.len())
        .ok_or(StoreError::TooManyEntries(page.entries.len()))?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    put_u16(&mut buf, 0, page.version);
    put_u64(&mut buf, 4, page.epoch);
    put_u16(&mut buf, 12, count);
    for (i, entry) in page.entries.iter().enumerate() {
        let base = MANIFEST_HEADER_SIZE + i * MANIFEST_ENTRY_SIZE;
        put_u16(&mut buf, base, entry.level);
        put_u64(&mut buf, base + 4, entry.meta_off);
        put_u32(&mut buf, base + 12, entry.meta_len);
        buf[base + 16..base + 32].copy_from_slice(&entry.min_prefix);
        buf[base + 32..base + 48].copy_from_slice(&entry.max_prefix);
    }
    Ok(buf)
}

/// Decode a block image.
///
/// # Errors
/// `InvalidPageSize` for a wrong-size buffer, `CountExceedsCap` when the
/// claimed count is over capacity, `Corrupt` when the claimed payload runs
/// past the page.
pub fn decode_page(buf: &[u8]) -> Result<ManifestPage, StoreError> {
    if buf.len() != BLOCK_SIZE {
        return Err(StoreError::InvalidPageSize { expected: BLOCK_SIZE, got: buf.len() });
    }
    let version = get_u16(buf, 0);
    let epoch = get_u64(buf, 4);
    let count = get_u16(buf, 12);
    if version == 0 && epoch == 0 && count == 0 {
        return Ok(ManifestPage::empty());
    }
    if u16_to_usize(count) > MANIFEST_CAP {
        return Err(StoreError::CountExceedsCap(count));
    }
    let payload_end = MANIFEST_HEADER_SIZE + u16_to_usize(count) * MANIFEST_ENTRY_SIZE;
    if payload_end > buf.len() {
        return Err(StoreError::Corrupt(format!("{count} entries run past the page")));
    }
    let mut entries = Vec::with_capacity(u16_to_usize(count));
    for i in 0..u16_to_usize(count) {
        let base = MANIFEST_HEADER_SIZE + i * MANIFEST_ENTRY_SIZE;
        let mut min_prefix = [0u8; 16];
        let mut max_prefix = [0u8; 16];
        min_prefix.copy_from_slice(&buf[base + 16..base + 32]);
        max_prefix.copy_from_slice(&buf[base + 32..base + 48]);
        entries.push(ManifestEntry {
            level: get_u16(buf, base),
            meta_off: get_u64(buf, base + 4),
            meta_len: get_u32(buf, base + 12),
            min_prefix,
            max_prefix,
        });
    }
    Ok(ManifestPage { version, epoch, entries })
}
