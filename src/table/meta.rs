use crate::codec::{get_u16, get_u16_len, get_u32, get_u32_len, get_u64};
use crate::codec::{put_u16, put_u32, put_u64};
use crate::errors::StoreError;
use crate::layout::BLOCK_SIZE;
use crate::utils::num::{u32_to_usize, usize_to_u16, usize_to_u32, usize_to_u64};

/// Fixed part of the meta page before the id and extent list.
const META_FIXED: usize = 84;

/// The on-disk index region is padded to this alignment.
pub const INDEX_ALIGN: u64 = 8;

/// A contiguous run of blocks backing part of a table blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start_block: u64,
    pub blocks: u32,
}

/// Decoded table meta page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub level: u16,
    pub seq_min: u64,
    pub seq_max: u64,
    pub size_bytes: u64,
    pub block_size: u32,
    /// Absolute offset of the block index.
    pub index_off: u64,
    /// Unpadded index length.
    pub index_len: u32,
    pub entry_count: u32,
    pub min_key: [u8; 16],
    pub max_key: [u8; 16],
    pub id: String,
    pub extents: Vec<Extent>,
}

/// Encode the meta page into a full block image.
///
/// # Errors
/// Fails when the id and extent list overflow the page.
pub fn encode_meta(meta: &TableMeta) -> Result<Vec<u8>, StoreError> {
    let id = meta.id.as_bytes();
    let id_len = usize_to_u16(id.len()).ok_or(StoreError::TruncatedId(id.len()))?;
    let total = META_FIXED + id.len() + meta.extents.len() * 12;
    if total > BLOCK_SIZE {
        return Err(StoreError::Corrupt(format!("meta page needs {total} bytes")));
    }
    let mut buf = vec![0u8; BLOCK_SIZE];
    put_u16(&mut buf, 0, id_len);
    put_u16(&mut buf, 2, meta.level);
    put_u64(&mut buf, 4, meta.seq_min);
    put_u64(&mut buf, 12, meta.seq_max);
    put_u64(&mut buf, 20, meta.size_bytes);
    put_u32(&mut buf, 28, meta.block_size);
    put_u64(&mut buf, 32, meta.index_off);
    put_u32(&mut buf, 40, meta.index_len);
    put_u32(&mut buf, 44, meta.entry_count);
    buf[48..64].copy_from_slice(&meta.min_key);
    buf[64..80].copy_from_slice(&meta.max_key);
    let extent_count =
        usize_to_u32(meta.extents.len()).ok_or(StoreError::TruncatedExtents(u32::MAX))?;
    put_u32(&mut buf, 80, extent_count);
    buf[META_FIXED..META_FIXED + id.len()].copy_from_slice(id);
    let mut off = META_FIXED + id.len();
    for extent in &meta.extents {
        put_u64(&mut buf, off, extent.start_block);
        put_u32(&mut buf, off + 8, extent.blocks);
        off += 12;
    }
    Ok(buf)
}

/// Decode a meta page.
///
/// # Errors
/// `TruncatedId` or `TruncatedExtents` when the variable tail runs past the
/// buffer.
pub fn decode_meta(buf: &[u8]) -> Result<TableMeta, StoreError> {
    if buf.len() < META_FIXED {
        return Err(StoreError::ShortRead { offset: 0, wanted: META_FIXED, got: buf.len() });
    }
    let id_len = get_u16_len(buf, 0);
    let id_end = META_FIXED + id_len;
    if id_end > buf.len() {
        return Err(StoreError::TruncatedId(id_len));
    }
    let extent_count = get_u32(buf, 80);
    let extents_end = id_end + u32_to_usize(extent_count) * 12;
    if extents_end > buf.len() {
        return Err(StoreError::TruncatedExtents(extent_count));
    }
    let mut min_key = [0u8; 16];
    let mut max_key = [0u8; 16];
    min_key.copy_from_slice(&buf[48..64]);
    max_key.copy_from_slice(&buf[64..80]);
    let id = String::from_utf8_lossy(&buf[META_FIXED..id_end]).into_owned();
    let mut extents = Vec::with_capacity(u32_to_usize(extent_count));
    let mut off = id_end;
    for _ in 0..extent_count {
        extents.push(Extent { start_block: get_u64(buf, off), blocks: get_u32(buf, off + 8) });
        off += 12;
    }
    Ok(TableMeta {
        level: get_u16(buf, 2),
        seq_min: get_u64(buf, 4),
        seq_max: get_u64(buf, 12),
        size_bytes: get_u64(buf, 20),
        block_size: get_u32(buf, 28),
        index_off: get_u64(buf, 32),
        index_len: get_u32(buf, 40),
        entry_count: get_u32(buf, 44),
        min_key,
        max_key,
        id,
        extents,
    })
}

/// Block index entry as stored: the referenced block's first raw key, its
/// offset relative to the data-region start, and its padded length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub first_key: Vec<u8>,
    pub off: u64,
    pub len: u32,
}

const INDEX_ENTRY_HEADER: usize = 14;

/// Encode the unpadded index buffer.
#[must_use]
pub fn encode_index(entries: &[BlockIndexEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in entries {
        let mut header = [0u8; INDEX_ENTRY_HEADER];
        let key_len = usize_to_u16(entry.first_key.len()).unwrap_or(u16::MAX);
        put_u16(&mut header, 0, key_len);
        put_u64(&mut header, 2, entry.off);
        put_u32(&mut header, 10, entry.len);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&entry.first_key);
    }
    debug_assert_eq!(
        usize_to_u64(buf.len()),
        entries.iter().map(|e| usize_to_u64(INDEX_ENTRY_HEADER + e.first_key.len())).sum::<u64>()
    );
    buf
}

/// Decode index entries, tolerating a zero-padded tail.
#[must_use]
pub fn decode_index(buf: &[u8]) -> Vec<BlockIndexEntry> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + INDEX_ENTRY_HEADER <= buf.len() {
        let key_len = get_u16_len(buf, off);
        let block_off = get_u64(buf, off + 2);
        let block_len = get_u32_len(buf, off + 10);
        if block_len == 0 {
            break; // padding
        }
        let key_end = off + INDEX_ENTRY_HEADER + key_len;
        if key_end > buf.len() {
            break;
        }
        out.push(BlockIndexEntry {
            first_key: buf[off + INDEX_ENTRY_HEADER..key_end].to_vec(),
            off: block_off,
            len: get_u32(buf, off + 10),
        });
        off = key_end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_round_trips() {
        let meta = TableMeta {
            level: 0,
            seq_min: 1,
            seq_max: 9,
            size_bytes: 12_288,
            block_size: BLOCK_SIZE as u32,
            index_off: 1_056_768 + 4096,
            index_len: 27,
            entry_count: 8,
            min_key: [1; 16],
            max_key: [9; 16],
            id: "0f4e1f5c-2c57-4bb4-9c71-1f13a1a2b3c4".to_string(),
            extents: vec![Extent { start_block: 258, blocks: 3 }],
        };
        let buf = encode_meta(&meta).unwrap();
        assert_eq!(buf.len(), BLOCK_SIZE);
        assert_eq!(decode_meta(&buf).unwrap(), meta);
    }

    #[test]
    fn truncated_tails_are_detected() {
        let meta = TableMeta {
            level: 0,
            seq_min: 0,
            seq_max: 0,
            size_bytes: 0,
            block_size: BLOCK_SIZE as u32,
            index_off: 0,
            index_len: 0,
            entry_count: 0,
            min_key: [0; 16],
            max_key: [0; 16],
            id: "t".to_string(),
            extents: vec![],
        };
        let buf = encode_meta(&meta).unwrap();
        // Claim a longer id than the page holds.
        let mut bad = buf.clone();
        put_u16(&mut bad, 0, u16::MAX);
        assert!(matches!(decode_meta(&bad).unwrap_err(), StoreError::TruncatedId(_)));
        // Claim more extents than the page holds.
        let mut bad = buf;
        put_u32(&mut bad, 80, 100_000);
        assert!(matches!(decode_meta(&bad).unwrap_err(), StoreError::TruncatedExtents(100_000)));
    }

    #[test]
    fn index_tolerates_padded_tail() {
        let entries = vec![
            BlockIndexEntry { first_key: b"apple".to_vec(), off: 0, len: 4096 },
            BlockIndexEntry { first_key: b"pear".to_vec(), off: 4096, len: 4096 },
        ];
        let mut buf = encode_index(&entries);
        let unpadded = buf.len();
        buf.resize(unpadded + 7, 0);
        assert_eq!(decode_index(&buf), entries);
        assert_eq!(decode_index(&buf[..unpadded]), entries);
    }
}
