//! Table writer: seals a frozen memtable snapshot into an immutable blob of
//! [meta page || block index || data blocks] and admits it through the
//! manifest. The writer owns the in-memory manifest page and the `table_tail`
//! watermark for blob placement.

use std::collections::HashMap;

use log::{debug, info};
use uuid::Uuid;

use crate::codec::{cmp16, get_u16, put_u16, put_u32, sort_key16};
use crate::errors::StoreError;
use crate::io::{BlockFile, align_block, byte_len};
use crate::layout::{BLOCK_SIZE, Layout, align_up};
use crate::manifest::{MANIFEST_CAP, ManifestEntry, ManifestPage, decode_page, encode_page};
use crate::memtable::FrozenMemtable;
use crate::table::meta::{
    BlockIndexEntry, Extent, INDEX_ALIGN, TableMeta, decode_index, decode_meta, encode_index,
    encode_meta,
};
use crate::utils::num::{u32_to_usize, u64_to_usize, usize_to_u32, usize_to_u64};

/// Decoded meta plus the block index rebased to absolute offsets.
#[derive(Debug, Clone)]
pub struct TableHead {
    pub meta: TableMeta,
    pub index: Vec<BlockIndexEntry>,
}

pub struct TableWriter {
    manifest_off: u64,
    page: ManifestPage,
    /// Next free byte for a new blob.
    table_tail: u64,
    heads: HashMap<u64, TableHead>,
}

impl TableWriter {
    #[must_use]
    pub fn new(layout: &Layout) -> Self {
        Self {
            manifest_off: layout.manifest_off(),
            page: ManifestPage::empty(),
            table_tail: layout.table_region_off(),
            heads: HashMap::new(),
        }
    }

    /// Write an empty manifest page and fsync.
    ///
    /// # Errors
    /// Surfaces I/O failures.
    pub fn format_initial(
        &mut self,
        file: &mut BlockFile,
        version: u16,
        epoch: u64,
    ) -> Result<(), StoreError> {
        self.page = ManifestPage::new(version, epoch);
        let image = encode_page(&self.page)?;
        file.write_at(self.manifest_off, &image)?;
        file.sync()?;
        Ok(())
    }

    /// Decode the on-disk manifest page and accumulate the blob watermark
    /// from the admitted entries.
    ///
    /// # Errors
    /// Surfaces decode and I/O failures.
    pub fn load(&mut self, file: &mut BlockFile) -> Result<(), StoreError> {
        let buf = file.read_exact_at(self.manifest_off, BLOCK_SIZE)?;
        self.page = decode_page(&buf)?;
        let mut tail = self.manifest_off + BLOCK_SIZE as u64;
        for entry in &self.page.entries {
            tail += align_block(u64::from(entry.meta_len));
        }
        self.table_tail = tail;
        self.heads.clear();
        debug!("manifest load: {} entries, table tail {}", self.page.entries.len(), tail);
        Ok(())
    }

    #[must_use]
    pub fn manifest(&self) -> &ManifestPage {
        &self.page
    }

    #[must_use]
    pub fn table_tail(&self) -> u64 {
        self.table_tail
    }

    /// Seal a frozen snapshot into a level-0 table. Records are sorted stably
    /// by sort-key prefix, packed into block-aligned data blocks, and written
    /// as one contiguous blob; the blob is fsynced before the manifest commit
    /// that makes it visible. `seq_min`/`seq_max` are the journal LSN bounds
    /// the snapshot covers.
    ///
    /// # Errors
    /// `NeedsCompaction` when the table region cannot take the blob,
    /// `ManifestFull` at manifest capacity, `BrokenTableSize` when the
    /// composed blob disagrees with the reservation; otherwise I/O errors.
    pub fn flush_snapshot(
        &mut self,
        file: &mut BlockFile,
        snapshot: &FrozenMemtable,
        seq_min: u64,
        seq_max: u64,
    ) -> Result<ManifestEntry, StoreError> {
        let mut items: Vec<([u8; 16], &[u8], &[u8])> = snapshot
            .iter()
            .map(|(key, value)| (sort_key16(key.as_bytes()), key.as_bytes(), value))
            .collect();
        items.sort_by(|a, b| cmp16(&a.0, &b.0));

        let mut packer = BlockPacker::new();
        let mut min_prefix = [0xFFu8; 16];
        let mut max_prefix = [0u8; 16];
        for (prefix, key, value) in &items {
            if cmp16(prefix, &min_prefix).is_lt() {
                min_prefix = *prefix;
            }
            if cmp16(prefix, &max_prefix).is_gt() {
                max_prefix = *prefix;
            }
            packer.push(key, value)?;
        }
        let (blocks, index) = packer.finish();

        let index_buf = encode_index(&index);
        let index_len = usize_to_u32(index_buf.len())
            .ok_or_else(|| StoreError::Corrupt("block index exceeds u32".into()))?;
        let index_padded = align_up(byte_len(&index_buf), INDEX_ALIGN);
        let data_bytes: u64 = blocks.iter().map(|b| byte_len(b)).sum();
        let size_bytes = BLOCK_SIZE as u64 + index_padded + data_bytes;

        // The table region grows with zero fill ahead of admission; sparse
        // extension keeps this cheap.
        let meta_off = self.table_tail;
        file.ensure_size(meta_off + align_block(size_bytes))?;

        let entry_count = usize_to_u32(items.len())
            .ok_or_else(|| StoreError::Corrupt("snapshot exceeds u32 entries".into()))?;
        let meta = TableMeta {
            level: 0,
            seq_min,
            seq_max,
            size_bytes,
            block_size: BLOCK_SIZE as u32,
            index_off: meta_off + BLOCK_SIZE as u64,
            index_len,
            entry_count,
            min_key: min_prefix,
            max_key: max_prefix,
            id: Uuid::new_v4().to_string(),
            extents: vec![Extent {
                start_block: meta_off / BLOCK_SIZE as u64,
                blocks: u32::try_from(align_block(size_bytes) / BLOCK_SIZE as u64)
                    .unwrap_or(u32::MAX),
            }],
        };

        let mut blob = encode_meta(&meta)?;
        blob.extend_from_slice(&index_buf);
        blob.resize(
            u64_to_usize(BLOCK_SIZE as u64 + index_padded)
                .ok_or_else(|| StoreError::Corrupt("blob exceeds memory".into()))?,
            0,
        );
        for block in &blocks {
            blob.extend_from_slice(block);
        }
        if byte_len(&blob) != size_bytes {
            return Err(StoreError::BrokenTableSize { got: byte_len(&blob), reserved: size_bytes });
        }

        file.write_at(meta_off, &blob)?;
        file.sync()?;

        let entry = self.request_table(file, 0, size_bytes, min_prefix, max_prefix)?;
        info!(
            "flushed level-0 table {} at {}: {} records, {} blocks, prefixes {}..{}",
            meta.id,
            meta_off,
            items.len(),
            blocks.len(),
            hex::encode(&min_prefix[..4]),
            hex::encode(&max_prefix[..4]),
        );
        Ok(entry)
    }

    /// Reserve the next blob slot and admit its manifest entry. The tail
    /// advances only after the entry is accepted.
    ///
    /// # Errors
    /// `NeedsCompaction` when `size` exceeds the remaining table region,
    /// `ManifestFull` at capacity; otherwise I/O errors.
    pub fn request_table(
        &mut self,
        file: &mut BlockFile,
        level: u16,
        size: u64,
        min_prefix: [u8; 16],
        max_prefix: [u8; 16],
    ) -> Result<ManifestEntry, StoreError> {
        let left = file.size()?.saturating_sub(self.table_tail);
        if size > left {
            return Err(StoreError::NeedsCompaction { size, left });
        }
        let meta_len = u32::try_from(size)
            .map_err(|_| StoreError::Corrupt("table size exceeds u32".into()))?;
        let entry = ManifestEntry {
            level,
            meta_off: self.table_tail,
            meta_len,
            min_prefix,
            max_prefix,
        };
        self.add_entry(file, entry)?;
        self.table_tail += align_block(size);
        Ok(entry)
    }

    /// Append an entry and persist the whole manifest page. The page rewrite
    /// is the canonical persisted form.
    ///
    /// # Errors
    /// `ManifestFull` when the page is at capacity; otherwise I/O errors.
    pub fn add_entry(&mut self, file: &mut BlockFile, entry: ManifestEntry) -> Result<(), StoreError> {
        if self.page.entries.len() >= MANIFEST_CAP {
            return Err(StoreError::ManifestFull(self.page.entries.len()));
        }
        if self.page.version == 0 {
            self.page.version = 1;
        }
        self.page.entries.push(entry);
        let image = encode_page(&self.page)?;
        file.write_at(self.manifest_off, &image)?;
        file.sync()?;
        Ok(())
    }

    /// Decode the meta page and absolute-offset block index of entry `i`.
    /// Memoized by blob offset; sealed tables never mutate.
    ///
    /// # Errors
    /// `EntryNotExist` for a bad index; otherwise decode and I/O errors.
    pub fn read_head(&mut self, file: &mut BlockFile, i: usize) -> Result<TableHead, StoreError> {
        let entry = *self.page.entries.get(i).ok_or(StoreError::EntryNotExist(i))?;
        if let Some(head) = self.heads.get(&entry.meta_off) {
            return Ok(head.clone());
        }
        let meta_buf = file.read_exact_at(entry.meta_off, BLOCK_SIZE)?;
        let meta = decode_meta(&meta_buf)?;
        let index_buf = file.read_exact_at(meta.index_off, u32_to_usize(meta.index_len))?;
        let mut index = decode_index(&index_buf);
        let data_start =
            entry.meta_off + BLOCK_SIZE as u64 + align_up(u64::from(meta.index_len), INDEX_ALIGN);
        for e in &mut index {
            e.off += data_start;
        }
        let head = TableHead { meta, index };
        self.heads.insert(entry.meta_off, head.clone());
        Ok(head)
    }

    /// All heads whose meta records the requested level.
    ///
    /// # Errors
    /// Surfaces decode and I/O errors from [`Self::read_head`].
    pub fn agg_heads(
        &mut self,
        file: &mut BlockFile,
        level: u16,
    ) -> Result<Vec<TableHead>, StoreError> {
        let mut out = Vec::new();
        for i in 0..self.page.entries.len() {
            let head = self.read_head(file, i)?;
            if head.meta.level == level {
                out.push(head);
            }
        }
        Ok(out)
    }

    /// Total record count across the heads of one level.
    ///
    /// # Errors
    /// Surfaces decode and I/O errors from [`Self::agg_heads`].
    pub fn level_size(&mut self, file: &mut BlockFile, level: u16) -> Result<u64, StoreError> {
        Ok(self.agg_heads(file, level)?.iter().map(|h| u64::from(h.meta.entry_count)).sum())
    }
}

/// Packs records into block-aligned data blocks. A record never straddles a
/// block boundary; a record too large for an empty block gets an oversized
/// block of whole-block multiples to itself.
struct BlockPacker {
    blocks: Vec<Vec<u8>>,
    index: Vec<BlockIndexEntry>,
    records: Vec<u8>,
    count: u16,
    first_key: Vec<u8>,
    data_off: u64,
}

const RECORD_HEADER: usize = 6;

impl BlockPacker {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            index: Vec::new(),
            records: Vec::new(),
            count: 0,
            first_key: Vec::new(),
            data_off: 0,
        }
    }

    fn push(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if key.len() > usize::from(u16::MAX) {
            return Err(StoreError::InvalidKeySize(key.len()));
        }
        let rec_len = RECORD_HEADER + key.len() + value.len();
        if self.count > 0 && 2 + self.records.len() + rec_len > BLOCK_SIZE {
            self.seal();
        }
        if self.count == 0 {
            self.first_key = key.to_vec();
        }
        let mut header = [0u8; RECORD_HEADER];
        put_u16(&mut header, 0, usize_to_u16_clamped(key.len()));
        put_u32(
            &mut header,
            2,
            usize_to_u32(value.len()).ok_or_else(|| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "value length exceeds u32",
                ))
            })?,
        );
        self.records.extend_from_slice(&header);
        self.records.extend_from_slice(key);
        self.records.extend_from_slice(value);
        self.count += 1;
        Ok(())
    }

    fn seal(&mut self) {
        let payload = 2 + self.records.len();
        let padded = u64_to_usize(align_block(usize_to_u64(payload))).unwrap_or(payload);
        let mut block = vec![0u8; padded];
        put_u16(&mut block, 0, self.count);
        block[2..payload].copy_from_slice(&self.records);
        debug_assert_eq!(get_u16(&block, 0), self.count);
        self.index.push(BlockIndexEntry {
            first_key: std::mem::take(&mut self.first_key),
            off: self.data_off,
            len: usize_to_u32(padded).unwrap_or(u32::MAX),
        });
        self.data_off += usize_to_u64(padded);
        self.blocks.push(block);
        self.records.clear();
        self.count = 0;
    }

    fn finish(mut self) -> (Vec<Vec<u8>>, Vec<BlockIndexEntry>) {
        if self.count > 0 {
            self.seal();
        }
        (self.blocks, self.index)
    }
}

fn usize_to_u16_clamped(v: usize) -> u16 {
    crate::utils::num::usize_to_u16(v).unwrap_or(u16::MAX)
}
