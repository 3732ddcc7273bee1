//! Ring-shaped write-ahead journal. Records live in a fixed region of the
//! backing file; `head` points at the oldest live byte and `tail` at the next
//! write position. Appends are batched with a single fsync; truncation only
//! happens through [`RingJournal::checkpoint`], which also publishes the new
//! pointers into a superblock.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::codec::{get_u32_len, get_u64, put_u32, put_u64};
use crate::errors::StoreError;
use crate::io::{BlockFile, byte_len};
use crate::layout::{Layout, WAL_ALIGN, align_up};
use crate::superblock::{CheckpointUpdate, Superblock, SuperblockManager};
use crate::utils::num::{u64_to_usize, usize_to_u32, usize_to_u64};

/// Record header: lsn u64, op u8, klen u32, vlen u32.
pub const WAL_HEADER: usize = 17;

/// Wire opcodes. 0 is the wrap marker and never admissible as a user
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Pad = 0,
    Set = 1,
    Del = 2,
    Get = 3,
    Check = 4,
}

impl OpCode {
    #[must_use]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Pad),
            1 => Some(Self::Set),
            2 => Some(Self::Del),
            3 => Some(Self::Get),
            4 => Some(Self::Check),
            _ => None,
        }
    }

    /// Whether replay materially changes state. Get and check records are
    /// accepted during a scan but replay as no-ops.
    #[must_use]
    pub const fn is_replayable(self) -> bool {
        matches!(self, Self::Set | Self::Del)
    }
}

/// One operation to journal.
#[derive(Debug, Clone)]
pub struct JournalOp {
    pub op: OpCode,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A decoded non-PAD record. `end` is the absolute post-record offset,
/// normalized to the journal start when it lands on the region end.
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub lsn: u64,
    pub op: OpCode,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub end: u64,
}

#[derive(Debug)]
pub struct RingJournal {
    j_start: u64,
    j_end: u64,
    head: u64,
    tail: u64,
    last_lsn: u64,
    /// lsn -> normalized post-record offset; the basis for truncation.
    offsets: BTreeMap<u64, u64>,
}

impl RingJournal {
    /// A fresh, empty journal for a newly formatted file.
    #[must_use]
    pub fn new(layout: &Layout) -> Self {
        Self {
            j_start: layout.journal_start(),
            j_end: layout.journal_end(),
            head: layout.journal_start(),
            tail: layout.journal_start(),
            last_lsn: 0,
            offsets: BTreeMap::new(),
        }
    }

    /// Adopt the pointers a superblock recorded. The LSN map is rebuilt by
    /// [`Self::recover_scan`].
    #[must_use]
    pub fn attach(layout: &Layout, sb: &Superblock) -> Self {
        Self {
            j_start: layout.journal_start(),
            j_end: layout.journal_end(),
            head: sb.j_head,
            tail: sb.j_tail,
            last_lsn: sb.checkpoint_lsn,
            offsets: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn head(&self) -> u64 {
        self.head
    }

    #[must_use]
    pub fn tail(&self) -> u64 {
        self.tail
    }

    #[must_use]
    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.j_end - self.j_start
    }

    /// Live bytes between head and tail, ring order.
    #[must_use]
    pub fn used(&self) -> u64 {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            (self.j_end - self.head) + (self.tail - self.j_start)
        }
    }

    #[must_use]
    pub fn dirty(&self) -> bool {
        self.used() > 0
    }

    /// Encoded on-disk footprint of one record.
    #[must_use]
    pub fn record_len(key_len: usize, value_len: usize) -> u64 {
        align_up(usize_to_u64(WAL_HEADER + key_len + value_len), WAL_ALIGN)
    }

    /// Append a batch: assign consecutive LSNs, wrap with a PAD when the batch
    /// would cross the region end, write each record, fsync once, then commit
    /// tail, last LSN and the offset map in memory. Returns the last LSN.
    ///
    /// A batch that does not fit fails with `WalFull` and leaves both the
    /// in-memory pointers and the disk untouched.
    ///
    /// # Errors
    /// `WalFull` when the batch does not fit; `InvalidKeySize` for an
    /// oversized key; otherwise I/O errors.
    pub fn append_many(
        &mut self,
        file: &mut BlockFile,
        ops: &[JournalOp],
    ) -> Result<u64, StoreError> {
        if ops.is_empty() {
            return Ok(self.last_lsn);
        }
        let first_lsn = self.last_lsn + 1;
        let mut records = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            records.push(encode_record(first_lsn + usize_to_u64(i), op)?);
        }
        let batch_bytes: u64 = records.iter().map(|r| byte_len(r)).sum();

        let needs_wrap = self.tail + batch_bytes > self.j_end;
        let wrap_cost = if needs_wrap { self.j_end - self.tail } else { 0 };
        let free = self.capacity() - self.used();
        // One alignment unit stays reserved so a full ring never collapses
        // into the tail == head "empty" encoding.
        if free < batch_bytes + wrap_cost + WAL_ALIGN {
            return Err(StoreError::WalFull { need: batch_bytes + wrap_cost, free });
        }

        let mut cursor = self.tail;
        if needs_wrap {
            let gap = u64_to_usize(wrap_cost).expect("journal gap fits in memory");
            let mut pad = vec![0u8; gap];
            if gap >= u64_to_usize(Self::record_len(0, 0)).unwrap_or(usize::MAX) {
                // PAD copies the last used lsn and consumes none itself.
                put_u64(&mut pad, 0, self.last_lsn);
                pad[8] = OpCode::Pad as u8;
            }
            file.write_at(cursor, &pad)?;
            trace!("journal wrap: pad {} bytes at {}", gap, cursor);
            cursor = self.j_start;
        }

        let mut ends = Vec::with_capacity(records.len());
        for (i, rec) in records.iter().enumerate() {
            file.write_at(cursor, rec)?;
            let end = cursor + byte_len(rec);
            let normalized = if end == self.j_end { self.j_start } else { end };
            ends.push((first_lsn + usize_to_u64(i), normalized));
            cursor = normalized;
        }
        file.sync()?;

        self.tail = cursor;
        self.last_lsn = first_lsn + usize_to_u64(ops.len()) - 1;
        for (lsn, end) in ends {
            self.offsets.insert(lsn, end);
        }
        Ok(self.last_lsn)
    }

    /// Decode records out of a bounded read starting at an absolute offset.
    /// PAD records advance without yielding; a truncated header or body, or
    /// an unknown opcode, ends the scan cleanly. The scanner does not wrap:
    /// a wrapped log is read with two calls.
    ///
    /// # Errors
    /// Surfaces I/O failures from the underlying read.
    pub fn scan(
        file: &mut BlockFile,
        from: u64,
        max_bytes: u64,
    ) -> Result<Vec<ScannedRecord>, StoreError> {
        let want = u64_to_usize(max_bytes).unwrap_or(usize::MAX);
        let buf = file.read_at(from, want)?;
        let mut out = Vec::new();
        let mut off = 0usize;
        while off + WAL_HEADER <= buf.len() {
            let lsn = get_u64(&buf, off);
            let raw_op = buf[off + 8];
            let klen = get_u32_len(&buf, off + 9);
            let vlen = get_u32_len(&buf, off + 13);
            let Some(rec_len) = u64_to_usize(Self::record_len(klen, vlen)) else {
                break;
            };
            let Some(rec_end) = off.checked_add(rec_len) else {
                break;
            };
            if rec_end > buf.len() {
                break; // truncated body: treated as end of log
            }
            let Some(op) = OpCode::from_u8(raw_op) else {
                break;
            };
            if op == OpCode::Pad {
                off = rec_end;
                continue;
            }
            let key = buf[off + WAL_HEADER..off + WAL_HEADER + klen].to_vec();
            let value = buf[off + WAL_HEADER + klen..off + WAL_HEADER + klen + vlen].to_vec();
            out.push(ScannedRecord { lsn, op, key, value, end: from + usize_to_u64(rec_end) });
            off = rec_end;
        }
        Ok(out)
    }

    /// Boot-time scan of the live region, in LSN order, rebuilding the
    /// in-memory LSN map and last LSN as a side effect. Handles the wrapped
    /// case with two passes.
    ///
    /// # Errors
    /// Surfaces I/O failures from the underlying reads.
    pub fn recover_scan(&mut self, file: &mut BlockFile) -> Result<Vec<ScannedRecord>, StoreError> {
        if self.used() == 0 {
            return Ok(Vec::new());
        }
        let mut records = if self.tail > self.head {
            Self::scan(file, self.head, self.tail - self.head)?
        } else {
            let mut first = Self::scan(file, self.head, self.j_end - self.head)?;
            let second = Self::scan(file, self.j_start, self.tail - self.j_start)?;
            first.extend(second);
            first
        };
        // Normalize ends that land exactly on the region end.
        for rec in &mut records {
            if rec.end == self.j_end {
                rec.end = self.j_start;
            }
            self.offsets.insert(rec.lsn, rec.end);
            if rec.lsn > self.last_lsn {
                self.last_lsn = rec.lsn;
            }
        }
        debug!("journal recover scan: {} live records, last lsn {}", records.len(), self.last_lsn);
        Ok(records)
    }

    /// Truncate everything at or below `lsn` and publish the new head through
    /// a superblock checkpoint. The only path that moves `head`.
    ///
    /// # Errors
    /// `LsnNotFound` when `lsn` is not in the offset map; otherwise surfaces
    /// superblock I/O failures.
    pub fn checkpoint(
        &mut self,
        file: &mut BlockFile,
        superblock: &mut SuperblockManager,
        lsn: u64,
    ) -> Result<(), StoreError> {
        let end = *self.offsets.get(&lsn).ok_or(StoreError::LsnNotFound(lsn))?;
        self.head = end;
        self.offsets = self.offsets.split_off(&(lsn + 1));
        superblock.checkpoint(
            file,
            CheckpointUpdate { checkpoint_lsn: lsn, j_head: self.head, j_tail: self.tail },
        )?;
        debug!("journal checkpoint: lsn {}, head {}, {} bytes live", lsn, self.head, self.used());
        Ok(())
    }
}

fn encode_record(lsn: u64, op: &JournalOp) -> Result<Vec<u8>, StoreError> {
    if op.key.len() > usize::from(u16::MAX) {
        return Err(StoreError::InvalidKeySize(op.key.len()));
    }
    let klen = usize_to_u32(op.key.len()).ok_or(StoreError::InvalidKeySize(op.key.len()))?;
    let vlen = usize_to_u32(op.value.len()).ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "value length exceeds u32",
        ))
    })?;
    let total = u64_to_usize(RingJournal::record_len(op.key.len(), op.value.len()))
        .expect("record length fits in memory");
    let mut buf = vec![0u8; total];
    put_u64(&mut buf, 0, lsn);
    buf[8] = op.op as u8;
    put_u32(&mut buf, 9, klen);
    put_u32(&mut buf, 13, vlen);
    buf[WAL_HEADER..WAL_HEADER + op.key.len()].copy_from_slice(&op.key);
    buf[WAL_HEADER + op.key.len()..WAL_HEADER + op.key.len() + op.value.len()]
        .copy_from_slice(&op.value);
    Ok(buf)
}
