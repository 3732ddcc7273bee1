//! LSM state: the live memtable, an optional frozen snapshot, the flush
//! threshold, and the recovery replay seed.

use log::{debug, info};

use crate::errors::StoreError;
use crate::io::BlockFile;
use crate::journal::RingJournal;
use crate::memtable::{FrozenMemtable, Memtable, Slot};
use crate::queue::{Dispatch, SubmitQueue};

/// How a key resolves against the in-memory layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InMemory {
    Found(String),
    Deleted,
    Unknown,
}

#[derive(Debug)]
pub struct LsmState {
    mem: Memtable,
    frozen: Option<FrozenMemtable>,
    max_size: usize,
    /// Pre-recovery last LSN, or -1 once the replay batch has been consumed.
    pub recover_flush: i64,
    seq_lo: Option<u64>,
    seq_hi: u64,
}

impl LsmState {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { mem: Memtable::new(), frozen: None, max_size, recover_flush: -1, seq_lo: None, seq_hi: 0 }
    }

    pub fn put(&mut self, key: String, value: String) {
        self.mem.insert(key, value);
    }

    pub fn delete(&mut self, key: String) {
        self.mem.insert_tombstone(key);
    }

    /// Resolve against the live memtable, then the frozen snapshot. A
    /// tombstone wins over anything older; `Unknown` sends the caller on to
    /// the on-disk tables.
    #[must_use]
    pub fn lookup(&self, key: &str) -> InMemory {
        let staged = self.mem.get(key).or_else(|| {
            self.frozen.as_ref().and_then(|f| f.get(key))
        });
        match staged {
            Some(Slot::Value(v)) => InMemory::Found(v.clone()),
            Some(Slot::Tombstone) => InMemory::Deleted,
            None => InMemory::Unknown,
        }
    }

    #[must_use]
    pub fn needs_flush(&self) -> bool {
        self.mem.len() >= self.max_size
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    /// Clone the live memtable into the frozen slot. The live table is
    /// cleared separately by the submission loop.
    pub fn freeze(&mut self) {
        debug!("freezing memtable: {} entries", self.mem.len());
        self.frozen = Some(self.mem.freeze());
    }

    #[must_use]
    pub fn frozen(&self) -> Option<&FrozenMemtable> {
        self.frozen.as_ref()
    }

    pub fn clear_live(&mut self) {
        self.mem.clear();
    }

    pub fn discard_frozen(&mut self) {
        self.frozen = None;
    }

    /// Record the journal LSN bounds of operations applied into the live
    /// memtable since the last flush.
    pub fn note_seqs(&mut self, lo: u64, hi: u64) {
        if self.seq_lo.is_none_or(|cur| lo < cur) {
            self.seq_lo = Some(lo);
        }
        if hi > self.seq_hi {
            self.seq_hi = hi;
        }
    }

    /// LSN bounds for the table about to be flushed; resets the running
    /// range.
    pub fn take_seqs(&mut self) -> (u64, u64) {
        let lo = self.seq_lo.take().unwrap_or(0);
        let hi = std::mem::take(&mut self.seq_hi);
        (lo, hi)
    }

    /// Crash recovery: scan the live journal region and enqueue every
    /// materially replayable record as a replay dispatch, in LSN order. Get
    /// and check records decode but replay as explicit no-ops. Sets
    /// `recover_flush` to the pre-recovery last LSN so the first drained
    /// batch skips the journal append.
    ///
    /// # Errors
    /// Surfaces journal scan failures; short reads end the scan cleanly
    /// inside the journal layer.
    pub fn recover(
        &mut self,
        journal: &mut RingJournal,
        file: &mut BlockFile,
        queue: &SubmitQueue,
    ) -> Result<usize, StoreError> {
        let records = journal.recover_scan(file)?;
        let mut replayed = 0usize;
        let mut lo = u64::MAX;
        let mut hi = 0u64;
        for rec in records {
            if !rec.op.is_replayable() {
                continue;
            }
            lo = lo.min(rec.lsn);
            hi = hi.max(rec.lsn);
            let key = String::from_utf8_lossy(&rec.key).into_owned();
            let value = (rec.op == crate::journal::OpCode::Set)
                .then(|| String::from_utf8_lossy(&rec.value).into_owned());
            queue.push(Dispatch::replay(rec.op, key, value));
            replayed += 1;
        }
        if replayed > 0 {
            self.recover_flush = i64::try_from(journal.last_lsn()).unwrap_or(i64::MAX);
            self.note_seqs(lo, hi);
            info!(
                "recovery: enqueued {replayed} replay dispatches, lsns {lo}..={hi}, \
                 recover_flush {}",
                self.recover_flush
            );
        }
        Ok(replayed)
    }
}
