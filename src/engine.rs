//! The submission loop: the sole mutator of persistent state. One iteration
//! drains a batch from the queue and drives it through journal append,
//! superblock checkpoint, apply, and a possible freeze + flush + truncate,
//! in that order. Batches are strictly ordered; applies yield to the
//! scheduler between operations so incoming dispatches can enqueue.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::task::yield_now;

use crate::codec::{cmp16, sort_key16};
use crate::config::Options;
use crate::errors::StoreError;
use crate::io::BlockFile;
use crate::journal::{JournalOp, OpCode, RingJournal};
use crate::layout::Layout;
use crate::lsm::{InMemory, LsmState};
use crate::manifest::ManifestPage;
use crate::queue::{Dispatch, SubmitQueue};
use crate::superblock::{CheckpointUpdate, Superblock, SuperblockManager};
use crate::table::{TableHead, TableReader, TableWriter};

pub struct Engine {
    file: BlockFile,
    layout: Layout,
    opts: Options,
    superblock: SuperblockManager,
    journal: RingJournal,
    tables: TableWriter,
    lsm: LsmState,
    queue: SubmitQueue,
}

impl Engine {
    /// Open the database file, formatting it when new and recovering from the
    /// journal when not. Recovery enqueues replay dispatches; they are
    /// consumed by the first loop iteration.
    ///
    /// # Errors
    /// Superblock-load failure prevents startup; other persistent-state
    /// errors surface unchanged.
    pub fn open(path: &Path, opts: Options) -> Result<Self, StoreError> {
        let layout = opts.layout();
        let mut file = BlockFile::open(path)?;
        let mut superblock = SuperblockManager::new();
        let mut tables = TableWriter::new(&layout);
        let mut lsm = LsmState::new(opts.memtable_max);
        let queue = SubmitQueue::new();

        let fresh = file.size()? < layout.table_region_off();
        let journal = if fresh {
            file.ensure_size(layout.table_region_off())?;
            superblock.format_initial(&mut file, layout.journal_start(), 1)?;
            tables.format_initial(&mut file, 1, 1)?;
            info!(
                "formatted {} ({} journal blocks)",
                path.display(),
                layout.journal_bytes() / crate::layout::BLOCK_SIZE as u64
            );
            RingJournal::new(&layout)
        } else {
            let sb = superblock.load(&mut file)?;
            tables.load(&mut file)?;
            let mut journal = RingJournal::attach(&layout, &sb);
            let replayed = lsm.recover(&mut journal, &mut file, &queue)?;
            info!("opened {} with {} replay dispatches pending", path.display(), replayed);
            journal
        };

        Ok(Self { file, layout, opts, superblock, journal, tables, lsm, queue })
    }

    /// Cloneable handle for producers.
    #[must_use]
    pub fn queue(&self) -> SubmitQueue {
        self.queue.clone()
    }

    pub fn submit(&self, dispatch: Dispatch) {
        self.queue.push(dispatch);
    }

    /// Drive iterations until the wall-clock budget elapses, yielding when
    /// the queue is empty. State is left consistent at expiry; in-progress
    /// batches run to completion.
    ///
    /// # Errors
    /// Persistent-state errors (journal full, table region exhausted, I/O)
    /// are fatal for the loop and surface to the driver.
    pub async fn run_for(&mut self, budget: Duration) -> Result<(), StoreError> {
        let deadline = Instant::now() + budget;
        loop {
            let batch = self.queue.take_batch(self.opts.max_inflight);
            if batch.is_empty() {
                if Instant::now() >= deadline {
                    return Ok(());
                }
                yield_now().await;
                continue;
            }
            self.process_batch(batch).await?;
            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    /// One batch through the full state machine: received, journaled,
    /// superblock-advanced, applied, possibly frozen + flushed +
    /// journal-truncated, completed.
    async fn process_batch(&mut self, mut batch: Vec<Dispatch>) -> Result<(), StoreError> {
        if self.lsm.recover_flush > 0 {
            // Replayed operations are already in the journal.
            self.lsm.recover_flush = -1;
            debug!("replay batch of {} ops, journal append skipped", batch.len());
        } else {
            let ops: Vec<JournalOp> = batch.iter().map(to_journal_op).collect();
            let first_lsn = self.journal.last_lsn() + 1;
            let last_lsn = self.journal.append_many(&mut self.file, &ops)?;
            self.lsm.note_seqs(first_lsn, last_lsn);
        }

        self.superblock.checkpoint(
            &mut self.file,
            CheckpointUpdate {
                checkpoint_lsn: self.journal.last_lsn(),
                j_head: self.journal.head(),
                j_tail: self.journal.tail(),
            },
        )?;

        for dispatch in &mut batch {
            self.apply(dispatch)?;
            yield_now().await;
        }

        if self.lsm.needs_flush() {
            self.flush_memtable()?;
        }
        Ok(())
    }

    fn apply(&mut self, dispatch: &mut Dispatch) -> Result<(), StoreError> {
        match dispatch.op {
            OpCode::Set => {
                let value = dispatch.value.clone().unwrap_or_default();
                self.lsm.put(dispatch.key.clone(), value);
                dispatch.complete(String::new());
            }
            OpCode::Del => {
                self.lsm.delete(dispatch.key.clone());
                dispatch.complete(String::new());
            }
            OpCode::Get => {
                let value = self.lookup(&dispatch.key)?;
                dispatch.complete(value);
            }
            OpCode::Check => {
                if self.journal.dirty() {
                    let lsn = self.journal.last_lsn();
                    self.journal.checkpoint(&mut self.file, &mut self.superblock, lsn)?;
                }
                dispatch.complete(String::new());
            }
            // The wrap marker is never admissible as a user operation.
            OpCode::Pad => dispatch.complete(String::new()),
        }
        Ok(())
    }

    /// Freeze the live memtable, seal the snapshot as a level-0 table, then
    /// truncate the journal past everything the table now covers.
    fn flush_memtable(&mut self) -> Result<(), StoreError> {
        self.lsm.freeze();
        self.lsm.clear_live();
        let (seq_min, seq_max) = self.lsm.take_seqs();
        if let Some(frozen) = self.lsm.frozen() {
            self.tables.flush_snapshot(&mut self.file, frozen, seq_min, seq_max)?;
        }
        self.lsm.discard_frozen();
        if self.journal.dirty() {
            let lsn = self.journal.last_lsn();
            self.journal.checkpoint(&mut self.file, &mut self.superblock, lsn)?;
        }
        Ok(())
    }

    /// Read cascade: live memtable, frozen snapshot, then level-0 tables
    /// newest-first. Absent keys resolve to the empty string.
    fn lookup(&mut self, key: &str) -> Result<String, StoreError> {
        match self.lsm.lookup(key) {
            InMemory::Found(v) => return Ok(v),
            InMemory::Deleted => return Ok(String::new()),
            InMemory::Unknown => {}
        }
        let prefix = sort_key16(key.as_bytes());
        let heads = self.tables.agg_heads(&mut self.file, 0)?;
        for head in heads.iter().rev() {
            if cmp16(&prefix, &head.meta.min_key).is_lt()
                || cmp16(&prefix, &head.meta.max_key).is_gt()
            {
                continue;
            }
            let mut reader = TableReader::new(head.clone());
            while let Some((k, v)) = reader.next(&mut self.file)? {
                if k == key.as_bytes() {
                    return Ok(String::from_utf8_lossy(v).into_owned());
                }
            }
        }
        Ok(String::new())
    }

    // Read-only views used by the facade and tests.

    #[must_use]
    pub fn journal(&self) -> &RingJournal {
        &self.journal
    }

    #[must_use]
    pub fn superblock(&self) -> Option<&Superblock> {
        self.superblock.current()
    }

    #[must_use]
    pub fn manifest(&self) -> &ManifestPage {
        self.tables.manifest()
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.lsm.memtable_len()
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Heads of the requested level, in admission order.
    ///
    /// # Errors
    /// Surfaces decode and I/O errors.
    pub fn level_heads(&mut self, level: u16) -> Result<Vec<TableHead>, StoreError> {
        self.tables.agg_heads(&mut self.file, level)
    }

    /// Total record count across one level.
    ///
    /// # Errors
    /// Surfaces decode and I/O errors.
    pub fn level_size(&mut self, level: u16) -> Result<u64, StoreError> {
        self.tables.level_size(&mut self.file, level)
    }
}

fn to_journal_op(dispatch: &Dispatch) -> JournalOp {
    JournalOp {
        op: dispatch.op,
        key: dispatch.key.clone().into_bytes(),
        value: dispatch.value.clone().unwrap_or_default().into_bytes(),
    }
}
