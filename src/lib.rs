#![forbid(unsafe_code)]

//! lsmlite: an embedded, single-file, crash-recoverable key-value store.
//!
//! One regular file holds two alternating superblocks, a ring-shaped
//! write-ahead journal, a manifest page, and immutable sorted tables.
//! Operations go through a submission queue and are acknowledged once the
//! journal append is durable; the memtable is periodically frozen and sealed
//! into level-0 tables, after which the journal head advances.

pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod io;
pub mod journal;
pub mod layout;
pub mod lsm;
pub mod manifest;
pub mod memtable;
pub mod queue;
pub mod superblock;
pub mod table;
pub mod utils;

pub use config::Options;
pub use engine::Engine;
pub use errors::StoreError;
pub use journal::OpCode;
pub use queue::{Dispatch, Reply, SubmitQueue};

use std::path::PathBuf;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::clock::MonotonicClock;

/// The main database handle: owns the engine and stamps dispatches with
/// monotonic timestamps. Submissions enqueue; [`Store::run_for`] drives the
/// submission loop that processes them.
pub struct Store {
    engine: Engine,
    clock: Mutex<MonotonicClock>,
    name: String,
    path: PathBuf,
}

impl Store {
    /// Open a database, optionally at the provided file path/name.
    /// - If `name_or_path` is `Some` and non-empty, it is used (extension
    ///   defaults to `.db` if missing).
    /// - If `None` or empty, defaults to `lsmlite.db` in the current
    ///   directory.
    ///
    /// A missing or empty file is formatted; an existing one is loaded and
    /// its journal replayed into the submission queue.
    ///
    /// # Errors
    /// Returns an error if creating, formatting or recovering the database
    /// fails.
    pub fn open(name_or_path: Option<&str>, opts: Options) -> Result<Self, StoreError> {
        let path = crate::utils::fsutil::normalize_db_path(name_or_path);
        if opts.logging
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            let base = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let _ = crate::utils::logger::init_for_db_in(base, stem);
        }
        let engine = Engine::open(&path, opts)?;
        let clock = Mutex::new(MonotonicClock::new()?);
        let name =
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("lsmlite").to_string();
        Ok(Self { engine, clock, name, path })
    }

    /// Queue a durable write. The receiver fires after the journal append,
    /// superblock checkpoint and apply.
    ///
    /// # Errors
    /// Returns a clock error if no timestamp can be issued.
    pub fn set(&self, key: &str, value: &str) -> Result<oneshot::Receiver<Reply>, StoreError> {
        self.submit_with_ack(OpCode::Set, key, Some(value))
    }

    /// Queue a tombstone for `key`.
    ///
    /// # Errors
    /// Returns a clock error if no timestamp can be issued.
    pub fn del(&self, key: &str) -> Result<oneshot::Receiver<Reply>, StoreError> {
        self.submit_with_ack(OpCode::Del, key, None)
    }

    /// Queue a read. The reply carries the value, or the empty string for a
    /// missing or deleted key.
    ///
    /// # Errors
    /// Returns a clock error if no timestamp can be issued.
    pub fn get(&self, key: &str) -> Result<oneshot::Receiver<Reply>, StoreError> {
        self.submit_with_ack(OpCode::Get, key, None)
    }

    /// Queue a forced journal checkpoint.
    ///
    /// # Errors
    /// Returns a clock error if no timestamp can be issued.
    pub fn checkpoint(&self) -> Result<oneshot::Receiver<Reply>, StoreError> {
        self.submit_with_ack(OpCode::Check, "", None)
    }

    fn submit_with_ack(
        &self,
        op: OpCode,
        key: &str,
        value: Option<&str>,
    ) -> Result<oneshot::Receiver<Reply>, StoreError> {
        let ts = self.clock.lock().now_ms()?;
        let (dispatch, rx) =
            Dispatch::with_ack(op, key.to_string(), value.map(str::to_string), ts);
        self.engine.submit(dispatch);
        Ok(rx)
    }

    /// Drive the submission loop for a wall-clock budget.
    ///
    /// # Errors
    /// Persistent-state errors are fatal and surface to the caller.
    pub async fn run_for(&mut self, budget: std::time::Duration) -> Result<(), StoreError> {
        self.engine.run_for(budget).await
    }

    /// The logical database name (file stem).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
