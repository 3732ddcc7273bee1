use crate::layout::{DEFAULT_JOURNAL_BLOCKS, Layout};

/// Tunables threaded through construction. The defaults match the compiled-in
/// geometry; block size itself is not configurable because persisted tables
/// lock it in.
#[derive(Debug, Clone)]
pub struct Options {
    /// Journal ring length in blocks.
    pub journal_blocks: u64,
    /// Memtable entry count that triggers a freeze + flush.
    pub memtable_max: usize,
    /// Upper bound on operations drained per loop iteration.
    pub max_inflight: usize,
    /// Initialize a rolling file logger next to the database.
    pub logging: bool,
}

impl Options {
    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout::new(self.journal_blocks)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            journal_blocks: DEFAULT_JOURNAL_BLOCKS,
            memtable_max: 1024,
            max_inflight: 64,
            logging: false,
        }
    }
}
