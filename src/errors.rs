use thiserror::Error;

/// Error group, mirroring the numeric code ranges in [`StoreError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorGroup {
    File,
    Wal,
    Table,
    Manifest,
    Superblock,
    Clock,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },

    #[error("journal full: need {need} bytes, {free} free")]
    WalFull { need: u64, free: u64 },

    #[error("LSN {0} not present in the journal offset map")]
    LsnNotFound(u64),

    #[error("key length {0} exceeds the record limit")]
    InvalidKeySize(usize),

    #[error("table meta truncated while reading id ({0} bytes claimed)")]
    TruncatedId(usize),

    #[error("table meta truncated while reading extents ({0} claimed)")]
    TruncatedExtents(u32),

    #[error("manifest is full ({0} entries)")]
    ManifestFull(usize),

    #[error("table region exhausted: {size} bytes requested, {left} left")]
    NeedsCompaction { size: u64, left: u64 },

    #[error("composed table blob is {got} bytes, reserved {reserved}")]
    BrokenTableSize { got: u64, reserved: u64 },

    #[error("manifest entry {0} does not exist")]
    EntryNotExist(usize),

    #[error("sort-key prefix must be 16 bytes, got {0}")]
    InvalidPrefixSize(usize),

    #[error("manifest page cannot hold {0} entries")]
    TooManyEntries(usize),

    #[error("manifest page buffer must be {expected} bytes, got {got}")]
    InvalidPageSize { expected: usize, got: usize },

    #[error("manifest count {0} exceeds page capacity")]
    CountExceedsCap(u16),

    #[error("manifest page is corrupt: {0}")]
    Corrupt(String),

    #[error("no valid superblock in either slot")]
    NoValidSuperblocks,

    #[error("superblock manager used before load or format")]
    NotInitialized,

    #[error("clock epoch is corrupted: {0}")]
    CorruptedEpoch(String),

    #[error("monotonic clock state is broken: {0}")]
    BrokenClockState(String),
}

impl StoreError {
    /// Stable numeric code, grouped by subsystem.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Io(_) => 10,
            Self::ShortRead { .. } => 11,
            Self::WalFull { .. } => 20,
            Self::LsnNotFound(_) => 21,
            Self::InvalidKeySize(_) => 30,
            Self::TruncatedId(_) => 31,
            Self::TruncatedExtents(_) => 32,
            Self::ManifestFull(_) => 33,
            Self::NeedsCompaction { .. } => 34,
            Self::BrokenTableSize { .. } => 35,
            Self::EntryNotExist(_) => 36,
            Self::InvalidPrefixSize(_) => 37,
            Self::TooManyEntries(_) => 41,
            Self::InvalidPageSize { .. } => 42,
            Self::CountExceedsCap(_) => 43,
            Self::Corrupt(_) => 44,
            Self::NoValidSuperblocks => 50,
            Self::NotInitialized => 51,
            Self::CorruptedEpoch(_) => 60,
            Self::BrokenClockState(_) => 61,
        }
    }

    #[must_use]
    pub const fn group(&self) -> ErrorGroup {
        match self.code() {
            10..=19 => ErrorGroup::File,
            20..=29 => ErrorGroup::Wal,
            30..=39 => ErrorGroup::Table,
            40..=49 => ErrorGroup::Manifest,
            50..=59 => ErrorGroup::Superblock,
            _ => ErrorGroup::Clock,
        }
    }
}
