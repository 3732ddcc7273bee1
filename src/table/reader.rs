use crate::codec::{get_u16, get_u16_len, get_u32_len};
use crate::errors::StoreError;
use crate::io::BlockFile;
use crate::table::writer::TableHead;
use crate::utils::num::u32_to_usize;

/// Restartable sequence of (key, value) pairs over one sealed table. Loads
/// one data block at a time; yielded slices borrow the current block buffer
/// and must be copied if they outlive the next call.
pub struct TableReader {
    head: TableHead,
    next_block: usize,
    block: Vec<u8>,
    pos: usize,
    remaining: u16,
}

impl TableReader {
    #[must_use]
    pub fn new(head: TableHead) -> Self {
        Self { head, next_block: 0, block: Vec::new(), pos: 0, remaining: 0 }
    }

    /// Restart the sequence from the first block.
    pub fn rewind(&mut self) {
        self.next_block = 0;
        self.block.clear();
        self.pos = 0;
        self.remaining = 0;
    }

    /// The next record, or `None` at end of table.
    ///
    /// # Errors
    /// Surfaces I/O failures and malformed blocks.
    pub fn next(&mut self, file: &mut BlockFile) -> Result<Option<(&[u8], &[u8])>, StoreError> {
        while self.remaining == 0 {
            if self.next_block >= self.head.index.len() {
                return Ok(None);
            }
            let entry = &self.head.index[self.next_block];
            self.next_block += 1;
            self.block = file.read_exact_at(entry.off, u32_to_usize(entry.len))?;
            self.remaining = get_u16(&self.block, 0);
            self.pos = 2;
        }
        if self.pos + 6 > self.block.len() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "data block header runs past the block",
            )));
        }
        let klen = get_u16_len(&self.block, self.pos);
        let vlen = get_u32_len(&self.block, self.pos + 2);
        let key_start = self.pos + 6;
        let value_start = key_start + klen;
        let value_end = value_start + vlen;
        if value_end > self.block.len() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "data block record runs past the block",
            )));
        }
        self.pos = value_end;
        self.remaining -= 1;
        Ok(Some((&self.block[key_start..value_start], &self.block[value_start..value_end])))
    }
}
