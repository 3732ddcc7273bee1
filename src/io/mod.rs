//! Positioned block I/O over the single backing file. All offsets are
//! absolute; the caller is responsible for alignment and sizing.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::StoreError;
use crate::layout::BLOCK_SIZE;
use crate::utils::num::usize_to_u64;

pub struct BlockFile {
    file: File,
}

impl BlockFile {
    /// Open an existing file read-write, creating it with restrictive
    /// permissions when missing.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        #[cfg(unix)]
        let file = {
            use std::os::unix::fs::OpenOptionsExt;
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(0o600)
                .open(path)?
        };
        #[cfg(not(unix))]
        let file =
            OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
        Ok(Self { file })
    }

    /// Current file length in bytes.
    ///
    /// # Errors
    /// Returns an error if metadata cannot be read.
    pub fn size(&self) -> Result<u64, StoreError> {
        Ok(self.file.metadata()?.len())
    }

    /// Extend the file to at least `n` bytes with zero fill, then fsync.
    /// A file already at least `n` bytes long is left untouched.
    ///
    /// # Errors
    /// Returns an error if the resize or fsync fails.
    pub fn ensure_size(&mut self, n: u64) -> Result<(), StoreError> {
        if self.size()? < n {
            self.file.set_len(n)?;
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Positioned write of `bytes` at absolute `offset`. No implicit append
    /// semantics; writing past EOF extends the file sparsely.
    ///
    /// # Errors
    /// Returns an error if the seek or write fails.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Positioned read of up to `n` bytes at `offset`. The returned buffer is
    /// shorter than `n` when EOF intervenes.
    ///
    /// # Errors
    /// Returns an error if the seek or read fails.
    pub fn read_at(&mut self, offset: u64, n: usize) -> Result<Vec<u8>, StoreError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = self.file.read(&mut buf[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Positioned read of exactly `n` bytes.
    ///
    /// # Errors
    /// Fails with `ShortRead` when EOF is reached before `n` bytes.
    pub fn read_exact_at(&mut self, offset: u64, n: usize) -> Result<Vec<u8>, StoreError> {
        let buf = self.read_at(offset, n)?;
        if buf.len() < n {
            return Err(StoreError::ShortRead { offset, wanted: n, got: buf.len() });
        }
        Ok(buf)
    }

    /// Flush file contents to stable storage.
    ///
    /// # Errors
    /// Returns an error if the fsync fails.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_data()?;
        Ok(())
    }
}

/// Round `n` up to the next multiple of the block size.
#[must_use]
pub const fn align_block(n: u64) -> u64 {
    crate::layout::align_up(n, BLOCK_SIZE as u64)
}

/// Length of a buffer as `u64` for offset arithmetic.
#[must_use]
pub fn byte_len(buf: &[u8]) -> u64 {
    usize_to_u64(buf.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("lsmlite_io_tests");
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir.join(format!(
            "{name}_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn ensure_size_zero_fills() {
        let path = scratch("ensure");
        let mut f = BlockFile::open(&path).unwrap();
        f.ensure_size(64).unwrap();
        assert_eq!(f.size().unwrap(), 64);
        let buf = f.read_exact_at(0, 64).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        // shrinking is never performed
        f.ensure_size(8).unwrap();
        assert_eq!(f.size().unwrap(), 64);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn short_read_is_distinguished() {
        let path = scratch("short");
        let mut f = BlockFile::open(&path).unwrap();
        f.write_at(0, b"abc").unwrap();
        let err = f.read_exact_at(0, 8).unwrap_err();
        assert!(matches!(err, StoreError::ShortRead { got: 3, wanted: 8, .. }));
        assert_eq!(err.code(), 11);
        // read_at tolerates the same EOF
        assert_eq!(f.read_at(0, 8).unwrap(), b"abc");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn positioned_writes_do_not_append() {
        let path = scratch("positioned");
        let mut f = BlockFile::open(&path).unwrap();
        f.write_at(10, b"xyz").unwrap();
        f.write_at(0, b"ab").unwrap();
        assert_eq!(f.size().unwrap(), 13);
        assert_eq!(f.read_exact_at(10, 3).unwrap(), b"xyz");
        let _ = std::fs::remove_file(path);
    }
}
