//! Dual superblock protocol. Two identical-format slots occupy the first two
//! blocks of the file; a checkpoint writes the inactive slot with a bumped
//! epoch, fsyncs, then flips. Load picks the slot with the larger epoch so a
//! torn checkpoint falls back to the older consistent state.

use log::debug;

use crate::codec::{get_u16, get_u64, put_u16, put_u64};
use crate::errors::StoreError;
use crate::io::BlockFile;
use crate::layout::{BLOCK_SIZE, SUPERBLOCK_A_OFF, SUPERBLOCK_B_OFF};

pub const SUPERBLOCK_VERSION: u16 = 1;

/// Encoded size of the record; the rest of the slot stays zero.
const ENCODED_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u16,
    pub block_size: u16,
    pub epoch: u64,
    pub checkpoint_lsn: u64,
    pub j_head: u64,
    pub j_tail: u64,
}

impl Superblock {
    /// Encode into a zero-padded block image.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        put_u16(&mut buf, 0, self.version);
        put_u16(&mut buf, 2, self.block_size);
        put_u64(&mut buf, 8, self.epoch);
        put_u64(&mut buf, 16, self.checkpoint_lsn);
        put_u64(&mut buf, 24, self.j_head);
        put_u64(&mut buf, 32, self.j_tail);
        buf
    }

    /// Decode one slot. Returns `None` for an invalid copy (version 0 or a
    /// foreign block size); the caller tolerates one bad slot.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENCODED_SIZE {
            return None;
        }
        let version = get_u16(buf, 0);
        let block_size = get_u16(buf, 2);
        if version == 0 || usize::from(block_size) != BLOCK_SIZE {
            return None;
        }
        Some(Self {
            version,
            block_size,
            epoch: get_u64(buf, 8),
            checkpoint_lsn: get_u64(buf, 16),
            j_head: get_u64(buf, 24),
            j_tail: get_u64(buf, 32),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    #[must_use]
    pub const fn offset(self) -> u64 {
        match self {
            Self::A => SUPERBLOCK_A_OFF,
            Self::B => SUPERBLOCK_B_OFF,
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Fields a checkpoint publishes; the manager supplies version and epoch.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointUpdate {
    pub checkpoint_lsn: u64,
    pub j_head: u64,
    pub j_tail: u64,
}

/// Per-slot diagnostics from [`SuperblockManager::verify`].
#[derive(Debug, Clone, Copy)]
pub struct SlotReport {
    pub slot: Slot,
    pub valid: bool,
    pub epoch: Option<u64>,
}

#[derive(Debug, Default)]
pub struct SuperblockManager {
    current: Option<Superblock>,
    active: Slot,
}

impl Default for Slot {
    fn default() -> Self {
        Self::A
    }
}

impl SuperblockManager {
    #[must_use]
    pub fn new() -> Self {
        Self { current: None, active: Slot::A }
    }

    /// Write identical superblocks to both slots: version 1, the given epoch,
    /// checkpoint LSN 0, head and tail at the journal start. One fsync covers
    /// both writes. The active slot becomes A.
    ///
    /// # Errors
    /// Surfaces any I/O failure.
    pub fn format_initial(
        &mut self,
        file: &mut BlockFile,
        journal_start: u64,
        epoch: u64,
    ) -> Result<(), StoreError> {
        let sb = Superblock {
            version: SUPERBLOCK_VERSION,
            block_size: BLOCK_SIZE as u16,
            epoch,
            checkpoint_lsn: 0,
            j_head: journal_start,
            j_tail: journal_start,
        };
        let image = sb.encode();
        file.write_at(Slot::A.offset(), &image)?;
        file.write_at(Slot::B.offset(), &image)?;
        file.sync()?;
        self.current = Some(sb);
        self.active = Slot::A;
        Ok(())
    }

    /// Read both slots and adopt the newest valid copy. Larger epoch wins;
    /// ties resolve to B.
    ///
    /// # Errors
    /// Fails with `NoValidSuperblocks` when neither slot decodes.
    pub fn load(&mut self, file: &mut BlockFile) -> Result<Superblock, StoreError> {
        let a = Self::read_slot(file, Slot::A)?;
        let b = Self::read_slot(file, Slot::B)?;
        let (active, sb) = match (a, b) {
            (Some(a), Some(b)) if a.epoch > b.epoch => (Slot::A, a),
            (_, Some(b)) => (Slot::B, b),
            (Some(a), None) => (Slot::A, a),
            (None, None) => return Err(StoreError::NoValidSuperblocks),
        };
        debug!(
            "superblock load: slot {:?}, epoch {}, checkpoint lsn {}",
            active, sb.epoch, sb.checkpoint_lsn
        );
        self.current = Some(sb);
        self.active = active;
        Ok(sb)
    }

    /// Publish a new checkpoint: write the inactive slot with epoch + 1 and
    /// the supplied journal pointers, fsync, then flip the active slot. A
    /// failed write or fsync leaves the previously active slot intact.
    ///
    /// # Errors
    /// Fails with `NotInitialized` before a load or format; surfaces I/O
    /// failures.
    pub fn checkpoint(
        &mut self,
        file: &mut BlockFile,
        update: CheckpointUpdate,
    ) -> Result<(), StoreError> {
        let cur = self.current.ok_or(StoreError::NotInitialized)?;
        let next = Superblock {
            version: cur.version,
            block_size: cur.block_size,
            epoch: cur.epoch + 1,
            checkpoint_lsn: update.checkpoint_lsn,
            j_head: update.j_head,
            j_tail: update.j_tail,
        };
        let slot = self.active.other();
        file.write_at(slot.offset(), &next.encode())?;
        file.sync()?;
        self.active = slot;
        self.current = Some(next);
        Ok(())
    }

    /// The last loaded or written superblock, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Superblock> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn active_slot(&self) -> Slot {
        self.active
    }

    /// Diagnose both slots without adopting either.
    ///
    /// # Errors
    /// Surfaces I/O failures other than a short read (a short slot reads as
    /// invalid).
    pub fn verify(file: &mut BlockFile) -> Result<[SlotReport; 2], StoreError> {
        let mut out = [
            SlotReport { slot: Slot::A, valid: false, epoch: None },
            SlotReport { slot: Slot::B, valid: false, epoch: None },
        ];
        for report in &mut out {
            if let Some(sb) = Self::read_slot(file, report.slot)? {
                report.valid = true;
                report.epoch = Some(sb.epoch);
            }
        }
        Ok(out)
    }

    /// Copy the newest valid slot over an invalid or stale sibling so both
    /// slots agree again.
    ///
    /// # Errors
    /// Fails with `NoValidSuperblocks` when neither slot decodes; surfaces
    /// I/O failures.
    pub fn repair(file: &mut BlockFile) -> Result<(), StoreError> {
        let a = Self::read_slot(file, Slot::A)?;
        let b = Self::read_slot(file, Slot::B)?;
        let (best_slot, best) = match (a, b) {
            (Some(a), Some(b)) if a.epoch > b.epoch => (Slot::A, a),
            (_, Some(b)) => (Slot::B, b),
            (Some(a), None) => (Slot::A, a),
            (None, None) => return Err(StoreError::NoValidSuperblocks),
        };
        let sibling = best_slot.other();
        let up_to_date =
            Self::read_slot(file, sibling)?.is_some_and(|sb| sb.epoch == best.epoch);
        if !up_to_date {
            file.write_at(sibling.offset(), &best.encode())?;
            file.sync()?;
            debug!("superblock repair: copied epoch {} into slot {:?}", best.epoch, sibling);
        }
        Ok(())
    }

    fn read_slot(file: &mut BlockFile, slot: Slot) -> Result<Option<Superblock>, StoreError> {
        let buf = file.read_at(slot.offset(), BLOCK_SIZE)?;
        Ok(Superblock::decode(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_invalid_copies() {
        let sb = Superblock {
            version: SUPERBLOCK_VERSION,
            block_size: BLOCK_SIZE as u16,
            epoch: 3,
            checkpoint_lsn: 9,
            j_head: 8192,
            j_tail: 8200,
        };
        let mut image = sb.encode();
        assert_eq!(Superblock::decode(&image), Some(sb));

        put_u16(&mut image, 0, 0); // version 0
        assert_eq!(Superblock::decode(&image), None);

        put_u16(&mut image, 0, 1);
        put_u16(&mut image, 2, 512); // foreign block size
        assert_eq!(Superblock::decode(&image), None);

        assert_eq!(Superblock::decode(&[0u8; 16]), None);
    }
}
