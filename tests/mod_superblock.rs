use lsmlite::errors::StoreError;
use lsmlite::io::BlockFile;
use lsmlite::layout::{BLOCK_SIZE, JOURNAL_START, SUPERBLOCK_B_OFF};
use lsmlite::superblock::{CheckpointUpdate, Slot, Superblock, SuperblockManager};
use tempfile::tempdir;

fn fresh_file(dir: &tempfile::TempDir, name: &str) -> BlockFile {
    BlockFile::open(&dir.path().join(name)).unwrap()
}

#[test]
fn format_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let mut file = fresh_file(&dir, "sb.db");
    let mut mgr = SuperblockManager::new();
    mgr.format_initial(&mut file, JOURNAL_START, 1).unwrap();
    assert_eq!(mgr.active_slot(), Slot::A);

    let mut reloaded = SuperblockManager::new();
    let sb = reloaded.load(&mut file).unwrap();
    assert_eq!(sb.epoch, 1);
    assert_eq!(sb.checkpoint_lsn, 0);
    assert_eq!(sb.j_head, JOURNAL_START);
    assert_eq!(sb.j_tail, JOURNAL_START);
    assert_eq!(usize::from(sb.block_size), BLOCK_SIZE);
}

#[test]
fn checkpoint_flips_slots_and_bumps_epoch() {
    let dir = tempdir().unwrap();
    let mut file = fresh_file(&dir, "sb.db");
    let mut mgr = SuperblockManager::new();
    mgr.format_initial(&mut file, JOURNAL_START, 1).unwrap();

    mgr.checkpoint(
        &mut file,
        CheckpointUpdate { checkpoint_lsn: 5, j_head: JOURNAL_START, j_tail: JOURNAL_START + 120 },
    )
    .unwrap();
    assert_eq!(mgr.active_slot(), Slot::B);
    assert_eq!(mgr.current().unwrap().epoch, 2);

    mgr.checkpoint(
        &mut file,
        CheckpointUpdate {
            checkpoint_lsn: 9,
            j_head: JOURNAL_START + 120,
            j_tail: JOURNAL_START + 120,
        },
    )
    .unwrap();
    assert_eq!(mgr.active_slot(), Slot::A);
    assert_eq!(mgr.current().unwrap().epoch, 3);

    let mut reloaded = SuperblockManager::new();
    let sb = reloaded.load(&mut file).unwrap();
    assert_eq!(sb.epoch, 3);
    assert_eq!(sb.checkpoint_lsn, 9);
    assert_eq!(reloaded.active_slot(), Slot::A);
}

#[test]
fn load_tolerates_one_corrupt_slot() {
    let dir = tempdir().unwrap();
    let mut file = fresh_file(&dir, "sb.db");
    let mut mgr = SuperblockManager::new();
    mgr.format_initial(&mut file, JOURNAL_START, 1).unwrap();
    mgr.checkpoint(
        &mut file,
        CheckpointUpdate { checkpoint_lsn: 3, j_head: JOURNAL_START, j_tail: JOURNAL_START + 64 },
    )
    .unwrap();

    // Tear the now-inactive slot A; the active copy in B must still load.
    file.write_at(0, &vec![0u8; BLOCK_SIZE]).unwrap();
    let mut reloaded = SuperblockManager::new();
    let sb = reloaded.load(&mut file).unwrap();
    assert_eq!(sb.epoch, 2);
    assert_eq!(sb.checkpoint_lsn, 3);
    assert_eq!(reloaded.active_slot(), Slot::B);
}

#[test]
fn load_fails_when_both_slots_invalid() {
    let dir = tempdir().unwrap();
    let mut file = fresh_file(&dir, "sb.db");
    file.ensure_size(2 * BLOCK_SIZE as u64).unwrap();
    let mut mgr = SuperblockManager::new();
    let err = mgr.load(&mut file).unwrap_err();
    assert!(matches!(err, StoreError::NoValidSuperblocks));
    assert_eq!(err.code(), 50);
}

#[test]
fn epoch_tie_resolves_to_slot_b() {
    let dir = tempdir().unwrap();
    let mut file = fresh_file(&dir, "sb.db");
    let a = Superblock {
        version: 1,
        block_size: BLOCK_SIZE as u16,
        epoch: 7,
        checkpoint_lsn: 1,
        j_head: JOURNAL_START,
        j_tail: JOURNAL_START,
    };
    let b = Superblock { checkpoint_lsn: 2, ..a };
    file.write_at(0, &a.encode()).unwrap();
    file.write_at(SUPERBLOCK_B_OFF, &b.encode()).unwrap();

    let mut mgr = SuperblockManager::new();
    let sb = mgr.load(&mut file).unwrap();
    assert_eq!(mgr.active_slot(), Slot::B);
    assert_eq!(sb.checkpoint_lsn, 2);
}

#[test]
fn repair_copies_newest_slot_over_torn_sibling() {
    let dir = tempdir().unwrap();
    let mut file = fresh_file(&dir, "sb.db");
    let mut mgr = SuperblockManager::new();
    mgr.format_initial(&mut file, JOURNAL_START, 1).unwrap();
    mgr.checkpoint(
        &mut file,
        CheckpointUpdate { checkpoint_lsn: 4, j_head: JOURNAL_START, j_tail: JOURNAL_START + 96 },
    )
    .unwrap();
    file.write_at(0, &vec![0xAAu8; BLOCK_SIZE]).unwrap();

    let before = SuperblockManager::verify(&mut file).unwrap();
    assert!(!before[0].valid);
    assert!(before[1].valid);

    SuperblockManager::repair(&mut file).unwrap();
    let after = SuperblockManager::verify(&mut file).unwrap();
    assert!(after[0].valid && after[1].valid);
    assert_eq!(after[0].epoch, after[1].epoch);
}
