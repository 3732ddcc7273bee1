use std::time::Duration;

use lsmlite::io::BlockFile;
use lsmlite::layout::BLOCK_SIZE;
use lsmlite::superblock::SuperblockManager;
use lsmlite::{Options, Store};
use tempfile::tempdir;

fn opts() -> Options {
    Options { journal_blocks: 4, memtable_max: 8, max_inflight: 64, logging: false }
}

#[tokio::test]
async fn a_crashed_write_is_replayed_from_the_journal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.db");
    {
        let mut store = Store::open(path.to_str(), opts()).unwrap();
        let ack = store.set("a", "1").unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
        ack.await.unwrap();
        assert_eq!(store.engine().journal().used(), 24);
        // Dropped without a flush: the only durable copy is the journal.
    }

    let mut store = Store::open(path.to_str(), opts()).unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    // The replayed batch is not re-journaled: the ring still holds exactly
    // the original record.
    assert_eq!(store.engine().journal().used(), 24);
    assert_eq!(store.engine().memtable_len(), 1);

    let hit = store.get("a").unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    assert_eq!(hit.await.unwrap().value, "1");
}

#[tokio::test]
async fn replay_is_idempotent_across_repeated_reopens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("twice.db");
    {
        let mut store = Store::open(path.to_str(), opts()).unwrap();
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
            let _ = store.set(k, v).unwrap();
        }
        let _ = store.del("b").unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
    }
    for _ in 0..2 {
        let mut store = Store::open(path.to_str(), opts()).unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
        assert_eq!(store.engine().memtable_len(), 3, "a, c, and the b tombstone");
        let a = store.get("a").unwrap();
        let b = store.get("b").unwrap();
        let c = store.get("c").unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
        assert_eq!(a.await.unwrap().value, "1");
        assert_eq!(b.await.unwrap().value, "", "tombstone survives replay");
        assert_eq!(c.await.unwrap().value, "3");
    }
}

#[tokio::test]
async fn flushed_data_needs_no_replay_and_reads_from_tables() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flushed.db");
    {
        let mut store = Store::open(path.to_str(), opts()).unwrap();
        for i in 1..=8 {
            let _ = store.set(&i.to_string(), "hi").unwrap();
        }
        store.run_for(Duration::from_millis(40)).await.unwrap();
        assert_eq!(store.engine().journal().used(), 0);
    }

    let mut store = Store::open(path.to_str(), opts()).unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    assert_eq!(store.engine().memtable_len(), 0, "nothing to replay");
    assert_eq!(store.engine_mut().level_heads(0).unwrap().len(), 1);
    let hit = store.get("5").unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    assert_eq!(hit.await.unwrap().value, "hi");
}

#[tokio::test]
async fn new_writes_after_recovery_journal_normally() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("resume.db");
    {
        let mut store = Store::open(path.to_str(), opts()).unwrap();
        let _ = store.set("a", "1").unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
    }
    let mut store = Store::open(path.to_str(), opts()).unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    let used_after_replay = store.engine().journal().used();

    let ack = store.set("b", "2").unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    ack.await.unwrap();
    assert!(store.engine().journal().used() > used_after_replay);
    // LSNs continue past the replayed record.
    assert!(store.engine().journal().last_lsn() >= 2);
    assert!(store.engine().superblock().unwrap().checkpoint_lsn >= 2);
}

#[tokio::test]
async fn open_survives_one_torn_superblock_slot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("torn.db");
    {
        let mut store = Store::open(path.to_str(), opts()).unwrap();
        let _ = store.set("a", "1").unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
        // The latest checkpoint lives in slot B (epoch 2); tear slot A.
    }
    {
        let mut file = BlockFile::open(&path).unwrap();
        file.write_at(0, &vec![0u8; BLOCK_SIZE]).unwrap();
        SuperblockManager::repair(&mut file).unwrap();
        let reports = SuperblockManager::verify(&mut file).unwrap();
        assert!(reports.iter().all(|r| r.valid));
    }

    let mut store = Store::open(path.to_str(), opts()).unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    let hit = store.get("a").unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    assert_eq!(hit.await.unwrap().value, "1");
}
