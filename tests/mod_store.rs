use std::time::Duration;

use lsmlite::{Options, Store};
use tempfile::tempdir;

#[tokio::test]
async fn open_names_the_store_after_the_file_stem() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("inventory");
    let store = Store::open(path.to_str(), Options::default()).unwrap();
    assert_eq!(store.name(), "inventory");
    // A bare name gains the default extension.
    assert_eq!(store.path().extension().and_then(|e| e.to_str()), Some("db"));
}

#[tokio::test]
async fn a_fresh_file_is_formatted_with_both_superblocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    let store = Store::open(path.to_str(), Options::default()).unwrap();
    let layout = *store.engine().layout();
    // Superblocks + journal + manifest are preallocated.
    assert!(std::fs::metadata(store.path()).unwrap().len() >= layout.table_region_off());
    let sb = store.engine().superblock().unwrap();
    assert_eq!(sb.epoch, 1);
    assert_eq!(sb.j_head, layout.journal_start());
    assert_eq!(sb.j_tail, layout.journal_start());
}

#[tokio::test]
async fn values_survive_a_clean_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.db");
    {
        let mut store = Store::open(path.to_str(), Options::default()).unwrap();
        let ack = store.set("city", "narvik").unwrap();
        store.run_for(Duration::from_millis(40)).await.unwrap();
        ack.await.unwrap();
    }
    let mut store = Store::open(path.to_str(), Options::default()).unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    let hit = store.get("city").unwrap();
    store.run_for(Duration::from_millis(40)).await.unwrap();
    assert_eq!(hit.await.unwrap().value, "narvik");
}

#[tokio::test]
async fn dispatch_timestamps_are_monotonic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ts.db");
    let store = Store::open(path.to_str(), Options::default()).unwrap();
    let queue = store.engine().queue();
    for i in 0..5 {
        let _ = store.set(&format!("k{i}"), "v").unwrap();
    }
    let batch = queue.take_batch(16);
    assert_eq!(batch.len(), 5);
    assert!(batch.windows(2).all(|w| w[0].ts <= w[1].ts));
}

#[tokio::test]
async fn logging_option_creates_a_log_folder_next_to_the_db() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("logged.db");
    let opts = Options { logging: true, ..Options::default() };
    let _store = Store::open(path.to_str(), opts).unwrap();
    assert!(dir.path().join("logged_logs").is_dir());
}
