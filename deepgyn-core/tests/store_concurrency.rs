//! Concurrent access to the scan store.

use deepgyn_core::{NewScan, RecordStore, SqliteRecordStore};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn scan(owner: &str, name: String) -> NewScan {
    NewScan {
        owner: owner.to_string(),
        name,
        age: 41,
        location: "Coimbatore".to_string(),
        category: "Pre-cancerous".to_string(),
        confidence: 0.64,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_get_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteRecordStore::open(&dir.path().join("scans.db")).unwrap());

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            store.save(&scan("dr.x@example.com", format!("Patient {i}")))
        }));
    }
    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 32);

    let history = store.history("dr.x@example.com").unwrap();
    assert_eq!(history.len(), 32);
    // Newest first, strictly decreasing ids.
    assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    let listed: HashSet<i64> = history.iter().map(|r| r.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_owners_stay_isolated() {
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::in_memory().unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        let owner = if i % 2 == 0 { "a@example.com" } else { "b@example.com" };
        handles.push(tokio::task::spawn_blocking(move || {
            store.save(&scan(owner, format!("{owner} patient {i}")))
        }));
    }
    for handle in futures::future::join_all(handles).await {
        handle.unwrap().unwrap();
    }

    for owner in ["a@example.com", "b@example.com"] {
        let history = store.history(owner).unwrap();
        assert_eq!(history.len(), 10);
        assert!(history.iter().all(|r| r.owner == owner));
        assert!(history.iter().all(|r| r.name.starts_with(owner)));
    }
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("scans.db");
    let first_id = {
        let store = SqliteRecordStore::open(&path).unwrap();
        store.save(&scan("dr.x@example.com", "Jane Doe".into())).unwrap()
    };
    let store = SqliteRecordStore::open(&path).unwrap();
    let second_id = store
        .save(&scan("dr.x@example.com", "Mary Roe".into()))
        .unwrap();
    assert!(second_id > first_id);
    let history = store.history("dr.x@example.com").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].name, "Mary Roe");
}
