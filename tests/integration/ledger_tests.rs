//! Ledger persistence across restarts

use lex_harvest::ledger::{
    load_statistics, DocumentKey, DocumentRole, LedgerError, SkipLedger, SkippedDocument,
    TrackedDocument, TrackingStore,
};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn tracked(href: &str, role: DocumentRole) -> TrackedDocument {
    TrackedDocument::new(
        DocumentKey::new(role, href),
        role,
        format!("https://portal.test{}", href),
        "Highway Traffic Act",
        format!("{}.html", href.trim_matches('/').replace('/', "_")),
    )
}

#[test]
fn test_restart_resumes_from_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("download_tracking.json");

    {
        let mut store = TrackingStore::load(&path).unwrap();
        store.mark_complete(tracked("/a/", DocumentRole::Main)).unwrap();
        store.mark_complete(tracked("/a/", DocumentRole::EnablingStatute)).unwrap();
    }

    let store = TrackingStore::load(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.is_complete(&DocumentKey::new(DocumentRole::Main, "https://portal.test/a/")));
    assert!(store.is_complete(&DocumentKey::new(DocumentRole::EnablingStatute, "/a/")));
    assert!(!store.is_complete(&DocumentKey::new(DocumentRole::Regulation, "/a/")));
}

#[test]
fn test_mark_complete_twice_leaves_one_entry_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("download_tracking.json");
    let mut store = TrackingStore::load(&path).unwrap();

    assert!(store.mark_complete(tracked("/a/", DocumentRole::Main)).unwrap());
    assert!(!store.mark_complete(tracked("/a/", DocumentRole::Main)).unwrap());

    let json: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["processed_documents"].as_array().unwrap().len(), 1);
}

#[test]
fn test_legacy_ledger_upgrades_and_keeps_resumability() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("download_tracking.json");
    fs::write(
        &path,
        r#"{"processed_documents": ["main_/en/on/laws/stat/a/", "regulation_/en/on/laws/regu/b/"]}"#,
    )
    .unwrap();

    let mut store = TrackingStore::load(&path).unwrap();
    assert_eq!(store.migrated_count(), 2);
    assert!(store.is_complete(&DocumentKey::new(DocumentRole::Main, "/en/on/laws/stat/a/")));

    // a legacy key counts as complete, so re-marking it is a no-op
    let mut again = tracked("/en/on/laws/stat/a/", DocumentRole::Main);
    again.key = DocumentKey::new(DocumentRole::Main, "/en/on/laws/stat/a/");
    assert!(!store.mark_complete(again).unwrap());

    store.mark_complete(tracked("/c/", DocumentRole::Main)).unwrap();
    let reloaded = TrackingStore::load(&path).unwrap();
    assert_eq!(reloaded.migrated_count(), 0);
    assert_eq!(reloaded.legacy_keys().len(), 2);
    assert_eq!(reloaded.documents().len(), 1);
}

#[test]
fn test_corrupt_ledger_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("download_tracking.json");
    fs::write(&path, "[1, 2").unwrap();

    assert!(matches!(
        TrackingStore::load(&path),
        Err(LedgerError::Corrupt { .. })
    ));
}

#[test]
fn test_skip_ledger_is_separate_from_completions() {
    let dir = TempDir::new().unwrap();
    let tracking = TrackingStore::load(dir.path().join("t.json")).unwrap();
    let mut skipped = SkipLedger::load(dir.path().join("s.json")).unwrap();

    skipped
        .record(SkippedDocument::new(
            "Old Act",
            "/en/on/laws/stat/old/",
            "https://portal.test/en/on/laws/stat/old/",
            "Repealed by SO 2019, c 7",
        ))
        .unwrap();

    assert!(!tracking.is_complete(&DocumentKey::new(DocumentRole::Main, "/en/on/laws/stat/old/")));
    let stats = load_statistics(&tracking, &skipped);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.total_completed, 0);
}

#[test]
fn test_earlier_records_survive_a_new_completion() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("download_tracking.json");
    fs::write(
        &path,
        r#"{"processed_documents": [
            {"key": "main_/a/", "url": "https://portal.test/a/", "title": "A",
             "s3_key": "legislation/A.pdf", "downloaded_at": "2025-01-02 10:00:00"},
            {"key": "main_/odd/", "note": "hand edited"}
        ]}"#,
    )
    .unwrap();

    let mut store = TrackingStore::load(&path).unwrap();
    store.mark_complete(tracked("/c/", DocumentRole::Main)).unwrap();

    let json: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entries = json["processed_documents"].as_array().unwrap();
    assert_eq!(entries.len(), 3);

    let earlier = entries.iter().find(|e| e["key"] == "main_/a/").unwrap();
    assert_eq!(earlier["title"], "A");
    assert_eq!(earlier["url"], "https://portal.test/a/");
    assert_eq!(earlier["storage_key"], "legislation/A.pdf");
    assert!(earlier["completed_at"].as_str().unwrap().starts_with("2025-01-02"));

    let odd = entries.iter().find(|e| e["key"] == "main_/odd/").unwrap();
    assert_eq!(odd["note"], "hand edited");

    let reloaded = TrackingStore::load(&path).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert!(reloaded.is_complete(&DocumentKey::new(DocumentRole::Main, "/odd/")));
}
