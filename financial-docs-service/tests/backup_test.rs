//! Crash-recovery backups on disk.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::cement_invoice;
use financial_docs_service::autosave::{
    backup_key, clear_backup, recover_backup, recover_backup_at, write_backup, write_backup_at,
    BackupStore, FileBackupStore,
};
use financial_docs_service::models::FinancialDocument;
use std::time::Duration;
use tempfile::TempDir;

const DAY: Duration = Duration::from_secs(24 * 3600);

fn store() -> (TempDir, FileBackupStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = FileBackupStore::new(dir.path().join("backups"));
    (dir, store)
}

#[tokio::test]
async fn fresh_backup_is_offered() {
    let (_dir, store) = store();
    let doc = cement_invoice();
    let key = doc.id().to_string();

    write_backup(&store, &key, &doc).await.unwrap();

    let entry = recover_backup::<FinancialDocument>(&store, &key, DAY)
        .await
        .unwrap()
        .expect("backup offered");
    assert_eq!(entry.data, doc);
    assert_eq!(entry.key, key);
    assert!(store.dir().join(format!("{}.json", backup_key(&key))).exists());
}

#[tokio::test]
async fn backup_older_than_max_age_is_discarded() {
    let (_dir, store) = store();
    let doc = cement_invoice();
    let key = doc.id().to_string();
    let now = Utc::now();

    write_backup_at(&store, &key, &doc, now - ChronoDuration::hours(25))
        .await
        .unwrap();

    let entry = recover_backup_at::<FinancialDocument>(&store, &key, DAY, now)
        .await
        .unwrap();
    assert!(entry.is_none());
    assert_eq!(store.get(&backup_key(&key)).await.unwrap(), None);
}

#[tokio::test]
async fn backup_just_inside_max_age_is_offered() {
    let (_dir, store) = store();
    let doc = cement_invoice();
    let key = doc.id().to_string();
    let now = Utc::now();

    write_backup_at(&store, &key, &doc, now - ChronoDuration::hours(23))
        .await
        .unwrap();

    let entry = recover_backup_at::<FinancialDocument>(&store, &key, DAY, now)
        .await
        .unwrap();
    assert!(entry.is_some());
}

#[tokio::test]
async fn unreadable_backup_is_removed() {
    let (_dir, store) = store();
    store
        .put(&backup_key("broken"), "{not json".to_string())
        .await
        .unwrap();

    let entry = recover_backup::<FinancialDocument>(&store, "broken", DAY)
        .await
        .unwrap();
    assert!(entry.is_none());
    assert_eq!(store.get(&backup_key("broken")).await.unwrap(), None);
}

#[tokio::test]
async fn missing_backup_and_clear_are_quiet() {
    let (_dir, store) = store();

    let entry = recover_backup::<FinancialDocument>(&store, "nothing-here", DAY)
        .await
        .unwrap();
    assert!(entry.is_none());

    clear_backup(&store, "nothing-here").await.unwrap();
}

#[tokio::test]
async fn newer_backup_replaces_older() {
    let (_dir, store) = store();
    let mut doc = cement_invoice();
    let key = doc.id().to_string();

    write_backup(&store, &key, &doc).await.unwrap();
    doc.edit_header(|h| h.project_name = Some("Phase 2".to_string()));
    write_backup(&store, &key, &doc).await.unwrap();

    let entry = recover_backup::<FinancialDocument>(&store, &key, DAY)
        .await
        .unwrap()
        .expect("backup offered");
    assert_eq!(entry.data.header().project_name.as_deref(), Some("Phase 2"));

    clear_backup(&store, &key).await.unwrap();
    assert!(recover_backup::<FinancialDocument>(&store, &key, DAY)
        .await
        .unwrap()
        .is_none());
}
