//! Editing sessions: document edits flowing into autosave and the store.

mod common;

use common::{cement_invoice, dec, draft, FlakyStore};
use financial_docs_service::autosave::{
    backup_key, write_backup, AutosaveConfig, BackupStore, MemoryBackupStore, SavePhase,
    SaveTarget,
};
use financial_docs_service::config::AutosaveSettings;
use financial_docs_service::error::SessionError;
use financial_docs_service::lifecycle::{NotificationOutcome, StatusLifecycle};
use financial_docs_service::models::{
    DocumentKind, DocumentStatus, FinancialDocument, NewLineItem, NewSection, TransitionMode,
};
use financial_docs_service::services::{DocumentStore, InMemoryDocumentStore, MockNotifier};
use financial_docs_service::session::{EditingSession, SessionFactory, StoreSaveTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn target(store: &Arc<InMemoryDocumentStore>) -> Arc<dyn SaveTarget<FinancialDocument>> {
    Arc::new(StoreSaveTarget::new(store.clone() as Arc<dyn DocumentStore>))
}

#[tokio::test(start_paused = true)]
async fn new_document_is_saved_after_the_debounce() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = cement_invoice();
    let id = doc.id();

    let session = EditingSession::start(doc, false, target(&store), AutosaveConfig::default(), None);

    sleep(Duration::from_millis(1900)).await;
    assert!(store.is_empty());

    sleep(Duration::from_millis(200)).await;
    let stored = store.fetch(id).await.unwrap();
    assert_eq!(&stored, session.document());
    assert!(!session.autosave_state().has_unsaved_changes);
}

#[tokio::test(start_paused = true)]
async fn edits_reach_the_store_with_fresh_totals() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = cement_invoice();
    let id = doc.id();
    store.save(&doc).await.unwrap();

    let mut session = EditingSession::start(doc, true, target(&store), AutosaveConfig::default(), None);
    let section_id = session.document().sections()[0].id;

    session
        .edit(|d| d.add_item(section_id, NewLineItem::material("Sand", dec("4"), "t", dec("2500"))))
        .unwrap();
    assert_eq!(
        session.document().totals().total_material_cost,
        dec("610000")
    );
    sleep(Duration::from_millis(10)).await;
    assert_eq!(session.autosave_state().phase, SavePhase::PendingSave);

    sleep(Duration::from_millis(2100)).await;
    let stored = store.fetch(id).await.unwrap();
    assert_eq!(stored.totals().total_material_cost, dec("610000"));
    assert_eq!(stored.totals().total_labour_cost, dec("219600"));
}

#[tokio::test(start_paused = true)]
async fn incomplete_document_is_not_saved() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = draft(DocumentKind::Quotation);

    let mut session = EditingSession::start(doc, false, target(&store), AutosaveConfig::default(), None);
    sleep(Duration::from_secs(3)).await;

    assert!(store.is_empty());
    let state = session.autosave_state();
    assert!(state.has_unsaved_changes);
    assert_eq!(state.consecutive_failures, 0);

    session
        .edit(|d| d.add_section(NewSection::named("Preliminaries")))
        .unwrap();
    session.save_now().await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_edits_do_not_reach_autosave() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = cement_invoice();
    store.save(&doc).await.unwrap();

    let mut session = EditingSession::start(doc, true, target(&store), AutosaveConfig::default(), None);
    let result = session.edit(|d| d.set_tax_rate(dec("-3")));

    assert!(result.is_err());
    assert!(!session.autosave_state().has_unsaved_changes);
}

#[tokio::test(start_paused = true)]
async fn transitions_are_autosaved() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let lifecycle = StatusLifecycle::new(notifier.clone());
    let doc = cement_invoice();
    let id = doc.id();
    store.save(&doc).await.unwrap();

    let mut session = EditingSession::start(doc, true, target(&store), AutosaveConfig::default(), None);
    session
        .transition(&lifecycle, DocumentStatus::Sent, TransitionMode::Forward)
        .await
        .unwrap();
    session.save_now().await.unwrap();

    let stored = store.fetch(id).await.unwrap();
    assert_eq!(stored.status(), DocumentStatus::Sent);
    assert!(stored.timestamps().sent_at.is_some());
    assert_eq!(notifier.send_count(), 1);

    let closed = session.close().await;
    assert_eq!(closed.status(), DocumentStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn backup_restores_unsaved_work() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let backups = Arc::new(MemoryBackupStore::new());
    let doc = cement_invoice();
    store.save(&doc).await.unwrap();

    let mut unsaved = doc.clone();
    unsaved.edit_header(|h| h.notes = Some("Deliver before noon".to_string()));
    write_backup(backups.as_ref(), &doc.id().to_string(), &unsaved)
        .await
        .unwrap();

    let mut session = EditingSession::start(
        doc,
        true,
        target(&store),
        AutosaveConfig::default(),
        Some(backups.clone() as Arc<dyn BackupStore>),
    );

    assert!(session.restore_backup().await.unwrap());
    assert_eq!(
        session.document().header().notes.as_deref(),
        Some("Deliver before noon")
    );
    sleep(Duration::from_millis(10)).await;
    assert!(session.autosave_state().has_unsaved_changes);

    // Nothing newer than the restored copy.
    assert!(!session.restore_backup().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn unsaved_transition_is_rolled_back_without_notifying() {
    let store = Arc::new(FlakyStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let lifecycle = StatusLifecycle::new(notifier.clone());
    let doc = cement_invoice();
    let id = doc.id();
    store.save(&doc).await.unwrap();

    let target: Arc<dyn SaveTarget<FinancialDocument>> =
        Arc::new(StoreSaveTarget::new(store.clone() as Arc<dyn DocumentStore>));
    let mut session = EditingSession::start(doc, true, target, AutosaveConfig::default(), None);

    store.fail_saves(true);
    let result = session
        .transition(&lifecycle, DocumentStatus::Sent, TransitionMode::Forward)
        .await;

    assert!(matches!(result, Err(SessionError::NotSaved(_))));
    assert_eq!(session.document().status(), DocumentStatus::Draft);
    assert_eq!(session.document().timestamps().sent_at, None);
    assert_eq!(notifier.send_count(), 0);

    store.fail_saves(false);
    let outcome = session
        .transition(&lifecycle, DocumentStatus::Sent, TransitionMode::Forward)
        .await
        .unwrap();

    assert_eq!(outcome.notification, NotificationOutcome::Delivered);
    assert_eq!(notifier.send_count(), 1);
    assert_eq!(store.fetch(id).await.unwrap().status(), DocumentStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn factory_applies_configured_delay() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let settings = AutosaveSettings {
        delay_ms: 500,
        ..AutosaveSettings::default()
    };
    let factory = SessionFactory::new(settings, store.clone());

    let session = factory.open(cement_invoice(), false);

    sleep(Duration::from_millis(400)).await;
    assert!(store.is_empty());
    sleep(Duration::from_millis(200)).await;
    assert_eq!(store.len(), 1);
    assert!(!session.autosave_state().has_unsaved_changes);
}

#[tokio::test]
async fn factory_keeps_backups_in_configured_directory() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = AutosaveSettings {
        backup_dir: Some(dir.path().join("autosave")),
        ..AutosaveSettings::default()
    };
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = cement_invoice();
    let key = doc.id().to_string();
    store.save(&doc).await.unwrap();
    let factory = SessionFactory::new(settings, store.clone());

    let mut unsaved = doc.clone();
    unsaved.edit_header(|h| h.notes = Some("Gate code 4471".to_string()));
    write_backup(factory.backups().as_ref(), &key, &unsaved)
        .await
        .unwrap();
    assert!(dir
        .path()
        .join("autosave")
        .join(format!("{}.json", backup_key(&key)))
        .exists());

    let mut session = factory.open(doc, true);
    assert!(session.restore_backup().await.unwrap());
    assert_eq!(
        session.document().header().notes.as_deref(),
        Some("Gate code 4471")
    );
    session.close().await;
}
