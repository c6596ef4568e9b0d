//! Integration tests for the SQLite resource store

use deposit_common::events::{ChangeKind, NotificationBus};
use deposit_common::model::{
    relation, Deposit, DepositStatus, Repository, RepositoryCopy, Submission,
};
use deposit_common::store::SqliteResourceStore;
use deposit_common::{ResourceId, ResourceStore, ResourceStoreExt, StoreError};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

const BASE_URI: &str = "http://pass.example.org/fcrepo/rest";

async fn memory_store() -> SqliteResourceStore {
    // A single connection: every :memory: connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteResourceStore::from_pool(pool, BASE_URI).await.unwrap()
}

#[tokio::test]
async fn test_create_and_read_back() {
    let store = memory_store().await;

    let repository = store
        .create_and_read(Repository {
            name: "JScholarship".to_string(),
            repository_key: Some("jscholarship".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let id = repository.id.clone().unwrap();
    assert!(id.as_str().starts_with(BASE_URI));
    assert_eq!(repository.version.as_deref(), Some("1"));
    assert_eq!(repository.repository_key.as_deref(), Some("jscholarship"));
}

#[tokio::test]
async fn test_update_bumps_version_and_detects_stale_writes() {
    let store = memory_store().await;
    let id = store
        .create_entity(Deposit::new("s/1".into(), "r/1".into()))
        .await
        .unwrap();

    let mut fresh: Deposit = store.read_entity(&id).await.unwrap();
    let stale = fresh.clone();

    fresh.deposit_status = Some(DepositStatus::Submitted);
    store.update_entity(fresh).await.unwrap();

    let current: Deposit = store.read_entity(&id).await.unwrap();
    assert_eq!(current.version.as_deref(), Some("2"));
    assert_eq!(current.deposit_status, Some(DepositStatus::Submitted));

    let err = store.update_entity(stale).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");
}

#[tokio::test]
async fn test_update_of_missing_resource_is_not_found() {
    let store = memory_store().await;
    let mut deposit = Deposit::new("s/1".into(), "r/1".into());
    deposit.id = Some(ResourceId::from("http://nowhere/deposits/1"));
    deposit.version = Some("1".into());

    let err = store.update_entity(deposit).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_with_other_kind_is_rejected() {
    let store = memory_store().await;
    let id = store.create_entity(Submission::default()).await.unwrap();

    let mut impostor = RepositoryCopy::default();
    impostor.id = Some(id);
    impostor.version = Some("1".into());

    let err = store.update_entity(impostor).await.unwrap_err();
    assert!(matches!(err, StoreError::KindMismatch { .. }));
}

#[tokio::test]
async fn test_incoming_follows_reference_changes() {
    let store = memory_store().await;
    let submission = store.create_entity(Submission::default()).await.unwrap();
    let copy_id = store.create_entity(RepositoryCopy::default()).await.unwrap();

    let deposit_id = store
        .create_entity(Deposit::new(submission.clone(), "r/1".into()))
        .await
        .unwrap();
    assert_eq!(
        store.incoming_by(&submission, relation::SUBMISSION).await.unwrap(),
        vec![deposit_id.clone()]
    );

    let mut deposit: Deposit = store.read_entity(&deposit_id).await.unwrap();
    deposit.repository_copy = Some(copy_id.clone());
    store.update_entity(deposit).await.unwrap();

    assert_eq!(
        store.incoming_by(&copy_id, relation::REPOSITORY_COPY).await.unwrap(),
        vec![deposit_id.clone()]
    );

    store.delete(&deposit_id).await.unwrap();
    assert!(store.incoming(&submission).await.unwrap().is_empty());
    assert!(store.read(&deposit_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_duplicate_identity_rejected() {
    let store = memory_store().await;
    let mut submission = Submission::default();
    submission.id = Some(ResourceId::from("http://pass.example.org/submissions/fixed"));

    store.create_entity(submission.clone()).await.unwrap();
    let err = store.create_entity(submission).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_file_database_persists_and_notifies() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("store").join("resources.db");
    let bus = NotificationBus::new(16);
    let mut rx = bus.subscribe();

    let id = {
        let store = SqliteResourceStore::open(&db_path, BASE_URI)
            .await
            .unwrap()
            .with_notifications(bus.clone());
        store.create_entity(Submission::default()).await.unwrap()
    };

    let notification = rx.recv().await.unwrap();
    assert_eq!(notification.resource_id, id);
    assert_eq!(notification.change, ChangeKind::Created);

    let reopened = SqliteResourceStore::open(&db_path, BASE_URI).await.unwrap();
    let submission: Submission = reopened.read_entity(&id).await.unwrap();
    assert_eq!(submission.id, Some(id));
}
