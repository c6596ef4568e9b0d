//! Deposit task: physical transfer, receipt recording and completion

mod helpers;

use deposit_common::config::{StatusRefRewrite, TransportBinding};
use deposit_common::model::{CopyStatus, Deposit, DepositStatus, IntegrationType, Repository, RepositoryCopy, Submission};
use deposit_services::packager::{
    DepositReceipt, FilesystemTransport, JsonAssembler, Packager, Transport, DIRECTORY_PROPERTY,
};
use deposit_common::{ResourceKind, ResourceStore};
use deposit_services::{CriticalRepositoryInteraction, DepositTask, DepositWorkerContext, FailureReason};
use helpers::{
    deposit_submission, packager, repository_config, ConflictingStore, FakeOutcome, FakeTransport, Fixture,
};
use std::sync::Arc;
use tempfile::TempDir;

struct Setup {
    fixture: Fixture,
    submission: Submission,
    repository: Repository,
    deposit: Deposit,
}

async fn setup(status: Option<DepositStatus>) -> Setup {
    let fixture = Fixture::new();
    let repository = fixture.repository("dspace", IntegrationType::Full).await;
    let submission = fixture
        .submission(&[&repository], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;
    let deposit = fixture.deposit(&submission, &repository, status).await;
    Setup {
        fixture,
        submission,
        repository,
        deposit,
    }
}

fn task(setup: &Setup, packager: Packager, rewrite: StatusRefRewrite) -> DepositTask {
    DepositTask::new(
        DepositWorkerContext {
            deposit: setup.deposit.clone(),
            submission: setup.submission.clone(),
            deposit_submission: Arc::new(deposit_submission(setup.submission.id.as_ref().unwrap())),
            repository: setup.repository.clone(),
            packager: Arc::new(packager),
        },
        setup.fixture.cri.clone(),
        rewrite,
    )
}

#[tokio::test]
async fn test_terminal_deposit_is_never_transferred_again() {
    let setup = setup(Some(DepositStatus::Accepted)).await;
    let transport = Arc::new(FakeTransport::succeeding());

    let err = task(&setup, packager("dspace", transport.clone()), StatusRefRewrite::default())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.reason(), Some(FailureReason::Precondition));
    assert!(err.is_precondition_failure());
    assert_eq!(transport.opened(), 0);
    let stored: Deposit = setup.fixture.read(setup.deposit.id.as_ref().unwrap()).await;
    assert_eq!(stored.deposit_status, Some(DepositStatus::Accepted));
    assert_eq!(stored.version, setup.deposit.version);
}

#[tokio::test]
async fn test_transport_failure_is_in_the_cause_chain() {
    let setup = setup(None).await;
    let transport = Arc::new(FakeTransport::new(
        TransportBinding::Ftp,
        FakeOutcome::Failure("550 permission denied".to_string()),
    ));

    let err = task(&setup, packager("pmc", transport.clone()), StatusRefRewrite::default())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.reason(), Some(FailureReason::Postcondition));
    assert!(err.message().contains("Failed to perform deposit"));
    assert!(
        err.chain().iter().any(|m| m.contains("550 permission denied")),
        "cause chain: {:?}",
        err.chain()
    );
    assert_eq!(err.deposit().and_then(|d| d.id.clone()), setup.deposit.id);

    // The session was closed even though the transfer failed
    assert_eq!(transport.opened(), 1);
    assert_eq!(transport.closed(), 1);

    let stored: Deposit = setup.fixture.read(setup.deposit.id.as_ref().unwrap()).await;
    assert_eq!(stored.deposit_status, None);
    assert!(stored.repository_copy.is_none());
}

#[tokio::test]
async fn test_session_open_failure_is_fatal() {
    let setup = setup(None).await;
    let transport = Arc::new(FakeTransport::new(
        TransportBinding::SwordV2,
        FakeOutcome::OpenError("connection refused".to_string()),
    ));

    let err = task(&setup, packager("dspace", transport), StatusRefRewrite::default())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.reason(), Some(FailureReason::CriticalFunction));
    assert!(err.chain().iter().any(|m| m.contains("connection refused")));
}

#[tokio::test]
async fn test_receipt_status_ref_is_rewritten() {
    let setup = setup(None).await;
    let transport = Arc::new(FakeTransport::new(
        TransportBinding::SwordV2,
        FakeOutcome::Receipt(DepositReceipt {
            status_ref: Some("http://internal:8080/statement/1".to_string()),
            item_url: Some("http://internal:8080/item/1".to_string()),
            splash_url: Some("https://public/handle/1".to_string()),
        }),
    ));
    let rewrite = StatusRefRewrite {
        prefix_to_match: Some("http://internal:8080".to_string()),
        replacement_prefix: Some("https://public".to_string()),
    };

    task(&setup, packager("dspace", transport.clone()), rewrite)
        .run()
        .await
        .unwrap();

    let deposit: Deposit = setup.fixture.read(setup.deposit.id.as_ref().unwrap()).await;
    assert_eq!(deposit.deposit_status, Some(DepositStatus::Submitted));
    assert_eq!(deposit.deposit_status_ref.as_deref(), Some("https://public/statement/1"));

    let copy: RepositoryCopy = setup.fixture.read(deposit.repository_copy.as_ref().unwrap()).await;
    assert_eq!(copy.copy_status, Some(CopyStatus::InProgress));
    assert_eq!(copy.access_url.as_deref(), Some("https://public/handle/1"));
    assert_eq!(copy.external_ids, vec!["http://internal:8080/item/1".to_string()]);
    assert_eq!(copy.repository, setup.repository.id);

    let packages = transport.packages();
    assert_eq!(packages.len(), 1);
    assert!(packages[0].0.ends_with(".json"));
    assert!(packages[0].1 > 0);
}

#[tokio::test]
async fn test_conflict_while_recording_receipt_creates_one_copy() {
    let setup = setup(None).await;
    let store = Arc::new(ConflictingStore::new(Arc::clone(&setup.fixture.store)));
    // First Deposit update is the transfer, the second records the receipt
    store.conflict_on(ResourceKind::Deposit, 1);
    let cri = CriticalRepositoryInteraction::new(Arc::clone(&store) as Arc<dyn ResourceStore>);

    let transport = Arc::new(FakeTransport::new(
        TransportBinding::SwordV2,
        FakeOutcome::Receipt(DepositReceipt {
            status_ref: Some("http://internal:8080/statement/1".to_string()),
            item_url: Some("http://internal:8080/item/1".to_string()),
            splash_url: None,
        }),
    ));
    let context = DepositWorkerContext {
        deposit: setup.deposit.clone(),
        submission: setup.submission.clone(),
        deposit_submission: Arc::new(deposit_submission(setup.submission.id.as_ref().unwrap())),
        repository: setup.repository.clone(),
        packager: Arc::new(packager("dspace", transport)),
    };

    DepositTask::new(context, cri.clone(), StatusRefRewrite::default())
        .run()
        .await
        .unwrap();

    assert_eq!(cri.conflict_handler().conflicts_handled(), 1);
    let copies = setup.fixture.store.list(ResourceKind::RepositoryCopy);
    assert_eq!(copies.len(), 1);

    let deposit: Deposit = setup.fixture.read(setup.deposit.id.as_ref().unwrap()).await;
    assert_eq!(deposit.repository_copy.as_ref(), copies[0].id());
    let copy: RepositoryCopy = setup.fixture.read(deposit.repository_copy.as_ref().unwrap()).await;
    assert_eq!(copy.external_ids, vec!["http://internal:8080/item/1".to_string()]);
    assert_eq!(copy.copy_status, Some(CopyStatus::InProgress));
}

#[tokio::test]
async fn test_receiptless_deposit_gets_placeholder_copy() {
    let setup = setup(None).await;
    let transport = Arc::new(FakeTransport::succeeding());

    task(&setup, packager("dspace", transport), StatusRefRewrite::default())
        .run()
        .await
        .unwrap();

    let deposit: Deposit = setup.fixture.read(setup.deposit.id.as_ref().unwrap()).await;
    assert_eq!(deposit.deposit_status, Some(DepositStatus::Submitted));
    assert!(deposit.deposit_status_ref.is_none());

    let copy: RepositoryCopy = setup.fixture.read(deposit.repository_copy.as_ref().unwrap()).await;
    assert_eq!(copy.copy_status, Some(CopyStatus::InProgress));
    assert_eq!(copy.repository, setup.repository.id);
    assert_eq!(copy.publication, setup.submission.publication);
}

#[tokio::test]
async fn test_filesystem_deposit_end_to_end() {
    let setup = setup(None).await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("packages");

    let config = repository_config(
        "local",
        TransportBinding::Filesystem,
        &[(DIRECTORY_PROPERTY, target.to_str().unwrap())],
    );
    let transport: Arc<dyn Transport> = Arc::new(FilesystemTransport);
    let packager = Packager::new("local", Arc::new(JsonAssembler), transport, Arc::new(config));

    task(&setup, packager, StatusRefRewrite::default()).run().await.unwrap();

    let deposit: Deposit = setup.fixture.read(setup.deposit.id.as_ref().unwrap()).await;
    assert_eq!(deposit.deposit_status, Some(DepositStatus::Accepted));

    let copy: RepositoryCopy = setup.fixture.read(deposit.repository_copy.as_ref().unwrap()).await;
    assert_eq!(copy.copy_status, Some(CopyStatus::Complete));
    let access_url = copy.access_url.unwrap();
    assert!(access_url.starts_with("file://"));

    let written = std::path::PathBuf::from(access_url.trim_start_matches("file://"));
    assert!(written.starts_with(&target));
    let body: serde_json::Value = serde_json::from_slice(&std::fs::read(&written).unwrap()).unwrap();
    assert_eq!(body["name"], "Deposit engines");
    assert_eq!(body["files"][0]["name"], "manuscript.pdf");
}
