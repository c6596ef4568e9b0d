//! Submission acceptance and per-repository fan-out

mod helpers;

use deposit_common::config::StatusRefRewrite;
use deposit_common::model::{AggregatedDepositStatus, IntegrationType, Submission, SubmissionSource};
use deposit_common::{ResourceStore, ResourceStoreExt};
use deposit_services::builder::StoreSubmissionBuilder;
use deposit_services::packager::PackagerRegistry;
use deposit_services::policy::{AlwaysAcceptPolicy, SubmissionPolicy, UserSubmittedPolicy};
use deposit_services::pool::TaskExecutor;
use deposit_services::{FailureReason, SubmissionProcessor};
use helpers::{packager, FakeTransport, Fixture, RecordingExecutor};
use std::sync::Arc;

fn registry(keys: &[&str]) -> Arc<PackagerRegistry> {
    let mut registry = PackagerRegistry::new();
    for key in keys {
        registry.register(*key, packager(key, Arc::new(FakeTransport::succeeding())));
    }
    Arc::new(registry)
}

fn processor(
    fixture: &Fixture,
    registry: Arc<PackagerRegistry>,
    executor: Arc<dyn TaskExecutor>,
    policy: Arc<dyn SubmissionPolicy>,
) -> SubmissionProcessor {
    SubmissionProcessor::new(
        fixture.cri.clone(),
        Arc::new(StoreSubmissionBuilder::new(Arc::clone(&fixture.store) as Arc<dyn ResourceStore>)),
        policy,
        registry,
        executor,
        StatusRefRewrite::default(),
    )
}

#[tokio::test]
async fn test_submission_without_files_is_refused() {
    let fixture = Fixture::new();
    let repository = fixture.repository("dspace", IntegrationType::Full).await;
    let submission = fixture.submission(&[&repository], &[]).await;
    let executor = Arc::new(RecordingExecutor::new());

    let err = processor(&fixture, registry(&["dspace"]), executor.clone(), Arc::new(AlwaysAcceptPolicy))
        .process(submission.id.as_ref().unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.reason(), Some(FailureReason::Postcondition));
    assert!(
        err.chain().iter().any(|m| m.contains("no files attached")),
        "cause chain: {:?}",
        err.chain()
    );
    assert!(err.submission().is_some());
    assert!(fixture.deposits().is_empty());
    assert_eq!(executor.len(), 0);
}

#[tokio::test]
async fn test_files_without_location_are_reported() {
    let fixture = Fixture::new();
    let repository = fixture.repository("dspace", IntegrationType::Full).await;
    let submission = fixture
        .submission(
            &[&repository],
            &[("manuscript.pdf", Some("http://localhost/files/1")), ("figure.png", None)],
        )
        .await;
    let executor = Arc::new(RecordingExecutor::new());

    let err = processor(&fixture, registry(&["dspace"]), executor.clone(), Arc::new(AlwaysAcceptPolicy))
        .process(submission.id.as_ref().unwrap())
        .await
        .unwrap_err();

    let chain = err.chain().join(" | ");
    assert!(chain.contains("missing URIs"), "{}", chain);
    assert!(chain.contains("figure.png"));
    assert!(!chain.contains("manuscript.pdf"));
    assert!(fixture.deposits().is_empty());
}

#[tokio::test]
async fn test_one_deposit_and_task_per_repository() {
    let fixture = Fixture::new();
    let dspace = fixture.repository("dspace", IntegrationType::Full).await;
    let pmc = fixture.repository("pmc", IntegrationType::OneWay).await;
    let submission = fixture
        .submission(&[&dspace, &pmc], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;
    let submission_id = submission.id.clone().unwrap();
    let executor = Arc::new(RecordingExecutor::new());

    let created = processor(&fixture, registry(&["dspace", "pmc"]), executor.clone(), Arc::new(AlwaysAcceptPolicy))
        .process(&submission_id)
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    let deposits = fixture.deposits();
    assert_eq!(deposits.len(), 2);
    assert_eq!(executor.len(), 2);

    for context in executor.contexts() {
        let deposit = deposits
            .iter()
            .find(|d| d.id == context.deposit.id)
            .expect("task for an unknown deposit");
        assert_eq!(deposit.repository, context.repository.id);
        assert_eq!(deposit.submission.as_ref(), Some(&submission_id));
        assert_eq!(deposit.deposit_status, None);
        assert_eq!(
            context.packager.name(),
            context.repository.repository_key.as_deref().unwrap()
        );
        assert_eq!(context.deposit_submission.files.len(), 1);
    }

    let stored: Submission = fixture.read(&submission_id).await;
    assert_eq!(stored.aggregated_deposit_status, Some(AggregatedDepositStatus::InProgress));
}

#[tokio::test]
async fn test_web_link_repositories_are_skipped() {
    let fixture = Fixture::new();
    let dspace = fixture.repository("dspace", IntegrationType::Full).await;
    let link = fixture.repository("landing-page", IntegrationType::WebLink).await;
    let submission = fixture
        .submission(&[&dspace, &link], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;
    let executor = Arc::new(RecordingExecutor::new());

    processor(&fixture, registry(&["dspace"]), executor.clone(), Arc::new(AlwaysAcceptPolicy))
        .process(submission.id.as_ref().unwrap())
        .await
        .unwrap();

    let deposits = fixture.deposits();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].repository, dspace.id);
    assert_eq!(executor.len(), 1);
}

#[tokio::test]
async fn test_missing_packager_is_fatal() {
    let fixture = Fixture::new();
    let dspace = fixture.repository("dspace", IntegrationType::Full).await;
    let unknown = fixture.repository("unknown", IntegrationType::Full).await;
    let submission = fixture
        .submission(&[&dspace, &unknown], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;
    let executor = Arc::new(RecordingExecutor::new());

    let err = processor(&fixture, registry(&["dspace"]), executor.clone(), Arc::new(AlwaysAcceptPolicy))
        .process(submission.id.as_ref().unwrap())
        .await
        .unwrap_err();

    assert!(err.message().contains("No packager found"));
    assert!(err.submission().is_some());
    // Work already scheduled for the first repository is not rolled back
    assert_eq!(fixture.deposits().len(), 1);
    assert_eq!(executor.len(), 1);
}

#[tokio::test]
async fn test_saturated_pool_is_fatal() {
    let fixture = Fixture::new();
    let dspace = fixture.repository("dspace", IntegrationType::Full).await;
    let submission = fixture
        .submission(&[&dspace], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;

    let err = processor(
        &fixture,
        registry(&["dspace"]),
        Arc::new(RecordingExecutor::rejecting()),
        Arc::new(AlwaysAcceptPolicy),
    )
    .process(submission.id.as_ref().unwrap())
    .await
    .unwrap_err();

    assert!(err.message().contains("Failed to schedule deposit"));
    assert!(err.chain().iter().any(|m| m.contains("saturated")));
}

#[tokio::test]
async fn test_started_submission_is_not_accepted_twice() {
    let fixture = Fixture::new();
    let dspace = fixture.repository("dspace", IntegrationType::Full).await;
    let submission = fixture
        .submission(&[&dspace], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;
    let executor = Arc::new(RecordingExecutor::new());
    let processor = processor(&fixture, registry(&["dspace"]), executor.clone(), Arc::new(AlwaysAcceptPolicy));

    processor.process(submission.id.as_ref().unwrap()).await.unwrap();
    let err = processor
        .process(submission.id.as_ref().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_precondition_failure());
    assert_eq!(fixture.deposits().len(), 1);
    assert_eq!(executor.len(), 1);
}

#[tokio::test]
async fn test_policy_refusal_is_a_precondition_failure() {
    let fixture = Fixture::new();
    let dspace = fixture.repository("dspace", IntegrationType::Full).await;
    let mut submission = fixture
        .submission(&[&dspace], &[("manuscript.pdf", Some("http://localhost/files/1"))])
        .await;
    submission.source = Some(SubmissionSource::Other);
    fixture.store.update_entity(submission.clone()).await.unwrap();
    let executor = Arc::new(RecordingExecutor::new());

    let err = processor(&fixture, registry(&["dspace"]), executor.clone(), Arc::new(UserSubmittedPolicy))
        .process(submission.id.as_ref().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_precondition_failure());
    assert!(fixture.deposits().is_empty());
}
