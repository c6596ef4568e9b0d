use deposit_common::config::StatusRefRewrite;
use deposit_common::model::{AggregatedDepositStatus, Deposit, IntegrationType, Repository, Submission};
use deposit_common::{ResourceId, ResourceStoreExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::builder::SubmissionBuilder;
use crate::cri::{ConditionViolation, CriticalRepositoryInteraction};
use crate::error::{DepositResult, DepositServiceError};
use crate::model::DepositSubmission;
use crate::packager::PackagerRegistry;
use crate::policy::{is_not_started, SubmissionPolicy};
use crate::pool::TaskExecutor;
use crate::task::{DepositTask, DepositWorkerContext};

/// Accepts a ready Submission and schedules one deposit task per repository
pub struct SubmissionProcessor {
    cri: CriticalRepositoryInteraction,
    builder: Arc<dyn SubmissionBuilder>,
    policy: Arc<dyn SubmissionPolicy>,
    registry: Arc<PackagerRegistry>,
    executor: Arc<dyn TaskExecutor>,
    status_ref_rewrite: StatusRefRewrite,
}

impl SubmissionProcessor {
    pub fn new(
        cri: CriticalRepositoryInteraction,
        builder: Arc<dyn SubmissionBuilder>,
        policy: Arc<dyn SubmissionPolicy>,
        registry: Arc<PackagerRegistry>,
        executor: Arc<dyn TaskExecutor>,
        status_ref_rewrite: StatusRefRewrite,
    ) -> Self {
        Self {
            cri,
            builder,
            policy,
            registry,
            executor,
            status_ref_rewrite,
        }
    }

    pub fn policy(&self) -> &dyn SubmissionPolicy {
        self.policy.as_ref()
    }

    /// Accept the submission and schedule its deposits
    ///
    /// Returns the identities of the Deposits created. Deposits created before
    /// a failure on a later repository are left in place.
    pub async fn process(&self, submission_id: &ResourceId) -> DepositResult<Vec<ResourceId>> {
        let (submission, deposit_submission) = self.accept(submission_id).await?;
        let deposit_submission = Arc::new(deposit_submission);
        let store = self.cri.store();

        let mut deposits = Vec::new();
        for repository_id in &submission.repositories {
            let repository: Repository = store.read_entity(repository_id).await.map_err(|e| {
                DepositServiceError::new(format!(
                    "Failed to read repository {} of submission {}",
                    repository_id, submission_id
                ))
                .with_resource(submission.clone())
                .with_source(e)
            })?;

            if repository.integration_type == Some(IntegrationType::WebLink) {
                debug!(repository = %repository_id, "Skipping web-link repository");
                continue;
            }

            let packager = self.registry.resolve(&repository).ok_or_else(|| {
                DepositServiceError::new(format!(
                    "No packager found for repository {} of submission {}",
                    repository_id, submission_id
                ))
                .with_resource(submission.clone())
            })?;

            let deposit = store
                .create_and_read(Deposit::new(submission_id.clone(), repository_id.clone()))
                .await
                .map_err(|e| {
                    DepositServiceError::new(format!(
                        "Failed to create deposit of submission {} to repository {}",
                        submission_id, repository_id
                    ))
                    .with_resource(submission.clone())
                    .with_source(e)
                })?;
            let deposit_id = deposit.id.clone();

            let task = DepositTask::new(
                DepositWorkerContext {
                    deposit,
                    submission: submission.clone(),
                    deposit_submission: Arc::clone(&deposit_submission),
                    repository,
                    packager,
                },
                self.cri.clone(),
                self.status_ref_rewrite.clone(),
            );
            self.executor.execute(task).map_err(|e| {
                DepositServiceError::new(format!(
                    "Failed to schedule deposit of submission {} to repository {}",
                    submission_id, repository_id
                ))
                .with_resource(submission.clone())
                .with_source(e)
            })?;

            info!(
                submission = %submission_id,
                repository = %repository_id,
                deposit = ?deposit_id,
                "Scheduled deposit"
            );
            deposits.extend(deposit_id);
        }
        Ok(deposits)
    }

    /// Move the submission to in-progress and build its working model
    async fn accept(&self, submission_id: &ResourceId) -> DepositResult<(Submission, DepositSubmission)> {
        let builder = &self.builder;
        let policy = &self.policy;

        let result = self
            .cri
            .perform_critical(
                submission_id,
                |s: &Submission| policy.accept(s) && is_not_started(s.aggregated_deposit_status),
                |s: &Submission, model: &DepositSubmission| {
                    ConditionViolation::ensure(
                        s.aggregated_deposit_status == Some(AggregatedDepositStatus::InProgress),
                        format!("Submission {} is not in progress", submission_id),
                    )?;
                    ConditionViolation::ensure(
                        !model.files.is_empty(),
                        format!("Submission {} has no files attached", submission_id),
                    )?;
                    let missing = model.files_missing_location();
                    ConditionViolation::ensure(
                        missing.is_empty(),
                        format!(
                            "Submission {} has files with missing URIs: {}",
                            submission_id,
                            missing.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    )
                },
                move |mut s: Submission| async move {
                    let model = builder.build(submission_id.as_str()).await?;
                    s.aggregated_deposit_status = Some(AggregatedDepositStatus::InProgress);
                    Ok((s, model))
                },
            )
            .await;

        if !result.success() {
            let message = match result.error() {
                Some(err) => format!("Failed to accept submission {}: {}", submission_id, err),
                None => format!("Submission {} is not eligible for deposit", submission_id),
            };
            return Err(DepositServiceError::from_critical(message, result));
        }

        match result.into_parts() {
            (Some(submission), Some(model), _) => {
                info!(
                    submission = %submission_id,
                    files = model.files.len(),
                    repositories = submission.repositories.len(),
                    "Accepted submission"
                );
                Ok((submission, model))
            }
            _ => Err(DepositServiceError::new(format!(
                "Missing submission or deposit model after accepting submission {}",
                submission_id
            ))),
        }
    }
}
