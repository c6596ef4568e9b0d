use async_trait::async_trait;
use deposit_common::model::{AggregatedDepositStatus, Deposit, DepositStatus, Submission};
use deposit_common::ResourceId;
use tracing::{debug, error, warn};

use crate::cri::CriticalRepositoryInteraction;
use crate::error::DepositServiceError;
use crate::policy::{is_terminal_aggregated_status, is_terminal_deposit_status};

/// Receives every task-fatal error raised while processing notifications
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: DepositServiceError);
}

/// Logs the error and marks the entity it carries as failed
///
/// Precondition failures only mean the resource was not eligible, usually
/// because a duplicate notification arrived after the work was done; they
/// are logged and otherwise ignored.
pub struct DepositServiceErrorHandler {
    cri: CriticalRepositoryInteraction,
}

impl DepositServiceErrorHandler {
    pub fn new(cri: CriticalRepositoryInteraction) -> Self {
        Self { cri }
    }

    async fn fail_deposit(&self, id: &ResourceId) {
        let result = self
            .cri
            .perform_critical(
                id,
                |d: &Deposit| !is_terminal_deposit_status(d.deposit_status),
                |_: &Deposit, _: &()| Ok(()),
                |mut d: Deposit| async move {
                    d.deposit_status = Some(DepositStatus::Failed);
                    Ok((d, ()))
                },
            )
            .await;

        if result.success() {
            warn!(deposit = %id, "Marked deposit as failed");
        } else {
            debug!(deposit = %id, reason = ?result.reason(), "Deposit not marked as failed");
        }
    }

    async fn fail_submission(&self, id: &ResourceId) {
        let result = self
            .cri
            .perform_critical(
                id,
                |s: &Submission| !is_terminal_aggregated_status(s.aggregated_deposit_status),
                |_: &Submission, _: &()| Ok(()),
                |mut s: Submission| async move {
                    s.aggregated_deposit_status = Some(AggregatedDepositStatus::Failed);
                    Ok((s, ()))
                },
            )
            .await;

        if result.success() {
            warn!(submission = %id, "Marked submission as failed");
        } else {
            debug!(submission = %id, reason = ?result.reason(), "Submission not marked as failed");
        }
    }
}

#[async_trait]
impl ErrorHandler for DepositServiceErrorHandler {
    async fn handle(&self, err: DepositServiceError) {
        if err.is_precondition_failure() {
            debug!("{}", err.chain().join(": "));
            return;
        }

        error!(
            resource = ?err.resource().and_then(|r| r.id()),
            "{}",
            err.chain().join(": ")
        );

        if let Some(id) = err.deposit().and_then(|d| d.id.as_ref()) {
            self.fail_deposit(id).await;
        } else if let Some(id) = err.submission().and_then(|s| s.id.as_ref()) {
            self.fail_submission(id).await;
        }
    }
}
