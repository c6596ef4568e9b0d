use anyhow::Context;
use deposit_common::model::{relation, AggregatedDepositStatus, Deposit, DepositStatus, Submission};
use deposit_common::{Resource, ResourceId, ResourceStoreExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cri::{CriticalRepositoryInteraction, FailureReason};
use crate::error::{DepositResult, DepositServiceError};
use crate::policy::{is_intermediate_aggregated_status, is_terminal_deposit_status};
use crate::status::DepositStatusRefresher;

/// Reacts to a changed Deposit
///
/// A terminal Deposit may complete its Submission; an intermediate one has
/// its remote status refreshed.
pub struct DepositProcessor {
    cri: CriticalRepositoryInteraction,
    refresher: Arc<DepositStatusRefresher>,
}

impl DepositProcessor {
    pub fn new(cri: CriticalRepositoryInteraction, refresher: Arc<DepositStatusRefresher>) -> Self {
        Self { cri, refresher }
    }

    pub async fn process(&self, deposit_id: &ResourceId) -> DepositResult<()> {
        let deposit: Deposit = self.cri.store().read_entity(deposit_id).await.map_err(|e| {
            DepositServiceError::new(format!("Failed to read deposit {}", deposit_id)).with_source(e)
        })?;

        if is_terminal_deposit_status(deposit.deposit_status) {
            let submission_id = deposit.submission.clone().ok_or_else(|| {
                DepositServiceError::new(format!("Deposit {} has no submission", deposit_id))
                    .with_resource(deposit.clone())
            })?;
            self.aggregate(&submission_id).await?;
        } else {
            self.refresher.refresh(deposit_id).await?;
        }
        Ok(())
    }

    /// Derive the submission's aggregated status from all of its deposits
    ///
    /// Nothing changes until every deposit is terminal.
    pub async fn aggregate(&self, submission_id: &ResourceId) -> DepositResult<Option<AggregatedDepositStatus>> {
        let store = self.cri.store();

        let result = self
            .cri
            .perform_critical(
                submission_id,
                |s: &Submission| is_intermediate_aggregated_status(s.aggregated_deposit_status),
                |_: &Submission, _: &Option<AggregatedDepositStatus>| Ok(()),
                move |mut s: Submission| async move {
                    let id = s.id.clone().context("Submission has no identity")?;
                    let mut statuses = Vec::new();
                    for referrer in store.incoming_by(&id, relation::SUBMISSION).await? {
                        // Files refer to their submission too
                        if let Resource::Deposit(d) = store.read(&referrer).await? {
                            statuses.push(d.deposit_status);
                        }
                    }

                    let aggregated = aggregate_statuses(&statuses);
                    if let Some(status) = aggregated {
                        s.aggregated_deposit_status = Some(status);
                    }
                    Ok((s, aggregated))
                },
            )
            .await;

        if result.reason() == Some(FailureReason::Precondition) {
            debug!(submission = %submission_id, "Submission already terminal");
            return Ok(None);
        }
        if !result.success() {
            return Err(DepositServiceError::from_critical(
                format!("Failed to update the aggregated status of submission {}", submission_id),
                result,
            ));
        }

        let status = result.into_result().flatten();
        match status {
            Some(status) => info!(submission = %submission_id, status = %status, "Submission complete"),
            None => debug!(submission = %submission_id, "Submission has deposits in flight"),
        }
        Ok(status)
    }
}

/// Accepted when every deposit was accepted, rejected when all are terminal
/// but some were not, `None` while any is intermediate or there are none
pub fn aggregate_statuses(statuses: &[Option<DepositStatus>]) -> Option<AggregatedDepositStatus> {
    if statuses.is_empty() || !statuses.iter().all(|s| is_terminal_deposit_status(*s)) {
        return None;
    }
    if statuses.iter().all(|s| *s == Some(DepositStatus::Accepted)) {
        Some(AggregatedDepositStatus::Accepted)
    } else {
        Some(AggregatedDepositStatus::Rejected)
    }
}
