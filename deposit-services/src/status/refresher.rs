use anyhow::Context;
use deposit_common::model::{CopyStatus, Deposit, DepositStatus, Repository, RepositoryCopy};
use deposit_common::{ResourceId, ResourceStoreExt};
use std::sync::Arc;
use tracing::{debug, info};

use super::DepositStatusProcessor;
use crate::cri::{CriticalRepositoryInteraction, FailureReason};
use crate::error::{DepositResult, DepositServiceError};
use crate::packager::PackagerRegistry;
use crate::policy::{is_intermediate_deposit_status, is_terminal_deposit_status};

/// Updates an in-flight deposit from its remote status document
///
/// The lookup runs inside a critical interaction on the Deposit so it cannot
/// race with a deposit task updating the same Deposit. Only terminal remote
/// statuses are recorded.
pub struct DepositStatusRefresher {
    cri: CriticalRepositoryInteraction,
    registry: Arc<PackagerRegistry>,
    processor: Arc<DepositStatusProcessor>,
}

impl DepositStatusRefresher {
    pub fn new(
        cri: CriticalRepositoryInteraction,
        registry: Arc<PackagerRegistry>,
        processor: Arc<DepositStatusProcessor>,
    ) -> Self {
        Self {
            cri,
            registry,
            processor,
        }
    }

    /// Returns the terminal status recorded on the deposit, if it reached one
    pub async fn refresh(&self, deposit_id: &ResourceId) -> DepositResult<Option<DepositStatus>> {
        let store = self.cri.store();
        let registry = &self.registry;
        let processor = &self.processor;

        let result = self
            .cri
            .perform_critical(
                deposit_id,
                |d: &Deposit| {
                    is_intermediate_deposit_status(d.deposit_status) && d.deposit_status_ref.is_some()
                },
                |_: &Deposit, _: &Option<DepositStatus>| Ok(()),
                move |mut d: Deposit| async move {
                    let repository_id = d.repository.clone().context("Deposit has no repository")?;
                    let repository: Repository = store.read_entity(&repository_id).await?;
                    let packager = registry.resolve(&repository).with_context(|| {
                        format!("No packager found for repository {}", repository_id)
                    })?;

                    let status = processor
                        .process(&d, packager.repository_config())
                        .await?
                        .filter(|s| is_terminal_deposit_status(Some(*s)));
                    if let Some(status) = status {
                        d.deposit_status = Some(status);
                    }
                    Ok((d, status))
                },
            )
            .await;

        if result.reason() == Some(FailureReason::Precondition) {
            debug!(deposit = %deposit_id, "Deposit is terminal or has no status reference, not refreshing");
            return Ok(None);
        }
        if !result.success() {
            return Err(DepositServiceError::from_critical(
                format!("Failed to refresh the status of deposit {}", deposit_id),
                result,
            ));
        }

        let (deposit, status, _) = result.into_parts();
        let (Some(deposit), Some(status)) = (deposit, status.flatten()) else {
            return Ok(None);
        };

        info!(deposit = %deposit_id, status = %status, "Deposit reached terminal status");
        if let Some(copy_id) = &deposit.repository_copy {
            self.update_copy(copy_id, status).await?;
        }
        Ok(Some(status))
    }

    async fn update_copy(&self, copy_id: &ResourceId, status: DepositStatus) -> DepositResult<()> {
        let target = match status {
            DepositStatus::Accepted => CopyStatus::Complete,
            DepositStatus::Rejected => CopyStatus::Rejected,
            _ => return Ok(()),
        };

        let result = self
            .cri
            .perform_critical(
                copy_id,
                |copy: &RepositoryCopy| copy.copy_status != Some(target),
                |_: &RepositoryCopy, _: &()| Ok(()),
                |mut copy: RepositoryCopy| async move {
                    copy.copy_status = Some(target);
                    Ok((copy, ()))
                },
            )
            .await;

        if result.success() || result.reason() == Some(FailureReason::Precondition) {
            Ok(())
        } else {
            Err(DepositServiceError::from_critical(
                format!("Failed to update repository copy {}", copy_id),
                result,
            ))
        }
    }
}
