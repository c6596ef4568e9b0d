//! Deposit of one submission into one repository
//!
//! A task separates physical success (the package bytes reached the remote
//! endpoint) from logical success (the repository accepted the content).
//! Physical transfer and the Deposit's move to `submitted` happen in one
//! critical interaction on the Deposit; receipt data returned by the
//! repository is recorded in a second one.

use anyhow::Context;
use deposit_common::config::StatusRefRewrite;
use deposit_common::model::{CopyStatus, Deposit, DepositStatus, Repository, RepositoryCopy, Submission};
use deposit_common::{ResourceId, ResourceStoreExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::cri::{ConditionViolation, CriticalRepositoryInteraction};
use crate::error::{DepositResult, DepositServiceError};
use crate::model::DepositSubmission;
use crate::packager::{send_package, DepositReceipt, Packager, SuccessContext, TransportResponse};
use crate::policy::is_intermediate_deposit_status;
use crate::utils::rewrite_status_ref;

/// Everything a deposit task works on
#[derive(Clone)]
pub struct DepositWorkerContext {
    pub deposit: Deposit,
    pub submission: Submission,
    pub deposit_submission: Arc<DepositSubmission>,
    pub repository: Repository,
    pub packager: Arc<Packager>,
}

impl fmt::Debug for DepositWorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepositWorkerContext")
            .field("deposit", &self.deposit.id)
            .field("submission", &self.submission.id)
            .field("repository", &self.repository.id)
            .field("packager", &self.packager.name())
            .finish()
    }
}

#[derive(Debug)]
pub struct DepositTask {
    context: DepositWorkerContext,
    cri: CriticalRepositoryInteraction,
    status_ref_rewrite: StatusRefRewrite,
}

impl DepositTask {
    pub fn new(
        context: DepositWorkerContext,
        cri: CriticalRepositoryInteraction,
        status_ref_rewrite: StatusRefRewrite,
    ) -> Self {
        Self {
            context,
            cri,
            status_ref_rewrite,
        }
    }

    pub fn context(&self) -> &DepositWorkerContext {
        &self.context
    }

    pub fn deposit_id(&self) -> Option<&ResourceId> {
        self.context.deposit.id.as_ref()
    }

    pub async fn run(self) -> DepositResult<()> {
        let deposit_id = self.context.deposit.id.clone().ok_or_else(|| {
            DepositServiceError::new("Deposit task has no deposit identity")
                .with_resource(self.context.deposit.clone())
        })?;
        info!(
            deposit = %deposit_id,
            packager = %self.context.packager.name(),
            "Starting deposit"
        );

        let (deposit, response) = self.transfer(&deposit_id).await?;

        let copy = match response.deposit_receipt() {
            Some(receipt) => Some(self.record_receipt(&deposit_id, receipt).await?),
            None => None,
        };
        let (deposit, copy) = match copy {
            Some(recorded) => recorded,
            None => self.attach_placeholder_copy(deposit).await?,
        };

        response
            .on_success(SuccessContext {
                cri: &self.cri,
                submission: &self.context.submission,
                deposit: &deposit,
                repository_copy: &copy,
            })
            .await
            .map_err(|e| {
                DepositServiceError::new(format!(
                    "Deposit {} was transferred but its completion step failed",
                    deposit_id
                ))
                .with_resource(deposit.clone())
                .with_source(e)
            })?;

        info!(deposit = %deposit_id, copy = ?copy.id, "Deposit complete");
        Ok(())
    }

    /// Assemble, send, and mark the Deposit submitted
    async fn transfer(&self, deposit_id: &ResourceId) -> DepositResult<(Deposit, Box<dyn TransportResponse>)> {
        let context = &self.context;

        let result = self
            .cri
            .perform_critical(
                deposit_id,
                |d: &Deposit| {
                    let intermediate = is_intermediate_deposit_status(d.deposit_status);
                    if !intermediate {
                        debug!(deposit = %deposit_id, status = ?d.deposit_status, "Deposit already terminal");
                    }
                    intermediate
                },
                |d: &Deposit, response: &Box<dyn TransportResponse>| {
                    if let Some(error) = response.error() {
                        return Err(ConditionViolation::with_source(
                            format!("Transport of deposit {} failed", deposit_id),
                            error.clone(),
                        ));
                    }
                    ConditionViolation::ensure(
                        response.success(),
                        format!("Transport of deposit {} did not report success", deposit_id),
                    )?;
                    ConditionViolation::ensure(
                        d.deposit_status == Some(DepositStatus::Submitted),
                        format!("Deposit {} is not in the submitted state", deposit_id),
                    )
                },
                move |mut d: Deposit| async move {
                    let packager = &context.packager;
                    let package = packager
                        .assembler()
                        .assemble(&context.deposit_submission, packager.assembler_options())
                        .await
                        .with_context(|| format!("Failed to assemble package for deposit {}", deposit_id))?;

                    let response = send_package(packager.transport(), package, packager.configuration())
                        .await
                        .with_context(|| format!("Failed to transport package for deposit {}", deposit_id))?;

                    if response.success() {
                        d.deposit_status = Some(DepositStatus::Submitted);
                    }
                    Ok((d, response))
                },
            )
            .await;

        if !result.success() {
            let message = match result.error() {
                Some(err) => format!("Failed to perform deposit {}: {}", deposit_id, err),
                None => format!(
                    "Failed to perform deposit {}: {} check did not pass",
                    deposit_id,
                    result
                        .reason()
                        .map_or_else(|| "unknown".to_string(), |r| r.to_string())
                ),
            };
            error!(deposit = %deposit_id, "{}", message);
            return Err(DepositServiceError::from_critical(message, result));
        }

        let (deposit, response, _) = result.into_parts();
        match (deposit, response) {
            (Some(deposit), Some(response)) => Ok((deposit, response)),
            _ => Err(DepositServiceError::new(format!(
                "Missing deposit or transport response after transferring deposit {}",
                deposit_id
            ))
            .with_resource(self.context.deposit.clone())),
        }
    }

    /// Record receipt data: rewritten status reference and the repository copy
    async fn record_receipt(
        &self,
        deposit_id: &ResourceId,
        receipt: &DepositReceipt,
    ) -> DepositResult<(Deposit, RepositoryCopy)> {
        let store = self.cri.store();
        let context = &self.context;
        let status_ref = receipt
            .status_ref
            .as_deref()
            .map(|url| rewrite_status_ref(&self.status_ref_rewrite, url));
        let status_ref = status_ref.as_deref();
        let created_copy: OnceCell<ResourceId> = OnceCell::new();
        let created_copy = &created_copy;

        let result = self
            .cri
            .perform_critical(
                deposit_id,
                |d: &Deposit| d.deposit_status == Some(DepositStatus::Submitted),
                |d: &Deposit, _: &RepositoryCopy| {
                    ConditionViolation::ensure(
                        d.deposit_status_ref.is_some(),
                        format!("Deposit {} has no status reference after recording its receipt", deposit_id),
                    )?;
                    ConditionViolation::ensure(
                        d.repository_copy.is_some(),
                        format!("Deposit {} has no repository copy after recording its receipt", deposit_id),
                    )
                },
                move |mut d: Deposit| async move {
                    // A conflict retry sees a Deposit without the link, so reuse
                    // the copy created by the first attempt
                    let copy_id = match &d.repository_copy {
                        Some(copy_id) => copy_id.clone(),
                        None => created_copy
                            .get_or_try_init(|| {
                                store.create_entity(RepositoryCopy {
                                    repository: context.repository.id.clone(),
                                    publication: context.submission.publication.clone(),
                                    ..Default::default()
                                })
                            })
                            .await?
                            .clone(),
                    };

                    let mut copy: RepositoryCopy = store.read_entity(&copy_id).await?;
                    copy.copy_status = Some(CopyStatus::InProgress);
                    copy.access_url = receipt
                        .splash_url
                        .clone()
                        .or_else(|| receipt.item_url.clone())
                        .or(copy.access_url);
                    if let Some(item_url) = &receipt.item_url {
                        if !copy.external_ids.contains(item_url) {
                            copy.external_ids.push(item_url.clone());
                        }
                    }
                    store.update_entity(copy).await?;
                    let copy: RepositoryCopy = store.read_entity(&copy_id).await?;

                    d.deposit_status_ref = status_ref.map(str::to_string);
                    d.repository_copy = copy.id.clone();
                    Ok((d, copy))
                },
            )
            .await;

        if !result.success() {
            return Err(DepositServiceError::from_critical(
                format!("Failed to record the deposit receipt of deposit {}", deposit_id),
                result,
            ));
        }
        let (deposit, copy, _) = result.into_parts();
        match (deposit, copy) {
            (Some(deposit), Some(copy)) => {
                debug!(deposit = %deposit_id, status_ref = ?deposit.deposit_status_ref, "Recorded deposit receipt");
                Ok((deposit, copy))
            }
            _ => Err(DepositServiceError::new(format!(
                "Missing deposit or repository copy after recording the receipt of deposit {}",
                deposit_id
            ))
            .with_resource(self.context.deposit.clone())),
        }
    }

    /// Give a receipt-less deposit an in-progress repository copy
    ///
    /// The copy is created outside any critical interaction since nobody else
    /// can know about it yet; linking it to the Deposit is guarded.
    async fn attach_placeholder_copy(&self, deposit: Deposit) -> DepositResult<(Deposit, RepositoryCopy)> {
        let store = self.cri.store();
        let deposit_id = deposit.id.clone().ok_or_else(|| {
            DepositServiceError::new("Deposit has no identity").with_resource(deposit.clone())
        })?;

        if let Some(copy_id) = &deposit.repository_copy {
            let copy: RepositoryCopy = store.read_entity(copy_id).await.map_err(|e| {
                DepositServiceError::new(format!("Failed to read repository copy {}", copy_id))
                    .with_resource(deposit.clone())
                    .with_source(e)
            })?;
            return Ok((deposit, copy));
        }

        let copy = store
            .create_and_read(RepositoryCopy {
                copy_status: Some(CopyStatus::InProgress),
                repository: self.context.repository.id.clone(),
                publication: self.context.submission.publication.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                DepositServiceError::new(format!(
                    "Failed to create repository copy for deposit {}",
                    deposit_id
                ))
                .with_resource(deposit.clone())
                .with_source(e)
            })?;
        let copy_id = copy.id.clone();

        let result = self
            .cri
            .perform_critical(
                &deposit_id,
                |d: &Deposit| d.repository_copy.is_none(),
                |d: &Deposit, _: &()| {
                    ConditionViolation::ensure(
                        d.repository_copy == copy_id,
                        "repository copy was not linked",
                    )
                },
                |mut d: Deposit| {
                    let copy_id = copy_id.clone();
                    async move {
                        d.repository_copy = copy_id;
                        Ok((d, ()))
                    }
                },
            )
            .await;

        if !result.success() {
            return Err(DepositServiceError::from_critical(
                format!("Failed to link repository copy to deposit {}", deposit_id),
                result,
            ));
        }
        match result.into_resource() {
            Some(deposit) => Ok((deposit, copy)),
            None => Err(DepositServiceError::new(format!(
                "Missing deposit after linking its repository copy {}",
                deposit_id
            ))),
        }
    }
}
