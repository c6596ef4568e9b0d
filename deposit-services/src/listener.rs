//! Dispatches resource-change notifications to the processors
//!
//! Notifications are hints, not facts: the same resource may be announced
//! many times, so every dispatch re-reads the resource and the processors'
//! critical interactions decide whether there is anything to do.

use deposit_common::events::{ChangeKind, ResourceNotification};
use deposit_common::model::Submission;
use deposit_common::{ResourceKind, ResourceStoreExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cri::CriticalRepositoryInteraction;
use crate::error::{DepositResult, DepositServiceError};
use crate::error_handler::ErrorHandler;
use crate::policy::is_not_started;
use crate::processor::{DepositProcessor, SubmissionProcessor};

pub struct NotificationListener {
    cri: CriticalRepositoryInteraction,
    submissions: Arc<SubmissionProcessor>,
    deposits: Arc<DepositProcessor>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl NotificationListener {
    pub fn new(
        cri: CriticalRepositoryInteraction,
        submissions: Arc<SubmissionProcessor>,
        deposits: Arc<DepositProcessor>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            cri,
            submissions,
            deposits,
            error_handler,
        }
    }

    /// Receive and dispatch until cancelled or the bus closes
    ///
    /// Each notification is handled on its own task; dispatches still running
    /// when the loop ends are awaited before returning.
    pub async fn run(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<ResourceNotification>,
        cancel: CancellationToken,
    ) {
        info!("Notification listener started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Notification dispatch panicked: {}", e);
                    }
                }
                received = rx.recv() => match received {
                    Ok(notification) => {
                        let listener = Arc::clone(&self);
                        in_flight.spawn(async move {
                            if let Err(e) = listener.dispatch(&notification).await {
                                listener.error_handler.handle(e).await;
                            }
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Notification listener lagged, {} notifications dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Notification bus closed");
                        break;
                    }
                },
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Notification dispatch panicked: {}", e);
            }
        }
        info!("Notification listener stopped");
    }

    /// Route one notification to the processor for its resource kind
    pub async fn dispatch(&self, notification: &ResourceNotification) -> DepositResult<()> {
        if notification.change == ChangeKind::Deleted {
            return Ok(());
        }
        let id = &notification.resource_id;

        match notification.kind {
            ResourceKind::Submission => {
                let submission: Submission = self.cri.store().read_entity(id).await.map_err(|e| {
                    DepositServiceError::new(format!("Failed to read submission {}", id)).with_source(e)
                })?;
                if !self.submissions.policy().accept(&submission)
                    || !is_not_started(submission.aggregated_deposit_status)
                {
                    debug!(submission = %id, "Submission not eligible, skipping");
                    return Ok(());
                }
                self.submissions.process(id).await.map(|_| ())
            }
            ResourceKind::Deposit => self.deposits.process(id).await,
            _ => Ok(()),
        }
    }
}
