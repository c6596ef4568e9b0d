use deposit_common::ResourceId;
use std::sync::Arc;
use tracing::{error, info};

use crate::status::DepositStatusRefresher;

/// Outcome counts of a batch refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Deposits that reached a terminal status
    pub refreshed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Refreshes the remote status of a batch of deposits
///
/// Each deposit is refreshed independently; a failure is logged and counted
/// without stopping the batch.
pub struct DepositUpdater {
    refresher: Arc<DepositStatusRefresher>,
}

impl DepositUpdater {
    pub fn new(refresher: Arc<DepositStatusRefresher>) -> Self {
        Self { refresher }
    }

    pub async fn update(&self, deposit_ids: &[ResourceId]) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        for id in deposit_ids {
            match self.refresher.refresh(id).await {
                Ok(Some(status)) => {
                    info!(deposit = %id, status = %status, "Deposit status updated");
                    summary.refreshed += 1;
                }
                Ok(None) => summary.unchanged += 1,
                Err(e) => {
                    error!(deposit = %id, "{}", e.chain().join(": "));
                    summary.failed += 1;
                }
            }
        }
        info!(
            refreshed = summary.refreshed,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "Deposit update finished"
        );
        summary
    }
}
