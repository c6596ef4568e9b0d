//! Status classification and submission acceptance policies

use deposit_common::model::{AggregatedDepositStatus, DepositStatus, Submission, SubmissionSource};

/// A deposit status from which no further transition is expected
///
/// An unset status belongs to a deposit that has not been attempted yet and
/// is intermediate.
pub fn is_terminal_deposit_status(status: Option<DepositStatus>) -> bool {
    matches!(
        status,
        Some(DepositStatus::Accepted | DepositStatus::Rejected | DepositStatus::Failed)
    )
}

pub fn is_intermediate_deposit_status(status: Option<DepositStatus>) -> bool {
    !is_terminal_deposit_status(status)
}

pub fn is_terminal_aggregated_status(status: Option<AggregatedDepositStatus>) -> bool {
    matches!(
        status,
        Some(
            AggregatedDepositStatus::Accepted
                | AggregatedDepositStatus::Rejected
                | AggregatedDepositStatus::Failed
                | AggregatedDepositStatus::Cancelled
        )
    )
}

pub fn is_intermediate_aggregated_status(status: Option<AggregatedDepositStatus>) -> bool {
    !is_terminal_aggregated_status(status)
}

/// Processing of the submission has not begun
pub fn is_not_started(status: Option<AggregatedDepositStatus>) -> bool {
    matches!(status, None | Some(AggregatedDepositStatus::NotStarted))
}

/// Decides whether a submission is eligible for deposit at all
pub trait SubmissionPolicy: Send + Sync {
    fn accept(&self, submission: &Submission) -> bool;
}

/// Accepts every submission
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAcceptPolicy;

impl SubmissionPolicy for AlwaysAcceptPolicy {
    fn accept(&self, _submission: &Submission) -> bool {
        true
    }
}

/// Accepts only submissions a user created interactively and then submitted
#[derive(Debug, Clone, Copy, Default)]
pub struct UserSubmittedPolicy;

impl SubmissionPolicy for UserSubmittedPolicy {
    fn accept(&self, submission: &Submission) -> bool {
        submission.submitted && submission.source == Some(SubmissionSource::Pass)
    }
}
