//! Notification-driven processors

mod deposit;
mod submission;

pub use deposit::{aggregate_statuses, DepositProcessor};
pub use submission::SubmissionProcessor;
