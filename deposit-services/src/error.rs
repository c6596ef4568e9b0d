//! Task-fatal errors of the deposit services

use deposit_common::model::{Deposit, Submission};
use deposit_common::Resource;
use thiserror::Error;

use crate::cri::{BoxError, CriticalResult, FailureReason};

/// A failure that ends the processing of a submission or deposit
///
/// Carries the offending entity so the error handler can mark it failed and
/// operators can correlate the log entry. The full cause chain is reachable
/// through `std::error::Error::source`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DepositServiceError {
    message: String,
    resource: Option<Resource>,
    reason: Option<FailureReason>,
    #[source]
    source: Option<BoxError>,
}

pub type DepositResult<T> = std::result::Result<T, DepositServiceError>;

impl DepositServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource: None,
            reason: None,
            source: None,
        }
    }

    /// Build from a failed critical interaction, keeping its resource,
    /// failure reason and captured error
    pub fn from_critical<R, T>(message: impl Into<String>, result: CriticalResult<R, T>) -> Self
    where
        T: Into<Resource>,
    {
        let reason = result.reason();
        let (resource, _, error) = result.into_parts();
        Self {
            message: message.into(),
            resource: resource.map(Into::into),
            reason,
            source: error.map(|e| Box::new(e) as BoxError),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<Resource>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.reason
    }

    pub fn deposit(&self) -> Option<&Deposit> {
        match &self.resource {
            Some(Resource::Deposit(deposit)) => Some(deposit),
            _ => None,
        }
    }

    pub fn submission(&self) -> Option<&Submission> {
        match &self.resource {
            Some(Resource::Submission(submission)) => Some(submission),
            _ => None,
        }
    }

    /// True when the resource was simply not eligible, e.g. a stale or
    /// duplicate notification for work that already happened
    pub fn is_precondition_failure(&self) -> bool {
        self.reason == Some(FailureReason::Precondition)
    }

    /// Messages of this error and every cause below it, outermost first
    pub fn chain(&self) -> Vec<String> {
        let mut messages = Vec::new();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            messages.push(err.to_string());
            current = err.source();
        }
        messages
    }
}
