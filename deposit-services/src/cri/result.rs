//! Outcome types of a critical repository interaction

use deposit_common::StoreError;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed error carried as the cause of a failure
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Which phase of a critical interaction decided its failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The resource was not in a state that allows the interaction
    Precondition,
    /// The critical function returned an error
    CriticalFunction,
    /// A version conflict could not be recovered
    Conflict,
    /// Reading or writing the resource failed
    Store,
    /// The state after write-back was not the expected one
    Postcondition,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::Precondition => "precondition",
            FailureReason::CriticalFunction => "critical function",
            FailureReason::Conflict => "conflict",
            FailureReason::Store => "store",
            FailureReason::Postcondition => "postcondition",
        };
        f.write_str(name)
    }
}

/// A postcondition that does not hold, with an optional underlying cause
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConditionViolation {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ConditionViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `Ok` when `condition` holds, a violation with `message` otherwise
    pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), Self> {
        if condition {
            Ok(())
        } else {
            Err(Self::new(message))
        }
    }
}

/// Error captured by a failed critical interaction
#[derive(Debug, Error)]
pub enum CriticalError {
    #[error("Unresolved version conflict: {0}")]
    Conflict(#[source] StoreError),

    #[error("Resource store error: {0}")]
    Store(#[source] StoreError),

    #[error("Critical function failed: {0}")]
    Critical(#[source] BoxError),

    #[error("Postcondition failed: {0}")]
    Postcondition(#[source] ConditionViolation),
}

impl CriticalError {
    pub fn reason(&self) -> FailureReason {
        match self {
            CriticalError::Conflict(_) => FailureReason::Conflict,
            CriticalError::Store(_) => FailureReason::Store,
            CriticalError::Critical(_) => FailureReason::CriticalFunction,
            CriticalError::Postcondition(_) => FailureReason::Postcondition,
        }
    }

    /// Classify a store error raised during read or write-back
    pub(crate) fn from_store(err: StoreError) -> Self {
        if err.is_conflict() {
            CriticalError::Conflict(err)
        } else {
            CriticalError::Store(err)
        }
    }
}

impl From<anyhow::Error> for CriticalError {
    fn from(err: anyhow::Error) -> Self {
        CriticalError::Critical(err.into())
    }
}

/// Outcome of `CriticalRepositoryInteraction::perform_critical`
///
/// `result` and `resource` may be absent even when `success()` is true if a
/// collaborator short-circuits; callers that need them must check.
#[derive(Debug)]
pub struct CriticalResult<R, T> {
    success: bool,
    result: Option<R>,
    resource: Option<T>,
    reason: Option<FailureReason>,
    error: Option<CriticalError>,
}

impl<R, T> CriticalResult<R, T> {
    pub(crate) fn succeeded(resource: T, result: R) -> Self {
        Self {
            success: true,
            result: Some(result),
            resource: Some(resource),
            reason: None,
            error: None,
        }
    }

    /// Precondition did not hold: no error, no result
    pub(crate) fn precondition_failed(resource: Option<T>) -> Self {
        Self {
            success: false,
            result: None,
            resource,
            reason: Some(FailureReason::Precondition),
            error: None,
        }
    }

    pub(crate) fn failed(resource: Option<T>, result: Option<R>, error: CriticalError) -> Self {
        Self {
            success: false,
            result,
            resource,
            reason: Some(error.reason()),
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    pub fn resource(&self) -> Option<&T> {
        self.resource.as_ref()
    }

    pub fn error(&self) -> Option<&CriticalError> {
        self.error.as_ref()
    }

    /// Phase that failed, `None` on success
    pub fn reason(&self) -> Option<FailureReason> {
        self.reason
    }

    pub fn into_result(self) -> Option<R> {
        self.result
    }

    pub fn into_resource(self) -> Option<T> {
        self.resource
    }

    pub fn into_parts(self) -> (Option<T>, Option<R>, Option<CriticalError>) {
        (self.resource, self.result, self.error)
    }
}
