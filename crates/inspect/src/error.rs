//! Error taxonomy for the inspection client.

use std::time::Duration;

use thiserror::Error;

use dlpkit_core::{DomainError, JobId};
use dlpkit_events::ChannelError;

use crate::storage::StorageError;

/// Failure reported by (or on behalf of) the remote inspection service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed request: bad filter syntax, unknown info type, invalid regex.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The target resource (or job) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                Self::NotFound(value.to_string())
            }
            StorageError::InvalidPattern(_) => Self::InvalidArgument(value.to_string()),
            StorageError::Unavailable(_) => Self::Unavailable(value.to_string()),
        }
    }
}

/// Outcome of a failed submit/await.
///
/// Every variant is terminal for the call that produced it: the coordinator
/// never retries, recovers or swallows. Resubmission is the caller's decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The service rejected the job request.
    #[error("job submission rejected: {0}")]
    Submission(ServiceError),

    /// No matching completion notification arrived before the deadline.
    #[error("timed out after {waited:?} waiting for job {job_id}")]
    Timeout { job_id: JobId, waited: Duration },

    /// The notification channel is unreachable or was deleted mid-wait.
    #[error("notification channel failed: {0}")]
    Channel(#[from] ChannelError),

    /// The job completed but the service reports it as failed.
    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: JobId, reason: String },

    /// The job completed but its result could not be fetched.
    #[error("fetching job result failed: {0}")]
    Fetch(ServiceError),
}

impl CoordinatorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
