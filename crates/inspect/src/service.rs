//! Remote inspection service (interface only).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dlpkit_core::{InspectionResult, JobId};

use crate::error::ServiceError;
use crate::request::{InspectContentRequest, InspectJobRequest};
use crate::resource::JobTarget;

/// Job-level timeout the service applies when the caller gives none.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Remote job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// The service's view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlpJob {
    pub id: JobId,
    pub state: JobState,
    pub target: JobTarget,
    /// Present once `state` is `Done`.
    pub result: Option<InspectionResult>,
    /// Present once `state` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// The remote DLP API.
///
/// Implementations must be safe to share across threads; the coordinator may be
/// used by several waiters at once.
pub trait InspectionService: Send + Sync {
    /// Start an out-of-band scan. The service publishes a completion message to
    /// `request.notify_topic` when the job reaches a terminal state.
    fn submit_job(&self, request: InspectJobRequest) -> Result<JobId, ServiceError>;

    /// Fetch the current state (and result, once done) of a job.
    fn get_job_result(&self, job_id: &JobId) -> Result<DlpJob, ServiceError>;

    /// Inspect an inline payload and return findings immediately.
    fn inspect_content(
        &self,
        request: InspectContentRequest,
    ) -> Result<InspectionResult, ServiceError>;

    fn default_job_timeout(&self) -> Duration {
        DEFAULT_JOB_TIMEOUT
    }
}

impl<S> InspectionService for Arc<S>
where
    S: InspectionService + ?Sized,
{
    fn submit_job(&self, request: InspectJobRequest) -> Result<JobId, ServiceError> {
        (**self).submit_job(request)
    }

    fn get_job_result(&self, job_id: &JobId) -> Result<DlpJob, ServiceError> {
        (**self).get_job_result(job_id)
    }

    fn inspect_content(
        &self,
        request: InspectContentRequest,
    ) -> Result<InspectionResult, ServiceError> {
        (**self).inspect_content(request)
    }

    fn default_job_timeout(&self) -> Duration {
        (**self).default_job_timeout()
    }
}
