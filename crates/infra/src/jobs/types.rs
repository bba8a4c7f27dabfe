//! Scan job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dlpkit_core::{InspectionResult, JobId};
use dlpkit_inspect::{DlpJob, InspectConfig, InspectJobRequest, JobState, JobTarget};

/// A submitted inspection job as the service stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    pub target: JobTarget,
    pub config: InspectConfig,
    /// Topic the completion notification goes to.
    pub notify_topic: String,
    pub state: JobState,
    pub result: Option<InspectionResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanJob {
    pub fn new(request: InspectJobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(&request.project),
            target: request.target,
            config: request.config,
            notify_topic: request.notify_topic,
            state: JobState::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            end_time: None,
        }
    }

    pub fn mark_running(&mut self) {
        let now = Utc::now();
        self.state = JobState::Running;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_done(&mut self, result: InspectionResult) {
        let now = Utc::now();
        self.state = JobState::Done;
        self.result = Some(result);
        self.end_time = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.end_time = Some(now);
        self.updated_at = now;
    }

    /// The client-facing view of this job.
    pub fn to_dlp_job(&self) -> DlpJob {
        DlpJob {
            id: self.id.clone(),
            state: self.state,
            target: self.target.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            end_time: self.end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use dlpkit_core::{InfoType, ProjectId};
    use dlpkit_inspect::InspectOptions;

    use super::*;

    fn job() -> ScanJob {
        ScanJob::new(InspectJobRequest {
            project: ProjectId::new("acme").unwrap(),
            target: JobTarget::StorageObjects {
                bucket: "b".into(),
                objects: vec!["o.txt".into()],
            },
            config: InspectConfig::new(
                &[InfoType::new("EMAIL_ADDRESS").unwrap()],
                &InspectOptions::default(),
            ),
            notify_topic: "dlp-test".into(),
        })
    }

    #[test]
    fn job_lifecycle() {
        let mut job = job();
        assert!(job.id.as_str().starts_with("projects/acme/dlpJobs/"));
        assert_eq!(job.state, JobState::Pending);

        job.mark_running();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());
        assert!(job.end_time.is_none());

        job.mark_done(InspectionResult::empty());
        assert_eq!(job.state, JobState::Done);
        assert!(job.end_time.is_some());

        let view = job.to_dlp_job();
        assert_eq!(view.result, Some(InspectionResult::empty()));
        assert_eq!(view.error, None);
    }

    #[test]
    fn failure_keeps_reason() {
        let mut job = job();
        job.mark_running();
        job.mark_failed("object not found: b/o.txt");

        let view = job.to_dlp_job();
        assert_eq!(view.state, JobState::Failed);
        assert_eq!(view.error.as_deref(), Some("object not found: b/o.txt"));
        assert!(view.result.is_none());
    }

    #[test]
    fn job_records_serialize_to_json() {
        let mut job = job();
        job.mark_running();
        job.mark_done(InspectionResult::empty());

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "DONE");
        assert_eq!(json["notify_topic"], "dlp-test");

        let back: ScanJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}
