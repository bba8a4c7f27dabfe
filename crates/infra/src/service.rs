//! In-process stand-in for the remote DLP inspection API.
//!
//! Jobs are accepted into a `JobStore`, executed either by a background worker
//! (`spawn_worker`) or on demand (`run_pending`), and announced on the job's
//! notify topic with a `DlpJobName` attribute once they reach a terminal state.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use dlpkit_core::{ContentItem, Finding, InspectionResult, JobId};
use dlpkit_events::{JobNotification, Message, NotificationPublisher};
use dlpkit_inspect::{
    DEFAULT_JOB_TIMEOUT, DlpJob, InspectContentRequest, InspectJobRequest, InspectionService,
    JobState, JobTarget, ObjectStorage, ServiceError,
};

use crate::detectors::DetectorSet;
use crate::jobs::{
    InMemoryJobStore, JobRunner, JobStore, JobStoreError, ScanJob, WorkerConfig, WorkerHandle,
    spawn_worker,
};
use crate::records::InMemoryRecordStore;

impl From<JobStoreError> for ServiceError {
    fn from(value: JobStoreError) -> Self {
        match value {
            JobStoreError::NotFound(id) => ServiceError::NotFound(format!("job {id}")),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

pub struct InMemoryInspectionService {
    jobs: InMemoryJobStore,
    publisher: Arc<dyn NotificationPublisher>,
    objects: Option<Arc<dyn ObjectStorage>>,
    records: Option<Arc<InMemoryRecordStore>>,
    default_job_timeout: Duration,
}

impl InMemoryInspectionService {
    pub fn new(publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self {
            jobs: InMemoryJobStore::new(),
            publisher,
            objects: None,
            records: None,
            default_job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_object_storage(mut self, objects: Arc<dyn ObjectStorage>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn with_record_store(mut self, records: Arc<InMemoryRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_default_job_timeout(mut self, timeout: Duration) -> Self {
        self.default_job_timeout = timeout;
        self
    }

    pub fn jobs(&self) -> &InMemoryJobStore {
        &self.jobs
    }

    /// Run every pending job to completion on the calling thread.
    /// Returns how many jobs were run.
    pub fn run_pending(&self) -> Result<usize, ServiceError> {
        let mut ran = 0;
        while self.run_next()?.is_some() {
            ran += 1;
        }
        Ok(ran)
    }

    /// Execute jobs on a background thread until the handle is shut down or dropped.
    pub fn spawn_worker(self: &Arc<Self>, config: WorkerConfig) -> io::Result<WorkerHandle> {
        spawn_worker(Arc::clone(self), config)
    }

    #[instrument(skip_all, fields(job_id = %job.id))]
    fn execute(&self, job: &mut ScanJob) {
        match self.scan(job) {
            Ok(result) => {
                info!(findings = result.len(), "job done");
                job.mark_done(result);
            }
            Err(e) => {
                warn!(error = %e, "job failed");
                job.mark_failed(e.to_string());
            }
        }
    }

    fn scan(&self, job: &ScanJob) -> Result<InspectionResult, ServiceError> {
        let detectors = DetectorSet::compile(&job.config)?;

        let findings: Vec<Finding> = match &job.target {
            JobTarget::StorageObjects { bucket, objects } => {
                let storage = self.objects.as_ref().ok_or_else(|| {
                    ServiceError::Unavailable("no object storage configured".to_string())
                })?;
                let mut findings = Vec::new();
                for name in objects {
                    let data = storage.get_object(bucket, name)?;
                    let text = String::from_utf8_lossy(&data);
                    let base = dlpkit_core::Location::default()
                        .in_container(format!("gs://{bucket}/{name}"));
                    findings.extend(detectors.scan(&text, &base));
                }
                findings
            }
            JobTarget::StoreKind {
                project,
                namespace,
                kind,
            } => {
                let records = self.record_store()?;
                let table = records
                    .kind_as_table(project, namespace.as_deref(), kind)
                    .ok_or_else(|| ServiceError::NotFound(format!("kind {kind}")))??;
                detectors.scan_table(&table, Some(kind))
            }
            JobTarget::WarehouseTable {
                project,
                dataset,
                table,
            } => {
                let records = self.record_store()?;
                let rows = records.table(project, dataset, table).ok_or_else(|| {
                    ServiceError::NotFound(format!("table {project}.{dataset}.{table}"))
                })?;
                detectors.scan_table(&rows, Some(&format!("{dataset}.{table}")))
            }
        };

        Ok(detectors.finish(findings))
    }

    fn record_store(&self) -> Result<&InMemoryRecordStore, ServiceError> {
        self.records
            .as_deref()
            .ok_or_else(|| ServiceError::Unavailable("no record store configured".to_string()))
    }

    fn notify(&self, job: &ScanJob) {
        let message = Message::job_completed(&JobNotification::new(job.id.clone()));
        match self.publisher.publish(&job.notify_topic, message) {
            Ok(message_id) => {
                debug!(job_id = %job.id, topic = %job.notify_topic, message_id = %message_id, "completion published");
            }
            Err(e) => {
                // The job result stays fetchable; only the wake-up is lost.
                warn!(job_id = %job.id, topic = %job.notify_topic, error = %e, "completion publish failed");
            }
        }
    }
}

impl JobRunner for InMemoryInspectionService {
    fn run_next(&self) -> Result<Option<(JobId, JobState)>, JobStoreError> {
        let Some(mut job) = self.jobs.claim_next()? else {
            return Ok(None);
        };

        self.execute(&mut job);
        self.jobs.update(&job)?;
        self.notify(&job);

        Ok(Some((job.id, job.state)))
    }
}

impl InspectionService for InMemoryInspectionService {
    #[instrument(skip_all, fields(topic = %request.notify_topic))]
    fn submit_job(&self, request: InspectJobRequest) -> Result<JobId, ServiceError> {
        // Reject malformed detector configs up front, as the remote API does.
        DetectorSet::compile(&request.config)?;

        if request.notify_topic.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("notify topic is empty".to_string()));
        }
        if let JobTarget::StorageObjects { objects, .. } = &request.target {
            if objects.is_empty() {
                return Err(ServiceError::InvalidArgument("no objects to scan".to_string()));
            }
        }

        let job_id = self.jobs.enqueue(ScanJob::new(request))?;
        debug!(job_id = %job_id, "job accepted");
        Ok(job_id)
    }

    fn get_job_result(&self, job_id: &JobId) -> Result<DlpJob, ServiceError> {
        self.jobs
            .get(job_id)?
            .map(|job| job.to_dlp_job())
            .ok_or_else(|| ServiceError::NotFound(format!("job {job_id}")))
    }

    fn inspect_content(
        &self,
        request: InspectContentRequest,
    ) -> Result<InspectionResult, ServiceError> {
        let detectors = DetectorSet::compile(&request.config)?;

        match &request.item {
            ContentItem::Text(text) => Ok(detectors.inspect_text(text)),
            ContentItem::Table(table) => Ok(detectors.inspect_table(table)),
            ContentItem::Bytes { kind, .. } if kind.is_image() => Err(ServiceError::InvalidArgument(
                format!("image content ({kind:?}) is not supported"),
            )),
            ContentItem::Bytes { data, .. } => {
                let text = std::str::from_utf8(data).map_err(|e| {
                    ServiceError::InvalidArgument(format!("content is not valid UTF-8: {e}"))
                })?;
                Ok(detectors.inspect_text(text))
            }
        }
    }

    fn default_job_timeout(&self) -> Duration {
        self.default_job_timeout
    }
}

#[cfg(test)]
mod tests {
    use dlpkit_core::{ByteContentType, InfoType, ProjectId};
    use dlpkit_events::{ChannelProvider, InMemoryPubSub, NotificationChannel};
    use dlpkit_inspect::{InspectConfig, InspectOptions};

    use super::*;
    use crate::storage::InMemoryObjectStorage;

    fn project() -> ProjectId {
        ProjectId::new("acme").unwrap()
    }

    fn email_config() -> InspectConfig {
        InspectConfig::new(
            &[InfoType::new("EMAIL_ADDRESS").unwrap()],
            &InspectOptions::default(),
        )
    }

    fn setup() -> (InMemoryInspectionService, Arc<InMemoryPubSub>, Arc<InMemoryObjectStorage>) {
        let pubsub = Arc::new(InMemoryPubSub::new());
        let objects = Arc::new(InMemoryObjectStorage::new());
        objects.put_object("bucket", "mail.txt", "write to gary@example.com");
        let service = InMemoryInspectionService::new(pubsub.clone())
            .with_object_storage(objects.clone());
        (service, pubsub, objects)
    }

    fn request(objects: &[&str]) -> InspectJobRequest {
        InspectJobRequest {
            project: project(),
            target: JobTarget::StorageObjects {
                bucket: "bucket".into(),
                objects: objects.iter().map(|o| o.to_string()).collect(),
            },
            config: email_config(),
            notify_topic: "dlp-test".into(),
        }
    }

    #[test]
    fn job_runs_and_publishes_completion() {
        let (service, pubsub, _) = setup();
        let channel = pubsub.create_channel("dlp-test", "dlp-test-sub").unwrap();

        let job_id = service.submit_job(request(&["mail.txt"])).unwrap();
        assert_eq!(service.get_job_result(&job_id).unwrap().state, JobState::Pending);

        assert_eq!(service.run_pending().unwrap(), 1);

        let job = service.get_job_result(&job_id).unwrap();
        assert_eq!(job.state, JobState::Done);
        let result = job.result.unwrap();
        assert!(result.has_info_type("EMAIL_ADDRESS"));
        assert_eq!(
            result.findings()[0].location.container.as_deref(),
            Some("gs://bucket/mail.txt")
        );

        let delivered = pubsub.pull(&channel, 10, Duration::from_millis(10)).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message.job_id(), Some(job_id));
    }

    #[test]
    fn missing_object_fails_the_job_but_still_notifies() {
        let (service, pubsub, _) = setup();
        let channel = pubsub.create_channel("dlp-test", "dlp-test-sub").unwrap();

        let job_id = service.submit_job(request(&["gone.txt"])).unwrap();
        service.run_pending().unwrap();

        let job = service.get_job_result(&job_id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.unwrap().contains("gone.txt"));
        assert_eq!(pubsub.pull(&channel, 10, Duration::from_millis(10)).unwrap().len(), 1);
    }

    #[test]
    fn malformed_requests_are_rejected_at_submission() {
        let (service, _, _) = setup();

        let mut unknown = request(&["mail.txt"]);
        unknown.config = InspectConfig::new(
            &[InfoType::new("NOT_A_DETECTOR").unwrap()],
            &InspectOptions::default(),
        );
        assert!(matches!(service.submit_job(unknown), Err(ServiceError::InvalidArgument(_))));

        let mut bad_regex = request(&["mail.txt"]);
        bad_regex.config =
            InspectConfig::new(&[], &InspectOptions::default().with_custom_regexes(["[z-a]"]));
        assert!(matches!(service.submit_job(bad_regex), Err(ServiceError::InvalidArgument(_))));

        assert!(matches!(service.submit_job(request(&[])), Err(ServiceError::InvalidArgument(_))));
        assert_eq!(service.jobs().stats().unwrap().pending, 0);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (service, _, _) = setup();
        let id = JobId::new("projects/acme/dlpJobs/i-missing").unwrap();
        assert!(matches!(service.get_job_result(&id), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn inline_bytes_are_decoded_and_images_rejected() {
        let (service, _, _) = setup();
        let content = |kind, data: &[u8]| InspectContentRequest {
            project: project(),
            item: ContentItem::Bytes { kind, data: data.to_vec() },
            config: email_config(),
        };

        let text = service
            .inspect_content(content(ByteContentType::TextUtf8, b"mail a@example.com"))
            .unwrap();
        assert_eq!(text.len(), 1);

        let image = service.inspect_content(content(ByteContentType::ImagePng, &[0x89, 0x50]));
        assert!(matches!(image, Err(ServiceError::InvalidArgument(_))));

        let binary = service.inspect_content(content(ByteContentType::TextUtf8, &[0xff, 0xfe]));
        assert!(matches!(binary, Err(ServiceError::InvalidArgument(_))));
    }

    #[test]
    fn background_worker_completes_jobs() {
        let (service, pubsub, _) = setup();
        let channel = pubsub.create_channel("dlp-test", "dlp-test-sub").unwrap();
        let service = Arc::new(service);
        let worker = service.spawn_worker(WorkerConfig::default()).unwrap();

        let job_id = service.submit_job(request(&["mail.txt"])).unwrap();
        let delivered = pubsub.pull(&channel, 1, Duration::from_secs(5)).unwrap();

        assert_eq!(delivered[0].message.job_id(), Some(job_id.clone()));
        assert_eq!(service.get_job_result(&job_id).unwrap().state, JobState::Done);
        worker.shutdown();
    }
}
