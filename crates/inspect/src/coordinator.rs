//! Async inspection job coordinator.
//!
//! ## Flow
//!
//! ```text
//! submit ──► InspectionService::submit_job ──► JobHandle
//!                      │
//!                      └─(out of band)─► publish completion to notify topic
//!
//! await_completion ──► pull ─► ack ─► correlate by DlpJobName ─► get_job_result
//!        ▲                                    │
//!        └──── until deadline ◄── no match ───┘
//! ```
//!
//! ## Sharing a channel
//!
//! Several jobs may report on one subscription. A pull hands each message to
//! exactly one waiter, and acknowledging removes it from the subscription, so a
//! waiter that pulls another job's notification records it in the coordinator's
//! `CompletionLedger` before discarding it. Every waiter checks the ledger before
//! each pull, so a completion is never lost to a sibling waiter on the same
//! coordinator. Waiters in *different* processes must use separate subscriptions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use dlpkit_core::{InfoType, InspectionResult, JobId};
use dlpkit_events::{ChannelError, ChannelRef, NotificationChannel};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, ServiceError};
use crate::request::{InspectConfig, InspectJobRequest, InspectOptions};
use crate::resource::{JobTarget, ResourceReference};
use crate::service::{InspectionService, JobState};
use crate::storage::ObjectStorage;

/// Client-side reference to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    job_id: JobId,
    channel: ChannelRef,
    submitted_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Channel the job was registered to notify.
    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// Completions kept by default before the oldest are evicted.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;
/// How long a recorded completion is kept by default.
pub const DEFAULT_LEDGER_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Jobs whose completion notification has been observed.
///
/// Recording is idempotent: the first notification wins and duplicates are
/// no-ops, so each job has at most one terminal transition. Entries older than
/// the retention are dropped on the next `record`, and once `capacity` is
/// reached the oldest entry makes room for the new one.
#[derive(Debug)]
pub struct CompletionLedger {
    inner: Mutex<LedgerEntries>,
    capacity: usize,
    retention: Duration,
}

#[derive(Debug, Default)]
struct LedgerEntries {
    completed: HashMap<JobId, DateTime<Utc>>,
    // Insertion order, which is also completion-time order.
    order: VecDeque<JobId>,
}

impl LedgerEntries {
    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.completed.remove(&oldest);
        }
    }

    fn evict_older_than(&mut self, cutoff: DateTime<Utc>) {
        while let Some(oldest) = self.order.front() {
            match self.completed.get(oldest) {
                Some(at) if *at >= cutoff => break,
                _ => self.evict_oldest(),
            }
        }
    }
}

impl Default for CompletionLedger {
    fn default() -> Self {
        Self::with_limits(DEFAULT_LEDGER_CAPACITY, DEFAULT_LEDGER_RETENTION)
    }
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is treated as one.
    pub fn with_limits(capacity: usize, retention: Duration) -> Self {
        Self {
            inner: Mutex::new(LedgerEntries::default()),
            capacity: capacity.max(1),
            retention,
        }
    }

    fn entries(&self) -> MutexGuard<'_, LedgerEntries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a completion. Returns `false` if it was already recorded.
    pub fn record(&self, job_id: JobId) -> bool {
        let now = Utc::now();
        let mut entries = self.entries();

        // A retention too large for chrono never expires anything.
        if let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        {
            entries.evict_older_than(cutoff);
        }

        if entries.completed.contains_key(&job_id) {
            return false;
        }
        while entries.completed.len() >= self.capacity {
            entries.evict_oldest();
        }
        entries.order.push_back(job_id.clone());
        entries.completed.insert(job_id, now);
        true
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.entries().completed.contains_key(job_id)
    }

    /// When the completion was first observed.
    pub fn completed_at(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        self.entries().completed.get(job_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries().completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Submits inspection jobs and waits for their completion notifications.
///
/// Blocking: `await_completion` suspends the calling thread in the
/// channel pull. Share across threads with `Arc<JobCoordinator<..>>`.
pub struct JobCoordinator<S, C>
where
    S: InspectionService,
    C: NotificationChannel,
{
    service: S,
    channel: C,
    storage: Option<Arc<dyn ObjectStorage>>,
    config: CoordinatorConfig,
    ledger: CompletionLedger,
}

impl<S, C> JobCoordinator<S, C>
where
    S: InspectionService,
    C: NotificationChannel,
{
    pub fn new(service: S, channel: C, config: CoordinatorConfig) -> Self {
        Self {
            service,
            channel,
            storage: None,
            config,
            ledger: CompletionLedger::new(),
        }
    }

    /// Replace the default completion ledger, e.g. to change its limits.
    pub fn with_completion_ledger(mut self, ledger: CompletionLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Attach object storage so wildcard object references can be expanded.
    pub fn with_object_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &CompletionLedger {
        &self.ledger
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submit a scan of `resource`, to be reported on `channel`.
    ///
    /// Custom dictionaries and regexes in `options` are labeled
    /// `CUSTOM_DICTIONARY_<i>` / `CUSTOM_REGEX_<i>` in the order given.
    /// A rejected request is returned as `CoordinatorError::Submission` and is
    /// not retried.
    #[instrument(skip_all, fields(resource = %resource, channel = %channel))]
    pub fn submit(
        &self,
        resource: &ResourceReference,
        info_types: &[InfoType],
        options: &InspectOptions,
        channel: &ChannelRef,
    ) -> Result<JobHandle, CoordinatorError> {
        let target = self.resolve(resource).map_err(CoordinatorError::Submission)?;

        let request = InspectJobRequest {
            project: self.config.project.clone(),
            target,
            config: InspectConfig::new(info_types, options),
            notify_topic: channel.topic().to_string(),
        };

        let job_id = self
            .service
            .submit_job(request)
            .map_err(CoordinatorError::Submission)?;

        info!(job_id = %job_id, "inspection job submitted");

        Ok(JobHandle {
            job_id,
            channel: channel.clone(),
            submitted_at: Utc::now(),
        })
    }

    /// Block until the job behind `handle` completes, then return its findings.
    ///
    /// `timeout` bounds the wait; `None` uses the configured job timeout, or the
    /// service's default when none is configured. Expiry fails with
    /// `CoordinatorError::Timeout` and leaves the remote job alone.
    ///
    /// Calling this again for a job that already completed re-fetches the stored
    /// result without touching the channel.
    #[instrument(skip_all, fields(job_id = %handle.job_id, channel = %channel))]
    pub fn await_completion(
        &self,
        handle: &JobHandle,
        channel: &ChannelRef,
        timeout: Option<Duration>,
    ) -> Result<InspectionResult, CoordinatorError> {
        if channel.topic() != handle.channel.topic() {
            return Err(CoordinatorError::Channel(ChannelError::Conflict(format!(
                "job {} notifies topic {}, not {}",
                handle.job_id,
                handle.channel.topic(),
                channel.topic()
            ))));
        }

        let timeout = timeout
            .or(self.config.job_timeout)
            .unwrap_or_else(|| self.service.default_job_timeout());
        let started = Instant::now();
        // `None` when the timeout is too large to represent: wait without a deadline.
        let deadline = started.checked_add(timeout);
        let job_id = &handle.job_id;

        loop {
            if self.ledger.contains(job_id) {
                if let Some(result) = self.fetch_result(job_id)? {
                    return Ok(result);
                }
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(job_id = %job_id, waited = ?timeout, "no completion notification before deadline");
                return Err(CoordinatorError::Timeout {
                    job_id: job_id.clone(),
                    waited: now.duration_since(started),
                });
            }

            let wait = match deadline {
                Some(deadline) => self.config.poll_interval.min(deadline - now),
                None => self.config.poll_interval,
            };
            let batch = self.channel.pull(channel, self.config.max_messages, wait)?;

            for received in batch {
                self.channel.acknowledge(channel, &received.ack_id)?;

                match received.message.job_id() {
                    Some(id) if &id == job_id => {
                        if !self.ledger.record(id) {
                            debug!("duplicate completion notification");
                        }
                    }
                    Some(other) => {
                        debug!(other_job = %other, "notification for another job");
                        self.ledger.record(other);
                    }
                    None => {
                        debug!(
                            message_id = %received.message.message_id(),
                            "ignoring message without job attribute"
                        );
                    }
                }
            }
        }
    }

    /// `submit` followed by `await_completion` on the same channel.
    pub fn inspect_resource(
        &self,
        resource: &ResourceReference,
        info_types: &[InfoType],
        options: &InspectOptions,
        channel: &ChannelRef,
        timeout: Option<Duration>,
    ) -> Result<InspectionResult, CoordinatorError> {
        let handle = self.submit(resource, info_types, options, channel)?;
        self.await_completion(&handle, channel, timeout)
    }

    /// Scan one storage object (or every object matching a glob in `name`).
    pub fn inspect_gcs_file(
        &self,
        bucket: &str,
        name: &str,
        info_types: &[InfoType],
        options: &InspectOptions,
        channel: &ChannelRef,
        timeout: Option<Duration>,
    ) -> Result<InspectionResult, CoordinatorError> {
        let resource = ResourceReference::storage_object(bucket, name);
        self.inspect_resource(&resource, info_types, options, channel, timeout)
    }

    /// Scan every entity of a structured-store kind in the configured project.
    pub fn inspect_datastore(
        &self,
        namespace: Option<&str>,
        kind: &str,
        info_types: &[InfoType],
        options: &InspectOptions,
        channel: &ChannelRef,
        timeout: Option<Duration>,
    ) -> Result<InspectionResult, CoordinatorError> {
        let mut resource = ResourceReference::store_kind(self.config.project.clone(), kind);
        if let Some(namespace) = namespace {
            resource = resource.with_namespace(namespace);
        }
        self.inspect_resource(&resource, info_types, options, channel, timeout)
    }

    /// Scan every row of a warehouse table in the configured project.
    pub fn inspect_bigquery(
        &self,
        dataset: &str,
        table: &str,
        info_types: &[InfoType],
        options: &InspectOptions,
        channel: &ChannelRef,
        timeout: Option<Duration>,
    ) -> Result<InspectionResult, CoordinatorError> {
        let resource =
            ResourceReference::warehouse_table(self.config.project.clone(), dataset, table);
        self.inspect_resource(&resource, info_types, options, channel, timeout)
    }

    /// Fetch a job known to have completed. `Ok(None)` if the service has not
    /// caught up with its own notification yet.
    fn fetch_result(&self, job_id: &JobId) -> Result<Option<InspectionResult>, CoordinatorError> {
        let job = self
            .service
            .get_job_result(job_id)
            .map_err(CoordinatorError::Fetch)?;

        match job.state {
            JobState::Done => {
                let result = job.result.unwrap_or_default();
                debug!(findings = result.len(), "job result fetched");
                Ok(Some(result))
            }
            JobState::Failed => Err(CoordinatorError::JobFailed {
                job_id: job_id.clone(),
                reason: job.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            JobState::Pending | JobState::Running => {
                debug!(state = ?job.state, "notified job not yet terminal");
                Ok(None)
            }
        }
    }

    fn resolve(&self, resource: &ResourceReference) -> Result<JobTarget, ServiceError> {
        match resource {
            ResourceReference::StorageObject { bucket, name } if resource.is_wildcard() => {
                let storage = self.storage.as_ref().ok_or_else(|| {
                    ServiceError::InvalidArgument(format!(
                        "wildcard {resource} needs object storage to resolve"
                    ))
                })?;
                let objects = storage.list_objects(bucket, name)?;
                if objects.is_empty() {
                    return Err(ServiceError::NotFound(format!("no objects match {resource}")));
                }
                debug!(matched = objects.len(), "wildcard resolved");
                Ok(JobTarget::StorageObjects {
                    bucket: bucket.clone(),
                    objects,
                })
            }
            ResourceReference::StorageObject { bucket, name } => Ok(JobTarget::StorageObjects {
                bucket: bucket.clone(),
                objects: vec![name.clone()],
            }),
            ResourceReference::StoreKind {
                project,
                namespace,
                kind,
            } => Ok(JobTarget::StoreKind {
                project: project.clone(),
                namespace: namespace.clone(),
                kind: kind.clone(),
            }),
            ResourceReference::WarehouseTable {
                project,
                dataset,
                table,
            } => Ok(JobTarget::WarehouseTable {
                project: project.clone(),
                dataset: dataset.clone(),
                table: table.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use dlpkit_core::{AckId, Finding, Likelihood, Location, ProjectId};
    use dlpkit_events::{JobNotification, Message, ReceivedMessage};

    use super::*;
    use crate::request::InspectContentRequest;
    use crate::service::DlpJob;
    use crate::storage::StorageError;

    /// Service double: records submissions; jobs are completed by the test.
    #[derive(Default)]
    struct ScriptedService {
        jobs: Mutex<HashMap<JobId, DlpJob>>,
        submitted: Mutex<Vec<InspectJobRequest>>,
        reject_with: Option<ServiceError>,
        fetches: Mutex<usize>,
    }

    impl ScriptedService {
        fn complete(&self, job_id: &JobId, findings: Vec<Finding>) {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(job_id).unwrap();
            job.state = JobState::Done;
            job.result = Some(InspectionResult::new(findings));
        }

        fn fail(&self, job_id: &JobId, reason: &str) {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(job_id).unwrap();
            job.state = JobState::Failed;
            job.error = Some(reason.to_string());
        }
    }

    impl InspectionService for ScriptedService {
        fn submit_job(&self, request: InspectJobRequest) -> Result<JobId, ServiceError> {
            if let Some(err) = &self.reject_with {
                return Err(err.clone());
            }
            let id = JobId::generate(&request.project);
            self.jobs.lock().unwrap().insert(
                id.clone(),
                DlpJob {
                    id: id.clone(),
                    state: JobState::Running,
                    target: request.target.clone(),
                    result: None,
                    error: None,
                    created_at: Utc::now(),
                    end_time: None,
                },
            );
            self.submitted.lock().unwrap().push(request);
            Ok(id)
        }

        fn get_job_result(&self, job_id: &JobId) -> Result<DlpJob, ServiceError> {
            *self.fetches.lock().unwrap() += 1;
            self.jobs
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))
        }

        fn inspect_content(
            &self,
            _request: InspectContentRequest,
        ) -> Result<InspectionResult, ServiceError> {
            Ok(InspectionResult::empty())
        }

        fn default_job_timeout(&self) -> Duration {
            Duration::from_millis(60)
        }
    }

    /// Channel double: a queue of messages; records acknowledgements.
    #[derive(Default)]
    struct QueueChannel {
        queue: Mutex<VecDeque<Message>>,
        acked: Mutex<Vec<AckId>>,
        fail_with: Option<ChannelError>,
    }

    impl QueueChannel {
        fn push(&self, message: Message) {
            self.queue.lock().unwrap().push_back(message);
        }
    }

    impl NotificationChannel for QueueChannel {
        fn pull(
            &self,
            _channel: &ChannelRef,
            max_messages: usize,
            wait: Duration,
        ) -> Result<Vec<ReceivedMessage>, ChannelError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let mut queue = self.queue.lock().unwrap();
            if queue.is_empty() {
                drop(queue);
                std::thread::sleep(wait);
                return Ok(Vec::new());
            }
            let take = max_messages.min(queue.len());
            Ok(queue
                .drain(..take)
                .map(|message| ReceivedMessage {
                    ack_id: AckId::generate(),
                    message,
                    delivery_attempt: 1,
                })
                .collect())
        }

        fn acknowledge(&self, _channel: &ChannelRef, ack_id: &AckId) -> Result<(), ChannelError> {
            self.acked.lock().unwrap().push(ack_id.clone());
            Ok(())
        }
    }

    struct NoObjects;

    impl ObjectStorage for NoObjects {
        fn get_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            })
        }

        fn list_objects(&self, _bucket: &str, _pattern: &str) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    type TestCoordinator = JobCoordinator<Arc<ScriptedService>, Arc<QueueChannel>>;

    fn setup() -> (TestCoordinator, Arc<ScriptedService>, Arc<QueueChannel>, ChannelRef) {
        let service = Arc::new(ScriptedService::default());
        let channel = Arc::new(QueueChannel::default());
        let config = CoordinatorConfig::new(ProjectId::new("acme").unwrap())
            .with_poll_interval(Duration::from_millis(5));
        let coordinator = JobCoordinator::new(service.clone(), channel.clone(), config);
        let channel_ref = ChannelRef::new("dlp-test", "dlp-test-subscription").unwrap();
        (coordinator, service, channel, channel_ref)
    }

    fn finding(name: &str) -> Finding {
        Finding {
            info_type: InfoType::new(name).unwrap(),
            likelihood: Likelihood::Likely,
            quote: None,
            location: Location::span(0, 4),
        }
    }

    fn notify(job_id: &JobId) -> Message {
        Message::job_completed(&JobNotification::new(job_id.clone()))
    }

    fn object() -> ResourceReference {
        ResourceReference::storage_object("bucket", "test.txt")
    }

    #[test]
    fn submit_builds_request_with_labeled_custom_detectors() {
        let (coordinator, service, _, channel) = setup();
        let options = InspectOptions::default().with_custom_regexes(["a+", "b+"]);

        coordinator.submit(&object(), &[], &options, &channel).unwrap();

        let submitted = service.submitted.lock().unwrap();
        let request = &submitted[0];
        assert_eq!(request.notify_topic, "dlp-test");
        assert_eq!(
            request.target,
            JobTarget::StorageObjects {
                bucket: "bucket".into(),
                objects: vec!["test.txt".into()],
            }
        );
        let labels: Vec<&str> = request
            .config
            .custom_info_types
            .iter()
            .map(|c| c.info_type.name())
            .collect();
        assert_eq!(labels, ["CUSTOM_REGEX_0", "CUSTOM_REGEX_1"]);
    }

    #[test]
    fn rejected_submission_is_surfaced() {
        let service = Arc::new(ScriptedService {
            reject_with: Some(ServiceError::PermissionDenied("no".into())),
            ..Default::default()
        });
        let config = CoordinatorConfig::new(ProjectId::new("acme").unwrap());
        let coordinator = JobCoordinator::new(service, Arc::new(QueueChannel::default()), config);
        let channel = ChannelRef::new("t", "s").unwrap();

        let err = coordinator.submit(&object(), &[], &InspectOptions::default(), &channel);

        assert_eq!(
            err.unwrap_err(),
            CoordinatorError::Submission(ServiceError::PermissionDenied("no".into()))
        );
    }

    #[test]
    fn wildcard_without_matches_is_rejected_before_submission() {
        let (coordinator, service, _, channel) = setup();
        let coordinator = coordinator.with_object_storage(Arc::new(NoObjects));

        let err = coordinator
            .submit(
                &ResourceReference::storage_object("bucket", "*"),
                &[],
                &InspectOptions::default(),
                &channel,
            )
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Submission(ServiceError::NotFound(_))));
        assert!(service.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn wildcard_without_storage_is_invalid() {
        let (coordinator, _, _, channel) = setup();
        let err = coordinator
            .submit(
                &ResourceReference::storage_object("bucket", "*.txt"),
                &[],
                &InspectOptions::default(),
                &channel,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            CoordinatorError::Submission(ServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn matching_notification_returns_findings_in_service_order() {
        let (coordinator, service, channel_impl, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();

        service.complete(
            handle.job_id(),
            vec![finding("PHONE_NUMBER"), finding("EMAIL_ADDRESS"), finding("PHONE_NUMBER")],
        );
        channel_impl.push(notify(handle.job_id()));

        let result = coordinator
            .await_completion(&handle, &channel, Some(Duration::from_secs(5)))
            .unwrap();

        let names: Vec<&str> = result.findings().iter().map(|f| f.info_type.name()).collect();
        assert_eq!(names, ["PHONE_NUMBER", "EMAIL_ADDRESS", "PHONE_NUMBER"]);
        assert_eq!(channel_impl.acked.lock().unwrap().len(), 1);
    }

    #[test]
    fn foreign_and_unattributed_messages_are_acked_and_skipped() {
        let (coordinator, service, channel_impl, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        let stale = JobId::new("projects/acme/dlpJobs/i-stale").unwrap();

        service.complete(handle.job_id(), vec![finding("EMAIL_ADDRESS")]);
        channel_impl.push(notify(&stale));
        channel_impl.push(Message::new("noise"));
        channel_impl.push(notify(handle.job_id()));

        let result = coordinator
            .await_completion(&handle, &channel, Some(Duration::from_secs(5)))
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(channel_impl.acked.lock().unwrap().len(), 3);
        assert!(coordinator.ledger().contains(&stale));
    }

    #[test]
    fn no_notification_times_out() {
        let (coordinator, _, _, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();

        let started = Instant::now();
        let err = coordinator
            .await_completion(&handle, &channel, Some(Duration::from_millis(30)))
            .unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn missing_timeout_uses_service_default() {
        let (coordinator, _, _, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();

        let started = Instant::now();
        let err = coordinator.await_completion(&handle, &channel, None).unwrap_err();

        assert!(err.is_timeout());
        // ScriptedService reports a 60ms default.
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn second_await_refetches_without_pulling() {
        let (coordinator, service, channel_impl, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        service.complete(handle.job_id(), vec![finding("FIRST_NAME")]);
        channel_impl.push(notify(handle.job_id()));

        let first = coordinator.await_completion(&handle, &channel, None).unwrap();
        // Duplicate notification left on the channel must not matter.
        channel_impl.push(notify(handle.job_id()));
        let second = coordinator.await_completion(&handle, &channel, None).unwrap();

        assert_eq!(first, second);
        assert_eq!(channel_impl.queue.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_job_is_reported() {
        let (coordinator, service, channel_impl, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        service.fail(handle.job_id(), "bucket vanished");
        channel_impl.push(notify(handle.job_id()));

        let err = coordinator.await_completion(&handle, &channel, None).unwrap_err();

        assert_eq!(
            err,
            CoordinatorError::JobFailed {
                job_id: handle.job_id().clone(),
                reason: "bucket vanished".into(),
            }
        );
    }

    #[test]
    fn notification_ahead_of_job_state_keeps_waiting() {
        let (coordinator, service, channel_impl, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        // Notified while the service still reports Running.
        channel_impl.push(notify(handle.job_id()));

        let err = coordinator
            .await_completion(&handle, &channel, Some(Duration::from_millis(30)))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(*service.fetches.lock().unwrap() > 0);
    }

    #[test]
    fn channel_failure_is_surfaced_immediately() {
        let service = Arc::new(ScriptedService::default());
        let channel_impl = Arc::new(QueueChannel {
            fail_with: Some(ChannelError::NotFound("dlp-test/gone".into())),
            ..Default::default()
        });
        let config = CoordinatorConfig::new(ProjectId::new("acme").unwrap());
        let coordinator = JobCoordinator::new(service, channel_impl, config);
        let channel = ChannelRef::new("dlp-test", "gone").unwrap();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();

        let err = coordinator
            .await_completion(&handle, &channel, Some(Duration::from_secs(5)))
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Channel(ChannelError::NotFound(_))));
    }

    #[test]
    fn awaiting_on_a_different_topic_is_rejected() {
        let (coordinator, _, _, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        let other = ChannelRef::new("other-topic", "s").unwrap();

        let err = coordinator.await_completion(&handle, &other, None).unwrap_err();
        assert!(matches!(err, CoordinatorError::Channel(ChannelError::Conflict(_))));
    }

    #[test]
    fn ledger_records_once() {
        let ledger = CompletionLedger::new();
        let id = JobId::new("projects/p/dlpJobs/i-1").unwrap();

        assert!(ledger.record(id.clone()));
        let first_seen = ledger.completed_at(&id);
        assert!(!ledger.record(id.clone()));

        assert_eq!(ledger.completed_at(&id), first_seen);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn oversized_timeout_does_not_overflow_the_deadline() {
        let service = Arc::new(ScriptedService::default());
        let channel_impl = Arc::new(QueueChannel {
            fail_with: Some(ChannelError::Unavailable("connection refused".into())),
            ..Default::default()
        });
        let config = CoordinatorConfig::new(ProjectId::new("acme").unwrap());
        let coordinator = JobCoordinator::new(service, channel_impl, config);
        let channel = ChannelRef::new("dlp-test", "dlp-test-subscription").unwrap();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();

        let err = coordinator
            .await_completion(&handle, &channel, Some(Duration::MAX))
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Channel(ChannelError::Unavailable(_))));
    }

    #[test]
    fn oversized_timeout_still_returns_on_notification() {
        let (coordinator, service, channel_impl, channel) = setup();
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        service.complete(handle.job_id(), vec![finding("EMAIL_ADDRESS")]);
        channel_impl.push(notify(handle.job_id()));

        let result = coordinator
            .await_completion(&handle, &channel, Some(Duration::MAX))
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn ledger_evicts_oldest_past_capacity() {
        let ledger = CompletionLedger::with_limits(3, DEFAULT_LEDGER_RETENTION);
        let ids: Vec<JobId> = (0..5)
            .map(|i| JobId::new(format!("projects/p/dlpJobs/i-{i}")).unwrap())
            .collect();

        for id in &ids {
            assert!(ledger.record(id.clone()));
        }

        assert_eq!(ledger.len(), 3);
        assert!(!ledger.contains(&ids[0]));
        assert!(!ledger.contains(&ids[1]));
        assert!(ids[2..].iter().all(|id| ledger.contains(id)));
    }

    #[test]
    fn ledger_drops_expired_entries_on_record() {
        let ledger = CompletionLedger::with_limits(100, Duration::from_millis(20));
        let stale = JobId::new("projects/p/dlpJobs/i-stale").unwrap();
        let fresh = JobId::new("projects/p/dlpJobs/i-fresh").unwrap();

        ledger.record(stale.clone());
        std::thread::sleep(Duration::from_millis(40));
        ledger.record(fresh.clone());

        assert!(!ledger.contains(&stale));
        assert!(ledger.contains(&fresh));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn shared_channel_noise_stays_bounded() {
        let (coordinator, service, channel_impl, channel) = setup();
        let coordinator = coordinator
            .with_completion_ledger(CompletionLedger::with_limits(8, DEFAULT_LEDGER_RETENTION));
        let handle = coordinator
            .submit(&object(), &[], &InspectOptions::default(), &channel)
            .unwrap();
        for i in 0..50 {
            channel_impl.push(notify(&JobId::new(format!("projects/acme/dlpJobs/i-{i}")).unwrap()));
        }
        service.complete(handle.job_id(), vec![]);
        channel_impl.push(notify(handle.job_id()));

        coordinator
            .await_completion(&handle, &channel, Some(Duration::from_secs(5)))
            .unwrap();

        assert!(coordinator.ledger().len() <= 8);
        assert!(coordinator.ledger().contains(handle.job_id()));
    }
}
