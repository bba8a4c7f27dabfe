//! `dlpkit-inspect`: client for the remote DLP inspection service.
//!
//! Two paths:
//!
//! - **Inline** (`inline`): content small enough to send with the request is
//!   inspected synchronously.
//! - **Job-based** (`coordinator`): remote resources (storage objects, store kinds,
//!   warehouse tables) are scanned out of band. The `JobCoordinator` submits the job
//!   and blocks until the job's completion notification arrives on a notification
//!   channel, or a deadline elapses.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod inline;
pub mod report;
pub mod request;
pub mod resource;
pub mod service;
pub mod storage;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{CompletionLedger, JobCoordinator, JobHandle};
pub use error::{CoordinatorError, ServiceError};
pub use request::{InspectConfig, InspectContentRequest, InspectJobRequest, InspectOptions};
pub use resource::{JobTarget, ResourceReference};
pub use service::{DEFAULT_JOB_TIMEOUT, DlpJob, InspectionService, JobState};
pub use storage::{ObjectStorage, StorageError};
