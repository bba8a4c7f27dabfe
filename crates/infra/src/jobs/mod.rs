//! Job bookkeeping for the simulated inspection service.
//!
//! - `ScanJob`: one submitted inspection job and its lifecycle
//! - `JobStore`: persistence for jobs (in-memory here)
//! - `JobRunner` / `spawn_worker`: background thread that drains pending jobs

pub mod store;
pub mod types;
pub mod worker;

pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::ScanJob;
pub use worker::{JobRunner, WorkerConfig, WorkerHandle, WorkerStats, spawn_worker};
