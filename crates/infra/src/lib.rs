//! Infrastructure layer: collaborator implementations behind the client's traits.
//!
//! - `storage` / `records`: in-memory object storage and structured data for the
//!   simulated service to read.
//! - `detectors` + `jobs` + `service`: `InMemoryInspectionService`, a stand-in for
//!   the remote DLP API that runs jobs on a background worker and publishes
//!   completion notifications.
//! - `redis_channel` (feature `redis`): notification channel over Redis Streams.

pub mod detectors;
pub mod jobs;
pub mod records;
pub mod service;
pub mod storage;

#[cfg(feature = "redis")]
pub mod redis_channel;


pub use records::InMemoryRecordStore;
pub use service::InMemoryInspectionService;
pub use storage::InMemoryObjectStorage;

#[cfg(feature = "redis")]
pub use redis_channel::RedisStreamsChannel;
