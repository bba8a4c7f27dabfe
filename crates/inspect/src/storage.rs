//! Object storage collaborator (interface only).

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("object not found: {bucket}/{name}")]
    ObjectNotFound { bucket: String, name: String },

    #[error("invalid object pattern: {0}")]
    InvalidPattern(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Read access to an object store.
///
/// Used by the coordinator to expand wildcard object references before a job is
/// submitted, and by service implementations to read object contents.
pub trait ObjectStorage: Send + Sync {
    fn get_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Names in `bucket` matching a glob `pattern` (`*`, `?`, `[..]`), sorted.
    fn list_objects(&self, bucket: &str, pattern: &str) -> Result<Vec<String>, StorageError>;
}

impl<T> ObjectStorage for Arc<T>
where
    T: ObjectStorage + ?Sized,
{
    fn get_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        (**self).get_object(bucket, name)
    }

    fn list_objects(&self, bucket: &str, pattern: &str) -> Result<Vec<String>, StorageError> {
        (**self).list_objects(bucket, pattern)
    }
}
