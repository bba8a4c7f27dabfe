//! In-memory object storage for tests/dev.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use glob::{MatchOptions, Pattern};
use tracing::debug;

use dlpkit_inspect::{ObjectStorage, StorageError};

type Bucket = BTreeMap<String, Vec<u8>>;

/// Buckets of named byte blobs.
///
/// Object names are kept sorted, so `list_objects` returns matches in name order.
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    buckets: RwLock<BTreeMap<String, Bucket>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `bucket` if it does not exist yet.
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bucket.into())
            .or_default();
    }

    /// Store (or replace) an object, creating its bucket as needed.
    pub fn put_object(&self, bucket: impl Into<String>, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let name = name.into();
        let data = data.into();
        let bucket = bucket.into();
        debug!(bucket = %bucket, object = %name, bytes = data.len(), "object stored");
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bucket)
            .or_default()
            .insert(name, data);
    }

    pub fn delete_object(&self, bucket: &str, name: &str) -> bool {
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(bucket)
            .is_some_and(|objects| objects.remove(name).is_some())
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn get_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            })
    }

    fn list_objects(&self, bucket: &str, pattern: &str) -> Result<Vec<String>, StorageError> {
        let matcher = Pattern::new(pattern)
            .map_err(|e| StorageError::InvalidPattern(format!("{pattern}: {e}")))?;
        // Object names are flat keys; `*` may span `/` as it does in gsutil.
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;

        Ok(objects
            .keys()
            .filter(|name| matcher.matches_with(name, options))
            .cloned()
            .collect())
    }
}
