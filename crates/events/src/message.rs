use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dlpkit_core::{JobId, MessageId};

/// Attribute carrying the job name on completion notifications.
pub const JOB_NAME_ATTRIBUTE: &str = "DlpJobName";

/// Envelope for one published message.
///
/// Notes:
/// - `attributes` are string key/values the transport carries alongside the body;
///   correlation only ever looks at attributes, never at `data`.
/// - `message_id` is assigned once, at construction, and survives redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    message_id: MessageId,
    data: Vec<u8>,
    attributes: BTreeMap<String, String>,
    publish_time: DateTime<Utc>,
}

impl Message {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: MessageId::generate(),
            data: data.into(),
            attributes: BTreeMap::new(),
            publish_time: Utc::now(),
        }
    }

    /// Rebuild a message that was already assigned an id (e.g. read back from a broker).
    pub fn from_parts(
        message_id: MessageId,
        data: Vec<u8>,
        attributes: BTreeMap<String, String>,
        publish_time: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            data,
            attributes,
            publish_time,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Completion notification for `job_id`.
    pub fn job_completed(notification: &JobNotification) -> Self {
        // Serializing a struct of strings cannot fail.
        let data = serde_json::to_vec(notification).unwrap_or_default();
        Self::new(data).with_attribute(JOB_NAME_ATTRIBUTE, notification.job_id.as_str())
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn publish_time(&self) -> DateTime<Utc> {
        self.publish_time
    }

    /// Job this message reports on, if it carries a well-formed job attribute.
    pub fn job_id(&self) -> Option<JobId> {
        self.attribute(JOB_NAME_ATTRIBUTE)
            .and_then(|name| JobId::new(name).ok())
    }
}

/// Body of a completion notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotification {
    pub job_id: JobId,
    pub completed_at: DateTime<Utc>,
}

impl JobNotification {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            completed_at: Utc::now(),
        }
    }
}
