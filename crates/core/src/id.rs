//! Strongly-typed identifiers used across the client.
//!
//! Remote-assigned identifiers (jobs, messages, ack handles) are opaque strings;
//! the client never interprets them beyond equality.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Cloud project that owns the inspection jobs and channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

/// Remote-assigned inspection job name (e.g. `projects/p/dlpJobs/i-…`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

/// Transport-assigned identifier of a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

/// Lease handle returned by a pull; used to acknowledge one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw identifier, rejecting empty or whitespace-bearing values.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() || value.chars().any(char::is_whitespace) {
                    return Err(DomainError::invalid_id(format!("{}: {:?}", $name, value)));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(ProjectId, "ProjectId");
impl_string_newtype!(JobId, "JobId");
impl_string_newtype!(MessageId, "MessageId");
impl_string_newtype!(AckId, "AckId");

impl JobId {
    /// Generate a fresh job name under `project`.
    ///
    /// Uses UUIDv7 (time-ordered). Only the remote side should mint job ids;
    /// this exists for service implementations and tests.
    pub fn generate(project: &ProjectId) -> Self {
        Self(format!("projects/{}/dlpJobs/i-{}", project, Uuid::now_v7().simple()))
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl AckId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}
