//! Remote resources a job can scan.

use serde::{Deserialize, Serialize};

use dlpkit_core::ProjectId;

/// What the caller asks to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceReference {
    /// One object, or every object matching a glob in `name` (e.g. `*`).
    StorageObject { bucket: String, name: String },
    /// All entities of a structured-store kind.
    StoreKind {
        project: ProjectId,
        namespace: Option<String>,
        kind: String,
    },
    /// Every row of a warehouse table.
    WarehouseTable {
        project: ProjectId,
        dataset: String,
        table: String,
    },
}

impl ResourceReference {
    pub fn storage_object(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self::StorageObject {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    pub fn store_kind(project: ProjectId, kind: impl Into<String>) -> Self {
        Self::StoreKind {
            project,
            namespace: None,
            kind: kind.into(),
        }
    }

    pub fn warehouse_table(
        project: ProjectId,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::WarehouseTable {
            project,
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        match self {
            Self::StoreKind { project, kind, .. } => Self::StoreKind {
                project,
                namespace: Some(namespace.into()),
                kind,
            },
            other => other,
        }
    }

    /// True for storage references whose object name is a glob.
    pub fn is_wildcard(&self) -> bool {
        match self {
            Self::StorageObject { name, .. } => is_glob(name),
            _ => false,
        }
    }
}

impl core::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StorageObject { bucket, name } => write!(f, "gs://{bucket}/{name}"),
            Self::StoreKind {
                project,
                namespace,
                kind,
            } => match namespace {
                Some(ns) => write!(f, "datastore://{project}/{ns}/{kind}"),
                None => write!(f, "datastore://{project}/{kind}"),
            },
            Self::WarehouseTable {
                project,
                dataset,
                table,
            } => write!(f, "bigquery://{project}.{dataset}.{table}"),
        }
    }
}

/// A resource after client-side resolution: what the job request actually names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTarget {
    /// Concrete object names (wildcards already expanded).
    StorageObjects { bucket: String, objects: Vec<String> },
    StoreKind {
        project: ProjectId,
        namespace: Option<String>,
        kind: String,
    },
    WarehouseTable {
        project: ProjectId,
        dataset: String,
        table: String,
    },
}

pub(crate) fn is_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}
