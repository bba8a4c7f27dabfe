//! Synchronous inspection of inline content.

use std::path::Path;

use anyhow::Context;
use tracing::debug;

use dlpkit_core::{ByteContentType, ContentItem, InfoType, InspectionResult, ProjectId, Table};

use crate::error::ServiceError;
use crate::request::{InspectConfig, InspectContentRequest, InspectOptions};
use crate::service::InspectionService;

/// Inspect a string.
pub fn inspect_string<S>(
    service: &S,
    project: &ProjectId,
    text: &str,
    info_types: &[InfoType],
    options: &InspectOptions,
) -> Result<InspectionResult, ServiceError>
where
    S: InspectionService + ?Sized,
{
    inspect_item(service, project, ContentItem::Text(text.to_string()), info_types, options)
}

/// Inspect a table of string cells.
pub fn inspect_table<S>(
    service: &S,
    project: &ProjectId,
    table: &Table,
    info_types: &[InfoType],
    options: &InspectOptions,
) -> Result<InspectionResult, ServiceError>
where
    S: InspectionService + ?Sized,
{
    inspect_item(service, project, ContentItem::Table(table.clone()), info_types, options)
}

/// Inspect a local file; the content type follows the file extension.
pub fn inspect_file<S>(
    service: &S,
    project: &ProjectId,
    path: &Path,
    info_types: &[InfoType],
    options: &InspectOptions,
) -> anyhow::Result<InspectionResult>
where
    S: InspectionService + ?Sized,
{
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let kind = ByteContentType::from_extension(path.extension().and_then(|e| e.to_str()));
    debug!(path = %path.display(), ?kind, bytes = data.len(), "inspecting file");

    let result = inspect_item(service, project, ContentItem::Bytes { kind, data }, info_types, options)
        .with_context(|| format!("inspecting {}", path.display()))?;
    Ok(result)
}

fn inspect_item<S>(
    service: &S,
    project: &ProjectId,
    item: ContentItem,
    info_types: &[InfoType],
    options: &InspectOptions,
) -> Result<InspectionResult, ServiceError>
where
    S: InspectionService + ?Sized,
{
    let request = InspectContentRequest {
        project: project.clone(),
        item,
        config: InspectConfig::new(info_types, options),
    };
    service.inspect_content(request)
}
