//! `dlpkit-core`: data model shared by the inspection client and its collaborators.
//!
//! This crate contains **pure** types (no IO, no transports): identifiers, info
//! types, findings and the content items a caller can ask the service to scan.

pub mod content;
pub mod error;
pub mod finding;
pub mod id;
pub mod info_type;

pub use content::{ByteContentType, ContentItem, Table};
pub use error::{DomainError, DomainResult};
pub use finding::{Finding, InfoTypeStat, InspectionResult, Location};
pub use id::{AckId, JobId, MessageId, ProjectId};
pub use info_type::{
    CustomDetector, CustomDictionary, CustomInfoType, InfoType, Likelihood,
    custom_info_types,
};
