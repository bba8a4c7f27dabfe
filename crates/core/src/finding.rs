//! Findings reported by the remote service.
//!
//! The client never constructs findings from content itself; it only relays what
//! the service returns, in the order the service returned it.

use serde::{Deserialize, Serialize};

use crate::info_type::{InfoType, Likelihood};

/// Where a finding was located.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Object, entity kind or table the match came from (absent for inline content).
    pub container: Option<String>,
    /// Byte offsets of the match within its cell or document.
    pub byte_start: usize,
    pub byte_end: usize,
    /// Row/column coordinates for tabular content.
    pub row: Option<usize>,
    pub column: Option<String>,
}

impl Location {
    pub fn span(byte_start: usize, byte_end: usize) -> Self {
        Self {
            byte_start,
            byte_end,
            ..Default::default()
        }
    }

    pub fn in_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn at_cell(mut self, row: usize, column: impl Into<String>) -> Self {
        self.row = Some(row);
        self.column = Some(column.into());
        self
    }
}

/// One detected occurrence of an info type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub info_type: InfoType,
    pub likelihood: Likelihood,
    /// Matched excerpt; present only when the request asked for quotes.
    pub quote: Option<String>,
    pub location: Location,
}

/// Count of findings for one info type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoTypeStat {
    pub info_type: InfoType,
    pub count: u64,
}

/// Outcome of an inspection (inline or job-based).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionResult {
    findings: Vec<Finding>,
    /// Set when the service stopped early because `max_findings` was reached.
    truncated: bool,
}

impl InspectionResult {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            truncated: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn has_info_type(&self, name: &str) -> bool {
        self.findings.iter().any(|f| f.info_type.name() == name)
    }

    /// Per-info-type counts, in order of first appearance.
    pub fn info_type_stats(&self) -> Vec<InfoTypeStat> {
        let mut stats: Vec<InfoTypeStat> = Vec::new();
        for finding in &self.findings {
            match stats.iter_mut().find(|s| s.info_type == finding.info_type) {
                Some(stat) => stat.count += 1,
                None => stats.push(InfoTypeStat {
                    info_type: finding.info_type.clone(),
                    count: 1,
                }),
            }
        }
        stats
    }
}
