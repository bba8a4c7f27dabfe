//! Request model sent to the inspection service.

use serde::{Deserialize, Serialize};

use dlpkit_core::{
    ContentItem, CustomDictionary, CustomInfoType, InfoType, Likelihood, ProjectId,
    custom_info_types,
};

use crate::resource::JobTarget;

/// Caller-facing knobs shared by inline and job-based inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectOptions {
    pub custom_dictionaries: Vec<CustomDictionary>,
    pub custom_regexes: Vec<String>,
    /// Return the matched excerpt with each finding.
    pub include_quote: bool,
    /// Drop findings reported below this likelihood.
    pub min_likelihood: Likelihood,
    /// Upper bound on returned findings (0 = unlimited).
    pub max_findings: usize,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            custom_dictionaries: Vec::new(),
            custom_regexes: Vec::new(),
            include_quote: true,
            min_likelihood: Likelihood::default(),
            max_findings: 0,
        }
    }
}

impl InspectOptions {
    pub fn with_custom_dictionaries(mut self, dictionaries: Vec<CustomDictionary>) -> Self {
        self.custom_dictionaries = dictionaries;
        self
    }

    pub fn with_custom_regexes<I, S>(mut self, regexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_regexes = regexes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include_quote(mut self, include_quote: bool) -> Self {
        self.include_quote = include_quote;
        self
    }

    pub fn with_min_likelihood(mut self, min_likelihood: Likelihood) -> Self {
        self.min_likelihood = min_likelihood;
        self
    }

    pub fn with_max_findings(mut self, max_findings: usize) -> Self {
        self.max_findings = max_findings;
        self
    }
}

/// Detector configuration as the service receives it: builtin filters plus
/// labeled custom detectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectConfig {
    pub info_types: Vec<InfoType>,
    pub custom_info_types: Vec<CustomInfoType>,
    pub include_quote: bool,
    pub min_likelihood: Likelihood,
    pub max_findings: usize,
}

impl InspectConfig {
    pub fn new(info_types: &[InfoType], options: &InspectOptions) -> Self {
        Self {
            info_types: info_types.to_vec(),
            custom_info_types: custom_info_types(
                &options.custom_dictionaries,
                &options.custom_regexes,
            ),
            include_quote: options.include_quote,
            min_likelihood: options.min_likelihood,
            max_findings: options.max_findings,
        }
    }

    /// True when no detector at all was requested.
    pub fn has_no_detectors(&self) -> bool {
        self.info_types.is_empty() && self.custom_info_types.is_empty()
    }
}

/// Synchronous inspection of an inline payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectContentRequest {
    pub project: ProjectId,
    pub item: ContentItem,
    pub config: InspectConfig,
}

/// Out-of-band inspection of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectJobRequest {
    pub project: ProjectId,
    pub target: JobTarget,
    pub config: InspectConfig,
    /// Topic the service publishes the completion notification to.
    pub notify_topic: String,
}
