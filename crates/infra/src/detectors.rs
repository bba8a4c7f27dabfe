//! Pattern-based detectors used by the simulated inspection service.
//!
//! A `DetectorSet` is compiled once per request from its `InspectConfig`:
//! builtin info types map to fixed patterns, custom dictionaries become
//! case-insensitive word alternations, custom regexes are compiled as given.
//! Compilation is where malformed requests are rejected.

use regex::Regex;
use tracing::debug;

use dlpkit_core::{
    CustomDetector, CustomDictionary, Finding, InfoType, InspectionResult, Likelihood, Location,
    Table,
};
use dlpkit_inspect::{InspectConfig, ServiceError};

/// Builtin info types the simulated service understands.
pub const BUILTIN_INFO_TYPES: &[&str] = &[
    "EMAIL_ADDRESS",
    "PHONE_NUMBER",
    "FIRST_NAME",
    "US_SOCIAL_SECURITY_NUMBER",
    "CREDIT_CARD_NUMBER",
];

const FIRST_NAMES: &[&str] = &[
    "Alice", "Amanda", "Ann", "Anna", "Barbara", "Betty", "Brian", "Carol", "Charles", "Daniel",
    "David", "Donald", "Dorothy", "Elizabeth", "Emily", "Gary", "George", "Helen", "James",
    "Jennifer", "John", "Joseph", "Karen", "Kevin", "Linda", "Lisa", "Margaret", "Maria", "Mark",
    "Mary", "Michael", "Nancy", "Patricia", "Paul", "Richard", "Robert", "Sandra", "Sarah",
    "Steven", "Susan", "Thomas", "William",
];

struct Detector {
    info_type: InfoType,
    likelihood: Likelihood,
    pattern: Regex,
    /// Extra check on a candidate match (checksums and reserved ranges).
    validate: Option<fn(&str) -> bool>,
}

/// Compiled detectors plus the request's output options.
pub struct DetectorSet {
    detectors: Vec<Detector>,
    include_quote: bool,
    min_likelihood: Likelihood,
    max_findings: usize,
}

impl DetectorSet {
    pub fn compile(config: &InspectConfig) -> Result<Self, ServiceError> {
        if config.has_no_detectors() {
            return Err(ServiceError::InvalidArgument(
                "no info types or custom detectors requested".to_string(),
            ));
        }

        let mut detectors = Vec::with_capacity(config.info_types.len() + config.custom_info_types.len());

        for info_type in &config.info_types {
            detectors.push(builtin(info_type)?);
        }

        for custom in &config.custom_info_types {
            let pattern = match &custom.detector {
                CustomDetector::Dictionary(dictionary) => dictionary_pattern(dictionary),
                CustomDetector::Regex { pattern } => pattern.clone(),
            };
            let pattern = Regex::new(&pattern).map_err(|e| {
                ServiceError::InvalidArgument(format!("invalid pattern for {}: {e}", custom.info_type))
            })?;
            detectors.push(Detector {
                info_type: custom.info_type.clone(),
                likelihood: custom.likelihood,
                pattern,
                validate: None,
            });
        }

        debug!(detectors = detectors.len(), "detector set compiled");

        Ok(Self {
            detectors,
            include_quote: config.include_quote,
            min_likelihood: config.min_likelihood,
            max_findings: config.max_findings,
        })
    }

    /// Every match in `text`, ordered by position (detector order breaks ties).
    /// Locations are relative to `text`; `base` supplies container/cell.
    pub fn scan(&self, text: &str, base: &Location) -> Vec<Finding> {
        let mut hits: Vec<(usize, usize, Finding)> = Vec::new();

        for (index, detector) in self.detectors.iter().enumerate() {
            if detector.likelihood < self.min_likelihood {
                continue;
            }
            for m in detector.pattern.find_iter(text) {
                if m.is_empty() {
                    continue;
                }
                if detector.validate.is_some_and(|check| !check(m.as_str())) {
                    continue;
                }
                let mut location = base.clone();
                location.byte_start = m.start();
                location.byte_end = m.end();
                hits.push((
                    m.start(),
                    index,
                    Finding {
                        info_type: detector.info_type.clone(),
                        likelihood: detector.likelihood,
                        quote: self.include_quote.then(|| m.as_str().to_string()),
                        location,
                    },
                ));
            }
        }

        hits.sort_by_key(|(start, index, _)| (*start, *index));
        hits.into_iter().map(|(_, _, finding)| finding).collect()
    }

    pub fn inspect_text(&self, text: &str) -> InspectionResult {
        self.finish(self.scan(text, &Location::default()))
    }

    /// Scan every cell, row-major.
    pub fn scan_table(&self, table: &Table, container: Option<&str>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (row, cells) in table.rows().iter().enumerate() {
            for (header, cell) in table.headers().iter().zip(cells) {
                let mut base = Location::default().at_cell(row, header.clone());
                if let Some(container) = container {
                    base = base.in_container(container);
                }
                findings.extend(self.scan(cell, &base));
            }
        }
        findings
    }

    pub fn inspect_table(&self, table: &Table) -> InspectionResult {
        self.finish(self.scan_table(table, None))
    }

    /// Apply `max_findings` (0 = unlimited).
    pub fn finish(&self, mut findings: Vec<Finding>) -> InspectionResult {
        let truncated = self.max_findings > 0 && findings.len() > self.max_findings;
        if truncated {
            findings.truncate(self.max_findings);
        }
        InspectionResult::new(findings).with_truncated(truncated)
    }
}

fn builtin(info_type: &InfoType) -> Result<Detector, ServiceError> {
    let (pattern, likelihood, validate): (String, Likelihood, Option<fn(&str) -> bool>) =
        match info_type.name() {
            "EMAIL_ADDRESS" => (
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
                Likelihood::Likely,
                None,
            ),
            "PHONE_NUMBER" => (
                r"(?:\(\d{3}\)\s?|\b\d{3}[-.\s]?)\d{3}[-.\s]?\d{4}\b".to_string(),
                Likelihood::Likely,
                None,
            ),
            "FIRST_NAME" => (
                format!(r"\b(?:{})\b", FIRST_NAMES.join("|")),
                Likelihood::Likely,
                None,
            ),
            "US_SOCIAL_SECURITY_NUMBER" => (
                r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
                Likelihood::VeryLikely,
                Some(valid_ssn),
            ),
            "CREDIT_CARD_NUMBER" => (
                r"\b(?:\d[ -]?){12,18}\d\b".to_string(),
                Likelihood::VeryLikely,
                Some(luhn_valid),
            ),
            other => {
                return Err(ServiceError::InvalidArgument(format!("unknown info type: {other}")));
            }
        };

    let pattern = Regex::new(&pattern)
        .map_err(|e| ServiceError::Internal(format!("builtin detector {info_type}: {e}")))?;

    Ok(Detector {
        info_type: info_type.clone(),
        likelihood,
        pattern,
        validate,
    })
}

/// Longest words first so overlapping entries prefer the longer match.
fn dictionary_pattern(dictionary: &CustomDictionary) -> String {
    let mut words: Vec<&str> = dictionary.words().iter().map(String::as_str).collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    let alternation: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    format!(r"(?i)\b(?:{})\b", alternation.join("|"))
}

fn valid_ssn(candidate: &str) -> bool {
    let mut parts = candidate.split('-');
    let (Some(area), Some(group), Some(serial)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
