//! Plain-text rendering of inspection results.

use std::fmt::Write;

use dlpkit_core::InspectionResult;

const NO_FINDINGS: &str = "No findings.\n";

/// One block per finding: quote (when present), info type, likelihood.
pub fn render_findings(result: &InspectionResult) -> String {
    if result.is_empty() {
        return NO_FINDINGS.to_string();
    }

    let mut out = String::new();
    for finding in result.findings() {
        if let Some(quote) = &finding.quote {
            let _ = writeln!(out, "Quote: {quote}");
        }
        let _ = writeln!(out, "Info type: {}", finding.info_type);
        let _ = writeln!(out, "Likelihood: {}", finding.likelihood);
    }
    if result.truncated() {
        out.push_str("(findings truncated)\n");
    }
    out
}

/// One line per info type with its count, in order of first appearance.
pub fn render_info_type_stats(result: &InspectionResult) -> String {
    if result.is_empty() {
        return NO_FINDINGS.to_string();
    }

    let mut out = String::new();
    for stat in result.info_type_stats() {
        let _ = writeln!(out, "Info type: {}; Count: {}", stat.info_type, stat.count);
    }
    out
}
