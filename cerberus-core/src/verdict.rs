//! Verdict data model: findings, per-reviewer verdicts, and SKIP taxonomy
//!
//! These types define the wire format of the reviewer verdict artifact. The
//! parser is deliberately tolerant when decoding model output (see
//! `crate::parser`); once constructed, a `ReviewerVerdict` is immutable for
//! the rest of the pipeline.

use serde::{Deserialize, Serialize};

/// Severity of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    /// Ranking used when sorting findings (lower is more severe)
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Major => 1,
            Severity::Minor => 2,
            Severity::Info => 3,
        }
    }

    /// Parse a severity string; anything outside the allowed set is `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "major" => Some(Severity::Major),
            "minor" => Some(Severity::Minor),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Info => "info",
        };
        write!(f, "{}", text)
    }
}

/// Reviewer- and cerberus-level verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictKind {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl VerdictKind {
    /// Parse a verdict string (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "PASS" => Some(VerdictKind::Pass),
            "WARN" => Some(VerdictKind::Warn),
            "FAIL" => Some(VerdictKind::Fail),
            "SKIP" => Some(VerdictKind::Skip),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            VerdictKind::Pass => "PASS",
            VerdictKind::Warn => "WARN",
            VerdictKind::Fail => "FAIL",
            VerdictKind::Skip => "SKIP",
        };
        write!(f, "{}", text)
    }
}

/// Scope of a finding relative to the PR diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingScope {
    /// The finding cites changed code (the default)
    Diff,
    /// The finding cites unchanged code whose defaults the PR alters;
    /// exempt from the missing-evidence demotion
    DefaultsChange,
}

/// A single reviewer finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: String,
    pub file: String,
    pub line: u64,
    pub title: String,
    pub description: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<FindingScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_verified: Option<bool>,
}

/// Per-severity counts plus file coverage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictStats {
    #[serde(default)]
    pub files_reviewed: u64,
    #[serde(default)]
    pub files_with_issues: u64,
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub major: u64,
    #[serde(default)]
    pub minor: u64,
    #[serde(default)]
    pub info: u64,
}

impl VerdictStats {
    /// Recompute severity counts from a finding list
    pub fn recount(&mut self, findings: &[Finding]) {
        self.critical = count_severity(findings, Severity::Critical);
        self.major = count_severity(findings, Severity::Major);
        self.minor = count_severity(findings, Severity::Minor);
        self.info = count_severity(findings, Severity::Info);
    }
}

fn count_severity(findings: &[Finding], severity: Severity) -> u64 {
    findings.iter().filter(|f| f.severity == severity).count() as u64
}

/// The cause behind a SKIP verdict
///
/// SKIP is never a failure-without-reason: each SKIP carries exactly one
/// synthetic finding whose category encodes one of these subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    Timeout,
    ApiError,
    ParseFailure,
}

impl SkipKind {
    /// The category string used on the synthetic finding
    pub fn category(&self) -> &'static str {
        match self {
            SkipKind::Timeout => "timeout",
            SkipKind::ApiError => "api_error",
            SkipKind::ParseFailure => "parse_failure",
        }
    }
}

/// One reviewer's verdict, the primary pipeline artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerVerdict {
    pub reviewer: String,
    pub perspective: String,
    pub verdict: VerdictKind,
    pub confidence: f64,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub stats: VerdictStats,

    // Pipeline-added metadata, absent in raw model output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
    /// Raw model output preserved when parsing was partial or failed (<= 50 KiB)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_review: Option<String>,
}

impl ReviewerVerdict {
    /// The SKIP subtype, if this is a SKIP verdict with a synthetic finding
    pub fn skip_kind(&self) -> Option<SkipKind> {
        if self.verdict != VerdictKind::Skip {
            return None;
        }
        self.findings.iter().find_map(|f| match f.category.as_str() {
            "timeout" => Some(SkipKind::Timeout),
            "api_error" => Some(SkipKind::ApiError),
            "parse_failure" | "parse-failure" => Some(SkipKind::ParseFailure),
            _ => None,
        })
    }

    /// Findings that count toward threshold rules (confidence gate applied
    /// at the verdict level)
    pub fn has_critical_finding(&self) -> bool {
        self.stats.critical > 0
            || self
                .findings
                .iter()
                .any(|f| f.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_verdict() -> ReviewerVerdict {
        ReviewerVerdict {
            reviewer: "trace".to_string(),
            perspective: "correctness".to_string(),
            verdict: VerdictKind::Warn,
            confidence: 0.85,
            summary: "One major issue".to_string(),
            findings: vec![Finding {
                severity: Severity::Major,
                category: "error-handling".to_string(),
                file: "src/lib.rs".to_string(),
                line: 42,
                title: "Unchecked unwrap".to_string(),
                description: "The result is unwrapped without a guard".to_string(),
                suggestion: "Propagate the error".to_string(),
                evidence: Some("let v = res.unwrap();".to_string()),
                scope: None,
                suggestion_verified: None,
            }],
            stats: VerdictStats {
                files_reviewed: 3,
                files_with_issues: 1,
                major: 1,
                ..Default::default()
            },
            runtime_seconds: Some(120),
            model_used: Some("model-a".to_string()),
            primary_model: Some("model-a".to_string()),
            fallback_used: Some(false),
            raw_review: None,
        }
    }

    #[test]
    fn test_verdict_serde_round_trip() {
        let verdict = sample_verdict();
        let json = serde_json::to_string(&verdict).unwrap();
        let back: ReviewerVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(verdict, back);
    }

    #[test]
    fn test_verdict_kind_wire_format() {
        let json = serde_json::to_string(&VerdictKind::Fail).unwrap();
        assert_eq!(json, "\"FAIL\"");
        assert_eq!(VerdictKind::parse("fail"), Some(VerdictKind::Fail));
        assert_eq!(VerdictKind::parse("bogus"), None);
    }

    #[test]
    fn test_severity_wire_format() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert_eq!(Severity::parse("MAJOR"), Some(Severity::Major));
        assert_eq!(Severity::parse("blocker"), None);
    }

    #[test]
    fn test_scope_wire_format() {
        let json = serde_json::to_string(&FindingScope::DefaultsChange).unwrap();
        assert_eq!(json, "\"defaults-change\"");
    }

    #[test]
    fn test_skip_kind_detection() {
        let mut verdict = sample_verdict();
        verdict.verdict = VerdictKind::Skip;
        verdict.findings = vec![Finding {
            severity: Severity::Info,
            category: "timeout".to_string(),
            file: "N/A".to_string(),
            line: 0,
            title: "Reviewer timeout after 600s".to_string(),
            description: "exceeded budget".to_string(),
            suggestion: "increase timeout".to_string(),
            evidence: None,
            scope: None,
            suggestion_verified: None,
        }];
        assert_eq!(verdict.skip_kind(), Some(SkipKind::Timeout));
    }

    #[test]
    fn test_skip_kind_absent_for_non_skip() {
        let verdict = sample_verdict();
        assert_eq!(verdict.skip_kind(), None);
    }

    #[test]
    fn test_stats_recount() {
        let verdict = sample_verdict();
        let mut stats = VerdictStats::default();
        stats.recount(&verdict.findings);
        assert_eq!(stats.major, 1);
        assert_eq!(stats.critical, 0);
    }
}
