//! Output parser: raw reviewer artifacts to typed verdicts
//!
//! The parser never fails: every input, including garbage, yields exactly
//! one verdict. Failures are classified into the SKIP taxonomy (`timeout`,
//! `api_error`, `parse_failure`) with a synthetic finding describing the
//! cause, so the aggregator can render a precise banner.

pub mod extract;

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::runner::salvage::ArtifactDescriptor;
use crate::verdict::{
    Finding, FindingScope, ReviewerVerdict, Severity, SkipKind, VerdictKind, VerdictStats,
};

/// Raw model output preserved on parse failures, in bytes
pub const RAW_REVIEW_LIMIT: usize = 50_000;

/// Findings below this confidence do not move the verdict
pub const CONFIDENCE_GATE: f64 = 0.7;

const WARN_MINOR_THRESHOLD: usize = 5;
const WARN_SAME_CATEGORY_MINOR_THRESHOLD: usize = 3;
const EVIDENCE_MAX_CHARS: usize = 2000;

const PARSE_FAILURE_PREFIX: &str = "Review output could not be parsed: ";

/// Pipeline identity of the reviewer being parsed
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub reviewer: &'a str,
    pub perspective: &'a str,
}

/// Parse the artifact a descriptor points at, attaching runner metadata
///
/// An unreadable artifact is a prior-step failure, not a review failure: it
/// becomes a SKIP rather than blocking the PR.
pub fn parse_artifact(ctx: ParseContext<'_>, descriptor: &ArtifactDescriptor) -> ReviewerVerdict {
    let mut verdict = match std::fs::read_to_string(&descriptor.parse_input) {
        Ok(raw) => parse_review(ctx, &raw),
        Err(e) => skip_verdict(
            ctx,
            SkipKind::ParseFailure,
            "Unreadable review artifact".to_string(),
            format!("{}unable to read input: {}", PARSE_FAILURE_PREFIX, e),
            format!(
                "The selected artifact {} could not be read.",
                descriptor.parse_input.display()
            ),
            "Check the reviewer job logs for the failure that preceded parsing.".to_string(),
            None,
        ),
    };

    verdict.runtime_seconds = Some(descriptor.runtime_seconds);
    verdict.model_used = Some(descriptor.model_used.clone());
    verdict.primary_model = Some(descriptor.primary_model.clone());
    verdict.fallback_used = Some(descriptor.fallback_used);
    verdict
}

/// Parse raw reviewer output into a verdict (infallible)
pub fn parse_review(ctx: ParseContext<'_>, raw: &str) -> ReviewerVerdict {
    if let Some(timeout) = detect_timeout_marker(raw) {
        return timeout_skip_verdict(ctx, &timeout);
    }

    if raw.contains("API Error:") {
        let title = explicit_api_error_title(raw);
        return api_error_skip_verdict(ctx, title, raw);
    }

    let Some(block) = extract::extract_json_block(raw) else {
        return handle_missing_json_block(ctx, raw);
    };

    let Some(value) = extract::parse_block(block) else {
        return parse_failure_verdict(ctx, "invalid JSON in fenced block", raw);
    };

    build_verdict(ctx, &value, raw)
}

fn build_verdict(
    ctx: ParseContext<'_>,
    value: &serde_json::Value,
    raw: &str,
) -> ReviewerVerdict {
    for field in [
        "reviewer",
        "perspective",
        "verdict",
        "confidence",
        "summary",
        "findings",
        "stats",
    ] {
        if value.get(field).is_none() {
            return parse_failure_verdict(ctx, &format!("missing root field: {}", field), raw);
        }
    }

    let Some(model_verdict) = value["verdict"].as_str().and_then(VerdictKind::parse) else {
        return parse_failure_verdict(ctx, "invalid verdict", raw);
    };

    let confidence = value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    let summary = value["summary"].as_str().unwrap_or("").to_string();

    let Some(raw_findings) = value["findings"].as_array() else {
        return parse_failure_verdict(ctx, "findings must be a list", raw);
    };
    let findings: Vec<Finding> = raw_findings.iter().map(normalize_finding).collect();

    // A model-declared SKIP is taken at face value; it carries no gating
    // findings by construction.
    let final_verdict = if model_verdict == VerdictKind::Skip {
        VerdictKind::Skip
    } else {
        let recomputed = recompute_verdict(&findings, confidence);
        if recomputed != model_verdict {
            warn!(
                reviewer = ctx.reviewer,
                claimed = %model_verdict,
                recomputed = %recomputed,
                "Model-supplied verdict disagrees with findings; recomputed verdict wins"
            );
        }
        recomputed
    };

    let mut stats = VerdictStats {
        files_reviewed: u64_field(&value["stats"], "files_reviewed"),
        files_with_issues: u64_field(&value["stats"], "files_with_issues"),
        ..Default::default()
    };
    stats.recount(&findings);

    ReviewerVerdict {
        reviewer: ctx.reviewer.to_string(),
        perspective: ctx.perspective.to_string(),
        verdict: final_verdict,
        confidence,
        summary,
        findings,
        stats,
        runtime_seconds: None,
        model_used: None,
        primary_model: None,
        fallback_used: None,
        raw_review: None,
    }
}

fn u64_field(value: &serde_json::Value, key: &str) -> u64 {
    value.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Normalize one raw finding value into the typed model
///
/// Schema violations within a finding are repaired, never discarded:
/// unknown severity coerces to `info`, non-numeric lines to 0, and findings
/// without usable evidence are demoted.
fn normalize_finding(value: &serde_json::Value) -> Finding {
    let severity_raw = value.get("severity").and_then(|v| v.as_str()).unwrap_or("");
    let severity = Severity::parse(severity_raw).unwrap_or(Severity::Info);

    let line = match value.get("line") {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    let scope = value
        .get("scope")
        .and_then(|v| v.as_str())
        .and_then(|s| match s.trim() {
            "diff" => Some(FindingScope::Diff),
            "defaults-change" => Some(FindingScope::DefaultsChange),
            _ => None,
        });

    let suggestion_verified = value.get("suggestion_verified").and_then(|v| v.as_bool());

    let evidence = value
        .get("evidence")
        .and_then(|v| v.as_str())
        .map(normalize_evidence)
        .filter(|e| !e.is_empty());

    let mut finding = Finding {
        severity,
        category: str_field(value, "category"),
        file: str_field(value, "file"),
        line,
        title: str_field(value, "title"),
        description: str_field(value, "description"),
        suggestion: str_field(value, "suggestion"),
        evidence,
        scope,
        suggestion_verified,
    };

    apply_evidence_gate(&mut finding);
    apply_speculative_downgrade(&mut finding);
    finding
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Missing evidence demotes severity to `info` unless the title already
/// carries the `[unverified]` prefix or the finding cites unchanged code
/// under the `defaults-change` exemption
fn apply_evidence_gate(finding: &mut Finding) {
    if finding.severity == Severity::Info {
        return;
    }
    if finding.evidence.is_some() {
        return;
    }
    if finding.scope == Some(FindingScope::DefaultsChange) {
        return;
    }
    if finding.title.starts_with("[unverified]") {
        finding.severity = Severity::Info;
        return;
    }
    finding.severity = Severity::Info;
    finding.title = format!("[unverified] {}", finding.title);
}

/// An explicitly unverified suggestion keeps the finding visible without
/// letting it inflate the verdict
fn apply_speculative_downgrade(finding: &mut Finding) {
    if finding.suggestion_verified != Some(false) {
        return;
    }
    if finding.severity == Severity::Info {
        return;
    }
    finding.severity = Severity::Info;
    if !finding.title.starts_with("[speculative]") {
        finding.title = format!("[speculative] {}", finding.title);
    }
}

/// Unwrap a fenced code block and strip diff +/- markers from pasted hunks
fn normalize_evidence(raw: &str) -> String {
    let mut evidence = raw.replace("\r\n", "\n").trim().to_string();

    if evidence.starts_with("```") {
        let lines: Vec<&str> = evidence.lines().collect();
        if lines.len() >= 2 && lines.last().map_or(false, |l| l.trim() == "```") {
            evidence = lines[1..lines.len() - 1].join("\n").trim_matches('\n').to_string();
        }
    }

    let lines: Vec<&str> = evidence.lines().collect();
    if !lines.is_empty() {
        let looks_like_diff = lines.iter().all(|l| {
            l.is_empty()
                || ((l.starts_with('+') || l.starts_with('-') || l.starts_with(' '))
                    && !l.starts_with("+++ ")
                    && !l.starts_with("--- "))
        }) && lines
            .iter()
            .any(|l| !l.is_empty() && (l.starts_with('+') || l.starts_with('-')));
        if looks_like_diff {
            evidence = lines
                .iter()
                .map(|l| {
                    if l.starts_with('+') || l.starts_with('-') || l.starts_with(' ') {
                        &l[1..]
                    } else {
                        l
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
                .trim_matches('\n')
                .to_string();
        }
    }

    if evidence.len() > EVIDENCE_MAX_CHARS {
        let mut end = EVIDENCE_MAX_CHARS;
        while !evidence.is_char_boundary(end) {
            end -= 1;
        }
        evidence.truncate(end);
        evidence.push_str("...");
    }
    evidence
}

/// Recompute the verdict from normalized findings
///
/// Low-confidence reviews keep their findings for visibility but do not
/// gate the merge.
pub fn recompute_verdict(findings: &[Finding], confidence: f64) -> VerdictKind {
    let gated: &[Finding] = if confidence < CONFIDENCE_GATE {
        &[]
    } else {
        findings
    };

    let critical = gated.iter().filter(|f| f.severity == Severity::Critical).count();
    let major = gated.iter().filter(|f| f.severity == Severity::Major).count();
    let minor = gated.iter().filter(|f| f.severity == Severity::Minor).count();

    let mut minor_by_category: std::collections::HashMap<&str, usize> =
        std::collections::HashMap::new();
    for finding in gated.iter().filter(|f| f.severity == Severity::Minor) {
        let category = finding.category.trim();
        let key = if category.is_empty() { "uncategorized" } else { category };
        *minor_by_category.entry(key).or_default() += 1;
    }
    let same_category_cluster = minor_by_category
        .values()
        .any(|&count| count >= WARN_SAME_CATEGORY_MINOR_THRESHOLD);

    if critical > 0 || major >= 2 {
        VerdictKind::Fail
    } else if major == 1 || minor >= WARN_MINOR_THRESHOLD || same_category_cluster {
        VerdictKind::Warn
    } else {
        VerdictKind::Pass
    }
}

struct TimeoutMarker {
    timeout_seconds: Option<u64>,
    files_in_diff: Vec<String>,
    fast_path: String,
}

static TIMEOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Review Timeout:\s*timeout after\s*(\d+)s").expect("timeout pattern")
});
static GENERIC_TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)timeout after\s*(\d+)s").expect("generic timeout pattern"));
static FILES_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^Files in diff:\s*(.*?)(?:^Next steps:|\z)").expect("files section pattern")
});
static FAST_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Fast-path:\s*(.+)$").expect("fast-path pattern"));

fn detect_timeout_marker(text: &str) -> Option<TimeoutMarker> {
    let captures = TIMEOUT_RE
        .captures(text)
        .or_else(|| GENERIC_TIMEOUT_RE.captures(text))?;
    let timeout_seconds = captures.get(1).and_then(|m| m.as_str().parse().ok());

    let files_in_diff = FILES_SECTION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && *l != "(none)")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let fast_path = FAST_PATH_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(TimeoutMarker {
        timeout_seconds,
        files_in_diff,
        fast_path,
    })
}

fn timeout_skip_verdict(ctx: ParseContext<'_>, marker: &TimeoutMarker) -> ReviewerVerdict {
    let suffix = marker
        .timeout_seconds
        .map(|s| format!(" after {}s", s))
        .unwrap_or_default();

    let mut description =
        "Reviewer exceeded the configured runtime limit before completing.".to_string();
    if !marker.files_in_diff.is_empty() {
        description.push_str(&format!(
            " Files in diff: {}",
            marker.files_in_diff.join(", ")
        ));
    }
    if !marker.fast_path.is_empty() {
        description.push_str(&format!(" Fast-path fallback: {}", marker.fast_path));
    }

    let mut suggestion = String::new();
    if marker.fast_path.starts_with("yes") {
        suggestion.push_str("Model provider may be stalled — check provider status. ");
    }
    suggestion.push_str("Increase timeout, reduce diff size, or try a faster model.");

    skip_verdict(
        ctx,
        SkipKind::Timeout,
        format!("Reviewer timeout{}", suffix),
        format!("Review skipped due to timeout{}.", suffix),
        description,
        suggestion,
        None,
    )
}

fn explicit_api_error_title(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if text.contains("API_KEY_INVALID") || lower.contains("authentication") {
        "API_KEY_INVALID"
    } else if text.contains("API_CREDITS_DEPLETED")
        || text.contains("API_QUOTA_EXCEEDED")
        || text.contains("402")
        || lower.contains("payment required")
        || lower.contains("quota")
        || lower.contains("billing")
    {
        "API_CREDITS_DEPLETED"
    } else {
        "API_ERROR"
    }
}

/// Error titles sniffed from raw output without an explicit marker
fn implicit_api_error_title(text: &str) -> Option<&'static str> {
    static PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
        [
            (r"401", "API_KEY_INVALID"),
            (r"402", "API_CREDITS_DEPLETED"),
            (r"403", "API_KEY_INVALID"),
            (r"429", "RATE_LIMITED"),
            (r"503", "SERVICE_UNAVAILABLE"),
            (r"(?i)payment required", "API_CREDITS_DEPLETED"),
            (r"exceeded_current_quota", "API_CREDITS_DEPLETED"),
            (r"insufficient_quota", "API_CREDITS_DEPLETED"),
            (r"incorrect_api_key", "API_KEY_INVALID"),
            (r"invalid_api_key", "API_KEY_INVALID"),
            (r"(?i)rate limit", "RATE_LIMITED"),
            (r"(?i)quota exceeded", "API_CREDITS_DEPLETED"),
            (r"(?i)billing", "API_CREDITS_DEPLETED"),
            (r"(?i)authentication", "API_KEY_INVALID"),
        ]
        .into_iter()
        .map(|(pattern, title)| (Regex::new(pattern).expect("api error pattern"), title))
        .collect()
    });

    PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, title)| *title)
}

fn api_error_skip_verdict(
    ctx: ParseContext<'_>,
    title: &str,
    raw: &str,
) -> ReviewerVerdict {
    let (summary, suggestion) = if title == "API_CREDITS_DEPLETED" {
        (
            format!("Review skipped: API credits depleted ({})", title),
            "Top up API credits or configure a fallback provider.".to_string(),
        )
    } else {
        (
            format!("Review skipped due to API error: {}", title),
            "Check API key and quota settings.".to_string(),
        )
    };

    skip_verdict(
        ctx,
        SkipKind::ApiError,
        format!("API Error: {}", title),
        summary,
        raw.trim().to_string(),
        suggestion,
        None,
    )
}

fn handle_missing_json_block(ctx: ParseContext<'_>, raw: &str) -> ReviewerVerdict {
    if let Some(title) = implicit_api_error_title(raw) {
        return api_error_skip_verdict(ctx, title, raw);
    }

    let sanitized = sanitize_raw_review(raw);

    // A scratchpad or substantive prose review is still a review: surface it
    // as a low-confidence WARN instead of hiding it behind a SKIP.
    if extract::is_scratchpad(raw) || sanitized.len() > 500 {
        let verdict = extract::extract_verdict_from_markdown(raw)
            .and_then(VerdictKind::parse)
            .unwrap_or(VerdictKind::Warn);
        return ReviewerVerdict {
            reviewer: ctx.reviewer.to_string(),
            perspective: ctx.perspective.to_string(),
            verdict,
            confidence: 0.3,
            summary: "Partial review: reviewer output was unstructured (no JSON). See workflow logs/artifacts for full output.".to_string(),
            findings: vec![synthetic_finding(
                SkipKind::ParseFailure,
                "Review analysis available but not machine-parseable".to_string(),
                "Reviewer produced a review without structured JSON output. Raw output is preserved in the verdict artifact.".to_string(),
                "No action needed; see the workflow run for the preserved raw output.".to_string(),
            )],
            stats: VerdictStats {
                info: 1,
                ..Default::default()
            },
            runtime_seconds: None,
            model_used: None,
            primary_model: None,
            fallback_used: None,
            raw_review: truncate_raw(&sanitized),
        };
    }

    parse_failure_verdict(ctx, "no ```json block found", raw)
}

fn parse_failure_verdict(ctx: ParseContext<'_>, error: &str, raw: &str) -> ReviewerVerdict {
    let sanitized = sanitize_raw_review(raw);
    skip_verdict(
        ctx,
        SkipKind::ParseFailure,
        "Review output could not be parsed".to_string(),
        format!("{}{}", PARSE_FAILURE_PREFIX, error),
        format!("The reviewer produced output without a valid verdict JSON block: {}.", error),
        "Re-run the reviewer or inspect the raw output in the workflow artifacts.".to_string(),
        truncate_raw(&sanitized),
    )
}

fn truncate_raw(sanitized: &str) -> Option<String> {
    if sanitized.is_empty() {
        return None;
    }
    let mut end = RAW_REVIEW_LIMIT.min(sanitized.len());
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }
    Some(sanitized[..end].to_string())
}

fn synthetic_finding(
    kind: SkipKind,
    title: String,
    description: String,
    suggestion: String,
) -> Finding {
    Finding {
        severity: Severity::Info,
        category: kind.category().to_string(),
        file: "N/A".to_string(),
        line: 0,
        title,
        description,
        suggestion,
        evidence: None,
        scope: None,
        suggestion_verified: None,
    }
}

fn skip_verdict(
    ctx: ParseContext<'_>,
    kind: SkipKind,
    title: String,
    summary: String,
    description: String,
    suggestion: String,
    raw_review: Option<String>,
) -> ReviewerVerdict {
    ReviewerVerdict {
        reviewer: ctx.reviewer.to_string(),
        perspective: ctx.perspective.to_string(),
        verdict: VerdictKind::Skip,
        confidence: 0.0,
        summary,
        findings: vec![synthetic_finding(kind, title, description, suggestion)],
        stats: VerdictStats {
            info: 1,
            ..Default::default()
        },
        runtime_seconds: None,
        model_used: None,
        primary_model: None,
        fallback_used: None,
        raw_review,
    }
}

static PREAMBLE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s* (?:[>\-*]\s*)? (?: i'll\b | i\s+will\b | i\s+(?:am|'m)\s+going\s+to\b | i\s+need\s+to\b | now\s+i\b | next\s*,?\s+i\b | first\s*,?\s+i\b | then\s+i\b | let\s+me\b | let'?s\b )",
    )
    .expect("preamble start pattern")
});

static PREAMBLE_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:start|begin|read|review|examin|investigat|check|look|analyz|create|write|open|fetch|run|use|call|tool|step)\w*\b",
    )
    .expect("preamble verb pattern")
});

static FIRST_SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^.*?(?:[.!?](?:\s+|\s*\n+)|\n+)").expect("sentence pattern"));

static BLANK_RUNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank runs pattern"));

/// Strip agentic narration preambles ("I'll start by reading...") from raw
/// output preserved for debugging
pub fn sanitize_raw_review(text: &str) -> String {
    let mut sanitized = text
        .replace("\r\n", "\n")
        .replace('\u{2019}', "'")
        .replace('\u{2018}', "'")
        .trim()
        .to_string();
    if sanitized.is_empty() {
        return sanitized;
    }

    for _ in 0..100 {
        let sentence = FIRST_SENTENCE_RE
            .find(&sanitized)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| sanitized.clone());
        if !PREAMBLE_START_RE.is_match(&sentence) || !PREAMBLE_VERB_RE.is_match(&sentence) {
            break;
        }
        sanitized = sanitized[sentence.len()..].trim_start().to_string();
        if sanitized.is_empty() {
            break;
        }
    }

    BLANK_RUNS_RE
        .replace_all(&sanitized, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::salvage::{timeout_marker_text, ArtifactKind};

    const CTX: ParseContext<'static> = ParseContext {
        reviewer: "trace",
        perspective: "correctness",
    };

    fn finding_json(severity: &str, evidence: Option<&str>) -> serde_json::Value {
        let mut finding = serde_json::json!({
            "severity": severity,
            "category": "error-handling",
            "file": "src/foo.py",
            "line": 42,
            "title": "Race condition",
            "description": "Two writers, no lock",
            "suggestion": "Add a mutex",
        });
        if let Some(evidence) = evidence {
            finding["evidence"] = serde_json::Value::String(evidence.to_string());
        }
        finding
    }

    fn artifact(verdict: &str, confidence: f64, findings: Vec<serde_json::Value>) -> String {
        let body = serde_json::json!({
            "reviewer": "trace",
            "perspective": "correctness",
            "verdict": verdict,
            "confidence": confidence,
            "summary": "summary",
            "findings": findings,
            "stats": {"files_reviewed": 2, "files_with_issues": 1, "critical": 0, "major": 0, "minor": 0, "info": 0},
        });
        format!("analysis prose\n```json\n{}\n```\n", body)
    }

    #[test]
    fn test_two_major_findings_fail() {
        let raw = artifact(
            "PASS",
            0.9,
            vec![
                finding_json("major", Some("let x = y.unwrap();")),
                finding_json("major", Some("drop(lock);")),
            ],
        );
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.verdict, VerdictKind::Fail);
        assert_eq!(verdict.stats.major, 2);
    }

    #[test]
    fn test_evidence_demotion_to_info() {
        let raw = artifact("FAIL", 0.9, vec![finding_json("major", None)]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.verdict, VerdictKind::Pass);
        assert_eq!(verdict.findings[0].severity, Severity::Info);
        assert!(verdict.findings[0].title.starts_with("[unverified] "));
        assert_eq!(verdict.stats.info, 1);
        assert_eq!(verdict.stats.major, 0);
    }

    #[test]
    fn test_defaults_change_scope_exempts_evidence_gate() {
        let mut finding = finding_json("major", None);
        finding["scope"] = serde_json::Value::String("defaults-change".to_string());
        let raw = artifact("WARN", 0.9, vec![finding]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.findings[0].severity, Severity::Major);
        assert_eq!(verdict.verdict, VerdictKind::Warn);
    }

    #[test]
    fn test_unverified_title_prefix_skips_reprefixing() {
        let mut finding = finding_json("major", None);
        finding["title"] = serde_json::Value::String("[unverified] Race".to_string());
        let raw = artifact("PASS", 0.9, vec![finding]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.findings[0].severity, Severity::Info);
        assert_eq!(verdict.findings[0].title, "[unverified] Race");
    }

    #[test]
    fn test_suggestion_verified_false_demotes() {
        let mut finding = finding_json("critical", Some("evidence line"));
        finding["suggestion_verified"] = serde_json::Value::Bool(false);
        let raw = artifact("FAIL", 0.9, vec![finding]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.findings[0].severity, Severity::Info);
        assert!(verdict.findings[0].title.starts_with("[speculative] "));
        assert_eq!(verdict.verdict, VerdictKind::Pass);
    }

    #[test]
    fn test_low_confidence_findings_do_not_gate() {
        let raw = artifact(
            "FAIL",
            0.5,
            vec![
                finding_json("critical", Some("bad code")),
                finding_json("major", Some("worse code")),
            ],
        );
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.verdict, VerdictKind::Pass);
        // Findings stay visible even though they do not gate.
        assert_eq!(verdict.findings.len(), 2);
    }

    #[test]
    fn test_warn_thresholds() {
        let minor = |cat: &str| {
            let mut f = finding_json("minor", Some("x"));
            f["category"] = serde_json::Value::String(cat.to_string());
            f
        };
        // One major -> WARN.
        let verdict = parse_review(CTX, &artifact("PASS", 0.9, vec![finding_json("major", Some("x"))]));
        assert_eq!(verdict.verdict, VerdictKind::Warn);
        // Three same-category minors -> WARN.
        let verdict = parse_review(
            CTX,
            &artifact("PASS", 0.9, vec![minor("style"), minor("style"), minor("style")]),
        );
        assert_eq!(verdict.verdict, VerdictKind::Warn);
        // Three scattered minors -> PASS.
        let verdict = parse_review(
            CTX,
            &artifact("PASS", 0.9, vec![minor("a"), minor("b"), minor("c")]),
        );
        assert_eq!(verdict.verdict, VerdictKind::Pass);
    }

    #[test]
    fn test_severity_coercion_and_line_coercion() {
        let mut finding = finding_json("blocker", Some("x"));
        finding["line"] = serde_json::Value::String("not-a-number".to_string());
        let raw = artifact("PASS", 0.9, vec![finding]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.findings[0].severity, Severity::Info);
        assert_eq!(verdict.findings[0].line, 0);
    }

    #[test]
    fn test_confidence_clamped() {
        let raw = artifact("PASS", 3.5, vec![]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(verdict.confidence, 1.0);
    }

    #[test]
    fn test_missing_required_field_is_parse_failure() {
        let raw = "```json\n{\"verdict\": \"PASS\", \"confidence\": 0.9}\n```";
        let verdict = parse_review(CTX, raw);
        assert_eq!(verdict.verdict, VerdictKind::Skip);
        assert_eq!(verdict.skip_kind(), Some(SkipKind::ParseFailure));
    }

    #[test]
    fn test_timeout_marker_round_trip() {
        let marker = timeout_marker_text("trace", "correctness", 600, &["src/a.rs".to_string()], true);
        let verdict = parse_review(CTX, &marker);
        assert_eq!(verdict.verdict, VerdictKind::Skip);
        assert_eq!(verdict.skip_kind(), Some(SkipKind::Timeout));
        assert!(verdict.summary.contains("after 600s"));
        let finding = &verdict.findings[0];
        assert!(finding.description.contains("src/a.rs"));
        assert!(finding.description.contains("Fast-path fallback: yes"));
    }

    #[test]
    fn test_api_error_marker_credits_depleted() {
        let raw = "API Error: API_CREDITS_DEPLETED\n\ninsufficient_credits\n";
        let verdict = parse_review(CTX, raw);
        assert_eq!(verdict.skip_kind(), Some(SkipKind::ApiError));
        assert_eq!(verdict.findings[0].title, "API Error: API_CREDITS_DEPLETED");
        assert!(verdict.summary.contains("credits depleted"));
    }

    #[test]
    fn test_implicit_api_error_without_marker() {
        let raw = "request failed: 429 rate limit exceeded, slow down";
        let verdict = parse_review(CTX, raw);
        assert_eq!(verdict.skip_kind(), Some(SkipKind::ApiError));
        assert_eq!(verdict.findings[0].title, "API Error: RATE_LIMITED");
    }

    #[test]
    fn test_scratchpad_becomes_low_confidence_warn() {
        let raw = "## Investigation Notes\nLots of analysis here.\n## Verdict: FAIL\nbroken";
        let verdict = parse_review(CTX, raw);
        assert_eq!(verdict.verdict, VerdictKind::Fail);
        assert_eq!(verdict.confidence, 0.3);
        assert!(verdict.raw_review.is_some());
        assert_eq!(verdict.findings[0].category, "parse_failure");
    }

    #[test]
    fn test_empty_input_is_parse_failure_skip() {
        let verdict = parse_review(CTX, "");
        assert_eq!(verdict.verdict, VerdictKind::Skip);
        assert_eq!(verdict.skip_kind(), Some(SkipKind::ParseFailure));
        assert!(verdict.raw_review.is_none());
    }

    #[test]
    fn test_parser_is_deterministic() {
        let raw = artifact("WARN", 0.8, vec![finding_json("major", Some("x"))]);
        let first = parse_review(CTX, &raw);
        let second = parse_review(CTX, &raw);
        assert_eq!(first, second);
    }

    #[test]
    fn test_raw_review_truncated_to_limit() {
        let huge = format!("x{}", "y".repeat(RAW_REVIEW_LIMIT * 2));
        let verdict = parse_review(CTX, &huge);
        // Substantive text becomes a WARN with truncated raw_review.
        let raw_review = verdict.raw_review.unwrap();
        assert!(raw_review.len() <= RAW_REVIEW_LIMIT);
    }

    #[test]
    fn test_evidence_diff_markers_stripped() {
        let evidence = "+let x = 1;\n+let y = 2;";
        let raw = artifact("PASS", 0.9, vec![finding_json("minor", Some(evidence))]);
        let verdict = parse_review(CTX, &raw);
        assert_eq!(
            verdict.findings[0].evidence.as_deref(),
            Some("let x = 1;\nlet y = 2;")
        );
    }

    #[test]
    fn test_sanitize_raw_review_strips_preamble() {
        let text = "I'll start by reading the diff. Then I will check the tests.\nThe change breaks the API contract.";
        let sanitized = sanitize_raw_review(text);
        assert!(sanitized.starts_with("The change breaks"));
    }

    #[test]
    fn test_parse_artifact_attaches_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("correctness-output.txt");
        std::fs::write(&path, artifact("PASS", 0.9, vec![])).unwrap();
        let descriptor = ArtifactDescriptor {
            parse_input: path,
            kind: ArtifactKind::JsonBlock,
            model_used: "model-b".to_string(),
            primary_model: "model-a".to_string(),
            fallback_used: true,
            runtime_seconds: 88,
        };
        let verdict = parse_artifact(CTX, &descriptor);
        assert_eq!(verdict.model_used.as_deref(), Some("model-b"));
        assert_eq!(verdict.primary_model.as_deref(), Some("model-a"));
        assert_eq!(verdict.fallback_used, Some(true));
        assert_eq!(verdict.runtime_seconds, Some(88));
    }

    #[test]
    fn test_unreadable_artifact_is_skip() {
        let descriptor = ArtifactDescriptor {
            parse_input: std::path::PathBuf::from("/nonexistent/cerberus-artifact"),
            kind: ArtifactKind::Partial,
            model_used: "model-a".to_string(),
            primary_model: "model-a".to_string(),
            fallback_used: false,
            runtime_seconds: 1,
        };
        let verdict = parse_artifact(CTX, &descriptor);
        assert_eq!(verdict.verdict, VerdictKind::Skip);
        assert_eq!(verdict.skip_kind(), Some(SkipKind::ParseFailure));
    }

    #[test]
    fn test_model_skip_is_preserved() {
        let raw = artifact("SKIP", 0.0, vec![]);
        let verdict = parse_review(CTX, &raw);
        // No synthetic finding is invented for a model-declared SKIP; the
        // aggregator treats it as parse-failure-adjacent only if it has one.
        assert_eq!(verdict.verdict, VerdictKind::Skip);
    }
}
