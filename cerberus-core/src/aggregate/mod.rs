//! Verdict aggregation: N reviewer verdicts to one cerberus verdict
//!
//! The decision table: every reviewer skipping means SKIP; a critical
//! reviewer's un-overridden FAIL is authoritative; two independent FAILs
//! constitute cross-perspective agreement; a single non-critical FAIL is
//! advisory and lands as WARN. Authorized overrides downgrade FAILs to
//! overridden-non-blocking, recorded but never erased.

pub mod overrides;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::pr::PrComment;
use crate::verdict::{ReviewerVerdict, SkipKind, VerdictKind};
use crate::{Error, Result};
use overrides::{Override, OverrideScan, RejectedOverride};

/// Verdict artifacts above this size are treated as malformed (1 MiB)
pub const MAX_ARTIFACT_SIZE: u64 = 1_048_576;

/// One reviewer's verdict with its aggregation-time annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerOutcome {
    #[serde(flatten)]
    pub verdict: ReviewerVerdict,
    /// The reviewer is marked `critical` in the roster
    #[serde(default)]
    pub critical_reviewer: bool,
    /// A FAIL downgraded to non-blocking by an authorized override
    #[serde(default)]
    pub overridden: bool,
}

/// Aggregate verdict counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: usize,
    pub fail: usize,
    pub warn: usize,
    pub pass: usize,
    pub skip: usize,
}

/// Wave context attached to the final verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveMeta {
    pub wave: String,
    /// Whether the gate allowed the next wave
    pub escalate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wave: Option<String>,
}

/// An artifact the loader refused, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedArtifact {
    pub file: String,
    pub reason: String,
}

/// The final cerberus-level verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CerberusVerdict {
    pub verdict: VerdictKind,
    pub summary: String,
    pub reviewers: Vec<ReviewerOutcome>,
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_applied: Option<Override>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_overrides: Vec<RejectedOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave: Option<WaveMeta>,
    pub stats: AggregateStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_artifacts: Vec<SkippedArtifact>,
}

/// Combine reviewer verdicts under the multi-rule policy
pub fn aggregate(
    verdicts: Vec<ReviewerVerdict>,
    config: &Config,
    scan: OverrideScan,
    wave: Option<WaveMeta>,
) -> CerberusVerdict {
    let override_used = scan.applied.is_some();

    let mut reviewers: Vec<ReviewerOutcome> = verdicts
        .into_iter()
        .map(|verdict| {
            let critical_reviewer = config
                .reviewer_for_codename(&verdict.reviewer)
                .map(|r| r.critical)
                .unwrap_or(false);
            let overridden = override_used && verdict.verdict == VerdictKind::Fail;
            ReviewerOutcome {
                verdict,
                critical_reviewer,
                overridden,
            }
        })
        .collect();

    // Deterministic rendering order regardless of artifact arrival order.
    reviewers.sort_by(|a, b| a.verdict.reviewer.cmp(&b.verdict.reviewer));

    let total = reviewers.len();
    let skips: Vec<&ReviewerOutcome> = reviewers
        .iter()
        .filter(|r| r.verdict.verdict == VerdictKind::Skip)
        .collect();
    let blocking_fails = reviewers
        .iter()
        .filter(|r| r.verdict.verdict == VerdictKind::Fail && !r.overridden)
        .count();
    let critical_fail = reviewers
        .iter()
        .any(|r| r.verdict.verdict == VerdictKind::Fail && !r.overridden && r.critical_reviewer);
    let warns = reviewers
        .iter()
        .filter(|r| r.verdict.verdict == VerdictKind::Warn)
        .count();
    let passes = reviewers
        .iter()
        .filter(|r| r.verdict.verdict == VerdictKind::Pass)
        .count();
    let non_skip = total - skips.len();

    let verdict = if total > 0 && non_skip == 0 {
        VerdictKind::Skip
    } else if critical_fail {
        VerdictKind::Fail
    } else if blocking_fails >= 2 {
        VerdictKind::Fail
    } else if blocking_fails == 1 || warns >= 1 {
        VerdictKind::Warn
    } else {
        VerdictKind::Pass
    };

    let mut summary = format!("{} reviewers. ", total);
    match &scan.applied {
        Some(applied) => {
            summary.push_str(&format!(
                "Override by {} for {}.",
                applied.actor, applied.sha
            ));
        }
        None => {
            let fails = reviewers
                .iter()
                .filter(|r| r.verdict.verdict == VerdictKind::Fail)
                .count();
            summary.push_str(&format!(
                "Failures: {}, warnings: {}, skipped: {}.",
                fails,
                warns,
                skips.len()
            ));
            let timed_out: Vec<&str> = skips
                .iter()
                .filter(|r| r.verdict.skip_kind() == Some(SkipKind::Timeout))
                .map(|r| r.verdict.reviewer.as_str())
                .collect();
            if !timed_out.is_empty() {
                summary.push_str(&format!(" Timed out reviewers: {}.", timed_out.join(", ")));
            }
        }
    }

    let stats = AggregateStats {
        total,
        fail: blocking_fails,
        warn: warns,
        pass: passes,
        skip: skips.len(),
    };

    CerberusVerdict {
        verdict,
        summary,
        reviewers,
        override_applied: scan.applied,
        rejected_overrides: scan.rejected,
        wave,
        stats,
        skipped_artifacts: Vec::new(),
    }
}

/// Scan comments and apply the override policy for the loaded verdicts
pub fn scan_overrides(
    config: &Config,
    verdicts: &[ReviewerVerdict],
    comments: &[PrComment],
    head_sha: &str,
    pr_author: Option<&str>,
    permissions: &HashMap<String, String>,
) -> OverrideScan {
    let failing_policies: Vec<_> = verdicts
        .iter()
        .filter(|v| v.verdict == VerdictKind::Fail)
        .map(|v| config.override_policy_for(&v.perspective))
        .collect();
    let policy = overrides::effective_policy(&failing_policies, config.overrides.default_policy);
    overrides::select_override(comments, head_sha, policy, pr_author, permissions)
}

/// Load verdict artifacts from a directory of `*.json` files
///
/// Malformed or oversized artifacts are recorded and skipped; they count as
/// SKIP at the cerberus level rather than failing the job.
pub fn load_verdict_dir(dir: &Path) -> Result<(Vec<ReviewerVerdict>, Vec<SkippedArtifact>)> {
    if !dir.is_dir() {
        return Err(Error::Aggregate(format!(
            "verdict dir not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(Error::Aggregate("no verdict files found".to_string()));
    }

    let mut verdicts = Vec::new();
    let mut skipped = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let size = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                skipped.push(SkippedArtifact {
                    file: name,
                    reason: format!("unable to stat: {}", e),
                });
                continue;
            }
        };
        if size > MAX_ARTIFACT_SIZE {
            skipped.push(SkippedArtifact {
                file: name,
                reason: format!("artifact size {} exceeds limit {}", size, MAX_ARTIFACT_SIZE),
            });
            continue;
        }

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                skipped.push(SkippedArtifact {
                    file: name,
                    reason: format!("unable to read: {}", e),
                });
                continue;
            }
        };

        match serde_json::from_str::<ReviewerVerdict>(&raw) {
            Ok(verdict) => verdicts.push(verdict),
            Err(e) => {
                warn!(file = %name, error = %e, "Skipping malformed verdict artifact");
                skipped.push(SkippedArtifact {
                    file: name,
                    reason: format!("invalid verdict JSON: {}", e),
                });
            }
        }
    }

    Ok((verdicts, skipped))
}

/// Synthesize SKIP verdicts for expected reviewers with no artifact
pub fn fill_missing_reviewers(
    verdicts: &mut Vec<ReviewerVerdict>,
    expected: &[(String, String)],
) {
    for (reviewer, perspective) in expected {
        if verdicts.iter().any(|v| &v.reviewer == reviewer) {
            continue;
        }
        warn!(reviewer = %reviewer, "Expected reviewer produced no artifact; counting as SKIP");
        let ctx = crate::parser::ParseContext {
            reviewer,
            perspective,
        };
        let mut verdict = crate::parser::parse_review(ctx, "");
        verdict.summary = format!(
            "Review output could not be parsed: no verdict artifact for {}",
            reviewer
        );
        verdicts.push(verdict);
    }
}
