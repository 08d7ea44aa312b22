//! Inline PR reviews anchored to diff positions
//!
//! High-signal findings become one PR review with inline comments, capped
//! at 30. Findings that cannot be anchored (file not in the diff, line not
//! present in the patch) are dropped from the inline surface; they are
//! still in the verdict comment.

use cerberus_core::diff::newline_to_position;
use cerberus_core::render::severity_icon;
use cerberus_core::{CerberusVerdict, Finding, Severity, VerdictKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

/// Maximum inline comments per review
pub const MAX_INLINE_COMMENTS: usize = 30;

/// One inline comment resolved to a diff position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineComment {
    pub path: String,
    pub position: u64,
    pub body: String,
}

fn finding_body(reviewer: &str, finding: &Finding) -> String {
    let mut body = format!(
        "{} **{}** ({} · `{}`)\n\n{}",
        severity_icon(finding.severity),
        finding.title,
        reviewer,
        finding.category,
        finding.description
    );
    if !finding.suggestion.is_empty() {
        body.push_str(&format!("\n\n_Suggestion:_ {}", finding.suggestion));
    }
    body
}

/// Resolve findings to inline comments against the PR's file patches
///
/// `patches` maps file path to the `patch` text from `pulls/{pr}/files`.
/// Findings are taken most-severe first until the cap.
pub fn resolve_inline_comments(
    cerberus: &CerberusVerdict,
    patches: &std::collections::HashMap<String, String>,
) -> Vec<InlineComment> {
    let mut candidates: Vec<(&str, &Finding)> = cerberus
        .reviewers
        .iter()
        .filter(|outcome| outcome.verdict.verdict != VerdictKind::Skip)
        .flat_map(|outcome| {
            outcome
                .verdict
                .findings
                .iter()
                .map(move |f| (outcome.verdict.reviewer.as_str(), f))
        })
        .filter(|(_, f)| f.severity != Severity::Info && f.line > 0 && !f.file.is_empty())
        .collect();
    candidates.sort_by_key(|(_, f)| f.severity.rank());

    let mut comments = Vec::new();
    let mut position_cache: std::collections::HashMap<&str, std::collections::HashMap<u64, u64>> =
        std::collections::HashMap::new();

    for (reviewer, finding) in candidates {
        if comments.len() >= MAX_INLINE_COMMENTS {
            break;
        }
        let Some(patch) = patches.get(&finding.file) else {
            debug!(file = %finding.file, "Finding file not in diff; no inline anchor");
            continue;
        };
        let positions = position_cache
            .entry(finding.file.as_str())
            .or_insert_with(|| newline_to_position(patch));
        let Some(position) = positions.get(&finding.line) else {
            debug!(
                file = %finding.file,
                line = finding.line,
                "Finding line not in patch; no inline anchor"
            );
            continue;
        };
        comments.push(InlineComment {
            path: finding.file.clone(),
            position: *position,
            body: finding_body(reviewer, finding),
        });
    }

    comments
}

impl GitHubClient {
    /// Patches for all files changed in the PR, keyed by path
    pub async fn pr_file_patches(
        &self,
        number: u64,
    ) -> Result<std::collections::HashMap<String, String>> {
        let mut patches = std::collections::HashMap::new();
        let mut page = self
            .client()
            .pulls(self.owner(), self.repo())
            .list_files(number)
            .await
            .map_err(Error::Api)?;

        loop {
            for file in page.take_items() {
                if let Some(patch) = file.patch {
                    patches.insert(file.filename, patch);
                }
            }
            match self
                .client()
                .get_page::<octocrab::models::pulls::FileDiff>(&page.next)
                .await
                .map_err(Error::Api)?
            {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(patches)
    }

    /// Post one COMMENT review carrying the resolved inline comments
    ///
    /// A review with zero anchorable comments is not posted.
    pub async fn post_findings_review(
        &self,
        number: u64,
        cerberus: &CerberusVerdict,
    ) -> Result<usize> {
        let patches = self.pr_file_patches(number).await?;
        let comments = resolve_inline_comments(cerberus, &patches);
        if comments.is_empty() {
            debug!(number, "No anchorable findings; skipping inline review");
            return Ok(0);
        }

        let body = json!({
            "event": "COMMENT",
            "body": format!("Cerberus inline findings ({}).", comments.len()),
            "comments": comments.iter().map(|c| json!({
                "path": c.path,
                "position": c.position,
                "body": c.body,
            })).collect::<Vec<_>>(),
        });

        let route = format!(
            "/repos/{}/{}/pulls/{}/reviews",
            self.owner(),
            self.repo(),
            number
        );
        let _: serde_json::Value = self
            .client()
            .post(route, Some(&body))
            .await
            .map_err(Error::Api)?;

        info!(number, count = comments.len(), "Posted inline findings review");
        Ok(comments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cerberus_core::aggregate::{AggregateStats, ReviewerOutcome};
    use cerberus_core::{ReviewerVerdict, VerdictStats};

    fn finding(severity: Severity, file: &str, line: u64, title: &str) -> Finding {
        Finding {
            severity,
            category: "logic".to_string(),
            file: file.to_string(),
            line,
            title: title.to_string(),
            description: "description".to_string(),
            suggestion: "suggestion".to_string(),
            evidence: Some("code".to_string()),
            scope: None,
            suggestion_verified: None,
        }
    }

    fn cerberus_with(findings: Vec<Finding>) -> CerberusVerdict {
        let mut stats = VerdictStats::default();
        stats.recount(&findings);
        CerberusVerdict {
            verdict: VerdictKind::Warn,
            summary: String::new(),
            reviewers: vec![ReviewerOutcome {
                verdict: ReviewerVerdict {
                    reviewer: "trace".to_string(),
                    perspective: "correctness".to_string(),
                    verdict: VerdictKind::Warn,
                    confidence: 0.9,
                    summary: String::new(),
                    findings,
                    stats,
                    runtime_seconds: None,
                    model_used: None,
                    primary_model: None,
                    fallback_used: None,
                    raw_review: None,
                },
                critical_reviewer: false,
                overridden: false,
            }],
            override_applied: None,
            rejected_overrides: Vec::new(),
            wave: None,
            stats: AggregateStats::default(),
            skipped_artifacts: Vec::new(),
        }
    }

    fn patches(file: &str) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        map.insert(
            file.to_string(),
            "@@ -1,2 +1,3 @@\n context\n+added line two\n+added line three".to_string(),
        );
        map
    }

    #[test]
    fn test_resolves_anchorable_finding() {
        let cerberus = cerberus_with(vec![finding(Severity::Major, "src/lib.rs", 2, "Bug")]);
        let comments = resolve_inline_comments(&cerberus, &patches("src/lib.rs"));
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].path, "src/lib.rs");
        assert_eq!(comments[0].position, 2);
        assert!(comments[0].body.contains("**Bug**"));
        assert!(comments[0].body.contains("trace"));
    }

    #[test]
    fn test_unanchorable_findings_dropped() {
        let cerberus = cerberus_with(vec![
            finding(Severity::Major, "src/other.rs", 2, "Wrong file"),
            finding(Severity::Major, "src/lib.rs", 99, "Line outside patch"),
        ]);
        let comments = resolve_inline_comments(&cerberus, &patches("src/lib.rs"));
        assert!(comments.is_empty());
    }

    #[test]
    fn test_info_findings_not_inlined() {
        let cerberus = cerberus_with(vec![finding(Severity::Info, "src/lib.rs", 2, "Nit")]);
        let comments = resolve_inline_comments(&cerberus, &patches("src/lib.rs"));
        assert!(comments.is_empty());
    }

    #[test]
    fn test_cap_at_thirty_most_severe_first() {
        let mut findings = Vec::new();
        for i in 0..40 {
            findings.push(finding(Severity::Minor, "src/lib.rs", 2, &format!("minor {}", i)));
        }
        findings.push(finding(Severity::Critical, "src/lib.rs", 3, "the big one"));
        let cerberus = cerberus_with(findings);
        let comments = resolve_inline_comments(&cerberus, &patches("src/lib.rs"));
        assert_eq!(comments.len(), MAX_INLINE_COMMENTS);
        assert!(comments[0].body.contains("the big one"));
    }
}
