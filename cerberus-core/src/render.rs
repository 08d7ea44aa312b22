//! Markdown rendering for PR comments
//!
//! A pure function from the structured `CerberusVerdict` to the verdict
//! comment body. Decision logic lives in the aggregator; this module only
//! formats. GitHub silently rejects comments above 65,536 bytes, so the
//! body is capped at 60,000 with headroom for the structural markdown.

use crate::aggregate::{CerberusVerdict, ReviewerOutcome};
use crate::verdict::{Finding, Severity, SkipKind, VerdictKind};

/// Byte budget for a rendered comment
pub const MAX_COMMENT_SIZE: usize = 60_000;

/// Marker identifying the cerberus verdict comment
pub const VERDICT_MARKER: &str = "<!-- cerberus:verdict -->";

/// Marker identifying one reviewer's comment
pub fn reviewer_marker(perspective: &str) -> String {
    format!("<!-- cerberus:{} -->", perspective)
}

/// Marker identifying a triage comment for one HEAD and run
pub fn triage_marker(head_sha: &str, run_id: &str) -> String {
    let prefix: String = head_sha.chars().take(7).collect();
    format!("<!-- cerberus:triage sha={} run={} -->", prefix, run_id)
}

/// Icon for a verdict header
pub fn verdict_icon(verdict: VerdictKind) -> &'static str {
    match verdict {
        VerdictKind::Pass => "✅",
        VerdictKind::Warn => "⚠️",
        VerdictKind::Fail => "❌",
        VerdictKind::Skip => "⏭️",
    }
}

/// Icon for a finding severity
pub fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::Major => "🟠",
        Severity::Minor => "🟡",
        Severity::Info => "🔵",
    }
}

/// Repository context for blob links in finding anchors
#[derive(Debug, Clone, Default)]
pub struct RepoContext {
    /// e.g. `https://github.com`
    pub server: String,
    /// `owner/repo`
    pub repo: String,
    /// HEAD commit the links pin to
    pub sha: String,
}

impl RepoContext {
    fn blob_url(&self, path: &str, line: u64) -> Option<String> {
        if self.server.is_empty() || self.repo.is_empty() || self.sha.is_empty() || path.is_empty()
        {
            return None;
        }
        let mut url = format!(
            "{}/{}/blob/{}/{}",
            self.server.trim_end_matches('/'),
            self.repo,
            self.sha,
            path
        );
        if line > 0 {
            url.push_str(&format!("#L{}", line));
        }
        Some(url)
    }
}

fn location(finding: &Finding, repo: &RepoContext) -> String {
    let path = finding.file.trim();
    if path.is_empty() || path == "N/A" {
        return String::new();
    }
    let label = if finding.line > 0 {
        format!("{}:{}", path, finding.line)
    } else {
        path.to_string()
    };
    match repo.blob_url(path, finding.line) {
        Some(url) => format!(" — [`{}`]({})", label, url),
        None => format!(" — `{}`", label),
    }
}

fn render_finding(finding: &Finding, repo: &RepoContext) -> String {
    let mut out = format!(
        "- {} **{}** `{}`{}\n",
        severity_icon(finding.severity),
        finding.title,
        finding.category,
        location(finding, repo),
    );
    if !finding.description.is_empty() {
        out.push_str(&format!("  {}\n", finding.description));
    }
    if let Some(evidence) = &finding.evidence {
        out.push_str("  ```\n");
        for line in evidence.lines() {
            out.push_str(&format!("  {}\n", line));
        }
        out.push_str("  ```\n");
    }
    if !finding.suggestion.is_empty() {
        out.push_str(&format!("  _Suggestion:_ {}\n", finding.suggestion));
    }
    out
}

fn skip_banner(outcome: &ReviewerOutcome) -> Option<String> {
    let kind = outcome.verdict.skip_kind()?;
    let finding = outcome.verdict.findings.first();
    let detail = finding.map(|f| f.title.as_str()).unwrap_or("");
    let banner = match kind {
        SkipKind::Timeout => format!("> ⏱️ **Skipped — timeout.** {}", detail),
        SkipKind::ApiError => format!("> 🚫 **Skipped — API error.** {}", detail),
        SkipKind::ParseFailure => {
            format!("> 🧩 **Skipped — output not parseable.** {}", detail)
        }
    };
    Some(banner)
}

fn render_reviewer(outcome: &ReviewerOutcome, repo: &RepoContext) -> String {
    let verdict = &outcome.verdict;
    let mut header = format!(
        "{} **{}** ({}): {}",
        verdict_icon(verdict.verdict),
        verdict.reviewer,
        verdict.perspective,
        verdict.verdict
    );
    if outcome.overridden {
        header.push_str(" _(overridden — non-blocking)_");
    }
    if outcome.critical_reviewer {
        header.push_str(" _(critical reviewer)_");
    }

    let mut body = String::new();
    if let Some(banner) = skip_banner(outcome) {
        body.push_str(&banner);
        body.push('\n');
    }
    if !verdict.summary.is_empty() {
        body.push_str(&format!("{}\n", verdict.summary));
    }
    if verdict.verdict != VerdictKind::Skip && !verdict.findings.is_empty() {
        body.push('\n');
        let mut findings: Vec<&Finding> = verdict.findings.iter().collect();
        findings.sort_by_key(|f| f.severity.rank());
        for finding in findings {
            body.push_str(&render_finding(finding, repo));
        }
    }

    let mut meta = Vec::new();
    if let Some(model) = &verdict.model_used {
        if verdict.fallback_used == Some(true) {
            let primary = verdict.primary_model.as_deref().unwrap_or("unknown");
            meta.push(format!("model: `{}` (fallback; primary `{}`)", model, primary));
        } else {
            meta.push(format!("model: `{}`", model));
        }
    }
    if let Some(runtime) = verdict.runtime_seconds {
        meta.push(format!("runtime: {}s", runtime));
    }
    if !meta.is_empty() {
        body.push_str(&format!("\n_{}_\n", meta.join(" · ")));
    }

    format!(
        "<details>\n<summary>{}</summary>\n\n{}\n</details>\n",
        header, body
    )
}

/// Render the cerberus verdict comment
pub fn render_verdict_comment(cerberus: &CerberusVerdict, repo: &RepoContext) -> String {
    let mut out = String::new();
    out.push_str(VERDICT_MARKER);
    out.push('\n');
    out.push_str(&format!(
        "## {} Cerberus Verdict: {}\n\n",
        verdict_icon(cerberus.verdict),
        cerberus.verdict
    ));
    out.push_str(&format!("{}\n\n", cerberus.summary));

    if let Some(applied) = &cerberus.override_applied {
        out.push_str(&format!(
            "> 🔓 **Override applied** by @{} for `{}`: {}\n\n",
            applied.actor, applied.sha, applied.reason
        ));
    }
    for rejected in &cerberus.rejected_overrides {
        out.push_str(&format!(
            "> 🔒 Override from @{} rejected ({}).\n",
            rejected.actor, rejected.reason
        ));
    }
    if !cerberus.rejected_overrides.is_empty() {
        out.push('\n');
    }

    if let Some(wave) = &cerberus.wave {
        let gate = if wave.escalate {
            match &wave.next_wave {
                Some(next) => format!("next wave `{}` will run", next),
                None => "escalating".to_string(),
            }
        } else {
            "next wave gated".to_string()
        };
        out.push_str(&format!("_Wave `{}` — {}._\n\n", wave.wave, gate));
    }

    for outcome in &cerberus.reviewers {
        out.push_str(&render_reviewer(outcome, repo));
    }

    for skipped in &cerberus.skipped_artifacts {
        out.push_str(&format!(
            "\n> ⚠️ Artifact `{}` was skipped: {}\n",
            skipped.file, skipped.reason
        ));
    }

    truncate_comment(out)
}

/// Render one reviewer's standalone comment
pub fn render_reviewer_comment(outcome: &ReviewerOutcome, repo: &RepoContext) -> String {
    let mut out = format!("{}\n", reviewer_marker(&outcome.verdict.perspective));
    out.push_str(&render_reviewer(outcome, repo));
    truncate_comment(out)
}

fn truncate_comment(mut out: String) -> String {
    if out.len() <= MAX_COMMENT_SIZE {
        return out;
    }
    let notice = "\n\n_…truncated; see workflow artifacts for the full review._\n";
    let mut end = MAX_COMMENT_SIZE - notice.len();
    while !out.is_char_boundary(end) {
        end -= 1;
    }
    out.truncate(end);
    out.push_str(notice);
    out
}
