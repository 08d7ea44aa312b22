//! Triage guard: circuit-breaker rules for follow-up fix attempts
//!
//! A FAIL verdict may trigger one automated triage run. The guard is a pure
//! decision function over a PR snapshot; every rule exists to prevent an
//! infinite review→fix→review loop. Only comments authored by the trusted
//! bot login count toward the breaker; PR authors and outsiders can never
//! influence the guard.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pr::PrComment;
use crate::verdict::VerdictKind;

/// Commit-message token marking a triage commit
pub const TRIAGE_COMMIT_TAG: &str = "[triage]";

/// What caused this triage evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageTrigger {
    /// Automatic PR event
    PullRequest,
    /// Manual `/cerberus triage` comment
    Comment,
    /// Scheduled sweep
    Schedule,
}

/// Requested or selected triage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageMode {
    /// Analyze and comment, no writes
    Diagnose,
    /// Attempt an automated fix commit
    Fix,
}

/// The guard's decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum TriageDecision {
    /// Kill switch set
    Disabled,
    /// A circuit-breaker rule tripped
    Skip { reason: String },
    /// Triage runs in the given mode
    Run { mode: TriageMode },
}

/// The latest authoritative verdict comment, if present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictComment {
    pub author: String,
    pub verdict: VerdictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything the guard looks at; assembled by the caller, never fetched
#[derive(Debug, Clone)]
pub struct TriageInput<'a> {
    pub trigger: TriageTrigger,
    /// Global kill switch
    pub enabled: bool,
    pub requested_mode: TriageMode,
    pub verdict_comment: Option<VerdictComment>,
    pub comments: &'a [PrComment],
    pub head_sha: &'a str,
    pub head_commit_message: &'a str,
    pub max_attempts: u32,
    /// Scheduled triggers only act on verdicts at least this old
    pub stale_hours: i64,
    /// Head repository differs from the target (fork PR)
    pub is_fork: bool,
    /// The working tree is a true git checkout
    pub is_git_checkout: bool,
    pub trusted_bot: &'a str,
    pub now: DateTime<Utc>,
}

static TRIAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"cerberus:triage sha=([0-9a-fA-F]{7,40})").expect("triage marker pattern")
});

static VERDICT_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)Cerberus Verdict:\s*(PASS|WARN|FAIL|SKIP)").expect("verdict header pattern")
});

static MODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmode=(\S+)").expect("mode pattern"));

/// Extract the cerberus verdict from a verdict comment body
pub fn extract_verdict(body: &str) -> Option<VerdictKind> {
    VERDICT_HEADER_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| VerdictKind::parse(m.as_str()))
}

/// Count prior triage attempts for the current HEAD
///
/// Only trusted-bot comments carrying a `cerberus:triage sha=<prefix>`
/// marker whose prefix matches HEAD are counted. Comments deleted from the
/// PR are invisible here; the counter sees exactly what the API returned.
pub fn count_attempts(comments: &[PrComment], trusted_bot: &str, head_sha: &str) -> u32 {
    let head_lower = head_sha.to_lowercase();
    comments
        .iter()
        .filter(|c| c.author == trusted_bot)
        .filter(|c| {
            TRIAGE_MARKER_RE
                .captures(&c.body)
                .and_then(|captures| captures.get(1))
                .map_or(false, |m| head_lower.starts_with(&m.as_str().to_lowercase()))
        })
        .count() as u32
}

/// Whether a commit message marks a prior triage commit
pub fn has_triage_commit_tag(message: &str) -> bool {
    message.contains(TRIAGE_COMMIT_TAG)
}

/// Parse `mode=<diagnose|fix>` from a `/cerberus triage` comment
///
/// Invalid modes fall back to the configured default.
pub fn parse_command_mode(body: &str, default: TriageMode) -> TriageMode {
    let Some(captures) = MODE_RE.captures(body) else {
        return default;
    };
    match captures.get(1).map(|m| m.as_str()) {
        Some("fix") => TriageMode::Fix,
        Some("diagnose") => TriageMode::Diagnose,
        _ => default,
    }
}

/// Staleness predicate for scheduled sweeps: triage only stale FAILs with
/// attempt room left
pub fn should_schedule(
    verdict: VerdictKind,
    verdict_updated_at: Option<DateTime<Utc>>,
    attempts: u32,
    max_attempts: u32,
    stale_hours: i64,
    now: DateTime<Utc>,
) -> bool {
    if verdict != VerdictKind::Fail {
        return false;
    }
    if attempts >= max_attempts {
        return false;
    }
    let Some(updated_at) = verdict_updated_at else {
        return false;
    };
    now - updated_at >= Duration::hours(stale_hours)
}

/// Evaluate the circuit breaker and pick a mode
pub fn decide(input: &TriageInput<'_>) -> TriageDecision {
    if !input.enabled {
        return TriageDecision::Disabled;
    }

    // Authoritative verdict comes only from the trusted bot identity.
    let Some(verdict_comment) = input
        .verdict_comment
        .as_ref()
        .filter(|c| c.author == input.trusted_bot)
    else {
        return TriageDecision::Skip {
            reason: "no authoritative verdict comment".to_string(),
        };
    };

    if verdict_comment.verdict != VerdictKind::Fail {
        return TriageDecision::Skip {
            reason: format!("latest verdict is {}", verdict_comment.verdict),
        };
    }

    let attempts = count_attempts(input.comments, input.trusted_bot, input.head_sha);
    if attempts >= input.max_attempts {
        return TriageDecision::Skip {
            reason: format!(
                "attempt limit reached ({}/{})",
                attempts, input.max_attempts
            ),
        };
    }

    if has_triage_commit_tag(input.head_commit_message) {
        return TriageDecision::Skip {
            reason: "HEAD is already a triage commit".to_string(),
        };
    }

    if input.trigger == TriageTrigger::Schedule {
        let stale = should_schedule(
            verdict_comment.verdict,
            verdict_comment.updated_at,
            attempts,
            input.max_attempts,
            input.stale_hours,
            input.now,
        );
        if !stale {
            return TriageDecision::Skip {
                reason: format!("verdict newer than {}h", input.stale_hours),
            };
        }
    }

    // Mode selection: anything that cannot safely push demotes to diagnose.
    let mode = if input.trigger != TriageTrigger::PullRequest {
        TriageMode::Diagnose
    } else if input.is_fork {
        TriageMode::Diagnose
    } else if !input.is_git_checkout {
        TriageMode::Diagnose
    } else {
        input.requested_mode
    };

    debug!(?mode, attempts, "Triage guard allows run");
    TriageDecision::Run { mode }
}

/// Outcome of an attempted fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    /// Fix command succeeded and produced a `[triage]`-tagged commit
    Fixed,
    /// Fix command succeeded with a clean tree
    NoChanges,
    /// Fix command or push failed
    FixFailed,
}

/// Render the triage comment body (idempotent via the per-run marker)
pub fn render_triage_comment(
    head_sha: &str,
    run_id: &str,
    mode: TriageMode,
    outcome: Option<FixOutcome>,
    diagnosis: &str,
) -> String {
    let mut out = crate::render::triage_marker(head_sha, run_id);
    out.push('\n');
    match mode {
        TriageMode::Diagnose => {
            out.push_str("## 🔎 Cerberus Triage — diagnosis\n\n");
        }
        TriageMode::Fix => {
            let status = match outcome {
                Some(FixOutcome::Fixed) => "fix pushed",
                Some(FixOutcome::NoChanges) => "no changes needed",
                Some(FixOutcome::FixFailed) => "fix failed",
                None => "fix attempted",
            };
            out.push_str(&format!("## 🔧 Cerberus Triage — {}\n\n", status));
        }
    }
    out.push_str(diagnosis);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HEAD: &str = "abc1234deadbeef0123456789abcdef012345678";
    const BOT: &str = "cerberus-bot";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 8, 3, 0, 0).unwrap()
    }

    fn bot_verdict(verdict: VerdictKind, updated_at: Option<DateTime<Utc>>) -> VerdictComment {
        VerdictComment {
            author: BOT.to_string(),
            verdict,
            updated_at,
        }
    }

    fn input<'a>(comments: &'a [PrComment]) -> TriageInput<'a> {
        TriageInput {
            trigger: TriageTrigger::PullRequest,
            enabled: true,
            requested_mode: TriageMode::Fix,
            verdict_comment: Some(bot_verdict(VerdictKind::Fail, Some(now()))),
            comments,
            head_sha: HEAD,
            head_commit_message: "fix lint errors",
            max_attempts: 2,
            stale_hours: 24,
            is_fork: false,
            is_git_checkout: true,
            trusted_bot: BOT,
            now: now(),
        }
    }

    #[test]
    fn test_extract_verdict() {
        let body = "<!-- cerberus:verdict -->\n## ❌ Cerberus Verdict: FAIL\nDetails";
        assert_eq!(extract_verdict(body), Some(VerdictKind::Fail));
        assert_eq!(extract_verdict("No verdict here"), None);
    }

    #[test]
    fn test_count_attempts_filters_by_sha_and_author() {
        let comments = vec![
            PrComment::new(BOT, "<!-- cerberus:triage sha=abc1234 run=1 -->"),
            PrComment::new(BOT, "<!-- cerberus:triage sha=abc1234 run=2 -->"),
            PrComment::new(BOT, "<!-- cerberus:triage sha=def5678 run=3 -->"),
            PrComment::new("mallory", "<!-- cerberus:triage sha=abc1234 run=4 -->"),
            PrComment::new(BOT, "plain comment"),
        ];
        assert_eq!(count_attempts(&comments, BOT, HEAD), 2);
        assert_eq!(count_attempts(&comments, BOT, "def5678cafebabe"), 1);
        assert_eq!(count_attempts(&comments, BOT, "0000000aaaa"), 0);
    }

    #[test]
    fn test_has_triage_commit_tag() {
        assert!(has_triage_commit_tag("[triage] fix lint errors"));
        assert!(!has_triage_commit_tag("fix lint errors"));
    }

    #[test]
    fn test_parse_command_mode() {
        assert_eq!(
            parse_command_mode("/cerberus triage", TriageMode::Diagnose),
            TriageMode::Diagnose
        );
        assert_eq!(
            parse_command_mode("/cerberus triage mode=fix", TriageMode::Diagnose),
            TriageMode::Fix
        );
        assert_eq!(
            parse_command_mode("/cerberus triage mode=explode", TriageMode::Diagnose),
            TriageMode::Diagnose
        );
    }

    #[test]
    fn test_kill_switch_disables() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.enabled = false;
        assert_eq!(decide(&input), TriageDecision::Disabled);
    }

    #[test]
    fn test_missing_verdict_comment_skips() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.verdict_comment = None;
        assert!(matches!(decide(&input), TriageDecision::Skip { .. }));
    }

    #[test]
    fn test_untrusted_verdict_comment_ignored() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.verdict_comment = Some(VerdictComment {
            author: "mallory".to_string(),
            verdict: VerdictKind::Fail,
            updated_at: Some(now()),
        });
        assert!(matches!(decide(&input), TriageDecision::Skip { .. }));
    }

    #[test]
    fn test_non_fail_verdict_skips() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.verdict_comment = Some(bot_verdict(VerdictKind::Warn, Some(now())));
        assert!(matches!(decide(&input), TriageDecision::Skip { .. }));
    }

    #[test]
    fn test_attempt_limit_skips() {
        let comments = vec![
            PrComment::new(BOT, "<!-- cerberus:triage sha=abc1234 run=1 -->"),
            PrComment::new(BOT, "<!-- cerberus:triage sha=abc1234 run=2 -->"),
        ];
        let input = input(&comments);
        match decide(&input) {
            TriageDecision::Skip { reason } => assert!(reason.contains("attempt limit")),
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_triage_commit_tag_breaks_loop() {
        // A HEAD that already carries [triage] must never re-trigger.
        let comments = Vec::new();
        let mut input = input(&comments);
        input.head_commit_message = "[triage] auto-fix lint";
        match decide(&input) {
            TriageDecision::Skip { reason } => assert!(reason.contains("triage commit")),
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_pr_event_honors_requested_fix_mode() {
        let comments = Vec::new();
        let input = input(&comments);
        assert_eq!(
            decide(&input),
            TriageDecision::Run {
                mode: TriageMode::Fix
            }
        );
    }

    #[test]
    fn test_manual_trigger_demotes_to_diagnose() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.trigger = TriageTrigger::Comment;
        assert_eq!(
            decide(&input),
            TriageDecision::Run {
                mode: TriageMode::Diagnose
            }
        );
    }

    #[test]
    fn test_fork_demotes_to_diagnose() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.is_fork = true;
        assert_eq!(
            decide(&input),
            TriageDecision::Run {
                mode: TriageMode::Diagnose
            }
        );
    }

    #[test]
    fn test_non_git_checkout_demotes_to_diagnose() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.is_git_checkout = false;
        assert_eq!(
            decide(&input),
            TriageDecision::Run {
                mode: TriageMode::Diagnose
            }
        );
    }

    #[test]
    fn test_scheduled_trigger_requires_staleness() {
        let comments = Vec::new();
        let mut input = input(&comments);
        input.trigger = TriageTrigger::Schedule;

        // Fresh verdict (30 minutes old): skip.
        input.verdict_comment = Some(bot_verdict(
            VerdictKind::Fail,
            Some(Utc.with_ymd_and_hms(2026, 2, 8, 2, 30, 0).unwrap()),
        ));
        assert!(matches!(decide(&input), TriageDecision::Skip { .. }));

        // Stale verdict (27 hours old): run in diagnose mode.
        input.verdict_comment = Some(bot_verdict(
            VerdictKind::Fail,
            Some(Utc.with_ymd_and_hms(2026, 2, 7, 0, 0, 0).unwrap()),
        ));
        assert_eq!(
            decide(&input),
            TriageDecision::Run {
                mode: TriageMode::Diagnose
            }
        );
    }

    #[test]
    fn test_should_schedule_predicate() {
        let stale = Some(Utc.with_ymd_and_hms(2026, 2, 7, 0, 0, 0).unwrap());
        let fresh = Some(Utc.with_ymd_and_hms(2026, 2, 8, 2, 30, 0).unwrap());
        assert!(should_schedule(VerdictKind::Fail, stale, 0, 1, 24, now()));
        assert!(!should_schedule(VerdictKind::Fail, fresh, 0, 1, 24, now()));
        assert!(!should_schedule(VerdictKind::Pass, stale, 0, 1, 24, now()));
        assert!(!should_schedule(VerdictKind::Fail, stale, 1, 1, 24, now()));
        assert!(!should_schedule(VerdictKind::Fail, None, 0, 1, 24, now()));
    }

    #[test]
    fn test_render_triage_comment() {
        let comment = render_triage_comment(
            HEAD,
            "17",
            TriageMode::Fix,
            Some(FixOutcome::NoChanges),
            "Nothing to do.",
        );
        assert!(comment.starts_with("<!-- cerberus:triage sha=abc1234 run=17 -->"));
        assert!(comment.contains("no changes needed"));
        assert!(comment.contains("Nothing to do."));
    }
}
