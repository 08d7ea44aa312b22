//! Override command parsing and authorization
//!
//! Overrides are PR comments matching `/cerberus override sha=<sha>` (or the
//! legacy `/council override` alias) followed by a non-empty `Reason:` line.
//! A candidate is applied only when its SHA matches the current HEAD, its
//! reason is non-empty, and its author satisfies the effective policy: the
//! strictest policy among the failing reviewers.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OverridePolicy;
use crate::pr::PrComment;

/// A parsed, SHA-validated, authorized override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub actor: String,
    pub sha: String,
    pub reason: String,
}

/// Why an override candidate was not applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ShaMismatch,
    MissingReason,
    InsufficientPermission,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectionReason::ShaMismatch => "bad SHA",
            RejectionReason::MissingReason => "missing reason",
            RejectionReason::InsufficientPermission => "insufficient permission",
        };
        write!(f, "{}", text)
    }
}

/// A rejected override, recorded for the verdict comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOverride {
    pub actor: String,
    pub reason: RejectionReason,
}

/// Result of scanning the PR comments for overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideScan {
    /// First authorized override in chronological order, if any
    pub applied: Option<Override>,
    pub rejected: Vec<RejectedOverride>,
}

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*/(?:cerberus|council) override\b.*$").expect("override command pattern")
});

static SHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sha=([0-9a-fA-F]{7,40})\b").expect("sha pattern"));

/// Parse an override command from a comment body
///
/// Returns `(sha, reason)` when the body carries the command with a
/// plausible SHA. The reason comes from a `Reason:` line, or failing that
/// from the remaining non-command lines.
pub fn parse_override_command(body: &str) -> Option<(String, Option<String>)> {
    let command_line = COMMAND_RE.find(body)?;
    let sha = SHA_RE
        .captures(command_line.as_str())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())?;

    let mut reason: Option<String> = None;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.to_lowercase().starts_with("reason:") {
            let text = trimmed[7..].trim();
            if !text.is_empty() {
                reason = Some(text.to_string());
                break;
            }
        }
    }
    if reason.is_none() {
        let remainder: Vec<&str> = body
            .lines()
            .map(str::trim)
            .filter(|l| {
                !l.is_empty()
                    && !l.starts_with("/cerberus override")
                    && !l.starts_with("/council override")
                    && !l.to_lowercase().starts_with("reason:")
            })
            .collect();
        if !remainder.is_empty() {
            reason = Some(remainder.join(" "));
        }
    }

    Some((sha, reason))
}

/// Whether an actor is authorized under a policy
pub fn validate_actor(
    actor: &str,
    policy: OverridePolicy,
    pr_author: Option<&str>,
    permission: Option<&str>,
) -> bool {
    match policy {
        OverridePolicy::PrAuthor => {
            pr_author.map_or(false, |author| actor.eq_ignore_ascii_case(author))
        }
        OverridePolicy::WriteAccess => {
            matches!(permission, Some("write") | Some("maintain") | Some("admin"))
        }
        OverridePolicy::MaintainersOnly => {
            matches!(permission, Some("maintain") | Some("admin"))
        }
    }
}

/// The strictest override policy among failing reviewers
///
/// With no failing reviewer the global policy applies (there is nothing to
/// override anyway).
pub fn effective_policy(
    failing_policies: &[OverridePolicy],
    global_policy: OverridePolicy,
) -> OverridePolicy {
    failing_policies
        .iter()
        .copied()
        .chain(std::iter::once(global_policy))
        .max_by_key(|p| p.strictness())
        .unwrap_or(global_policy)
}

/// Scan PR comments chronologically and pick the first authorized override
///
/// Every rejected candidate is recorded with its reason so the verdict
/// comment can explain what happened.
pub fn select_override(
    comments: &[PrComment],
    head_sha: &str,
    policy: OverridePolicy,
    pr_author: Option<&str>,
    permissions: &HashMap<String, String>,
) -> OverrideScan {
    let mut scan = OverrideScan::default();
    let head_lower = head_sha.to_lowercase();

    for comment in comments {
        let Some((sha, reason)) = parse_override_command(&comment.body) else {
            continue;
        };

        if !head_lower.starts_with(&sha) {
            debug!(actor = %comment.author, sha = %sha, "Override rejected: SHA mismatch");
            scan.rejected.push(RejectedOverride {
                actor: comment.author.clone(),
                reason: RejectionReason::ShaMismatch,
            });
            continue;
        }

        let Some(reason) = reason.filter(|r| !r.trim().is_empty()) else {
            debug!(actor = %comment.author, "Override rejected: missing reason");
            scan.rejected.push(RejectedOverride {
                actor: comment.author.clone(),
                reason: RejectionReason::MissingReason,
            });
            continue;
        };

        let permission = permissions.get(&comment.author).map(String::as_str);
        if !validate_actor(&comment.author, policy, pr_author, permission) {
            info!(
                actor = %comment.author,
                ?policy,
                "Override rejected by policy"
            );
            scan.rejected.push(RejectedOverride {
                actor: comment.author.clone(),
                reason: RejectionReason::InsufficientPermission,
            });
            continue;
        }

        info!(actor = %comment.author, sha = %sha, "Override authorized");
        scan.applied = Some(Override {
            actor: comment.author.clone(),
            sha,
            reason,
        });
        break;
    }

    scan
}
