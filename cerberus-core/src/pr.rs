//! Pull-request state snapshot types
//!
//! The aggregator and triage guard depend on these plain values rather than
//! on a network client; the GitHub layer fills them in, tests construct them
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One issue comment on a PR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrComment {
    /// Login of the comment author
    pub author: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PrComment {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// PR metadata substituted into review prompts
///
/// Every field here is attacker-controlled and must be escaped before it
/// reaches a prompt (see `runner::prompt`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestContext {
    pub title: String,
    pub author: String,
    pub head_branch: String,
    pub base_branch: String,
    pub body: String,
}
