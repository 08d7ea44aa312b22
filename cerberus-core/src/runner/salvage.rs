//! Output salvage: pick the best artifact a run left behind
//!
//! The runner prefers, in order, the first file containing a fenced `json`
//! block (scratchpad, then stdout), then any non-empty partial output. When
//! nothing is salvageable after a timeout, a synthetic marker file records
//! what happened so the parser can produce a precise SKIP.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::runner::classify::{classify_api_error_title, redact_secrets};
use crate::Result;

static JSON_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*\{.*?\}\s*```").expect("json block pattern")
});

/// Whether text contains a fenced ```json block with an object inside
pub fn has_json_block(text: &str) -> bool {
    JSON_BLOCK_RE.is_match(text)
}

/// What kind of artifact the runner selected for parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Contains a fenced JSON block
    JsonBlock,
    /// Non-empty output without a JSON block
    Partial,
    /// Output of the stripped-down fast-path re-invocation
    FastPath,
    /// Synthetic marker describing a timeout with nothing to salvage
    TimeoutMarker,
    /// Synthetic marker describing a permanent API error
    ApiErrorMarker,
}

/// The runner's hand-off to the parser: which file to parse plus the model
/// metadata to attach. One-way data flow: the parser reads exactly
/// this and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Path of the selected artifact
    pub parse_input: PathBuf,
    pub kind: ArtifactKind,
    /// Model that produced the artifact
    pub model_used: String,
    /// First model attempted
    pub primary_model: String,
    pub fallback_used: bool,
    pub runtime_seconds: u64,
}

impl ArtifactDescriptor {
    /// Persist the descriptor next to the artifact for the parse step
    pub fn write_beside(&self, artifact_dir: &Path, perspective: &str) -> Result<PathBuf> {
        let path = artifact_dir.join(format!("{}-artifact.json", perspective));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Load a descriptor persisted by `write_beside`
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Compose the timeout marker written when nothing was salvageable
pub fn timeout_marker_text(
    reviewer_name: &str,
    perspective: &str,
    timeout_seconds: u64,
    diff_files: &[String],
    fast_path_attempted: bool,
) -> String {
    let files = if diff_files.is_empty() {
        "(none)".to_string()
    } else {
        diff_files.join("\n")
    };
    format!(
        "Review Timeout: timeout after {timeout_seconds}s\n\
         {reviewer_name} ({perspective}) exceeded the configured timeout.\n\
         Fast-path: {}\n\
         Files in diff:\n{files}\n\
         Next steps: Increase timeout, reduce diff size, or check model provider status.\n",
        if fast_path_attempted { "yes" } else { "no" }
    )
}

/// Compose the API-error marker written on permanent auth/quota failures
///
/// Secrets in the surfaced provider output are masked before anything
/// reaches disk.
pub fn api_error_marker_text(stdout: &str, stderr: &str, models_tried: &[String]) -> String {
    let combined = format!("{}\n{}", stdout, stderr);
    let sanitized = redact_secrets(&combined);
    let title = classify_api_error_title(&sanitized);
    format!(
        "API Error: {}\n\n\
         The API provider returned an error that prevents the review from completing:\n\n\
         {}\n\n\
         Models tried: {}\n\
         Please check your API key and quota settings.\n",
        title.as_str(),
        sanitized.trim(),
        models_tried.join(" ")
    )
}
