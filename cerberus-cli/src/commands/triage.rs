//! Triage command - circuit-breaker evaluation and the optional fix attempt

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use cerberus_core::render::VERDICT_MARKER;
use cerberus_core::triage::{
    self, FixOutcome, TriageDecision, TriageInput, TriageMode, TriageTrigger, VerdictComment,
};
use cerberus_core::{Config, PrComment};
use cerberus_github::GitHubClient;
use clap::Args;
use tokio::process::Command;
use tracing::{info, warn};

/// Arguments for the triage command
#[derive(Args, Debug)]
pub struct TriageArgs {
    /// Path to the Cerberus config document
    #[arg(short, long)]
    pub config: PathBuf,

    /// What fired this evaluation (pull_request/comment/schedule)
    #[arg(long, default_value = "pull_request")]
    pub trigger: String,

    /// Requested mode (diagnose/fix); comment triggers may carry `mode=`
    #[arg(long, default_value = "diagnose")]
    pub mode: String,

    /// Global kill switch (set to false to disable triage entirely)
    #[arg(long, default_value_t = true)]
    pub enabled: bool,

    /// HEAD commit SHA
    #[arg(long)]
    pub head_sha: String,

    /// HEAD commit message (checked for the [triage] tag)
    #[arg(long, default_value = "")]
    pub head_commit_message: String,

    /// Maximum triage attempts per HEAD
    #[arg(long, default_value_t = 2)]
    pub max_attempts: u32,

    /// Scheduled triggers only act on verdicts at least this old (hours)
    #[arg(long, default_value_t = 24)]
    pub stale_hours: i64,

    /// The head repository is a fork of the target
    #[arg(long)]
    pub is_fork: bool,

    /// Working tree for the fix attempt
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// `owner/repo` for live comment access
    #[arg(long)]
    pub repo: Option<String>,

    /// PR number
    #[arg(long)]
    pub pr: Option<u64>,

    /// JSON file with the PR comment list (offline mode)
    #[arg(long)]
    pub comments_file: Option<PathBuf>,

    /// The triggering comment body (comment triggers; parsed for `mode=`)
    #[arg(long)]
    pub command_body: Option<String>,

    /// Shell command attempted in fix mode
    #[arg(long)]
    pub fix_command: Option<String>,

    /// Run identifier used in the triage comment marker
    #[arg(long, default_value = "0")]
    pub run_id: String,

    /// Post the triage comment to the PR
    #[arg(long)]
    pub comment: bool,
}

impl TriageArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let config = Config::load_from_file(&self.config)?;
        let trusted_bot = config.overrides.trusted_bot_login.clone();

        let trigger = match self.trigger.as_str() {
            "pull_request" => TriageTrigger::PullRequest,
            "comment" | "issue_comment" => TriageTrigger::Comment,
            "schedule" => TriageTrigger::Schedule,
            other => anyhow::bail!("unknown trigger '{}'", other),
        };

        let default_mode = match self.mode.as_str() {
            "fix" => TriageMode::Fix,
            _ => TriageMode::Diagnose,
        };
        let requested_mode = match &self.command_body {
            Some(body) => triage::parse_command_mode(body, default_mode),
            None => default_mode,
        };

        let client = match &self.repo {
            Some(slug) => Some(GitHubClient::from_slug(slug)?),
            None => None,
        };
        let comments = self.load_comments(client.as_ref()).await?;

        let verdict_comment = comments
            .iter()
            .rev()
            .find(|c| c.body.contains(VERDICT_MARKER))
            .and_then(|c| {
                triage::extract_verdict(&c.body).map(|verdict| VerdictComment {
                    author: c.author.clone(),
                    verdict,
                    updated_at: c.updated_at.or(c.created_at),
                })
            });

        let is_git_checkout = self.workdir.join(".git").exists();

        let input = TriageInput {
            trigger,
            enabled: self.enabled,
            requested_mode,
            verdict_comment,
            comments: &comments,
            head_sha: &self.head_sha,
            head_commit_message: &self.head_commit_message,
            max_attempts: self.max_attempts,
            stale_hours: self.stale_hours,
            is_fork: self.is_fork,
            is_git_checkout,
            trusted_bot: &trusted_bot,
            now: chrono::Utc::now(),
        };

        let decision = triage::decide(&input);
        println!("{}", serde_json::to_string_pretty(&decision)?);

        let TriageDecision::Run { mode } = &decision else {
            return Ok(0);
        };

        let (outcome, diagnosis) = match (mode, &self.fix_command) {
            (TriageMode::Fix, Some(command)) => {
                let outcome = self.attempt_fix(command).await;
                let diagnosis = match outcome {
                    FixOutcome::Fixed => {
                        "Automated fix committed with the [triage] tag.".to_string()
                    }
                    FixOutcome::NoChanges => {
                        "Fix command succeeded but produced no tracked changes.".to_string()
                    }
                    FixOutcome::FixFailed => {
                        "Fix command or push failed; see the workflow logs.".to_string()
                    }
                };
                (Some(outcome), diagnosis)
            }
            _ => (
                None,
                "Diagnosis run: the latest cerberus verdict on HEAD is FAIL. \
                 See the verdict comment for per-reviewer findings."
                    .to_string(),
            ),
        };

        if self.comment {
            let client = client
                .as_ref()
                .context("--comment requires --repo and --pr")?;
            let pr = self.pr.context("--comment requires --pr")?;
            let marker = cerberus_core::render::triage_marker(&self.head_sha, &self.run_id);
            let body =
                triage::render_triage_comment(&self.head_sha, &self.run_id, *mode, outcome, &diagnosis);
            client.upsert_comment(pr, &marker, &body).await?;
        }

        Ok(0)
    }

    async fn load_comments(&self, client: Option<&GitHubClient>) -> anyhow::Result<Vec<PrComment>> {
        if let Some(path) = &self.comments_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("unable to read {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("invalid comments JSON in {}", path.display()));
        }
        if let (Some(client), Some(pr)) = (client, self.pr) {
            return Ok(client.list_pr_comments(pr).await?);
        }
        Ok(Vec::new())
    }

    /// Run the fix command, then commit and push any tracked changes
    async fn attempt_fix(&self, command: &str) -> FixOutcome {
        info!(command, workdir = %self.workdir.display(), "Attempting triage fix");

        if !self.run_in_workdir("sh", &["-c", command]).await {
            warn!("Fix command failed");
            return FixOutcome::FixFailed;
        }

        let status = match Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&self.workdir)
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            _ => {
                warn!("git status failed after fix command");
                return FixOutcome::FixFailed;
            }
        };

        if status.trim().is_empty() {
            return FixOutcome::NoChanges;
        }

        let message = format!("{} automated fix (run {})", triage::TRIAGE_COMMIT_TAG, self.run_id);
        let committed = self.run_in_workdir("git", &["add", "-A"]).await
            && self
                .run_in_workdir("git", &["commit", "-m", &message])
                .await
            && self.run_in_workdir("git", &["push"]).await;

        if committed {
            FixOutcome::Fixed
        } else {
            warn!("Commit or push failed after fix command");
            FixOutcome::FixFailed
        }
    }

    async fn run_in_workdir(&self, program: &str, args: &[&str]) -> bool {
        Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
