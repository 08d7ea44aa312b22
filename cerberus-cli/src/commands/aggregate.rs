//! Aggregate command - combine reviewer verdicts into the cerberus verdict

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use cerberus_core::aggregate::{self, overrides::OverrideScan, WaveMeta};
use cerberus_core::render::{self, RepoContext};
use cerberus_core::{PrComment, VerdictKind};
use cerberus_github::GitHubClient;
use clap::Args;
use tracing::info;

/// Arguments for the aggregate command
#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Path to the Cerberus config document
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory of per-reviewer verdict JSON artifacts
    #[arg(long)]
    pub verdict_dir: PathBuf,

    /// HEAD commit SHA overrides are validated against
    #[arg(long)]
    pub head_sha: String,

    /// PR author login (for pr_author override policy)
    #[arg(long)]
    pub pr_author: Option<String>,

    /// Comma-separated reviewers expected to have produced artifacts
    #[arg(long, default_value = "")]
    pub expected: String,

    /// JSON file with the PR comment list (offline mode)
    #[arg(long)]
    pub comments_file: Option<PathBuf>,

    /// `owner/repo` to fetch comments and post the verdict comment
    #[arg(long)]
    pub repo: Option<String>,

    /// PR number (required with --repo)
    #[arg(long)]
    pub pr: Option<u64>,

    /// Wave this aggregation belongs to (attaches wave metadata)
    #[arg(long)]
    pub wave: Option<String>,

    /// Model tier for wave-depth evaluation
    #[arg(long)]
    pub tier: Option<String>,

    /// Where to write the cerberus verdict JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Post (upsert) the verdict comment on the PR
    #[arg(long)]
    pub comment: bool,

    /// Also post an inline PR review anchored to diff positions
    #[arg(long)]
    pub review: bool,

    /// Exit 1 when the cerberus verdict is SKIP
    #[arg(long)]
    pub fail_on_skip: bool,

    /// Always exit 0 regardless of verdict
    #[arg(long)]
    pub no_fail_on_verdict: bool,
}

impl AggregateArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let config = cerberus_core::Config::load_from_file(&self.config)?;

        let (mut verdicts, skipped) = aggregate::load_verdict_dir(&self.verdict_dir)?;

        let expected: Vec<(String, String)> = self
            .expected
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| {
                config
                    .reviewer_for_codename(name)
                    .map(|r| (r.codename.clone(), r.perspective.clone()))
            })
            .collect();
        aggregate::fill_missing_reviewers(&mut verdicts, &expected);

        let client = match &self.repo {
            Some(slug) => Some(GitHubClient::from_slug(slug)?),
            None => None,
        };

        let comments = self.load_comments(client.as_ref()).await?;

        // Permission lookups only for actors that actually posted an
        // override command.
        let actors: Vec<String> = comments
            .iter()
            .filter(|c| {
                aggregate::overrides::parse_override_command(&c.body).is_some()
            })
            .map(|c| c.author.clone())
            .collect();
        let permissions: HashMap<String, String> = match &client {
            Some(client) if !actors.is_empty() => {
                client.collaborator_permissions(&actors).await
            }
            _ => HashMap::new(),
        };

        let scan: OverrideScan = aggregate::scan_overrides(
            &config,
            &verdicts,
            &comments,
            &self.head_sha,
            self.pr_author.as_deref(),
            &permissions,
        );

        let wave_meta = match &self.wave {
            Some(wave) => {
                let tier = self
                    .tier
                    .as_deref()
                    .unwrap_or("standard")
                    .parse::<cerberus_core::ModelTier>()?;
                let decision = cerberus_core::wave::evaluate_gate(
                    &config,
                    &verdicts,
                    skipped.len(),
                    wave,
                    tier,
                )?;
                Some(WaveMeta {
                    wave: wave.clone(),
                    escalate: decision.escalate,
                    next_wave: decision.next_wave,
                })
            }
            None => None,
        };

        let mut cerberus = aggregate::aggregate(verdicts, &config, scan, wave_meta);
        cerberus.skipped_artifacts = skipped;

        info!(verdict = %cerberus.verdict, "Aggregation complete");
        println!("Cerberus Verdict: {}", cerberus.verdict);
        println!();
        println!("Reviewers:");
        for outcome in &cerberus.reviewers {
            println!(
                "- {} ({}): {}",
                outcome.verdict.reviewer, outcome.verdict.perspective, outcome.verdict.verdict
            );
        }

        if let Some(path) = &self.output {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            // Atomic write so a concurrent reader never sees a torn file.
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, serde_json::to_string_pretty(&cerberus)?)?;
            std::fs::rename(&tmp, path)?;
        }

        if self.comment {
            let client = client
                .as_ref()
                .context("--comment requires --repo and --pr")?;
            let pr = self.pr.context("--comment requires --pr")?;
            let repo_context = RepoContext {
                server: std::env::var("GITHUB_SERVER_URL")
                    .unwrap_or_else(|_| "https://github.com".to_string()),
                repo: self.repo.clone().unwrap_or_default(),
                sha: self.head_sha.clone(),
            };
            let body = render::render_verdict_comment(&cerberus, &repo_context);
            client
                .upsert_comment(pr, render::VERDICT_MARKER, &body)
                .await?;
        }

        if self.review {
            let client = client
                .as_ref()
                .context("--review requires --repo and --pr")?;
            let pr = self.pr.context("--review requires --pr")?;
            let posted = client.post_findings_review(pr, &cerberus).await?;
            info!(posted, "Inline findings review");
        }

        if self.no_fail_on_verdict {
            return Ok(0);
        }
        Ok(match cerberus.verdict {
            VerdictKind::Pass | VerdictKind::Warn => 0,
            VerdictKind::Fail => 1,
            VerdictKind::Skip => {
                if self.fail_on_skip {
                    1
                } else {
                    0
                }
            }
        })
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
}
