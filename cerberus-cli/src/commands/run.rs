//! Run command - execute one reviewer perspective against a diff

use std::path::PathBuf;

use anyhow::{bail, Context};
use cerberus_core::runner::prompt;
use cerberus_core::runner::staging::StagedConfig;
use cerberus_core::{
    CliBackend, Config, ModelTier, PullRequestContext, RandomPoolSelector, ReviewRun,
    ReviewRunner, RunnerOptions,
};
use clap::Args;
use tracing::info;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the Cerberus config document
    #[arg(short, long)]
    pub config: PathBuf,

    /// Perspective to run (must exist in the roster)
    #[arg(short, long)]
    pub perspective: String,

    /// Path to the PR diff file
    #[arg(long)]
    pub diff_file: PathBuf,

    /// Directory holding the prompt templates and agent definitions
    #[arg(long)]
    pub root: PathBuf,

    /// Directory receiving the run artifacts
    #[arg(long)]
    pub artifact_dir: PathBuf,

    /// Action-level model override (bypasses per-reviewer resolution)
    #[arg(long)]
    pub model: Option<String>,

    /// Model tier hint from the complexity router
    #[arg(long)]
    pub tier: Option<String>,

    /// Wave the task belongs to (selects the wave model pool)
    #[arg(long)]
    pub wave: Option<String>,

    /// Total wall-clock budget in seconds
    #[arg(long, default_value_t = cerberus_core::runner::DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Comma-separated fallback model chain
    #[arg(long, default_value = "")]
    pub fallback_models: String,

    /// Path to the review CLI executable
    #[arg(long, default_value = "pi")]
    pub cli_path: String,

    /// PR metadata JSON file ({title, author, head_branch, base_branch, body})
    #[arg(long)]
    pub pr_context: Option<PathBuf>,

    /// Consumer checkout to stage the trusted agent definition into
    /// (restored byte-for-byte when the run ends)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

impl RunArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let config = Config::load_from_file(&self.config)?;
        let reviewer = config.reviewer_for_perspective(&self.perspective)?.clone();

        let tier = self
            .tier
            .as_deref()
            .map(str::parse::<ModelTier>)
            .transpose()?;
        let mut selector = RandomPoolSelector;
        let primary_model = config.resolve_model(
            &reviewer,
            self.model.as_deref(),
            tier,
            self.wave.as_deref(),
            &mut selector,
        );

        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let Some(api_key) = api_key else {
            bail!("missing OPENROUTER_API_KEY");
        };

        let diff = std::fs::read_to_string(&self.diff_file)
            .with_context(|| format!("unable to read diff {}", self.diff_file.display()))?;

        let pr_context = match &self.pr_context {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("unable to read {}", path.display()))?;
                serde_json::from_str::<PullRequestContext>(&raw)
                    .with_context(|| format!("invalid PR context in {}", path.display()))?
            }
            None => PullRequestContext::default(),
        };

        let template_path = self.root.join("templates/review-prompt.md");
        let template = std::fs::read_to_string(&template_path)
            .with_context(|| format!("missing prompt template {}", template_path.display()))?;
        let today = chrono::Utc::now().date_naive().to_string();
        let rendered_prompt = prompt::render_review_prompt(
            &template,
            &pr_context,
            &self.diff_file.to_string_lossy(),
            &self.perspective,
            &today,
        );

        // Trusted system prompt: the perspective agent file body, with YAML
        // frontmatter stripped.
        let agent_path = self
            .root
            .join("agents")
            .join(format!("{}.md", self.perspective));
        let agent_text = std::fs::read_to_string(&agent_path)
            .with_context(|| format!("missing agent file {}", agent_path.display()))?;
        let system_body = prompt::strip_frontmatter(&agent_text).trim().to_string();
        if system_body.is_empty() {
            bail!("invalid agent prompt body: {}", agent_path.display());
        }
        std::fs::create_dir_all(&self.artifact_dir)?;
        let system_prompt_file = self
            .artifact_dir
            .join(format!("{}-system-prompt.md", self.perspective));
        std::fs::write(&system_prompt_file, system_body)?;

        let fast_path_template = std::fs::read_to_string(
            self.root.join("templates/fast-path-prompt.md"),
        )
        .ok();

        let fallback_models: Vec<String> = self
            .fallback_models
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();

        info!(
            reviewer = %reviewer.codename,
            perspective = %self.perspective,
            model = %primary_model,
            "Starting reviewer run"
        );

        // When running inside a consumer checkout, the CLI auto-discovers
        // the agent definition from the working tree: stage the trusted copy
        // there for the duration of the run.
        let mut staged = StagedConfig::new();
        if let Some(workspace) = &self.workspace {
            let dest = workspace
                .join(".cerberus")
                .join("agents")
                .join(format!("{}.md", self.perspective));
            staged.stage(&agent_path, &dest)?;
        }

        let runner = ReviewRunner::new(
            CliBackend::new().with_path(&self.cli_path),
            RunnerOptions {
                total_timeout_secs: self.timeout,
                fallback_models,
                ..Default::default()
            },
        );
        let run = ReviewRun {
            reviewer_name: reviewer.codename.clone(),
            perspective: self.perspective.clone(),
            primary_model,
            api_key,
            prompt: rendered_prompt,
            fast_path_template,
            diff,
            system_prompt_file,
            artifact_dir: self.artifact_dir.clone(),
        };

        let descriptor = runner.run(&run).await?;
        staged.restore();
        let descriptor_path = descriptor.write_beside(&self.artifact_dir, &self.perspective)?;
        println!("{}", descriptor_path.display());
        Ok(0)
    }
}
