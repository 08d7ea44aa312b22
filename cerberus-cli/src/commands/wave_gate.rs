//! Wave-gate command - decide whether the next review wave runs

use std::path::PathBuf;

use cerberus_core::{aggregate, wave, Config, ModelTier};
use clap::Args;

/// Arguments for the wave-gate command
#[derive(Args, Debug)]
pub struct WaveGateArgs {
    /// Path to the Cerberus config document
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory of per-reviewer verdict JSON artifacts
    #[arg(long)]
    pub verdict_dir: PathBuf,

    /// Wave that just finished
    #[arg(long)]
    pub wave: String,

    /// Model tier for depth limits
    #[arg(long, default_value = "standard")]
    pub tier: String,

    /// Where to write the decision JSON
    #[arg(long)]
    pub output_json: Option<PathBuf>,
}

impl WaveGateArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let config = Config::load_from_file(&self.config)?;
        let tier: ModelTier = self.tier.parse()?;
        let (verdicts, skipped) = aggregate::load_verdict_dir(&self.verdict_dir)?;

        let decision =
            wave::evaluate_gate(&config, &verdicts, skipped.len(), &self.wave, tier)?;

        if let Some(path) = &self.output_json {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&decision)?)?;
        }

        // Key=value lines for workflow step outputs.
        println!("escalate={}", decision.escalate);
        println!("blocking={}", decision.blocking);
        println!("next_wave={}", decision.next_wave.as_deref().unwrap_or(""));
        println!("reason={}", decision.reason);
        println!("major_count={}", decision.stats.major_count);
        println!("critical_count={}", decision.stats.critical_count);
        println!("skip_count={}", decision.stats.skip_count);
        println!("review_count={}", decision.stats.review_count);
        Ok(0)
    }
}
