//! Matrix command - expand the roster into reviewer tasks

use std::path::PathBuf;

use anyhow::Context;
use cerberus_core::{matrix, Config, ModelTier};
use clap::Args;

/// Arguments for the matrix command
#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Path to the Cerberus config document
    #[arg(short, long)]
    pub config: PathBuf,

    /// Restrict the matrix to one wave
    #[arg(long)]
    pub wave: Option<String>,

    /// Model tier annotation for the tasks (flash/standard/pro)
    #[arg(long)]
    pub tier: Option<String>,
}

impl MatrixArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let config = Config::load_from_file(&self.config)?;
        let tier = self
            .tier
            .as_deref()
            .map(str::parse::<ModelTier>)
            .transpose()?;

        let matrix = matrix::expand(&config, self.wave.as_deref(), tier)?;

        // Three lines for CI consumption: matrix JSON, count, names.
        println!(
            "{}",
            serde_json::to_string(&matrix).context("serialize matrix")?
        );
        println!("{}", matrix.len());
        println!("{}", matrix.names());
        Ok(0)
    }
}
