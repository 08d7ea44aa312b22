//! Parse command - turn a reviewer artifact into a typed verdict

use std::path::PathBuf;

use anyhow::Context;
use cerberus_core::parser::{self, ParseContext};
use cerberus_core::ArtifactDescriptor;
use clap::Args;

/// Arguments for the parse command
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Artifact descriptor written by `cerberus run`
    #[arg(long)]
    pub descriptor: PathBuf,

    /// Reviewer codename for the verdict
    #[arg(long)]
    pub reviewer: String,

    /// Perspective for the verdict
    #[arg(long)]
    pub perspective: String,

    /// Where to write the verdict JSON (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ParseArgs {
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let descriptor = ArtifactDescriptor::load(&self.descriptor).with_context(|| {
            format!("unable to load descriptor {}", self.descriptor.display())
        })?;

        let verdict = parser::parse_artifact(
            ParseContext {
                reviewer: &self.reviewer,
                perspective: &self.perspective,
            },
            &descriptor,
        );

        let json = serde_json::to_string_pretty(&verdict)?;
        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &json)?;
            }
            None => println!("{}", json),
        }
        Ok(0)
    }
}
