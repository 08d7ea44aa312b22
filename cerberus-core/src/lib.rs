//! Cerberus Core - the review pipeline behind the Cerberus merge gate
//!
//! Cerberus runs multiple specialized LLM reviewers in parallel against a PR
//! diff and aggregates their structured verdicts into a single merge
//! decision. This crate holds the whole pipeline (config, matrix
//! expansion, the reviewer runtime, output parsing, aggregation, wave
//! gating, and the triage guard) with no network I/O; the GitHub surface
//! lives in `cerberus-github`.

pub mod aggregate;
pub mod config;
pub mod diff;
pub mod error;
pub mod matrix;
pub mod parser;
pub mod pr;
pub mod render;
pub mod runner;
pub mod triage;
pub mod verdict;
pub mod wave;

pub use aggregate::{AggregateStats, CerberusVerdict, ReviewerOutcome, WaveMeta};
pub use config::{
    Config, FixedPoolSelector, ModelTier, OverridePolicy, PoolSelector, RandomPoolSelector,
    ReviewerProfile,
};
pub use error::{Error, Result};
pub use matrix::{Matrix, ReviewerTask};
pub use pr::{PrComment, PullRequestContext};
pub use runner::{
    backend::{CliBackend, ReviewBackend},
    salvage::{ArtifactDescriptor, ArtifactKind},
    ReviewRun, ReviewRunner, RunnerOptions,
};
pub use verdict::{Finding, ReviewerVerdict, Severity, SkipKind, VerdictKind, VerdictStats};
