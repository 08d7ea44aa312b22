//! Reviewer runtime: retry, fallback, and salvage for one review task
//!
//! The runner drives the LLM CLI through a typed state machine over
//! (attempt, model index, outcome). Transient errors retry with 2/4/8s
//! backoff (a provider `Retry-After` wins); exhausted retries advance down
//! the fallback model chain; auth/quota errors abort immediately because the
//! same key applies to every model. Whatever happens, the runner hands the
//! parser exactly one artifact via an `ArtifactDescriptor`.

pub mod backend;
pub mod classify;
pub mod prompt;
pub mod salvage;
pub mod staging;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::Result;
use backend::{AttemptRequest, ReviewBackend};
use classify::Classification;
use salvage::{has_json_block, ArtifactDescriptor, ArtifactKind};

/// Default per-reviewer wall clock budget
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Inner retry cap per model
pub const MAX_RETRIES: u32 = 3;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Total wall-clock budget for the reviewer (`T_total`)
    pub total_timeout_secs: u64,
    pub max_retries: u32,
    /// Fallback model chain tried after the primary
    pub fallback_models: Vec<String>,
    /// Step cap passed to the CLI for normal attempts
    pub max_steps: Option<u32>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            total_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: MAX_RETRIES,
            fallback_models: Vec::new(),
            max_steps: None,
        }
    }
}

/// Context for one reviewer task
#[derive(Debug, Clone)]
pub struct ReviewRun {
    pub reviewer_name: String,
    pub perspective: String,
    pub primary_model: String,
    pub api_key: String,
    /// Rendered user prompt for the primary attempts
    pub prompt: String,
    /// Fast-path prompt template; fast path is skipped when absent
    pub fast_path_template: Option<String>,
    /// Raw unified diff (fast-path inlining + timeout marker file list)
    pub diff: String,
    pub system_prompt_file: PathBuf,
    /// Directory receiving all per-perspective artifacts
    pub artifact_dir: PathBuf,
}

/// The fast-path sub-budget carved out of the total
///
/// `clamp(T_total/5, 60, 120)`, disabled entirely under a 120s total.
pub fn fast_path_budget(total_secs: u64) -> u64 {
    if total_secs < 120 {
        return 0;
    }
    (total_secs / 5).clamp(60, 120)
}

/// Backoff for the nth retry (1-based): 2s, 4s, then capped at 8s
pub fn backoff_seconds(retry: u32) -> u64 {
    match retry {
        0 | 1 => 2,
        2 => 4,
        _ => 8,
    }
}

/// What the state machine does after classifying an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Retry the same model after waiting
    Retry { wait_seconds: u64 },
    /// Advance to the next fallback model
    Fallback,
    /// Output produced; proceed to artifact selection
    Complete,
    /// Wall clock expired; proceed to timeout salvage
    Timeout,
    /// Permanent auth/quota failure; no fallback will help
    AbortAuthOrQuota,
}

/// Pure transition function of the retry/fallback state machine
pub fn transition(
    classification: &Classification,
    produced_output: bool,
    retry: u32,
    max_retries: u32,
) -> Transition {
    match classification {
        Classification::Success if produced_output => Transition::Complete,
        // Exit 0 with neither stdout nor scratchpad: treat as transient.
        Classification::Success => {
            if retry < max_retries {
                Transition::Retry {
                    wait_seconds: backoff_seconds(retry + 1),
                }
            } else {
                Transition::Fallback
            }
        }
        Classification::Timeout => Transition::Timeout,
        Classification::Transient {
            retry_after_seconds,
            ..
        } => {
            if retry < max_retries {
                let wait = retry_after_seconds.unwrap_or_else(|| backoff_seconds(retry + 1));
                Transition::Retry { wait_seconds: wait }
            } else {
                Transition::Fallback
            }
        }
        Classification::Permanent { class } => match class {
            classify::PermanentClass::AuthOrQuota => Transition::AbortAuthOrQuota,
            classify::PermanentClass::Client4xx => Transition::Fallback,
        },
        Classification::Unknown => {
            if produced_output {
                // Unknown exit but output exists: delegate to the parser.
                Transition::Complete
            } else {
                Transition::Fallback
            }
        }
    }
}

/// How the attempt loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopOutcome {
    Completed,
    TimedOut,
    AuthOrQuota,
    Exhausted,
}

/// Drives one reviewer task through retries, fallbacks, and salvage
pub struct ReviewRunner<B> {
    backend: B,
    options: RunnerOptions,
}

impl<B: ReviewBackend> ReviewRunner<B> {
    pub fn new(backend: B, options: RunnerOptions) -> Self {
        Self { backend, options }
    }

    /// Run the task to completion and return the artifact descriptor
    ///
    /// Never fails for reviewer-internal reasons: every failure mode ends in
    /// a parseable artifact (JSON block, partial text, or synthetic marker).
    pub async fn run(&self, run: &ReviewRun) -> Result<ArtifactDescriptor> {
        let total = self.options.total_timeout_secs;
        let fast_budget = fast_path_budget(total);
        let primary_budget = total - fast_budget;

        let mut models = vec![run.primary_model.clone()];
        models.extend(self.options.fallback_models.iter().cloned());

        tokio::fs::create_dir_all(&run.artifact_dir).await?;
        let stdout_file = run
            .artifact_dir
            .join(format!("{}-output.txt", run.perspective));
        let stderr_file = run
            .artifact_dir
            .join(format!("{}-stderr.log", run.perspective));
        let scratchpad = run
            .artifact_dir
            .join(format!("{}-review.md", run.perspective));

        // Isolated HOME for the CLI, removed when the runner returns.
        let isolated_home = tempfile::Builder::new()
            .prefix(&format!("cerberus-home-{}.", run.perspective))
            .tempdir_in(&run.artifact_dir)?;

        info!(
            reviewer = %run.reviewer_name,
            perspective = %run.perspective,
            model = %run.primary_model,
            budget_secs = primary_budget,
            "Running reviewer"
        );

        let start = tokio::time::Instant::now();
        let mut model_index = 0usize;
        let mut model_used = models[0].clone();
        let mut outcome = LoopOutcome::Exhausted;

        'models: while model_index < models.len() {
            let model = models[model_index].clone();
            if model_index > 0 {
                info!(
                    model = %model,
                    fallback = model_index,
                    of = models.len() - 1,
                    "Falling back to next model"
                );
            }
            model_used = model.clone();

            let mut retry = 0u32;
            loop {
                let remaining = primary_budget.saturating_sub(start.elapsed().as_secs());
                if remaining == 0 {
                    debug!("Timeout budget exhausted before attempt");
                    outcome = LoopOutcome::TimedOut;
                    break 'models;
                }

                let request = AttemptRequest {
                    perspective: run.perspective.clone(),
                    model: model.clone(),
                    prompt: run.prompt.clone(),
                    system_prompt_file: run.system_prompt_file.clone(),
                    timeout: Duration::from_secs(remaining),
                    max_steps: self.options.max_steps,
                    api_key: run.api_key.clone(),
                    isolated_home: isolated_home.path().to_path_buf(),
                    scratchpad: scratchpad.clone(),
                };
                let result = self.backend.run_attempt(&request).await?;
                tokio::fs::write(&stdout_file, &result.stdout).await?;
                tokio::fs::write(&stderr_file, &result.stderr).await?;

                let scratchpad_len = file_len(&scratchpad).await;
                let produced_output = !result.stdout.is_empty() || scratchpad_len > 0;
                debug!(
                    exit = result.exit_code,
                    stdout_bytes = result.stdout.len(),
                    scratchpad_bytes = scratchpad_len,
                    model = %model,
                    attempt = retry + 1,
                    "Attempt finished"
                );

                match transition(
                    &result.classification,
                    produced_output,
                    retry,
                    self.options.max_retries,
                ) {
                    Transition::Complete => {
                        outcome = LoopOutcome::Completed;
                        break 'models;
                    }
                    Transition::Timeout => {
                        outcome = LoopOutcome::TimedOut;
                        break 'models;
                    }
                    Transition::AbortAuthOrQuota => {
                        warn!("Permanent API error (auth/quota); writing error verdict");
                        outcome = LoopOutcome::AuthOrQuota;
                        break 'models;
                    }
                    Transition::Retry { wait_seconds } => {
                        retry += 1;
                        debug!(
                            attempt = retry,
                            max = self.options.max_retries,
                            wait_secs = wait_seconds,
                            "Retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_secs(wait_seconds)).await;
                    }
                    Transition::Fallback => {
                        model_index += 1;
                        continue 'models;
                    }
                }
            }
        }

        let runtime_seconds = start.elapsed().as_secs();
        let fallback_used = model_used != models[0];
        if fallback_used {
            info!(model = %model_used, primary = %models[0], "Review used fallback model");
        }

        let (parse_input, kind) = match outcome {
            LoopOutcome::Completed => {
                self.select_artifact(&scratchpad, &stdout_file).await?
            }
            LoopOutcome::TimedOut => {
                warn!(
                    reviewer = %run.reviewer_name,
                    perspective = %run.perspective,
                    timeout_secs = total,
                    "Reviewer timed out"
                );
                self.salvage_after_timeout(
                    run,
                    &scratchpad,
                    &stdout_file,
                    &model_used,
                    fast_budget,
                    isolated_home.path().to_path_buf(),
                )
                .await?
            }
            LoopOutcome::AuthOrQuota | LoopOutcome::Exhausted => {
                let stdout = read_or_empty(&stdout_file).await;
                let stderr = read_or_empty(&stderr_file).await;
                let marker = salvage::api_error_marker_text(&stdout, &stderr, &models);
                tokio::fs::write(&stdout_file, marker).await?;
                (stdout_file.clone(), ArtifactKind::ApiErrorMarker)
            }
        };

        Ok(ArtifactDescriptor {
            parse_input,
            kind,
            model_used,
            primary_model: models[0].clone(),
            fallback_used,
            runtime_seconds,
        })
    }

    /// Pick the best artifact from a completed run
    async fn select_artifact(
        &self,
        scratchpad: &PathBuf,
        stdout_file: &PathBuf,
    ) -> Result<(PathBuf, ArtifactKind)> {
        let scratchpad_text = read_or_empty(scratchpad).await;
        if has_json_block(&scratchpad_text) {
            debug!("parse-input: scratchpad (has JSON block)");
            return Ok((scratchpad.clone(), ArtifactKind::JsonBlock));
        }
        let stdout_text = read_or_empty(stdout_file).await;
        if has_json_block(&stdout_text) {
            debug!("parse-input: stdout (has JSON block)");
            return Ok((stdout_file.clone(), ArtifactKind::JsonBlock));
        }
        if !scratchpad_text.is_empty() {
            debug!("parse-input: scratchpad (partial, no JSON block)");
            return Ok((scratchpad.clone(), ArtifactKind::Partial));
        }
        debug!("parse-input: stdout (fallback)");
        Ok((stdout_file.clone(), ArtifactKind::Partial))
    }

    /// Salvage order after a timeout: JSON block, partial text, fast path,
    /// then the synthetic timeout marker
    async fn salvage_after_timeout(
        &self,
        run: &ReviewRun,
        scratchpad: &PathBuf,
        stdout_file: &PathBuf,
        model_used: &str,
        fast_budget: u64,
        isolated_home: PathBuf,
    ) -> Result<(PathBuf, ArtifactKind)> {
        let scratchpad_text = read_or_empty(scratchpad).await;
        let stdout_text = read_or_empty(stdout_file).await;

        if has_json_block(&scratchpad_text) {
            debug!("parse-input: scratchpad (timeout, but has JSON block)");
            return Ok((scratchpad.clone(), ArtifactKind::JsonBlock));
        }
        if has_json_block(&stdout_text) {
            debug!("parse-input: stdout (timeout, but has JSON block)");
            return Ok((stdout_file.clone(), ArtifactKind::JsonBlock));
        }
        if !scratchpad_text.is_empty() {
            debug!("parse-input: scratchpad (timeout, partial review)");
            return Ok((scratchpad.clone(), ArtifactKind::Partial));
        }
        if !stdout_text.is_empty() {
            debug!("parse-input: stdout (timeout, partial review)");
            return Ok((stdout_file.clone(), ArtifactKind::Partial));
        }

        let mut fast_path_attempted = false;
        if fast_budget > 0 {
            if let Some(template) = &run.fast_path_template {
                fast_path_attempted = true;
                info!(budget_secs = fast_budget, "Running fast-path fallback");
                let fast_prompt = prompt::render_fast_path_prompt(
                    template,
                    &run.perspective,
                    &run.reviewer_name,
                    &run.diff,
                );
                let fast_output = run
                    .artifact_dir
                    .join(format!("{}-fast-path-output.txt", run.perspective));
                let request = AttemptRequest {
                    perspective: run.perspective.clone(),
                    model: model_used.to_string(),
                    prompt: fast_prompt,
                    system_prompt_file: run.system_prompt_file.clone(),
                    timeout: Duration::from_secs(fast_budget),
                    max_steps: Some(1),
                    api_key: run.api_key.clone(),
                    isolated_home,
                    scratchpad: scratchpad.clone(),
                };
                let result = self.backend.run_attempt(&request).await?;
                tokio::fs::write(&fast_output, &result.stdout).await?;
                debug!(
                    exit = result.exit_code,
                    stdout_bytes = result.stdout.len(),
                    "Fast path finished"
                );
                if result.exit_code == 0 && has_json_block(&result.stdout) {
                    debug!("parse-input: fast-path output (has JSON block)");
                    return Ok((fast_output, ArtifactKind::FastPath));
                }
            }
        }

        let marker_file = run
            .artifact_dir
            .join(format!("{}-timeout-marker.txt", run.perspective));
        let marker = salvage::timeout_marker_text(
            &run.reviewer_name,
            &run.perspective,
            self.options.total_timeout_secs,
            &prompt::extract_diff_files(&run.diff),
            fast_path_attempted,
        );
        tokio::fs::write(&marker_file, marker).await?;
        debug!("parse-input: timeout marker (no output to salvage)");
        Ok((marker_file, ArtifactKind::TimeoutMarker))
    }
}

async fn file_len(path: &PathBuf) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn read_or_empty(path: &PathBuf) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::AttemptResult;
    use classify::{PermanentClass, TransientClass};
    use std::sync::Mutex;

    struct Scripted {
        /// stdout text per attempt, in order; the last entry repeats
        results: Mutex<std::collections::VecDeque<AttemptResult>>,
        seen_models: Mutex<Vec<String>>,
        seen_max_steps: Mutex<Vec<Option<u32>>>,
    }

    impl Scripted {
        fn new(results: Vec<AttemptResult>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                seen_models: Mutex::new(Vec::new()),
                seen_max_steps: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReviewBackend for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run_attempt(&self, request: &AttemptRequest) -> Result<AttemptResult> {
            self.seen_models.lock().unwrap().push(request.model.clone());
            self.seen_max_steps
                .lock()
                .unwrap()
                .push(request.max_steps);
            let mut results = self.results.lock().unwrap();
            Ok(results.pop_front().expect("scripted result available"))
        }
    }

    fn ok_result(stdout: &str) -> AttemptResult {
        AttemptResult {
            exit_code: 0,
            timed_out: false,
            stdout: stdout.to_string(),
            stderr: String::new(),
            classification: Classification::Success,
        }
    }

    fn failed_result(exit_code: i32, stderr: &str) -> AttemptResult {
        AttemptResult {
            exit_code,
            timed_out: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
            classification: classify::classify(exit_code, "", stderr),
        }
    }

    fn timeout_result() -> AttemptResult {
        AttemptResult {
            exit_code: backend::TIMEOUT_EXIT_CODE,
            timed_out: true,
            stdout: String::new(),
            stderr: String::new(),
            classification: Classification::Timeout,
        }
    }

    fn sample_run(dir: &std::path::Path) -> ReviewRun {
        ReviewRun {
            reviewer_name: "trace".to_string(),
            perspective: "correctness".to_string(),
            primary_model: "model-a".to_string(),
            api_key: "sk-test".to_string(),
            prompt: "review".to_string(),
            fast_path_template: Some("{{DIFF_CONTENT}}".to_string()),
            diff: "diff --git a/src/lib.rs b/src/lib.rs\n+code\n".to_string(),
            system_prompt_file: dir.join("system.md"),
            artifact_dir: dir.to_path_buf(),
        }
    }

    const GOOD_OUTPUT: &str = "analysis\n```json\n{\"verdict\": \"PASS\"}\n```\n";

    #[test]
    fn test_fast_path_budget() {
        assert_eq!(fast_path_budget(600), 120);
        assert_eq!(fast_path_budget(400), 80);
        assert_eq!(fast_path_budget(150), 60);
        assert_eq!(fast_path_budget(119), 0);
        assert_eq!(fast_path_budget(60), 0);
    }

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(backoff_seconds(1), 2);
        assert_eq!(backoff_seconds(2), 4);
        assert_eq!(backoff_seconds(3), 8);
        assert_eq!(backoff_seconds(9), 8);
    }

    #[test]
    fn test_transition_success_with_output() {
        let t = transition(&Classification::Success, true, 0, 3);
        assert_eq!(t, Transition::Complete);
    }

    #[test]
    fn test_transition_empty_output_retries_then_falls_back() {
        let t = transition(&Classification::Success, false, 0, 3);
        assert_eq!(t, Transition::Retry { wait_seconds: 2 });
        let t = transition(&Classification::Success, false, 3, 3);
        assert_eq!(t, Transition::Fallback);
    }

    #[test]
    fn test_transition_rate_limit_honors_retry_after() {
        let classification = Classification::Transient {
            class: TransientClass::RateLimit,
            retry_after_seconds: Some(30),
        };
        let t = transition(&classification, false, 1, 3);
        assert_eq!(t, Transition::Retry { wait_seconds: 30 });
    }

    #[test]
    fn test_transition_auth_aborts() {
        let classification = Classification::Permanent {
            class: PermanentClass::AuthOrQuota,
        };
        assert_eq!(
            transition(&classification, false, 0, 3),
            Transition::AbortAuthOrQuota
        );
    }

    #[test]
    fn test_transition_client_4xx_falls_back_immediately() {
        let classification = Classification::Permanent {
            class: PermanentClass::Client4xx,
        };
        assert_eq!(transition(&classification, false, 0, 3), Transition::Fallback);
    }

    #[test]
    fn test_transition_unknown_with_output_delegates() {
        assert_eq!(transition(&Classification::Unknown, true, 0, 3), Transition::Complete);
        assert_eq!(transition(&Classification::Unknown, false, 0, 3), Transition::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_selects_stdout_json_block() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(vec![ok_result(GOOD_OUTPUT)]);
        let runner = ReviewRunner::new(backend, RunnerOptions::default());
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::JsonBlock);
        assert!(!descriptor.fallback_used);
        assert_eq!(descriptor.model_used, "model-a");
        let text = std::fs::read_to_string(&descriptor.parse_input).unwrap();
        assert!(has_json_block(&text));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(vec![
            failed_result(1, "HTTP 503 service unavailable"),
            ok_result(GOOD_OUTPUT),
        ]);
        let runner = ReviewRunner::new(backend, RunnerOptions::default());
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::JsonBlock);
        assert!(!descriptor.fallback_used);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_advance_to_fallback_model() {
        let dir = tempfile::tempdir().unwrap();
        let transient = || failed_result(1, "connection reset");
        let backend = Scripted::new(vec![
            transient(),
            transient(),
            transient(),
            transient(),
            ok_result(GOOD_OUTPUT),
        ]);
        let options = RunnerOptions {
            fallback_models: vec!["model-b".to_string()],
            ..Default::default()
        };
        let runner = ReviewRunner::new(backend, options);
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert!(descriptor.fallback_used);
        assert_eq!(descriptor.model_used, "model-b");
        assert_eq!(descriptor.primary_model, "model-a");
        let models = runner.backend.seen_models.lock().unwrap().clone();
        assert_eq!(models, vec!["model-a", "model-a", "model-a", "model-a", "model-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_writes_api_error_marker_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(vec![failed_result(1, "insufficient_credits for key")]);
        let options = RunnerOptions {
            fallback_models: vec!["model-b".to_string()],
            ..Default::default()
        };
        let runner = ReviewRunner::new(backend, options);
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::ApiErrorMarker);
        let marker = std::fs::read_to_string(&descriptor.parse_input).unwrap();
        assert!(marker.contains("API Error: API_CREDITS_DEPLETED"));
        // No fallback attempted.
        let models = runner.backend.seen_models.lock().unwrap().clone();
        assert_eq!(models, vec!["model-a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_fast_path_salvage() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(vec![timeout_result(), ok_result(GOOD_OUTPUT)]);
        let runner = ReviewRunner::new(backend, RunnerOptions::default());
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::FastPath);
        assert!(!descriptor.fallback_used);
        assert_eq!(descriptor.model_used, "model-a");
        // Fast path runs with steps capped at 1.
        let steps = runner.backend.seen_max_steps.lock().unwrap().clone();
        assert_eq!(steps, vec![None, Some(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_salvage_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(vec![timeout_result(), failed_result(1, "noise")]);
        let runner = ReviewRunner::new(backend, RunnerOptions::default());
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::TimeoutMarker);
        let marker = std::fs::read_to_string(&descriptor.parse_input).unwrap();
        assert!(marker.contains("Review Timeout: timeout after 600s"));
        assert!(marker.contains("Fast-path: yes"));
        assert!(marker.contains("src/lib.rs"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_partial_stdout_delegates_to_parser() {
        let dir = tempfile::tempdir().unwrap();
        let mut partial = timeout_result();
        partial.stdout = "## Investigation Notes\nhalf-finished analysis".to_string();
        let backend = Scripted::new(vec![partial]);
        let runner = ReviewRunner::new(backend, RunnerOptions::default());
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::Partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_budget_disables_fast_path() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(vec![timeout_result()]);
        let options = RunnerOptions {
            total_timeout_secs: 90,
            ..Default::default()
        };
        let runner = ReviewRunner::new(backend, options);
        let descriptor = runner.run(&sample_run(dir.path())).await.unwrap();
        assert_eq!(descriptor.kind, ArtifactKind::TimeoutMarker);
        let marker = std::fs::read_to_string(&descriptor.parse_input).unwrap();
        assert!(marker.contains("Fast-path: no"));
        // Only the primary attempt ran.
        assert_eq!(runner.backend.seen_models.lock().unwrap().len(), 1);
    }
}
