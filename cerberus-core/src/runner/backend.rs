//! Review backend: bounded execution of the LLM CLI child process
//!
//! One attempt = one child process with a sanitized environment, the user
//! prompt on stdin, and a wall-clock timeout. On expiry the child is killed
//! and the attempt reports exit code 124, matching the `timeout` helper
//! convention the rest of the pipeline understands.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::classify::{classify, Classification};
use crate::{Error, Result};

/// Exit code reported for wall-clock timeouts
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// One reviewer runtime attempt
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    pub perspective: String,
    pub model: String,
    /// User prompt, written to the child's stdin
    pub prompt: String,
    /// Trusted system prompt file; PR input never touches it
    pub system_prompt_file: PathBuf,
    pub timeout: Duration,
    /// Agent step cap (the fast path sets 1)
    pub max_steps: Option<u32>,
    pub api_key: String,
    /// Fresh temp directory used as HOME, confining CLI caches
    pub isolated_home: PathBuf,
    /// Per-perspective scratchpad the model is instructed to write to
    pub scratchpad: PathBuf,
}

/// Normalized result of one attempt
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub classification: Classification,
}

/// A runtime capable of executing one review attempt
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    /// Name of this backend
    fn name(&self) -> &'static str;

    /// Execute one attempt and return a normalized result
    async fn run_attempt(&self, request: &AttemptRequest) -> Result<AttemptResult>;
}

/// Backend that shells out to the LLM coding-agent CLI
///
/// Invocation contract: `<cli> run -m <model> --agent <perspective>` with
/// the user prompt on stdin. Everything else travels through the sanitized
/// environment.
#[derive(Debug, Clone)]
pub struct CliBackend {
    cli_path: String,
    /// Environment variable carrying the model API key
    api_key_var: String,
}

impl CliBackend {
    pub fn new() -> Self {
        Self {
            cli_path: "pi".to_string(),
            api_key_var: "OPENROUTER_API_KEY".to_string(),
        }
    }

    /// Use a custom CLI executable path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.cli_path = path.into();
        self
    }

    /// Export the API key under a different variable name
    pub fn with_api_key_var(mut self, var: impl Into<String>) -> Self {
        self.api_key_var = var.into();
        self
    }

    /// Build the child command with the allow-list environment
    ///
    /// `env_clear` first: secrets like a VCS push token must not leak into
    /// the reviewer process.
    fn build_command(&self, request: &AttemptRequest) -> Command {
        let home = &request.isolated_home;

        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("run")
            .arg("-m")
            .arg(&request.model)
            .arg("--agent")
            .arg(&request.perspective);

        cmd.env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("HOME", home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("XDG_DATA_HOME", home.join(".local/share"))
            .env("TMPDIR", home.join("tmp"))
            .env(&self.api_key_var, &request.api_key)
            .env("CERBERUS_SYSTEM_PROMPT_FILE", &request.system_prompt_file)
            .env("CERBERUS_SCRATCHPAD", &request.scratchpad);

        if let Ok(lang) = std::env::var("LANG") {
            cmd.env("LANG", lang);
        }
        if let Ok(lc_all) = std::env::var("LC_ALL") {
            cmd.env("LC_ALL", lc_all);
        }
        if let Some(max_steps) = request.max_steps {
            cmd.env("CERBERUS_MAX_STEPS", max_steps.to_string());
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

impl Default for CliBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewBackend for CliBackend {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn run_attempt(&self, request: &AttemptRequest) -> Result<AttemptResult> {
        for dir in [".config", ".local/share", "tmp"] {
            tokio::fs::create_dir_all(request.isolated_home.join(dir)).await?;
        }

        let mut cmd = self.build_command(request);
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Runner(format!(
                    "review CLI not found at '{}'. Is it installed?",
                    self.cli_path
                ))
            } else {
                Error::Io(e)
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before reading the whole prompt; a broken
            // pipe here is the child's failure to report, not ours.
            let _ = stdin.write_all(request.prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(read_pipe(stdout_pipe));
        let stderr_task = tokio::spawn(read_pipe(stderr_pipe));

        let (exit_code, timed_out) =
            match tokio::time::timeout(request.timeout, child.wait()).await {
                Ok(status) => (status?.code().unwrap_or(-1), false),
                Err(_) => {
                    debug!(
                        perspective = %request.perspective,
                        model = %request.model,
                        timeout_secs = request.timeout.as_secs(),
                        "Attempt hit wall-clock timeout; killing child"
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    (TIMEOUT_EXIT_CODE, true)
                }
            };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let classification = if timed_out {
            Classification::Timeout
        } else {
            classify(exit_code, &stdout, &stderr)
        };

        Ok(AttemptResult {
            exit_code,
            timed_out,
            stdout,
            stderr,
            classification,
        })
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
