//! Subprocess-isolated embedding backend
//!
//! Spawns a fresh worker per call: a corrupted or crashing native runtime
//! takes down the child, never the host. One JSON request goes to the
//! child's stdin, exactly one JSON response is expected on its stdout, and
//! the whole round trip runs under a wall-clock timeout. On expiry the
//! child is killed and reaped; an orphaned worker is never left behind.

use super::{BackendFailure, EmbedRequest, EmbedResponse, EmbeddingBackend};
use crate::error::{RecallError, RecallResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How long to wait for a clean exit after stdout reaches EOF before
/// forcing termination.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// Embedding backend that runs the model in a short-lived child process
#[derive(Debug, Clone)]
pub struct WorkerProcessBackend {
    command: Vec<String>,
    model_name: String,
    timeout: Duration,
}

impl WorkerProcessBackend {
    /// `command` is the worker program plus arguments; it must name a
    /// program.
    pub fn new(
        command: Vec<String>,
        model_name: impl Into<String>,
        timeout: Duration,
    ) -> RecallResult<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(RecallError::config("worker command must name a program"));
        }
        Ok(Self {
            command,
            model_name: model_name.into(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Kill the child and wait for the OS to release it. Errors only mean
    /// the child already exited, which is exactly the state we want.
    async fn kill_and_reap(child: &mut Child) {
        if let Err(err) = child.kill().await {
            debug!(error = %err, "worker already exited before kill");
        }
        let _ = child.wait().await;
    }

    /// One full request/response round trip against a fresh child
    async fn round_trip(&self, request: &EmbedRequest) -> Result<Vec<u8>, BackendFailure> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| BackendFailure::Unavailable(format!("request encoding: {err}")))?;

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| BackendFailure::Unavailable(format!("spawn failed: {err}")))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            BackendFailure::Unavailable("worker stdin not captured".to_string())
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            BackendFailure::Unavailable("worker stdout not captured".to_string())
        })?;

        let io = async {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
            drop(stdin);
            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await?;
            Ok::<Vec<u8>, std::io::Error>(output)
        };

        let output = match tokio::time::timeout(self.timeout, io).await {
            Err(_) => {
                warn!(timeout = ?self.timeout, "worker exceeded wall-clock budget, killing");
                Self::kill_and_reap(&mut child).await;
                return Err(BackendFailure::Timeout(self.timeout));
            }
            Ok(Err(err)) => {
                Self::kill_and_reap(&mut child).await;
                return Err(BackendFailure::Unavailable(format!("worker io: {err}")));
            }
            Ok(Ok(output)) => output,
        };

        // Stdout is closed. Give the child a moment to exit, then force it.
        // The exit status is informational only: stream content decides.
        match tokio::time::timeout(REAP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                if output.is_empty() && !status.success() {
                    return Err(BackendFailure::Unavailable(format!(
                        "worker exited with {status} and produced no output"
                    )));
                }
            }
            Ok(Err(err)) => {
                debug!(error = %err, "could not collect worker exit status");
            }
            Err(_) => {
                warn!("worker lingered after closing stdout, killing");
                Self::kill_and_reap(&mut child).await;
            }
        }

        Ok(output)
    }

    fn parse(&self, output: &[u8], expected: usize) -> Result<Vec<Vec<f32>>, BackendFailure> {
        if output.is_empty() {
            return Err(BackendFailure::MalformedOutput(
                "worker produced no output".to_string(),
            ));
        }
        let response: EmbedResponse = serde_json::from_slice(output).map_err(|err| {
            BackendFailure::MalformedOutput(format!("invalid response body: {err}"))
        })?;
        if let Some(message) = response.error {
            return Err(BackendFailure::ModelError(message));
        }
        let embeddings = response.embeddings.ok_or_else(|| {
            BackendFailure::MalformedOutput(
                "response carried neither embeddings nor error".to_string(),
            )
        })?;
        if embeddings.len() != expected {
            return Err(BackendFailure::MalformedOutput(format!(
                "expected {expected} vectors, got {}",
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingBackend for WorkerProcessBackend {
    fn name(&self) -> &str {
        "worker-process"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendFailure> {
        let request = EmbedRequest {
            model: self.model_name.clone(),
            texts: texts.to_vec(),
        };
        let output = self.round_trip(&request).await?;
        self.parse(&output, texts.len())
    }
}
