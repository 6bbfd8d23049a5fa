//! Execution Engine — resolve, run under a deadline, normalize, publish
//!
//! Pipeline: resolve tool → resolve mode → allocate artifact → run (native or
//! external, with auto fallback) → assemble output → normalize → publish

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifacts::ArtifactManager;
use crate::config::{EngineConfig, ProbeSettings};
use crate::error::{EngineError, Result};
use crate::external::{self, ScriptOutcome, ScriptRequest, ScriptRunner};
use crate::normalize::normalize_output;
use crate::probes::{NativeProbe, ProbeContext};
use crate::registry::{ExecutionMode, Mode, OutputFormat, Registry, ToolDescriptor};
use crate::sink::{OutputSink, StreamSender};

const SHUTDOWN_MESSAGE: &str = "shutdown";
const TIMEOUT_EXIT_CODE: i32 = 124;
const NOT_FOUND_EXIT_CODE: i32 = 127;
const STDERR_TAIL_LINES: usize = 5;
/// How long a cancelled native probe gets to notice before its output is taken
const NATIVE_CANCEL_WAIT: Duration = Duration::from_secs(2);

/// Final status of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Ok,
    Timeout,
    NotFound,
    Failed,
    RequiresElevation,
}

impl ExitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitStatus::Ok => "ok",
            ExitStatus::Timeout => "timeout",
            ExitStatus::NotFound => "not_found",
            ExitStatus::Failed => "failed",
            ExitStatus::RequiresElevation => "requires_elevation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub tool_id: String,
    pub requested_mode: Mode,
    /// Zero means the configured default
    pub deadline: Duration,
}

impl ExecutionRequest {
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            requested_mode: Mode::Auto,
            deadline: Duration::ZERO,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.requested_mode = mode;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub tool_id: String,
    pub mode_used: ExecutionMode,
    pub exit_status: ExitStatus,
    pub exit_code: Option<i32>,
    pub output: String,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub artifact_id: Option<String>,
}

/// A request that passed resolution and can be run
#[derive(Debug, Clone)]
pub struct PreparedRun {
    descriptor: ToolDescriptor,
    requested: Mode,
    mode: ExecutionMode,
    deadline: Duration,
}

impl PreparedRun {
    pub fn tool_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// What one native or external attempt produced
struct Attempt {
    mode: ExecutionMode,
    status: ExitStatus,
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    message: Option<String>,
}

impl Attempt {
    fn without_output(mode: ExecutionMode, status: ExitStatus, message: String) -> Self {
        Self {
            mode,
            status,
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            message: Some(message),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.message.as_deref() == Some(SHUTDOWN_MESSAGE)
    }
}

pub struct Engine {
    registry: Arc<Registry>,
    artifacts: Arc<ArtifactManager>,
    runner: ScriptRunner,
    config: EngineConfig,
    probes: ProbeSettings,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(
        registry: Arc<Registry>,
        artifacts: Arc<ArtifactManager>,
        config: EngineConfig,
        probes: ProbeSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runner: ScriptRunner::new(&config),
            registry,
            artifacts,
            config,
            probes,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn artifacts(&self) -> &Arc<ArtifactManager> {
        &self.artifacts
    }

    /// Zero falls back to the default; anything over the maximum is clamped
    pub fn effective_deadline(&self, requested: Duration) -> Duration {
        if requested.is_zero() {
            self.config.default_deadline()
        } else {
            requested.min(self.config.max_deadline())
        }
    }

    /// Resolve tool and mode without side effects
    pub fn prepare(&self, request: &ExecutionRequest) -> Result<PreparedRun> {
        let descriptor = self.registry.resolve(&request.tool_id)?;
        let mode = resolve_mode(descriptor, request.requested_mode)?;
        Ok(PreparedRun {
            descriptor: descriptor.clone(),
            requested: request.requested_mode,
            mode,
            deadline: self.effective_deadline(request.deadline),
        })
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let prepared = self.prepare(&request)?;
        self.run(prepared, None).await
    }

    /// Run a prepared request. Output lines are forwarded to `stream` as they
    /// are produced.
    pub async fn run(
        &self,
        prepared: PreparedRun,
        stream: Option<StreamSender>,
    ) -> Result<ExecutionResult> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let descriptor = &prepared.descriptor;

        let handle = self.artifacts.allocate(&descriptor.id)?;
        info!(
            "Running {} ({}, deadline {}s, artifact {})",
            descriptor.id,
            prepared.mode.describe(),
            prepared.deadline.as_secs(),
            handle.id()
        );

        let attempt = if descriptor.requires_elevation && !nix::unistd::geteuid().is_root() {
            warn!("{} requires elevation, not running", descriptor.id);
            let message = format!(
                "{} requires elevated privileges; restart DiagnOStiX as root to run it",
                descriptor.label
            );
            let mut attempt =
                Attempt::without_output(prepared.mode, ExitStatus::RequiresElevation, message.clone());
            attempt.stdout = message.into_bytes();
            attempt
        } else {
            match (prepared.mode, descriptor.native) {
                (ExecutionMode::Native, Some(probe)) => {
                    let native = self
                        .run_native(probe, prepared.deadline, stream.clone())
                        .await;
                    if should_fall_back(prepared.requested, descriptor, &native) {
                        warn!(
                            "Native probe for {} failed ({}), falling back to external script",
                            descriptor.id,
                            native.message.as_deref().unwrap_or("no message")
                        );
                        if let Some(tx) = &stream {
                            let _ = tx.send("--- Native probe failed, running external script ---\n".into());
                        }
                        let remaining = prepared.deadline.saturating_sub(clock.elapsed());
                        self.run_external(descriptor, remaining, handle.path(), stream)
                            .await
                    } else {
                        native
                    }
                }
                _ => {
                    self.run_external(descriptor, prepared.deadline, handle.path(), stream)
                        .await
                }
            }
        };

        let raw = assemble_output(descriptor, &attempt);
        let output = normalize_output(&descriptor.id, &raw);

        let artifact_id = match handle.write_output(&output).await {
            Ok(()) => Some(self.artifacts.publish(handle)),
            Err(e) => {
                warn!("Failed to store output for {}: {e}", descriptor.id);
                None
            }
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            "{} finished: {} via {} in {}ms",
            descriptor.id,
            attempt.status.as_str(),
            attempt.mode.describe(),
            duration_ms
        );

        Ok(ExecutionResult {
            tool_id: descriptor.id.clone(),
            mode_used: attempt.mode,
            exit_status: attempt.status,
            exit_code: attempt.exit_code,
            output,
            message: attempt.message,
            started_at,
            duration_ms,
            artifact_id,
        })
    }

    async fn run_native(
        &self,
        probe: NativeProbe,
        deadline: Duration,
        stream: Option<StreamSender>,
    ) -> Attempt {
        let sink = OutputSink::new(stream);
        let cancel = self.shutdown.child_token();
        let ctx = ProbeContext::new(sink.clone(), cancel.clone(), self.probes.clone());
        // A dropped run must not leave the probe working on the blocking pool
        let _cancel_on_drop = cancel.clone().drop_guard();
        let mut task = tokio::task::spawn_blocking(move || probe.run(&ctx));

        let (status, message) = tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(())) => (ExitStatus::Ok, None),
                Ok(Err(e)) => (ExitStatus::Failed, Some(format!("{e:#}"))),
                Err(e) => (ExitStatus::Failed, Some(join_error_message(e))),
            },
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                let _ = tokio::time::timeout(NATIVE_CANCEL_WAIT, &mut task).await;
                (
                    ExitStatus::Timeout,
                    Some(format!("Timed out after {}s", deadline.as_secs())),
                )
            }
            _ = self.shutdown.cancelled() => {
                let _ = tokio::time::timeout(NATIVE_CANCEL_WAIT, &mut task).await;
                (ExitStatus::Failed, Some(SHUTDOWN_MESSAGE.to_string()))
            }
        };

        Attempt {
            mode: ExecutionMode::Native,
            status,
            exit_code: None,
            stdout: sink.snapshot(),
            stderr: Vec::new(),
            message,
        }
    }

    async fn run_external(
        &self,
        descriptor: &ToolDescriptor,
        deadline: Duration,
        work_dir: &std::path::Path,
        stream: Option<StreamSender>,
    ) -> Attempt {
        let Some(script) = descriptor.external_path.as_deref() else {
            return Attempt::without_output(
                ExecutionMode::External,
                ExitStatus::Failed,
                format!("No external script configured for {}", descriptor.id),
            );
        };

        let stdout = OutputSink::new(stream);
        let stderr = stdout.sibling();
        let outcome = self
            .runner
            .run(ScriptRequest {
                tool_id: &descriptor.id,
                script,
                work_dir,
                deadline,
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                shutdown: self.shutdown.clone(),
            })
            .await;

        let (status, exit_code, message) = match outcome {
            ScriptOutcome::Exited(exit) if exit.success() => (ExitStatus::Ok, exit.code(), None),
            ScriptOutcome::Exited(exit) => {
                let tail = external::stderr_tail(
                    &String::from_utf8_lossy(&stderr.snapshot()),
                    STDERR_TAIL_LINES,
                );
                let message = tail.unwrap_or_else(|| match exit.code() {
                    Some(code) => format!("Script exited with code {code}"),
                    None => "Script terminated by a signal".to_string(),
                });
                (ExitStatus::Failed, exit.code(), Some(message))
            }
            ScriptOutcome::TimedOut => (
                ExitStatus::Timeout,
                Some(TIMEOUT_EXIT_CODE),
                Some(format!("Timed out after {}s", deadline.as_secs())),
            ),
            ScriptOutcome::Shutdown => (ExitStatus::Failed, None, Some(SHUTDOWN_MESSAGE.to_string())),
            ScriptOutcome::NotFound(message) => {
                stdout.line(&message);
                (ExitStatus::NotFound, Some(NOT_FOUND_EXIT_CODE), Some(message))
            }
            ScriptOutcome::Rejected(message) | ScriptOutcome::SpawnFailed(message) => {
                (ExitStatus::Failed, None, Some(message))
            }
        };

        Attempt {
            mode: ExecutionMode::External,
            status,
            exit_code,
            stdout: stdout.snapshot(),
            stderr: stderr.snapshot(),
            message,
        }
    }
}

fn resolve_mode(descriptor: &ToolDescriptor, requested: Mode) -> Result<ExecutionMode> {
    let unavailable = || EngineError::ModeUnavailable {
        tool_id: descriptor.id.clone(),
        mode: requested,
    };
    match requested {
        Mode::Auto if descriptor.native_available() => Ok(ExecutionMode::Native),
        Mode::Auto if descriptor.external_available() => Ok(ExecutionMode::External),
        Mode::Native if descriptor.native_available() => Ok(ExecutionMode::Native),
        Mode::External if descriptor.external_available() => Ok(ExecutionMode::External),
        _ => Err(unavailable()),
    }
}

/// Only an `auto` run whose native probe failed outright retries externally
fn should_fall_back(requested: Mode, descriptor: &ToolDescriptor, native: &Attempt) -> bool {
    requested == Mode::Auto
        && native.status == ExitStatus::Failed
        && !native.is_shutdown()
        && descriptor.external_available()
}

fn join_error_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            format!("Probe panicked: {detail}")
        }
        Err(err) => format!("Probe task failed: {err}"),
    }
}

/// stdout, then stderr, then the execution footer
fn assemble_output(descriptor: &ToolDescriptor, attempt: &Attempt) -> Vec<u8> {
    let mut out = if descriptor.output_format == OutputFormat::SpeedTest
        && attempt.mode == ExecutionMode::External
        && !attempt.stdout.is_empty()
    {
        external::format_speed_test(&String::from_utf8_lossy(&attempt.stdout)).into_bytes()
    } else {
        attempt.stdout.clone()
    };

    if !attempt.stderr.is_empty() {
        out.extend_from_slice(b"\n\n=== STDERR ===\n");
        out.extend_from_slice(&attempt.stderr);
    }

    out.extend_from_slice(
        format!(
            "\n\n--- Execution Info ---\nMode: {}\nOS: {}\nMachine: {}\n",
            attempt.mode.describe(),
            std::env::consts::OS,
            std::env::consts::ARCH
        )
        .as_bytes(),
    );
    out
}
