//! External Probe Adapter — runs a registry-known script as an unprivileged child
//!
//! The child gets a scrubbed environment, its own process group, a closed
//! stdin and the run's artifact directory as both HOME and working directory.
//! stdout and stderr are pumped line by line into separate sinks so output
//! survives a deadline kill.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::sink::OutputSink;

const SAFE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const PUMP_DRAIN: Duration = Duration::from_secs(2);

/// How a script run ended
#[derive(Debug)]
pub enum ScriptOutcome {
    Exited(ExitStatus),
    TimedOut,
    Shutdown,
    /// The script file is missing or not a regular file
    NotFound(String),
    /// The script resolves outside the scripts directory
    Rejected(String),
    SpawnFailed(String),
}

/// One script invocation
pub struct ScriptRequest<'a> {
    pub tool_id: &'a str,
    pub script: &'a Path,
    pub work_dir: &'a Path,
    pub deadline: Duration,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: String,
    scripts_dir: Option<PathBuf>,
    kill_grace: Duration,
}

impl ScriptRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            scripts_dir: config.scripts_dir().map(Path::to_path_buf),
            kill_grace: config.kill_grace(),
        }
    }

    /// Resolve the script to a canonical path that is a regular file inside
    /// the scripts directory
    pub fn validate(&self, script: &Path) -> Result<PathBuf, ScriptOutcome> {
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());

        let is_file = std::fs::metadata(script).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            return Err(ScriptOutcome::NotFound(format!("Script not found: {name}")));
        }
        let canonical = script
            .canonicalize()
            .map_err(|e| ScriptOutcome::NotFound(format!("Script not found: {name} ({e})")))?;

        if let Some(dir) = &self.scripts_dir {
            let root = dir.canonicalize().map_err(|e| {
                ScriptOutcome::NotFound(format!(
                    "Scripts directory {} unavailable: {e}",
                    dir.display()
                ))
            })?;
            if !canonical.starts_with(&root) {
                return Err(ScriptOutcome::Rejected(format!(
                    "Script {name} resolves outside {}",
                    root.display()
                )));
            }
        }
        Ok(canonical)
    }

    fn command(&self, script: &Path, request: &ScriptRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(script)
            .current_dir(request.work_dir)
            .env_clear()
            .env("PATH", SAFE_PATH)
            .env("HOME", request.work_dir)
            .env("LANG", "C.UTF-8")
            .env("TERM", "dumb")
            .env("DIAGNOSTIX_TOOL_ID", request.tool_id)
            .env("DIAGNOSTIX_ARTIFACT_DIR", request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        cmd
    }

    pub async fn run(&self, request: ScriptRequest<'_>) -> ScriptOutcome {
        let script = match self.validate(request.script) {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };

        info!(
            "Running script {} for {} (deadline {}s)",
            script.display(),
            request.tool_id,
            request.deadline.as_secs()
        );

        let mut child = match self.command(&script, &request).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {} for {}: {e}", self.shell, request.tool_id);
                return ScriptOutcome::SpawnFailed(format!("Failed to start {}: {e}", self.shell));
            }
        };
        let pid = child.id();

        let mut stdout_task = spawn_pump(child.stdout.take(), request.stdout.clone());
        let mut stderr_task = spawn_pump(child.stderr.take(), request.stderr.clone());
        let guard = GroupGuard {
            pid,
            pumps: vec![stdout_task.abort_handle(), stderr_task.abort_handle()],
            armed: true,
        };

        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => ScriptOutcome::Exited(status),
                Err(e) => ScriptOutcome::SpawnFailed(format!("Failed to wait for script: {e}")),
            },
            _ = tokio::time::sleep(request.deadline) => ScriptOutcome::TimedOut,
            _ = request.shutdown.cancelled() => ScriptOutcome::Shutdown,
        };

        match &outcome {
            ScriptOutcome::Exited(_) => {
                // Background jobs the script left behind still hold the pipes
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
            _ => {
                warn!("Terminating {} ({:?})", request.tool_id, outcome);
                self.terminate(&mut child, pid).await;
            }
        }

        let drained = tokio::time::timeout(PUMP_DRAIN, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await;
        if drained.is_err() {
            warn!("Output pumps for {} did not finish, abandoning", request.tool_id);
            stdout_task.abort();
            stderr_task.abort();
        }

        guard.disarm();
        outcome
    }

    /// SIGTERM the whole group, then SIGKILL after the grace period
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        if tokio::time::timeout(self.kill_grace, child.wait()).await.is_err() {
            debug!("Grace period elapsed, sending SIGKILL");
        }
        signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        if let Err(e) = child.kill().await {
            debug!("Child already reaped: {e}");
        }
    }
}

/// Kills the process group and the pumps when a run is dropped before it
/// finished. `kill_on_drop` alone only reaches the shell, not its children.
struct GroupGuard {
    pid: Option<u32>,
    pumps: Vec<AbortHandle>,
    armed: bool,
}

impl GroupGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Script run abandoned, killing process group {:?}", self.pid);
        signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    let Some(pid) = pid else { return };
    let pgid = nix::unistd::Pid::from_raw(pid as i32);
    match nix::sys::signal::killpg(pgid, signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {signal:?} to process group {pid}: {e}"),
    }
}

fn spawn_pump<R>(reader: Option<R>, sink: OutputSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(reader) = reader else { return };
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => sink.write(&line),
                Err(e) => {
                    warn!("Error reading script output: {e}");
                    break;
                }
            }
        }
    })
}

/// Last few lines of stderr, for the result message
pub fn stderr_tail(stderr: &str, lines: usize) -> Option<String> {
    let tail: Vec<&str> = stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if tail.is_empty() {
        return None;
    }
    Some(tail[tail.len().saturating_sub(lines)..].join("\n"))
}

static DOWNLOAD_SPEED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Approximate download speed:\s*([0-9.]+)").expect("download pattern is valid")
});
static UPLOAD_SPEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)upload speed:\s*([0-9.]+)").expect("upload pattern is valid"));

/// Summarise the speed test script's stdout. The script reports download in
/// MB/s and upload in Mbps.
pub fn format_speed_test(raw: &str) -> String {
    let download_mb = DOWNLOAD_SPEED
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("0");
    let download_mbps = download_mb.parse::<f64>().map(|v| v * 8.0).unwrap_or(0.0);
    let upload_mbps = UPLOAD_SPEED
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);

    format!(
        "=== Network Speed Test ===\n\n\
         Download: {download_mbps:.1} Mbps ({download_mb} MB/s)\n\
         Upload: {upload_mbps:.1} Mbps\n\n\
         --- Raw Output ---\n{raw}"
    )
}
