//! Artifact Manager — per-run scratch directories and their lifecycle
//!
//! Every run gets a freshly created directory named
//! `{prefix}{tool_id}_{uuid}` under the artifact root. While a run (or a
//! download) holds an artifact, the sweeper never touches it. The most
//! recently published artifact per tool is remembered so it can be downloaded.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

pub const OUTPUT_FILE: &str = "output.txt";

#[derive(Debug, Clone)]
struct Published {
    id: String,
    path: PathBuf,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    holds: HashMap<String, usize>,
    latest: HashMap<String, Published>,
}

#[derive(Debug)]
pub struct ArtifactManager {
    root: PathBuf,
    prefix: String,
    state: Mutex<State>,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub retained: usize,
    pub failed: usize,
}

impl ArtifactManager {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Arc<Self>> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| EngineError::artifact(&format!("create {}", root.display()), e))?;
        Ok(Arc::new(Self {
            root,
            prefix: prefix.into(),
            state: Mutex::new(State::default()),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hold(&self, id: &str) {
        *self.lock().holds.entry(id.to_string()).or_insert(0) += 1;
    }

    fn release(&self, id: &str) {
        let mut state = self.lock();
        if let Some(count) = state.holds.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                state.holds.remove(id);
            }
        }
    }

    pub fn is_held(&self, id: &str) -> bool {
        self.lock().holds.contains_key(id)
    }

    pub fn held_count(&self) -> usize {
        self.lock().holds.len()
    }

    /// Create a fresh, never-before-used artifact directory and hold it
    pub fn allocate(self: &Arc<Self>, tool_id: &str) -> Result<ArtifactHandle> {
        let id = format!("{}{}_{}", self.prefix, tool_id, uuid::Uuid::new_v4().simple());
        let path = self.root.join(&id);
        // create_dir (not create_dir_all) fails if the name already exists
        fs::create_dir(&path)
            .map_err(|e| EngineError::artifact(&format!("create {}", path.display()), e))?;
        self.hold(&id);
        debug!("Allocated artifact {id}");

        Ok(ArtifactHandle {
            manager: Arc::clone(self),
            id,
            tool_id: tool_id.to_string(),
            path,
            keep: false,
        })
    }

    /// Keep the artifact and make it the latest for its tool. The previous
    /// latest artifact is left on disk for the sweeper.
    pub fn publish(&self, mut handle: ArtifactHandle) -> String {
        handle.keep = true;
        let record = Published {
            id: handle.id.clone(),
            path: handle.path.clone(),
            published_at: Utc::now(),
        };
        let replaced = self.lock().latest.insert(handle.tool_id.clone(), record);
        if let Some(old) = replaced {
            debug!("Artifact {} superseded for {}", old.id, handle.tool_id);
        }
        handle.id.clone()
    }

    /// Id of the latest published artifact for a tool
    pub fn latest(&self, tool_id: &str) -> Option<String> {
        self.lock().latest.get(tool_id).map(|p| p.id.clone())
    }

    pub fn latest_published_at(&self, tool_id: &str) -> Option<DateTime<Utc>> {
        self.lock().latest.get(tool_id).map(|p| p.published_at)
    }

    /// Claim the latest artifact for download. The cache entry is consumed and
    /// the directory is deleted when the lease is dropped.
    pub fn take_latest(self: &Arc<Self>, tool_id: &str) -> Option<ArtifactLease> {
        let published = {
            let mut state = self.lock();
            let published = state.latest.remove(tool_id)?;
            *state.holds.entry(published.id.clone()).or_insert(0) += 1;
            published
        };

        let lease = ArtifactLease {
            manager: Arc::clone(self),
            id: published.id,
            path: published.path,
        };
        if lease.path.is_dir() {
            Some(lease)
        } else {
            None
        }
    }

    pub fn sweep(&self, max_age: Duration) -> SweepReport {
        self.sweep_at(SystemTime::now(), max_age)
    }

    /// Remove unheld artifacts whose modification time is older than `max_age`
    /// relative to `now`. Failures are logged and counted, never returned.
    pub fn sweep_at(&self, now: SystemTime, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Artifact sweep could not read {}: {e}", self.root.display());
                report.failed += 1;
                return report;
            }
        };

        let mut expired = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&self.prefix) {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default());
            match age {
                Ok(age) if age > max_age => expired.push((name, entry.path())),
                Ok(_) => report.retained += 1,
                Err(e) => {
                    warn!("Artifact sweep could not stat {name}: {e}");
                    report.failed += 1;
                }
            }
        }

        // Decide under the lock so a concurrent download cannot claim
        // something we are about to delete
        let doomed: Vec<(String, PathBuf)> = {
            let mut state = self.lock();
            let (held, doomed): (Vec<_>, Vec<_>) = expired
                .into_iter()
                .partition(|(name, _)| state.holds.contains_key(name));
            report.retained += held.len();
            state
                .latest
                .retain(|_, p| !doomed.iter().any(|(name, _)| *name == p.id));
            doomed
        };

        for (name, path) in doomed {
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => {
                    debug!("Swept artifact {name}");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to sweep artifact {name}: {e}");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Start the periodic sweep task
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> SweeperHandle {
        let status = SweeperStatus::default();
        status.alive.store(true, Ordering::SeqCst);

        let manager = Arc::clone(self);
        let task_status = status.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let _alive = AliveGuard(Arc::clone(&task_status.alive));
            info!(
                "Artifact sweeper started (interval {}s, max age {}s)",
                interval.as_secs(),
                max_age.as_secs()
            );
            loop {
                let pass = {
                    let manager = Arc::clone(&manager);
                    tokio::task::spawn_blocking(move || manager.sweep(max_age))
                };
                match pass.await {
                    Ok(report) => {
                        if report.removed > 0 || report.failed > 0 {
                            info!(
                                "Artifact sweep: removed {}, retained {}, failed {}",
                                report.removed, report.retained, report.failed
                            );
                        }
                        task_status.record_sweep();
                    }
                    Err(e) => warn!("Artifact sweep task failed: {e}"),
                }

                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Artifact sweeper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        SweeperHandle {
            task,
            cancel,
            status,
        }
    }
}

/// Flips the liveness flag however the sweeper task ends, including panics
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Shared, cheaply clonable view of the sweeper for health reporting
#[derive(Debug, Clone, Default)]
pub struct SweeperStatus {
    alive: Arc<AtomicBool>,
    last_sweep: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl SweeperStatus {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn last_sweep_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sweep.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record_sweep(&self) {
        *self.last_sweep.lock().unwrap_or_else(|p| p.into_inner()) = Some(Utc::now());
    }
}

pub struct SweeperHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    status: SweeperStatus,
}

impl SweeperHandle {
    pub fn status(&self) -> SweeperStatus {
        self.status.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn last_sweep_at(&self) -> Option<DateTime<Utc>> {
        self.status.last_sweep_at()
    }

    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Artifact sweeper ended abnormally: {e}");
        }
    }
}

/// A held, in-progress artifact. Dropping it without publishing deletes the directory.
#[derive(Debug)]
pub struct ArtifactHandle {
    manager: Arc<ArtifactManager>,
    id: String,
    tool_id: String,
    path: PathBuf,
    keep: bool,
}

impl ArtifactHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn output_path(&self) -> PathBuf {
        self.path.join(OUTPUT_FILE)
    }

    pub async fn write_output(&self, output: &str) -> Result<()> {
        let path = self.output_path();
        tokio::fs::write(&path, output)
            .await
            .map_err(|e| EngineError::artifact(&format!("write {}", path.display()), e))
    }
}

impl Drop for ArtifactHandle {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to discard artifact {}: {e}", self.id);
                }
            }
        }
        self.manager.release(&self.id);
    }
}

/// A download's claim on a published artifact; the artifact is deleted on drop
#[derive(Debug)]
pub struct ArtifactLease {
    manager: Arc<ArtifactManager>,
    id: String,
    path: PathBuf,
}

impl ArtifactLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_output(&self) -> Result<Vec<u8>> {
        let path = self.path.join(OUTPUT_FILE);
        tokio::fs::read(&path)
            .await
            .map_err(|e| EngineError::artifact(&format!("read {}", path.display()), e))
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove downloaded artifact {}: {e}", self.id);
            }
        }
        self.manager.release(&self.id);
    }
}
