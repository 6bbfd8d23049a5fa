//! Status and health reporting for `/health` and `/api/tools`
//!
//! Health never fails: a broken subsystem turns the overall status to
//! `degraded` and is named in the payload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::artifacts::{ArtifactManager, SweeperStatus};
use crate::registry::{Registry, ToolSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsystemHealth {
    pub name: &'static str,
    pub healthy: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub version: &'static str,
    pub platform: Platform,
    pub tools: usize,
    pub native_probes_available: usize,
    /// Names of the subsystems that made the report degraded
    pub failing: Vec<&'static str>,
    pub subsystems: Vec<SubsystemHealth>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsPayload {
    pub tools: Vec<ToolSummary>,
    pub native_probes_available: usize,
    pub platform: Platform,
}

#[derive(Clone)]
pub struct HealthReporter {
    registry: Arc<Registry>,
    artifacts: Arc<ArtifactManager>,
    sweeper: SweeperStatus,
}

impl HealthReporter {
    pub fn new(registry: Arc<Registry>, artifacts: Arc<ArtifactManager>, sweeper: SweeperStatus) -> Self {
        Self {
            registry,
            artifacts,
            sweeper,
        }
    }

    pub fn health(&self) -> HealthReport {
        let registry = SubsystemHealth {
            name: "registry",
            healthy: !self.registry.is_empty(),
            detail: format!(
                "{} tools, {} with native probes",
                self.registry.tool_count(),
                self.registry.native_probe_count()
            ),
        };

        let sweeper = SubsystemHealth {
            name: "artifact_sweeper",
            healthy: self.sweeper.is_alive(),
            detail: match (self.sweeper.is_alive(), self.sweeper.last_sweep_at()) {
                (false, _) => "sweeper task is not running".to_string(),
                (true, Some(at)) => format!(
                    "last sweep {}, {} artifacts held in {}",
                    at.to_rfc3339(),
                    self.artifacts.held_count(),
                    self.artifacts.root().display()
                ),
                (true, None) => "waiting for first sweep".to_string(),
            },
        };

        let subsystems = vec![registry, sweeper];
        let failing: Vec<&'static str> = subsystems
            .iter()
            .filter(|s| !s.healthy)
            .map(|s| s.name)
            .collect();

        HealthReport {
            status: if failing.is_empty() {
                HealthState::Ok
            } else {
                HealthState::Degraded
            },
            version: env!("CARGO_PKG_VERSION"),
            platform: Platform::current(),
            tools: self.registry.tool_count(),
            native_probes_available: self.registry.native_probe_count(),
            failing,
            subsystems,
            checked_at: Utc::now(),
        }
    }

    pub fn tools(&self) -> ToolsPayload {
        ToolsPayload {
            tools: self.registry.snapshot(),
            native_probes_available: self.registry.native_probe_count(),
            platform: Platform::current(),
        }
    }
}
