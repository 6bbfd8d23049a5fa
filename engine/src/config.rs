//! DiagnOStiX configuration loading and parsing

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EngineError;

const DEFAULT_CONFIG_PATH: &str = "/etc/diagnostix/config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DiagnostixConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub probes: ProbeSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the external diagnostic scripts. Unset means native-only.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: Option<PathBuf>,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_deadline_secs")]
    pub default_deadline_secs: u64,
    #[serde(default = "default_max_deadline_secs")]
    pub max_deadline_secs: u64,
    /// Time between SIGTERM and SIGKILL when a script overruns its deadline
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            shell: default_shell(),
            default_deadline_secs: default_deadline_secs(),
            max_deadline_secs: default_max_deadline_secs(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl EngineConfig {
    /// Configured scripts directory; an empty string disables external probes
    pub fn scripts_dir(&self) -> Option<&Path> {
        self.scripts_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_secs(self.default_deadline_secs)
    }

    pub fn max_deadline(&self) -> Duration {
        Duration::from_secs(self.max_deadline_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_artifact_prefix")]
    pub prefix: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_age")]
    pub max_age_minutes: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            prefix: default_artifact_prefix(),
            sweep_interval_secs: default_sweep_interval(),
            max_age_minutes: default_max_age(),
        }
    }
}

impl ArtifactConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_minutes.saturating_mul(60))
    }
}

/// Knobs for the native probes that do real work (stress tests)
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_cpu_stress_secs")]
    pub cpu_stress_secs: u64,
    #[serde(default = "default_memory_stress_max_mb")]
    pub memory_stress_max_mb: u64,
    /// Fraction of currently available memory the memory stress test may allocate
    #[serde(default = "default_memory_stress_fraction")]
    pub memory_stress_fraction: f64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            cpu_stress_secs: default_cpu_stress_secs(),
            memory_stress_max_mb: default_memory_stress_max_mb(),
            memory_stress_fraction: default_memory_stress_fraction(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_bind_addr() -> String { "0.0.0.0:8000".into() }
fn default_scripts_dir() -> Option<PathBuf> { Some(PathBuf::from("scripts")) }
fn default_shell() -> String { "bash".into() }
fn default_deadline_secs() -> u64 { 60 }
fn default_max_deadline_secs() -> u64 { 600 }
fn default_kill_grace_ms() -> u64 { 500 }
fn default_artifact_dir() -> PathBuf { std::env::temp_dir().join("diagnostix") }
fn default_artifact_prefix() -> String { "diagnostix_".into() }
fn default_sweep_interval() -> u64 { 300 }
fn default_max_age() -> u64 { 30 }
fn default_cpu_stress_secs() -> u64 { 5 }
fn default_memory_stress_max_mb() -> u64 { 512 }
fn default_memory_stress_fraction() -> f64 { 0.3 }
fn default_log_level() -> String { "info".into() }

impl DiagnostixConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DiagnostixConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a diagnostic run unbounded or the sweeper spin
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.engine.default_deadline_secs == 0 {
            return Err(EngineError::Config("engine.default_deadline_secs must be > 0".into()));
        }
        if self.engine.max_deadline_secs < self.engine.default_deadline_secs {
            return Err(EngineError::Config(
                "engine.max_deadline_secs must be >= engine.default_deadline_secs".into(),
            ));
        }
        if self.engine.shell.trim().is_empty() {
            return Err(EngineError::Config("engine.shell must not be empty".into()));
        }
        if self.artifacts.sweep_interval_secs == 0 {
            return Err(EngineError::Config("artifacts.sweep_interval_secs must be > 0".into()));
        }
        if self.artifacts.prefix.is_empty() {
            return Err(EngineError::Config("artifacts.prefix must not be empty".into()));
        }
        if !(self.probes.memory_stress_fraction > 0.0 && self.probes.memory_stress_fraction <= 1.0) {
            return Err(EngineError::Config(
                "probes.memory_stress_fraction must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Where the configuration came from. Reported by the caller once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file was missing; built-in defaults are in use
    Defaults(PathBuf),
}

/// Load configuration from $DIAGNOSTIX_CONFIG or /etc/diagnostix/config.toml
pub fn load_config() -> Result<(DiagnostixConfig, ConfigSource)> {
    let config_path =
        std::env::var("DIAGNOSTIX_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(Path::new(&config_path))
}

pub fn load_config_from(path: &Path) -> Result<(DiagnostixConfig, ConfigSource)> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config = DiagnostixConfig::from_toml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    } else {
        Ok((DiagnostixConfig::default(), ConfigSource::Defaults(path.to_path_buf())))
    }
}
