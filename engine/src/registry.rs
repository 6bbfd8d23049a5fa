//! Probe Registry — maps tool identifiers to probe descriptors
//!
//! The table is fixed at startup. Script paths are built only from the
//! literal file names below, never from request input.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::probes::NativeProbe;

/// Requested execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Auto,
    Native,
    External,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Auto => "auto",
            Mode::Native => "native",
            Mode::External => "external",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts the legacy `python`/`bash` spellings used by existing clients
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Mode::Auto),
            "native" | "python" => Ok(Mode::Native),
            "external" | "bash" => Ok(Mode::External),
            other => Err(format!(
                "Invalid mode '{other}' (expected auto, native, external, python or bash)"
            )),
        }
    }
}

/// Mode a run actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Native,
    External,
}

impl ExecutionMode {
    pub fn describe(&self) -> &'static str {
        match self {
            ExecutionMode::Native => "Native (in-process)",
            ExecutionMode::External => "External script",
        }
    }
}

impl From<ExecutionMode> for Mode {
    fn from(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::Native => Mode::Native,
            ExecutionMode::External => Mode::External,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    System,
    Network,
    Storage,
    Stress,
    Repair,
    Other,
}

/// Post-processing applied to external probe stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Plain,
    SpeedTest,
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub id: String,
    pub label: String,
    pub description: String,
    pub category: Category,
    pub native: Option<NativeProbe>,
    pub external_path: Option<PathBuf>,
    pub default_mode: Mode,
    pub requires_elevation: bool,
    pub output_format: OutputFormat,
}

impl ToolDescriptor {
    pub fn native_available(&self) -> bool {
        self.native.is_some()
    }

    pub fn external_available(&self) -> bool {
        self.external_path.is_some()
    }

    /// Concrete modes this tool can run in
    pub fn modes(&self) -> Vec<ExecutionMode> {
        let mut modes = Vec::with_capacity(2);
        if self.native_available() {
            modes.push(ExecutionMode::Native);
        }
        if self.external_available() {
            modes.push(ExecutionMode::External);
        }
        modes
    }

    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            id: self.id.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            category: self.category,
            modes: self.modes(),
            default_mode: self.default_mode,
            requires_elevation: self.requires_elevation,
        }
    }
}

/// Read-only view of a descriptor for `/api/tools`
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub id: String,
    pub label: String,
    pub description: String,
    pub category: Category,
    pub modes: Vec<ExecutionMode>,
    pub default_mode: Mode,
    pub requires_elevation: bool,
}

/// Read-only tool registry, shared across requests without locking
#[derive(Debug)]
pub struct Registry {
    tools: HashMap<String, ToolDescriptor>,
}

impl Registry {
    /// Build a registry from explicit descriptors, rejecting duplicate ids
    pub fn from_descriptors(descriptors: Vec<ToolDescriptor>) -> Result<Self> {
        let mut tools = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if tools.contains_key(&descriptor.id) {
                return Err(EngineError::Config(format!(
                    "duplicate tool id '{}'",
                    descriptor.id
                )));
            }
            tools.insert(descriptor.id.clone(), descriptor);
        }
        Ok(Self { tools })
    }

    /// The built-in DiagnOStiX tool table
    pub fn builtin(scripts_dir: Option<&Path>) -> Self {
        let tools = BUILTIN_TOOLS
            .iter()
            .map(|entry| {
                let descriptor = entry.descriptor(scripts_dir);
                (descriptor.id.clone(), descriptor)
            })
            .collect::<HashMap<_, _>>();

        info!(
            "Registered {} built-in tools (scripts: {})",
            tools.len(),
            scripts_dir
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "disabled".into())
        );
        Self { tools }
    }

    /// Exact, case-sensitive lookup
    pub fn resolve(&self, tool_id: &str) -> Result<&ToolDescriptor> {
        self.tools
            .get(tool_id)
            .ok_or_else(|| EngineError::NotFound(tool_id.to_string()))
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    /// All tools, sorted by id
    pub fn snapshot(&self) -> Vec<ToolSummary> {
        let mut tools: Vec<ToolSummary> = self.tools.values().map(|t| t.summary()).collect();
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        tools
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn native_probe_count(&self) -> usize {
        self.tools.values().filter(|t| t.native_available()).count()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

struct BuiltinTool {
    id: &'static str,
    label: &'static str,
    description: &'static str,
    category: Category,
    native: Option<NativeProbe>,
    script: &'static str,
    requires_elevation: bool,
    output_format: OutputFormat,
}

impl BuiltinTool {
    fn descriptor(&self, scripts_dir: Option<&Path>) -> ToolDescriptor {
        ToolDescriptor {
            id: self.id.to_string(),
            label: self.label.to_string(),
            description: self.description.to_string(),
            category: self.category,
            native: self.native,
            external_path: scripts_dir.map(|dir| dir.join(self.script)),
            default_mode: if self.native.is_some() {
                Mode::Auto
            } else {
                Mode::External
            },
            requires_elevation: self.requires_elevation,
            output_format: self.output_format,
        }
    }
}

const fn tool(
    id: &'static str,
    label: &'static str,
    description: &'static str,
    category: Category,
    native: Option<NativeProbe>,
    script: &'static str,
) -> BuiltinTool {
    BuiltinTool {
        id,
        label,
        description,
        category,
        native,
        script,
        requires_elevation: false,
        output_format: OutputFormat::Plain,
    }
}

const BUILTIN_TOOLS: &[BuiltinTool] = &[
    tool(
        "about_diagnostix",
        "About DiagnOStiX",
        "Version info and project details.",
        Category::Other,
        Some(NativeProbe::About),
        "about_diagnostix.sh",
    ),
    tool(
        "system_overview",
        "System overview",
        "Summary of hardware, kernel, storage, and memory.",
        Category::System,
        Some(NativeProbe::SystemOverview),
        "system_overview.sh",
    ),
    tool(
        "hardware_health",
        "Hardware health",
        "CPU, RAM, SMART, and sensor status.",
        Category::System,
        Some(NativeProbe::HardwareHealth),
        "hardware_health.sh",
    ),
    tool(
        "disk_diagnostics",
        "Disk diagnostics",
        "Partition layout and disk checks.",
        Category::Storage,
        Some(NativeProbe::DiskDiagnostics),
        "disk_diagnostics.sh",
    ),
    tool(
        "network_diagnostics",
        "Network diagnostics",
        "Interfaces, routes, DNS, and connectivity.",
        Category::Network,
        Some(NativeProbe::NetworkDiagnostics),
        "network_diagnostics.sh",
    ),
    tool(
        "memory_stress_test",
        "Memory stress test",
        "Light RAM test.",
        Category::Stress,
        Some(NativeProbe::MemoryStressTest),
        "memory_stress_test.sh",
    ),
    tool(
        "cpu_stress_test",
        "CPU stress test",
        "Load test for CPU stability.",
        Category::Stress,
        Some(NativeProbe::CpuStressTest),
        "cpu_stress_test.sh",
    ),
    tool(
        "gpu_diagnostics",
        "GPU diagnostics",
        "Identify GPU and driver state.",
        Category::System,
        Some(NativeProbe::GpuDiagnostics),
        "gpu_diagnostics.sh",
    ),
    tool(
        "kraken_repo_scanner",
        "Kraken Repo Scanner",
        "Scan system for Git repositories and integrity issues (Linux only).",
        Category::Other,
        None,
        "kraken_repo_scanner.sh",
    ),
    BuiltinTool {
        output_format: OutputFormat::SpeedTest,
        ..tool(
            "network_speed_test",
            "Network speed test",
            "Download test file and measure throughput.",
            Category::Network,
            None,
            "network_speed_test.sh",
        )
    },
    BuiltinTool {
        requires_elevation: true,
        ..tool(
            "quick_repair",
            "Quick repair",
            "Common repair actions (Linux only).",
            Category::Repair,
            None,
            "quick_repair.sh",
        )
    },
    tool(
        "boot_diagnostics",
        "Boot diagnostics",
        "UEFI/BIOS mode, fstab, and boot logs (Linux only).",
        Category::System,
        None,
        "boot_diagnostics.sh",
    ),
    tool(
        "master_collect",
        "Full collection bundle",
        "Gather logs and diagnostic info into a bundle (Linux only).",
        Category::Other,
        None,
        "master_collect.sh",
    ),
    tool(
        "tech_support_mode",
        "Tech Support Mode",
        "Run everything and create a full support bundle (Linux only).",
        Category::Other,
        None,
        "tech_support_mode.sh",
    ),
];
