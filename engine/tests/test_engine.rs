//! End-to-end runs through the execution engine
//!
//! Each test builds its own registry over a scratch scripts directory so the
//! scenarios do not depend on what the host has installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use diagnostix::artifacts::ArtifactManager;
use diagnostix::config::{EngineConfig, ProbeSettings};
use diagnostix::engine::{Engine, ExecutionRequest, ExitStatus};
use diagnostix::error::EngineError;
use diagnostix::probes::NativeProbe;
use diagnostix::registry::{Category, ExecutionMode, Mode, OutputFormat, Registry, ToolDescriptor};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn tool(id: &str, native: Option<NativeProbe>, script: Option<PathBuf>) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        label: id.to_string(),
        description: format!("{id} test tool"),
        category: Category::System,
        native,
        external_path: script,
        default_mode: if native.is_some() { Mode::Auto } else { Mode::External },
        requires_elevation: false,
        output_format: OutputFormat::Plain,
    }
}

struct Harness {
    dir: TempDir,
    artifacts: Arc<ArtifactManager>,
    engine: Arc<Engine>,
}

impl Harness {
    fn new(tools: impl FnOnce(&Path) -> Vec<ToolDescriptor>) -> Self {
        Self::with_probes(
            ProbeSettings {
                cpu_stress_secs: 1,
                memory_stress_max_mb: 8,
                memory_stress_fraction: 0.01,
            },
            tools,
        )
    }

    fn with_probes(probes: ProbeSettings, tools: impl FnOnce(&Path) -> Vec<ToolDescriptor>) -> Self {
        let dir = TempDir::new().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir(&scripts).unwrap();
        let registry = Registry::from_descriptors(tools(&scripts)).unwrap();
        let artifacts = ArtifactManager::new(dir.path().join("artifacts"), "diagnostix_").unwrap();
        let config = EngineConfig {
            scripts_dir: Some(scripts),
            default_deadline_secs: 30,
            max_deadline_secs: 60,
            kill_grace_ms: 300,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::new(
            Arc::new(registry),
            Arc::clone(&artifacts),
            config,
            probes,
            CancellationToken::new(),
        ));
        Self {
            dir,
            artifacts,
            engine,
        }
    }

    fn artifact_count(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("artifacts"))
            .unwrap()
            .count()
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// A script that prints progress, then overruns a 2 second deadline
#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let harness = Harness::new(|scripts| {
        let path = script(scripts, "disk_diagnostics.sh", "echo 50%\nsleep 5\necho 100%\n");
        vec![tool("disk_diagnostics", None, Some(path))]
    });

    let result = harness
        .engine
        .execute(
            ExecutionRequest::new("disk_diagnostics")
                .with_mode(Mode::External)
                .with_deadline(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(result.exit_status, ExitStatus::Timeout);
    assert_eq!(result.mode_used, ExecutionMode::External);
    assert_eq!(result.exit_code, Some(124));
    assert!(result.output.contains("50%"));
    assert!(!result.output.contains("100%"));
    assert!(
        (1900..4500).contains(&result.duration_ms),
        "duration {}ms",
        result.duration_ms
    );
    assert!(result.artifact_id.is_some());
}

#[tokio::test]
async fn test_unknown_tool_spawns_nothing() {
    let harness = Harness::new(|scripts| {
        let path = script(scripts, "system_overview.sh", "echo hi\n");
        vec![tool("system_overview", None, Some(path))]
    });

    let err = harness
        .engine
        .execute(ExecutionRequest::new("unknown_tool"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(ref id) if id == "unknown_tool"));

    // Lookup is exact and case-sensitive
    assert!(harness
        .engine
        .execute(ExecutionRequest::new("System_Overview"))
        .await
        .is_err());
    assert_eq!(harness.artifact_count(), 0);
}

#[tokio::test]
async fn test_external_mode_without_script() {
    let harness = Harness::new(|_| {
        vec![tool("network_diagnostics", Some(NativeProbe::About), None)]
    });

    let err = harness
        .engine
        .execute(ExecutionRequest::new("network_diagnostics").with_mode(Mode::External))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::ModeUnavailable {
            mode: Mode::External,
            ..
        }
    ));
    assert_eq!(harness.artifact_count(), 0);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_artifacts() {
    let harness = Harness::new(|scripts| {
        let path = script(scripts, "about.sh", "echo about\n");
        vec![tool("about_diagnostix", None, Some(path))]
    });

    let result = harness
        .engine
        .execute(ExecutionRequest::new("about_diagnostix"))
        .await
        .unwrap();
    let artifact = harness
        .dir
        .path()
        .join("artifacts")
        .join(result.artifact_id.unwrap());
    assert!(artifact.join("output.txt").is_file());

    let now = SystemTime::now();
    let max_age = Duration::from_secs(30 * 60);

    let report = harness.artifacts.sweep_at(now + Duration::from_secs(10 * 60), max_age);
    assert_eq!(report.removed, 0);
    assert!(artifact.exists());

    let report = harness.artifacts.sweep_at(now + Duration::from_secs(45 * 60), max_age);
    assert_eq!(report.removed, 1);
    assert!(!artifact.exists());
}

#[tokio::test]
async fn test_concurrent_runs_get_distinct_artifacts() {
    let harness = Harness::new(|scripts| {
        let path = script(
            scripts,
            "master_collect.sh",
            "echo collecting\necho bundle > \"$DIAGNOSTIX_ARTIFACT_DIR/bundle.txt\"\nsleep 1\n",
        );
        vec![tool("master_collect", None, Some(path))]
    });

    let first = {
        let engine = Arc::clone(&harness.engine);
        tokio::spawn(async move { engine.execute(ExecutionRequest::new("master_collect")).await })
    };
    let second = {
        let engine = Arc::clone(&harness.engine);
        tokio::spawn(async move { engine.execute(ExecutionRequest::new("master_collect")).await })
    };
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first.exit_status, ExitStatus::Ok);
    assert_eq!(second.exit_status, ExitStatus::Ok);
    let first_id = first.artifact_id.unwrap();
    let second_id = second.artifact_id.unwrap();
    assert_ne!(first_id, second_id);

    let root = harness.dir.path().join("artifacts");
    for id in [&first_id, &second_id] {
        assert!(root.join(id).join("output.txt").is_file());
        assert!(root.join(id).join("bundle.txt").is_file());
    }
}

#[tokio::test]
async fn test_native_and_external_normalize_alike() {
    let harness = Harness::new(|scripts| {
        let path = script(
            scripts,
            "noisy.sh",
            "printf 'loading\\rdone\\n'\nprintf '\\033[1;32mPASS\\033[0m\\n'\nprintf 'bad \\377 byte\\n'\n",
        );
        vec![tool("noisy", Some(NativeProbe::About), Some(path))]
    });

    let external = harness
        .engine
        .execute(ExecutionRequest::new("noisy").with_mode(Mode::External))
        .await
        .unwrap();
    assert_eq!(external.mode_used, ExecutionMode::External);
    assert!(external.output.starts_with("done\nPASS\nbad \u{fffd} byte\n"));

    let native = harness
        .engine
        .execute(ExecutionRequest::new("noisy").with_mode(Mode::Native))
        .await
        .unwrap();
    assert_eq!(native.mode_used, ExecutionMode::Native);
    assert_eq!(native.exit_status, ExitStatus::Ok);

    for result in [&external, &native] {
        assert!(!result.output.contains('\x1b'));
        assert!(!result.output.contains('\r'));
        assert_eq!(
            diagnostix::normalize::strip_control_sequences(&result.output),
            result.output
        );
        assert!(result.output.contains(&format!(
            "--- Execution Info ---\nMode: {}\n",
            result.mode_used.describe()
        )));
    }
}

#[tokio::test]
async fn test_native_timeout_keeps_partial_output() {
    let probes = ProbeSettings {
        cpu_stress_secs: 10,
        memory_stress_max_mb: 8,
        memory_stress_fraction: 0.01,
    };
    let harness = Harness::with_probes(probes, |_| {
        vec![tool("cpu_stress_test", Some(NativeProbe::CpuStressTest), None)]
    });

    let result = harness
        .engine
        .execute(
            ExecutionRequest::new("cpu_stress_test")
                .with_mode(Mode::Native)
                .with_deadline(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(result.mode_used, ExecutionMode::Native);
    assert_eq!(result.exit_status, ExitStatus::Timeout);
    assert_eq!(result.exit_code, None);
    assert!(
        (1900..4500).contains(&result.duration_ms),
        "took {}ms",
        result.duration_ms
    );
    assert!(result.output.contains("s: CPU usage"), "{}", result.output);
    assert!(result.output.contains("Stress test cancelled"));
    assert!(result.artifact_id.is_some());
}

#[tokio::test]
async fn test_native_probe_through_engine() {
    let harness = Harness::new(|_| vec![tool("gpu_diagnostics", Some(NativeProbe::GpuDiagnostics), None)]);

    let result = harness
        .engine
        .execute(ExecutionRequest::new("gpu_diagnostics").with_mode(Mode::Native))
        .await
        .unwrap();
    assert_eq!(result.mode_used, ExecutionMode::Native);
    assert_eq!(result.exit_status, ExitStatus::Ok);
    assert!(result.output.contains("GPU DIAGNOSTICS"));
    assert!(result.output.contains("--- Execution Info ---"));
}

#[tokio::test]
async fn test_builtin_registry_resolves_every_tool() {
    let registry = Registry::builtin(Some(Path::new("/opt/diagnostix/scripts")));
    for id in registry.ids() {
        assert_eq!(registry.resolve(id).unwrap().id, id);
    }
    assert_eq!(registry.tool_count(), 14);
}
