//! HTTP router tests driven through `tower::ServiceExt::oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use diagnostix::artifacts::{ArtifactManager, SweeperHandle};
use diagnostix::config::{EngineConfig, ProbeSettings};
use diagnostix::engine::Engine;
use diagnostix::health::HealthReporter;
use diagnostix::probes::NativeProbe;
use diagnostix::registry::{Category, Mode, OutputFormat, Registry, ToolDescriptor};
use diagnostix::server::{router, AppState};

struct App {
    _dir: TempDir,
    router: Router,
    sweeper: SweeperHandle,
}

fn tool(id: &str, native: Option<NativeProbe>, script: Option<PathBuf>) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        label: id.to_string(),
        description: String::new(),
        category: Category::Other,
        native,
        external_path: script,
        default_mode: if native.is_some() { Mode::Auto } else { Mode::External },
        requires_elevation: false,
        output_format: OutputFormat::Plain,
    }
}

fn app() -> App {
    let dir = TempDir::new().unwrap();
    let scripts = dir.path().join("scripts");
    std::fs::create_dir(&scripts).unwrap();
    let write = |name: &str, body: &str| -> PathBuf {
        let path = scripts.join(name);
        std::fs::write(&path, body).unwrap();
        path
    };

    let tools = vec![
        tool("about_diagnostix", Some(NativeProbe::About), None),
        tool("boot_diagnostics", None, Some(write("boot.sh", "echo boot ok\n"))),
        tool(
            "slow_tool",
            None,
            Some(write("slow.sh", "echo 50%\nsleep 5\necho 100%\n")),
        ),
        tool(
            "stream_tool",
            None,
            Some(write("stream.sh", "echo first\nsleep 0.2\necho second\n")),
        ),
    ];
    let registry = Arc::new(Registry::from_descriptors(tools).unwrap());
    let artifacts = ArtifactManager::new(dir.path().join("artifacts"), "diagnostix_").unwrap();
    let shutdown = CancellationToken::new();
    let sweeper = artifacts.spawn_sweeper(
        Duration::from_secs(300),
        Duration::from_secs(1800),
        shutdown.child_token(),
    );
    let config = EngineConfig {
        scripts_dir: Some(scripts.clone()),
        kill_grace_ms: 200,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::new(
        Arc::clone(&registry),
        Arc::clone(&artifacts),
        config,
        ProbeSettings::default(),
        shutdown,
    ));
    let state = AppState {
        engine,
        health: HealthReporter::new(registry, artifacts, sweeper.status()),
    };
    App {
        _dir: dir,
        router: router(state),
        sweeper,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(router, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn test_run_text_response() {
    let app = app();
    let (status, headers, body) = get(&app.router, "/run/boot_diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    assert!(body.starts_with("Tool: boot_diagnostics\nMode: External script\nStatus: ok\nExit code: 0\n"));
    assert!(body.contains("boot ok\n"));
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_run_json_response() {
    let app = app();
    let (status, json) = get_json(&app.router, "/run/about_diagnostix?format=json&mode=python").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tool_id"], "about_diagnostix");
    assert_eq!(json["mode_used"], "native");
    assert_eq!(json["exit_status"], "ok");
    assert!(json["artifact_id"].is_string());
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_timeout_is_reported_with_200() {
    let app = app();
    let (status, json) =
        get_json(&app.router, "/run/slow_tool?format=json&deadline_secs=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["exit_status"], "timeout");
    let output = json["output"].as_str().unwrap();
    assert!(output.contains("50%"));
    assert!(!output.contains("100%"));
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_unknown_tool_is_404() {
    let app = app();
    let (status, json) = get_json(&app.router, "/run/unknown_tool").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "not_found");
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_bad_and_unsupported_modes_are_400() {
    let app = app();
    let (status, json) = get_json(&app.router, "/run/boot_diagnostics?mode=turbo").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");

    let (status, json) = get_json(&app.router, "/run/about_diagnostix?mode=bash").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "mode_unavailable");
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_stream_delivers_output_then_trailer() {
    let app = app();
    let (status, _, body) = get(&app.router, "/run/stream_tool?stream=true").await;
    assert_eq!(status, StatusCode::OK);
    let first = body.find("first").unwrap();
    let second = body.find("second").unwrap();
    let trailer = body.find("--- Run Complete ---").unwrap();
    assert!(first < second && second < trailer);
    assert!(body.contains("Status: ok"));
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_download_consumes_latest_output() {
    let app = app();
    let (status, _, _) = get(&app.router, "/download/boot_diagnostics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    get(&app.router, "/run/boot_diagnostics").await;
    let (status, headers, body) = get(&app.router, "/download/boot_diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"boot_diagnostics_output.txt\""
    );
    assert!(body.starts_with("boot ok\n"));

    let (status, _, _) = get(&app.router, "/download/boot_diagnostics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = get_json(&app.router, "/download/no_such_tool").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
    app.sweeper.shutdown().await;
}

#[tokio::test]
async fn test_health_and_tools() {
    let app = app();
    let (status, json) = get_json(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["tools"], 4);
    assert_eq!(json["native_probes_available"], 1);

    let (status, json) = get_json(&app.router, "/api/tools").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["about_diagnostix", "boot_diagnostics", "slow_tool", "stream_tool"]);
    assert_eq!(json["tools"][0]["modes"], serde_json::json!(["native"]));
    assert_eq!(json["platform"]["os"], std::env::consts::OS);

    app.sweeper.shutdown().await;
    let (_, json) = get_json(&app.router, "/health").await;
    assert_eq!(json["status"], "degraded");
}

