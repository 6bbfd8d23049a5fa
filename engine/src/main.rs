//! DiagnOStiX server — runs diagnostics on request over HTTP
//!
//! Startup: config → logging → registry → artifact store and sweeper →
//! engine → HTTP server. Shutdown on SIGINT or SIGTERM cancels in-flight runs
//! and stops the sweeper.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use diagnostix::artifacts::ArtifactManager;
use diagnostix::config::{self, ConfigSource};
use diagnostix::engine::Engine;
use diagnostix::health::HealthReporter;
use diagnostix::logging;
use diagnostix::registry::Registry;
use diagnostix::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = config::load_config()?;
    logging::init(&config.logging)?;

    info!("DiagnOStiX {} starting...", env!("CARGO_PKG_VERSION"));
    match &source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults(path) => {
            warn!("Config file not found at {}, using defaults", path.display())
        }
    }

    let registry = Arc::new(Registry::builtin(config.engine.scripts_dir()));
    let artifacts = ArtifactManager::new(&config.artifacts.dir, config.artifacts.prefix.clone())
        .context("Failed to prepare artifact directory")?;

    let shutdown = CancellationToken::new();
    let sweeper = artifacts.spawn_sweeper(
        config.artifacts.sweep_interval(),
        config.artifacts.max_age(),
        shutdown.child_token(),
    );

    let engine = Arc::new(Engine::new(
        Arc::clone(&registry),
        Arc::clone(&artifacts),
        config.engine.clone(),
        config.probes.clone(),
        shutdown.clone(),
    ));
    let state = AppState {
        engine,
        health: HealthReporter::new(registry, artifacts, sweeper.status()),
    };

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            warn!("Signal handling unavailable: {e}");
            return;
        }
        info!("Shutdown requested");
        signal_token.cancel();
    });

    let served = server::serve(listener, state, shutdown.clone()).await;
    shutdown.cancel();
    sweeper.shutdown().await;
    info!("DiagnOStiX stopped");
    served
}

async fn wait_for_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
