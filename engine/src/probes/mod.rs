//! Native probes — in-process diagnostics
//!
//! Each probe reads kernel interfaces directly (/proc, /sys) or shells out to
//! a read-only system utility, and writes a plain-text report line by line
//! into the run's [`OutputSink`]. Probes are synchronous and run on the
//! blocking pool; long-running ones poll the context for cancellation.

pub mod about;
pub mod disk;
pub mod gpu;
pub mod hardware;
pub mod network;
pub mod overview;
pub mod procfs;
pub mod stress;

use anyhow::Result;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ProbeSettings;
use crate::sink::OutputSink;

/// Closed set of native probe kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeProbe {
    About,
    SystemOverview,
    HardwareHealth,
    DiskDiagnostics,
    NetworkDiagnostics,
    MemoryStressTest,
    CpuStressTest,
    GpuDiagnostics,
}

impl NativeProbe {
    pub fn run(self, ctx: &ProbeContext) -> Result<()> {
        match self {
            NativeProbe::About => about::run(ctx),
            NativeProbe::SystemOverview => overview::run(ctx),
            NativeProbe::HardwareHealth => hardware::run(ctx),
            NativeProbe::DiskDiagnostics => disk::run(ctx),
            NativeProbe::NetworkDiagnostics => network::run(ctx),
            NativeProbe::MemoryStressTest => stress::run_memory(ctx),
            NativeProbe::CpuStressTest => stress::run_cpu(ctx),
            NativeProbe::GpuDiagnostics => gpu::run(ctx),
        }
    }
}

/// Everything a probe may touch while running
#[derive(Clone)]
pub struct ProbeContext {
    pub sink: OutputSink,
    pub cancel: CancellationToken,
    pub settings: ProbeSettings,
}

impl ProbeContext {
    pub fn new(sink: OutputSink, cancel: CancellationToken, settings: ProbeSettings) -> Self {
        Self {
            sink,
            cancel,
            settings,
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        self.sink.line(text);
    }

    pub fn blank(&self) {
        self.sink.line("");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep in short slices. Returns false if cancelled before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let end = Instant::now() + duration;
        while Instant::now() < end {
            if self.is_cancelled() {
                return false;
            }
            let slice = end
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(50));
            std::thread::sleep(slice);
        }
        !self.is_cancelled()
    }

    /// `=====` title `=====` header shared by every report
    pub fn banner(&self, title: &str) {
        self.line(RULE);
        self.line(title);
        self.line(RULE);
        self.blank();
    }

    pub fn section(&self, title: &str) {
        self.line(format!("--- {title} ---"));
    }

    pub fn footer(&self) {
        self.blank();
        self.line(RULE);
        self.line(format!(
            "Report generated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        self.line(RULE);
    }
}

const RULE: &str = "============================================================";

/// Human-readable size using binary multiples
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Thousands separators for counters
pub fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Status line for a utilisation percentage
pub fn usage_status(percent: f64, critical: &str, warning: &str) -> String {
    if percent > 90.0 {
        format!("STATUS: CRITICAL{critical}")
    } else if percent > 75.0 {
        format!("STATUS: WARNING{warning}")
    } else {
        "STATUS: OK".to_string()
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> ProbeContext {
    ProbeContext::new(
        OutputSink::new(None),
        CancellationToken::new(),
        ProbeSettings {
            cpu_stress_secs: 1,
            memory_stress_max_mb: 8,
            memory_stress_fraction: 0.01,
        },
    )
}

#[cfg(test)]
pub(crate) fn captured(ctx: &ProbeContext) -> String {
    String::from_utf8_lossy(&ctx.sink.snapshot()).into_owned()
}
