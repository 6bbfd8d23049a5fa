//! gpu_diagnostics — NVIDIA details via nvidia-smi, PCI display controllers via lspci

use anyhow::{Context, Result};
use std::process::Command;

use super::ProbeContext;

const NVIDIA_QUERY: &str = "index,name,driver_version,memory.total,memory.used,memory.free,utilization.gpu,temperature.gpu";
const HOT_GPU_CELSIUS: f64 = 85.0;

#[derive(Debug, Clone, PartialEq)]
pub struct NvidiaGpu {
    pub index: u32,
    pub name: String,
    pub driver: String,
    pub memory_total_mb: f64,
    pub memory_used_mb: f64,
    pub memory_free_mb: f64,
    pub load_percent: f64,
    pub temperature: f64,
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` rows for [`NVIDIA_QUERY`]
pub fn parse_nvidia_smi(output: &str) -> Vec<NvidiaGpu> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 8 {
                return None;
            }
            // "[N/A]" shows up for counters a card does not expose
            let num = |s: &str| s.parse::<f64>().unwrap_or(0.0);
            Some(NvidiaGpu {
                index: fields[0].parse().ok()?,
                name: fields[1].to_string(),
                driver: fields[2].to_string(),
                memory_total_mb: num(fields[3]),
                memory_used_mb: num(fields[4]),
                memory_free_mb: num(fields[5]),
                load_percent: num(fields[6]),
                temperature: num(fields[7]),
            })
        })
        .collect()
}

fn query_nvidia() -> Result<Vec<NvidiaGpu>> {
    let output = Command::new("nvidia-smi")
        .arg(format!("--query-gpu={NVIDIA_QUERY}"))
        .arg("--format=csv,noheader,nounits")
        .output()
        .context("nvidia-smi not available")?;
    if !output.status.success() {
        anyhow::bail!(
            "nvidia-smi failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout)))
}

/// Display controllers from `lspci` output
pub fn display_controllers(lspci: &str) -> Vec<&str> {
    lspci
        .lines()
        .filter(|l| l.contains("VGA") || l.contains("3D controller") || l.contains("Display"))
        .collect()
}

pub fn run(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("GPU DIAGNOSTICS");

    ctx.section("NVIDIA GPU Detection");
    match query_nvidia() {
        Ok(gpus) if gpus.is_empty() => ctx.line("No NVIDIA GPUs detected"),
        Ok(gpus) => {
            for gpu in gpus {
                ctx.blank();
                ctx.line(format!("GPU {}: {}", gpu.index, gpu.name));
                ctx.line(format!("  Driver: {}", gpu.driver));
                ctx.line(format!("  Memory Total: {} MB", gpu.memory_total_mb));
                ctx.line(format!("  Memory Used: {} MB", gpu.memory_used_mb));
                ctx.line(format!("  Memory Free: {} MB", gpu.memory_free_mb));
                ctx.line(format!("  GPU Load: {:.1}%", gpu.load_percent));
                ctx.line(format!("  Temperature: {}C", gpu.temperature));
                if gpu.temperature > HOT_GPU_CELSIUS {
                    ctx.line("  STATUS: WARNING - High temperature");
                } else {
                    ctx.line("  STATUS: OK");
                }
            }
        }
        Err(e) => ctx.line(format!("NVIDIA GPU detection unavailable: {e:#}")),
    }

    ctx.blank();
    ctx.blank();
    ctx.section("System GPU Information");
    match Command::new("lspci").output() {
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let controllers = display_controllers(&stdout);
            if controllers.is_empty() {
                ctx.line("No display controllers reported by lspci");
            }
            for line in controllers {
                ctx.line(line);
            }
        }
        Err(_) => ctx.line("lspci not found - Install pciutils for GPU detection"),
    }

    ctx.footer();
    Ok(())
}
