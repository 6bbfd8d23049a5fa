//! system_overview — one snapshot of CPU, memory, disks, network and OS
//!
//! Every section degrades to an "unavailable" line on its own; the report as
//! a whole never fails.

use anyhow::Result;
use std::time::Duration;

use super::about::{hostname, kernel_release};
use super::procfs::{self, read_trimmed};
use super::{disk, network, ProbeContext};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn gib_from_kb(kb: u64) -> String {
    format!("{:.2} GiB", (kb * 1024) as f64 / GIB)
}

fn cpu_state(ctx: &ProbeContext) {
    ctx.section("CPU State");
    match procfs::read_cpuinfo() {
        Ok(info) => {
            if let Some(model) = &info.model {
                ctx.line(format!("Model: {model}"));
            }
            ctx.line(format!(
                "Physical cores: {}",
                info.physical_cores
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "—".into())
            ));
            ctx.line(format!("Logical cores: {}", info.logical_cores));
            match procfs::sample_cpu_usage(Duration::from_secs(1)) {
                Ok(usage) => ctx.line(format!("Utilization: {:.1}%", usage.total)),
                Err(e) => ctx.line(format!("Utilization: unavailable - {e}")),
            }
            match info.mhz {
                Some(mhz) => ctx.line(format!("Frequency: {:.2} GHz", mhz / 1000.0)),
                None => ctx.line("Frequency: unavailable"),
            }
        }
        Err(e) => ctx.line(format!("unavailable - {e}")),
    }
    if let Some(load) = read_trimmed("/proc/loadavg").map(|s| procfs::parse_loadavg(&s)) {
        ctx.line(format!(
            "Load average: {:.2} {:.2} {:.2}",
            load[0], load[1], load[2]
        ));
    }
}

fn memory_state(ctx: &ProbeContext) {
    ctx.section("Memory State");
    match procfs::read_meminfo() {
        Ok(mem) => {
            ctx.line(format!("Total RAM: {}", gib_from_kb(mem.total_kb)));
            ctx.line(format!("Used RAM: {}", gib_from_kb(mem.used_kb())));
            ctx.line(format!("Available RAM: {}", gib_from_kb(mem.available_kb)));
            ctx.line(format!("Utilization: {:.1}%", mem.percent()));
            if mem.swap_total_kb > 0 {
                ctx.line(format!("Swap total: {}", gib_from_kb(mem.swap_total_kb)));
                ctx.line(format!("Swap used: {}", gib_from_kb(mem.swap_used_kb())));
            }
        }
        Err(e) => ctx.line(format!("unavailable - {e}")),
    }
}

fn disk_state(ctx: &ProbeContext) {
    ctx.section("Disk State");
    let volumes = match disk::volumes() {
        Ok(v) => v,
        Err(e) => {
            ctx.line(format!("unavailable - {e}"));
            return;
        }
    };
    if volumes.is_empty() {
        ctx.line("No mounted volumes detected");
        return;
    }
    for volume in volumes {
        ctx.line(format!("Mount: {}", volume.mount.mountpoint));
        ctx.line(format!("  Filesystem: {}", volume.mount.fstype));
        match &volume.usage {
            Some(usage) => {
                ctx.line(format!("  Total: {}", gib_from_kb(usage.total_kb)));
                ctx.line(format!("  Used: {}", gib_from_kb(usage.used_kb)));
                ctx.line(format!("  Free: {}", gib_from_kb(usage.available_kb)));
                ctx.line(format!("  Utilization: {}%", usage.percent));
            }
            None => ctx.line("  requires elevation"),
        }
        if volume.mount.is_readonly() {
            ctx.line("  State: readonly");
        }
        ctx.blank();
    }
}

fn network_state(ctx: &ProbeContext) {
    ctx.section("Network State");
    match network::interfaces() {
        Ok(list) if list.is_empty() => ctx.line("No interfaces detected"),
        Ok(list) => {
            for iface in list {
                ctx.line(format!("Interface: {}", iface.name));
                let status = match iface.up {
                    Some(true) => "up",
                    Some(false) => "down",
                    None => "—",
                };
                ctx.line(format!("  Status: {status}"));
                if !iface.ipv4.is_empty() {
                    let addrs: Vec<&str> = iface.ipv4.iter().map(|(a, _)| a.as_str()).collect();
                    ctx.line(format!("  IPv4: {}", addrs.join(", ")));
                }
                if !iface.ipv6.is_empty() {
                    ctx.line(format!("  IPv6: {}", iface.ipv6.join(", ")));
                }
                if let Some(mac) = &iface.mac {
                    ctx.line(format!("  MAC: {mac}"));
                }
                ctx.blank();
            }
        }
        Err(e) => ctx.line(format!("unavailable - {e}")),
    }
}

fn os_and_uptime(ctx: &ProbeContext) {
    ctx.section("OS and Uptime");
    ctx.line(format!("OS: {} {}", std::env::consts::OS, kernel_release()));
    if let Some(version) = read_trimmed("/proc/sys/kernel/version") {
        ctx.line(format!("Kernel: {version}"));
    }
    if let Some(pretty) = read_trimmed("/etc/os-release").and_then(|s| os_pretty_name(&s)) {
        ctx.line(format!("Distribution: {pretty}"));
    }
    ctx.line(format!("Architecture: {}", std::env::consts::ARCH));
    ctx.line(format!("Hostname: {}", hostname()));

    match read_trimmed("/proc/uptime").and_then(|s| procfs::parse_uptime(&s)) {
        Some(seconds) => {
            ctx.line(format!("Uptime: {}", procfs::format_uptime(seconds)));
            let boot = chrono::Local::now() - chrono::Duration::seconds(seconds as i64);
            ctx.line(format!("Boot time: {}", boot.format("%Y-%m-%d %H:%M:%S")));
        }
        None => ctx.line("Uptime: unavailable"),
    }
}

/// `PRETTY_NAME` from an os-release file
fn os_pretty_name(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        line.strip_prefix("PRETTY_NAME=")
            .map(|v| v.trim_matches('"').to_string())
    })
}

pub fn run(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("SYSTEM OVERVIEW");

    cpu_state(ctx);
    ctx.blank();
    memory_state(ctx);
    ctx.blank();
    if ctx.is_cancelled() {
        return Ok(());
    }
    disk_state(ctx);
    network_state(ctx);
    os_and_uptime(ctx);

    ctx.footer();
    Ok(())
}
