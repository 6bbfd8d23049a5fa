//! hardware_health — CPU load, memory pressure, temperatures, battery

use anyhow::Result;
use std::time::Duration;

use super::procfs::{self, SensorGroup};
use super::{format_bytes, usage_status, ProbeContext};

const HIGH_CPU_PERCENT: f64 = 90.0;

pub fn run(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("HARDWARE HEALTH REPORT");

    ctx.section("CPU Health");
    match procfs::sample_cpu_usage(Duration::from_secs(1)) {
        Ok(usage) => {
            ctx.line(format!("CPU Usage: {:.1}%", usage.total));
            if let Ok(info) = procfs::read_cpuinfo() {
                if let Some(mhz) = info.mhz {
                    ctx.line(format!("Current Frequency: {mhz:.2} MHz"));
                }
                if let Some(physical) = info.physical_cores {
                    ctx.line(format!("Physical Cores: {physical}"));
                }
                ctx.line(format!("Logical Cores: {}", info.logical_cores));
            }
            if usage.total > HIGH_CPU_PERCENT {
                ctx.line("STATUS: WARNING - High CPU usage");
            } else {
                ctx.line("STATUS: OK");
            }
        }
        Err(e) => ctx.line(format!("Error: {e:#}")),
    }

    if ctx.is_cancelled() {
        return Ok(());
    }

    ctx.blank();
    ctx.section("Memory Health");
    match procfs::read_meminfo() {
        Ok(mem) => {
            ctx.line(format!("Total RAM: {}", format_bytes(mem.total_kb * 1024)));
            ctx.line(format!("Available: {}", format_bytes(mem.available_kb * 1024)));
            ctx.line(format!("Usage: {:.1}%", mem.percent()));
            ctx.line(usage_status(mem.percent(), "", ""));
        }
        Err(e) => ctx.line(format!("Error: {e:#}")),
    }

    ctx.blank();
    ctx.section("Temperature Sensors");
    report_temperatures(ctx, &procfs::read_temperatures());

    ctx.blank();
    ctx.section("Battery");
    let batteries = procfs::read_batteries();
    if batteries.is_empty() {
        ctx.line("No battery detected (desktop system)");
    }
    for battery in batteries {
        ctx.line(format!("{}:", battery.name));
        match battery.capacity {
            Some(capacity) => ctx.line(format!("  Charge: {capacity}%")),
            None => ctx.line("  Charge: unknown"),
        }
        let plugged = !battery.status.eq_ignore_ascii_case("discharging");
        ctx.line(format!("  Plugged in: {}", if plugged { "Yes" } else { "No" }));
        ctx.line(format!("  State: {}", battery.status));
    }

    ctx.footer();
    Ok(())
}

fn report_temperatures(ctx: &ProbeContext, groups: &[SensorGroup]) {
    if groups.is_empty() {
        ctx.line("No temperature sensors detected (may require root)");
        return;
    }
    for group in groups {
        ctx.line(format!("{}:", group.name));
        for (label, celsius) in &group.readings {
            ctx.line(format!("  {label}: {celsius:.1}C"));
        }
    }
}
