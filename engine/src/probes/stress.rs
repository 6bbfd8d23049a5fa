//! cpu_stress_test and memory_stress_test
//!
//! Both run for a bounded time or allocation size taken from
//! `[probes]` settings, report progress as they go, and stop early when the
//! run is cancelled.

use anyhow::Result;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::procfs::{self, CpuTimes};
use super::{format_bytes, ProbeContext};

const MEMORY_CHUNK: usize = 50 * 1024 * 1024;
const MEMORY_CEILING_PERCENT: f64 = 90.0;
const CPU_PASS_PERCENT: f64 = 80.0;
const PAGE: usize = 4096;

// ---------------------------------------------------------------------------
// CPU
// ---------------------------------------------------------------------------

fn burn(stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        let mut acc = 0u64;
        for i in 0..10_000u64 {
            acc = acc.wrapping_add(black_box(i * i));
        }
        black_box(acc);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSummary {
    pub average: f64,
    pub peak: f64,
    pub minimum: f64,
}

pub fn summarize(samples: &[f64]) -> Option<SampleSummary> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().sum();
    Some(SampleSummary {
        average: sum / samples.len() as f64,
        peak: samples.iter().copied().fold(f64::MIN, f64::max),
        minimum: samples.iter().copied().fold(f64::MAX, f64::min),
    })
}

fn read_aggregate() -> Option<CpuTimes> {
    std::fs::read_to_string("/proc/stat")
        .ok()
        .map(|s| procfs::parse_proc_stat(&s).0)
}

pub fn run_cpu(ctx: &ProbeContext) -> Result<()> {
    let seconds = ctx.settings.cpu_stress_secs.max(1);
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    ctx.banner("CPU STRESS TEST");
    ctx.section("Pre-Test CPU State");
    ctx.line(format!("Logical CPU cores: {cores}"));
    match procfs::sample_cpu_usage(Duration::from_millis(500)) {
        Ok(usage) => ctx.line(format!("Initial CPU usage: {:.1}%", usage.total)),
        Err(e) => ctx.line(format!("Initial CPU usage: unavailable - {e}")),
    }

    ctx.blank();
    ctx.section(&format!("Running {seconds}-second Stress Test"));
    ctx.line(format!("Stressing {cores} cores..."));
    ctx.blank();

    let stop = AtomicBool::new(false);
    let start = Instant::now();
    let mut samples = Vec::new();
    let mut cancelled = false;

    std::thread::scope(|scope| {
        for _ in 0..cores {
            scope.spawn(|| burn(&stop));
        }

        let mut previous = read_aggregate();
        for _ in 0..seconds {
            if !ctx.sleep(Duration::from_secs(1)) {
                cancelled = true;
                break;
            }
            let current = read_aggregate();
            if let (Some(before), Some(after)) = (previous, current) {
                let usage = procfs::cpu_usage_between(before, after);
                samples.push(usage);
                ctx.line(format!(
                    "  {}s: CPU usage {usage:.1}%",
                    start.elapsed().as_secs()
                ));
            }
            previous = current;
        }
        stop.store(true, Ordering::Relaxed);
    });

    if cancelled {
        ctx.line("Stress test cancelled");
        return Ok(());
    }

    ctx.blank();
    ctx.section("Test Results");
    match summarize(&samples) {
        Some(summary) => {
            ctx.line(format!("Average CPU usage: {:.1}%", summary.average));
            ctx.line(format!("Peak CPU usage: {:.1}%", summary.peak));
            ctx.line(format!("Minimum CPU usage: {:.1}%", summary.minimum));
            if summary.average > CPU_PASS_PERCENT {
                ctx.line("STATUS: PASS - CPU stress test completed successfully");
            } else {
                ctx.line("STATUS: WARNING - CPU did not reach expected load");
            }
        }
        None => ctx.line("CPU usage samples unavailable"),
    }

    ctx.footer();
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Bytes to allocate: a fraction of what is available, capped
pub fn memory_target(available_bytes: u64, fraction: f64, cap_mb: u64) -> usize {
    let fraction_bytes = (available_bytes as f64 * fraction) as u64;
    fraction_bytes.min(cap_mb.saturating_mul(1024 * 1024)) as usize
}

/// Write a per-block pattern on every page so the allocation is really backed
fn fill_block(block: &mut [u8], seed: u8) {
    for (i, page) in block.chunks_mut(PAGE).enumerate() {
        page.fill(seed.wrapping_add(i as u8));
    }
}

fn verify_block(block: &[u8], seed: u8) -> bool {
    block
        .chunks(PAGE)
        .enumerate()
        .all(|(i, page)| page.iter().all(|b| *b == seed.wrapping_add(i as u8)))
}

fn memory_percent() -> Option<f64> {
    procfs::read_meminfo().ok().map(|m| m.percent())
}

pub fn run_memory(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("MEMORY STRESS TEST");

    let before = procfs::read_meminfo()?;
    ctx.section("Pre-Test Memory State");
    ctx.line(format!("Total RAM: {}", format_bytes(before.total_kb * 1024)));
    ctx.line(format!("Available RAM: {}", format_bytes(before.available_kb * 1024)));
    ctx.line(format!("Used RAM: {}", format_bytes(before.used_kb() * 1024)));
    ctx.line(format!("Memory usage: {:.1}%", before.percent()));

    let target = memory_target(
        before.available_kb * 1024,
        ctx.settings.memory_stress_fraction,
        ctx.settings.memory_stress_max_mb,
    );

    ctx.blank();
    ctx.section("Running Memory Stress Test");
    ctx.line("Allocating memory blocks...");
    ctx.line(format!("Target allocation: {}", format_bytes(target as u64)));
    ctx.blank();

    let mut blocks: Vec<Vec<u8>> = Vec::new();
    let mut allocated = 0usize;
    let mut peak = before.percent();

    while allocated < target {
        if ctx.is_cancelled() {
            ctx.line("Stress test cancelled, releasing memory");
            return Ok(());
        }
        let size = MEMORY_CHUNK.min(target - allocated);
        let mut block = Vec::new();
        if block.try_reserve_exact(size).is_err() {
            ctx.line("ERROR: Unable to allocate requested memory");
            break;
        }
        block.resize(size, 0);
        fill_block(&mut block, blocks.len() as u8);
        blocks.push(block);
        allocated += size;

        let percent = memory_percent().unwrap_or(0.0);
        peak = peak.max(percent);
        ctx.line(format!(
            "Allocated {} ({}%)",
            format_bytes(allocated as u64),
            allocated * 100 / target.max(1)
        ));
        if percent > MEMORY_CEILING_PERCENT {
            ctx.line("WARNING: Memory usage too high, stopping allocation");
            break;
        }
    }

    ctx.blank();
    ctx.section("Test Results");
    ctx.line(format!("Total allocated: {}", format_bytes(allocated as u64)));
    ctx.line(format!("Peak memory usage: {peak:.1}%"));
    ctx.line(format!("Memory increase: {:.1}%", peak - before.percent()));

    ctx.blank();
    ctx.line("Verifying memory integrity...");
    let intact = blocks
        .iter()
        .enumerate()
        .all(|(i, block)| verify_block(block, i as u8));
    if intact {
        ctx.line("Memory integrity check: PASSED");
    } else {
        ctx.line("Memory integrity check: FAILED");
    }

    ctx.blank();
    ctx.line("Deallocating memory...");
    drop(blocks);
    ctx.sleep(Duration::from_millis(500));
    if intact {
        ctx.line("STATUS: Memory stress test completed successfully");
    } else {
        ctx.line("STATUS: FAILED - memory contents changed during the test");
    }

    if let Ok(after) = procfs::read_meminfo() {
        ctx.blank();
        ctx.section("Post-Test Memory State");
        ctx.line(format!("Available RAM: {}", format_bytes(after.available_kb * 1024)));
        ctx.line(format!("Memory usage: {:.1}%", after.percent()));
    }

    ctx.footer();
    Ok(())
}
