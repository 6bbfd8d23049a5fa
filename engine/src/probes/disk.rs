//! disk_diagnostics — partitions, usage thresholds, I/O counters

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

use super::procfs::{self, DfEntry, DiskIo, Mount};
use super::{format_bytes, group_digits, usage_status, ProbeContext};

/// A mounted filesystem with its usage
#[derive(Debug, Clone)]
pub struct Volume {
    pub mount: Mount,
    pub usage: Option<DfEntry>,
}

/// Join /proc/mounts with `df -kP` by mount point
pub fn join_volumes(mounts: Vec<Mount>, usage: Vec<DfEntry>) -> Vec<Volume> {
    let mut by_mountpoint: HashMap<String, DfEntry> = usage
        .into_iter()
        .map(|entry| (entry.mountpoint.clone(), entry))
        .collect();

    mounts
        .into_iter()
        .map(|mount| Volume {
            usage: by_mountpoint.remove(&mount.mountpoint),
            mount,
        })
        .collect()
}

/// Real (non-pseudo) volumes on this machine
pub fn volumes() -> Result<Vec<Volume>> {
    let mounts = procfs::read_mounts()?
        .into_iter()
        .filter(|m| !m.is_pseudo())
        .collect();
    let usage = procfs::read_df().unwrap_or_default();
    Ok(join_volumes(mounts, usage))
}

/// Whole-disk totals; partitions and loop/ram devices are skipped so nothing is counted twice
pub fn total_io(stats: &[DiskIo], is_whole_disk: impl Fn(&str) -> bool) -> Option<DiskIo> {
    let disks: Vec<&DiskIo> = stats
        .iter()
        .filter(|d| !d.name.starts_with("loop") && !d.name.starts_with("ram"))
        .filter(|d| is_whole_disk(&d.name))
        .collect();
    if disks.is_empty() {
        return None;
    }
    Some(disks.into_iter().fold(
        DiskIo {
            name: "total".into(),
            ..Default::default()
        },
        |mut acc, d| {
            acc.reads += d.reads;
            acc.read_sectors += d.read_sectors;
            acc.read_ms += d.read_ms;
            acc.writes += d.writes;
            acc.write_sectors += d.write_sectors;
            acc.write_ms += d.write_ms;
            acc
        },
    ))
}

fn is_block_device(name: &str) -> bool {
    Path::new("/sys/block").join(name).exists()
}

pub fn run(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("DISK DIAGNOSTICS");

    ctx.section("Disk Partitions");
    match volumes() {
        Ok(list) if list.is_empty() => ctx.line("No mounted volumes detected"),
        Ok(list) => {
            for volume in list {
                let mount = &volume.mount;
                ctx.blank();
                ctx.line(format!("Device: {}", mount.device));
                ctx.line(format!("  Mountpoint: {}", mount.mountpoint));
                ctx.line(format!("  Filesystem: {}", mount.fstype));
                ctx.line(format!("  Options: {}", mount.options));
                match volume.usage {
                    Some(usage) => {
                        ctx.line(format!("  Total: {}", format_bytes(usage.total_kb * 1024)));
                        ctx.line(format!("  Used: {}", format_bytes(usage.used_kb * 1024)));
                        ctx.line(format!("  Free: {}", format_bytes(usage.available_kb * 1024)));
                        ctx.line(format!("  Usage: {}%", usage.percent));
                        ctx.line(format!(
                            "  {}",
                            usage_status(usage.percent, " - Disk almost full!", " - Low disk space")
                        ));
                    }
                    None => ctx.line("  Access Denied"),
                }
            }
        }
        Err(e) => ctx.line(format!("Error retrieving partitions: {e:#}")),
    }

    ctx.blank();
    ctx.blank();
    ctx.section("Disk I/O Statistics");
    match procfs::read_diskstats() {
        Ok(stats) => match total_io(&stats, is_block_device) {
            Some(io) => {
                ctx.line(format!("Read Count: {}", group_digits(io.reads)));
                ctx.line(format!("Write Count: {}", group_digits(io.writes)));
                ctx.line(format!("Read Bytes: {}", format_bytes(io.read_sectors * 512)));
                ctx.line(format!("Write Bytes: {}", format_bytes(io.write_sectors * 512)));
                ctx.line(format!("Read Time: {} ms", group_digits(io.read_ms)));
                ctx.line(format!("Write Time: {} ms", group_digits(io.write_ms)));
            }
            None => ctx.line("Disk I/O statistics not available"),
        },
        Err(e) => ctx.line(format!("Error: {e:#}")),
    }

    ctx.footer();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(device: &str, mountpoint: &str) -> Mount {
        Mount {
            device: device.into(),
            mountpoint: mountpoint.into(),
            fstype: "ext4".into(),
            options: "rw".into(),
        }
    }

    fn df(mountpoint: &str, percent: f64) -> DfEntry {
        DfEntry {
            filesystem: "/dev/x".into(),
            total_kb: 100,
            used_kb: percent as u64,
            available_kb: 100 - percent as u64,
            percent,
            mountpoint: mountpoint.into(),
        }
    }

    #[test]
    fn test_join_volumes_by_mountpoint() {
        let volumes = join_volumes(
            vec![mount("/dev/sda1", "/"), mount("/dev/sda2", "/home")],
            vec![df("/home", 80.0)],
        );
        assert_eq!(volumes.len(), 2);
        assert!(volumes[0].usage.is_none());
        assert_eq!(volumes[1].usage.as_ref().unwrap().percent, 80.0);
    }

    #[test]
    fn test_total_io_skips_partitions_and_loop() {
        let stats = vec![
            DiskIo { name: "sda".into(), reads: 10, writes: 5, read_sectors: 2, ..Default::default() },
            DiskIo { name: "sda1".into(), reads: 10, writes: 5, ..Default::default() },
            DiskIo { name: "nvme0n1".into(), reads: 1, writes: 1, ..Default::default() },
            DiskIo { name: "loop0".into(), reads: 100, ..Default::default() },
        ];
        let io = total_io(&stats, |name| name == "sda" || name == "nvme0n1" || name == "loop0").unwrap();
        assert_eq!(io.reads, 11);
        assert_eq!(io.writes, 6);
        assert_eq!(io.read_sectors, 2);
    }

    #[test]
    fn test_total_io_none_when_no_disks() {
        assert!(total_io(&[], |_| true).is_none());
    }

    #[test]
    fn test_disk_report_sections() {
        let ctx = crate::probes::test_context();
        run(&ctx).unwrap();
        let out = crate::probes::captured(&ctx);
        assert!(out.contains("--- Disk Partitions ---"));
        assert!(out.contains("--- Disk I/O Statistics ---"));
    }
}
