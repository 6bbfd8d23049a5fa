//! Readers and parsers for /proc and /sys
//!
//! Parsers take the file contents as `&str` so they can be tested against
//! captured fixtures; the `read_*` wrappers do the I/O.

use anyhow::{Context, Result};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
    pub free_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

impl MemInfo {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    pub fn swap_used_kb(&self) -> u64 {
        self.swap_total_kb.saturating_sub(self.swap_free_kb)
    }

    pub fn percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        self.used_kb() as f64 / self.total_kb as f64 * 100.0
    }
}

pub fn parse_meminfo(content: &str) -> MemInfo {
    let mut info = MemInfo::default();
    let mut saw_available = false;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        match key.trim_end_matches(':') {
            "MemTotal" => info.total_kb = value,
            "MemAvailable" => {
                info.available_kb = value;
                saw_available = true;
            }
            "MemFree" => info.free_kb = value,
            "Buffers" => info.buffers_kb = value,
            "Cached" => info.cached_kb = value,
            "SwapTotal" => info.swap_total_kb = value,
            "SwapFree" => info.swap_free_kb = value,
            _ => {}
        }
    }

    // Kernels before 3.14 have no MemAvailable
    if !saw_available {
        info.available_kb = info.free_kb + info.buffers_kb + info.cached_kb;
    }
    info
}

pub fn read_meminfo() -> Result<MemInfo> {
    let content = fs::read_to_string("/proc/meminfo").context("Failed to read /proc/meminfo")?;
    Ok(parse_meminfo(&content))
}

// ---------------------------------------------------------------------------
// CPU
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Aggregate line plus one entry per `cpuN` line
pub fn parse_proc_stat(stat: &str) -> (CpuTimes, Vec<CpuTimes>) {
    let mut aggregate = CpuTimes::default();
    let mut per_core = Vec::new();

    for line in stat.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };
        if !label.starts_with("cpu") {
            continue;
        }
        let values: Vec<u64> = fields.filter_map(|s| s.parse::<u64>().ok()).collect();
        let total = values.iter().sum();
        // idle + iowait
        let idle = values.get(3).copied().unwrap_or(0) + values.get(4).copied().unwrap_or(0);
        let times = CpuTimes { idle, total };
        if label == "cpu" {
            aggregate = times;
        } else {
            per_core.push(times);
        }
    }
    (aggregate, per_core)
}

/// Busy percentage between two samples
pub fn cpu_usage_between(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    let idle = after.idle.saturating_sub(before.idle);
    if total == 0 {
        return 0.0;
    }
    (total.saturating_sub(idle)) as f64 / total as f64 * 100.0
}

fn read_proc_stat() -> Result<(CpuTimes, Vec<CpuTimes>)> {
    let content = fs::read_to_string("/proc/stat").context("Failed to read /proc/stat")?;
    Ok(parse_proc_stat(&content))
}

#[derive(Debug, Clone, Default)]
pub struct CpuUsage {
    pub total: f64,
    pub per_core: Vec<f64>,
}

/// Sample /proc/stat twice, `interval` apart
pub fn sample_cpu_usage(interval: Duration) -> Result<CpuUsage> {
    let (first, first_cores) = read_proc_stat()?;
    std::thread::sleep(interval);
    let (second, second_cores) = read_proc_stat()?;

    Ok(CpuUsage {
        total: cpu_usage_between(first, second),
        per_core: first_cores
            .into_iter()
            .zip(second_cores)
            .map(|(a, b)| cpu_usage_between(a, b))
            .collect(),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuInfo {
    pub model: Option<String>,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub mhz: Option<f64>,
}

pub fn parse_cpuinfo(content: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut cores = std::collections::HashSet::new();
    let mut physical_id = String::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "processor" => info.logical_cores += 1,
            "model name" | "Hardware" if info.model.is_none() => {
                info.model = Some(value.to_string());
            }
            "cpu MHz" if info.mhz.is_none() => info.mhz = value.parse().ok(),
            "physical id" => physical_id = value.to_string(),
            "core id" => {
                cores.insert((physical_id.clone(), value.to_string()));
            }
            _ => {}
        }
    }

    if !cores.is_empty() {
        info.physical_cores = Some(cores.len());
    }
    info
}

pub fn read_cpuinfo() -> Result<CpuInfo> {
    let content = fs::read_to_string("/proc/cpuinfo").context("Failed to read /proc/cpuinfo")?;
    let mut info = parse_cpuinfo(&content);
    if info.logical_cores == 0 {
        info.logical_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
    }
    // cpufreq is more accurate than the cpuinfo snapshot when present
    if let Some(khz) = read_trimmed("/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq")
        .and_then(|s| s.parse::<f64>().ok())
    {
        info.mhz = Some(khz / 1000.0);
    }
    Ok(info)
}

pub fn parse_loadavg(content: &str) -> [f64; 3] {
    let parts: Vec<f64> = content
        .split_whitespace()
        .take(3)
        .filter_map(|s| s.parse::<f64>().ok())
        .collect();
    [
        parts.first().copied().unwrap_or(0.0),
        parts.get(1).copied().unwrap_or(0.0),
        parts.get(2).copied().unwrap_or(0.0),
    ]
}

// ---------------------------------------------------------------------------
// Uptime
// ---------------------------------------------------------------------------

pub fn parse_uptime(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

pub fn format_uptime(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    parts.push(format!("{minutes}m"));
    parts.join(" ")
}

// ---------------------------------------------------------------------------
// Filesystems
// ---------------------------------------------------------------------------

/// Filesystem types that never back user data
pub const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs", "binfmt_misc", "bpf", "cgroup", "cgroup2", "configfs", "debugfs", "devfs",
    "devpts", "devtmpfs", "fusectl", "hugetlbfs", "mqueue", "nsfs", "overlay", "proc",
    "pstore", "ramfs", "rpc_pipefs", "securityfs", "squashfs", "sysfs", "tmpfs", "tracefs",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: String,
}

impl Mount {
    pub fn is_pseudo(&self) -> bool {
        PSEUDO_FILESYSTEMS.contains(&self.fstype.to_lowercase().as_str())
    }

    pub fn is_readonly(&self) -> bool {
        self.options.split(',').any(|o| o == "ro")
    }
}

/// /proc/mounts escapes space, tab, newline and backslash as octal
fn unescape_mount_field(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

pub fn parse_mounts(content: &str) -> Vec<Mount> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some(Mount {
                device: unescape_mount_field(parts.next()?),
                mountpoint: unescape_mount_field(parts.next()?),
                fstype: parts.next()?.to_string(),
                options: parts.next()?.to_string(),
            })
        })
        .collect()
}

pub fn read_mounts() -> Result<Vec<Mount>> {
    let content = fs::read_to_string("/proc/mounts").context("Failed to read /proc/mounts")?;
    Ok(parse_mounts(&content))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DfEntry {
    pub filesystem: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
    pub percent: f64,
    pub mountpoint: String,
}

/// Parse POSIX `df -kP` output
pub fn parse_df(output: &str) -> Vec<DfEntry> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            Some(DfEntry {
                filesystem: parts[0].to_string(),
                total_kb: parts[1].parse().ok()?,
                used_kb: parts[2].parse().ok()?,
                available_kb: parts[3].parse().ok()?,
                percent: parts[4].trim_end_matches('%').parse().unwrap_or(0.0),
                // Mount points may contain spaces
                mountpoint: parts[5..].join(" "),
            })
        })
        .collect()
}

/// Usage for every mounted filesystem, via `df -kP`
pub fn read_df() -> Result<Vec<DfEntry>> {
    let output = Command::new("df")
        .arg("-kP")
        .output()
        .context("Failed to execute df")?;
    // df exits non-zero when a single mount is unreadable but still prints the rest
    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries = parse_df(&stdout);
    if entries.is_empty() && !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("df failed: {}", stderr.trim());
    }
    Ok(entries)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskIo {
    pub name: String,
    pub reads: u64,
    pub read_sectors: u64,
    pub read_ms: u64,
    pub writes: u64,
    pub write_sectors: u64,
    pub write_ms: u64,
}

pub fn parse_diskstats(content: &str) -> Vec<DiskIo> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 11 {
                return None;
            }
            let num = |i: usize| parts[i].parse::<u64>().ok();
            Some(DiskIo {
                name: parts[2].to_string(),
                reads: num(3)?,
                read_sectors: num(5)?,
                read_ms: num(6)?,
                writes: num(7)?,
                write_sectors: num(9)?,
                write_ms: num(10)?,
            })
        })
        .collect()
}

pub fn read_diskstats() -> Result<Vec<DiskIo>> {
    let content =
        fs::read_to_string("/proc/diskstats").context("Failed to read /proc/diskstats")?;
    Ok(parse_diskstats(&content))
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetDev {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
}

pub fn parse_net_dev(content: &str) -> Vec<NetDev> {
    content
        .lines()
        .skip(2)
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let values: Vec<u64> = rest
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            if values.len() < 12 {
                return None;
            }
            Some(NetDev {
                name: name.trim().to_string(),
                rx_bytes: values[0],
                rx_packets: values[1],
                rx_errs: values[2],
                rx_drop: values[3],
                tx_bytes: values[8],
                tx_packets: values[9],
                tx_errs: values[10],
                tx_drop: values[11],
            })
        })
        .collect()
}

pub fn read_net_dev() -> Result<Vec<NetDev>> {
    let content = fs::read_to_string("/proc/net/dev").context("Failed to read /proc/net/dev")?;
    Ok(parse_net_dev(&content))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub protocol: &'static str,
    pub local: String,
    pub remote: String,
    pub state: &'static str,
}

fn tcp_state(code: &str) -> &'static str {
    match code {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Decode a kernel `ADDR:PORT` pair. Addresses are stored as
/// native-endian 32-bit words, which is little-endian on every target we run on.
fn decode_socket_addr(field: &str) -> Option<String> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    match addr.len() {
        8 => {
            let raw = u32::from_str_radix(addr, 16).ok()?;
            Some(format!("{}:{port}", Ipv4Addr::from(raw.to_le_bytes())))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(&addr[i * 8..i * 8 + 8], 16).ok()?;
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            Some(format!("[{}]:{port}", Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Parse /proc/net/{tcp,tcp6,udp,udp6}
pub fn parse_net_sockets(content: &str, protocol: &'static str) -> Vec<Connection> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            let state = if protocol.starts_with("tcp") {
                tcp_state(parts[3])
            } else {
                "NONE"
            };
            Some(Connection {
                protocol,
                local: decode_socket_addr(parts[1])?,
                remote: decode_socket_addr(parts[2])?,
                state,
            })
        })
        .collect()
}

/// Up to `limit` inet sockets across tcp/udp, v4 then v6
pub fn read_connections(limit: usize) -> Vec<Connection> {
    let mut connections = Vec::new();
    for (path, protocol) in [
        ("/proc/net/tcp", "tcp"),
        ("/proc/net/udp", "udp"),
        ("/proc/net/tcp6", "tcp6"),
        ("/proc/net/udp6", "udp6"),
    ] {
        if connections.len() >= limit {
            break;
        }
        if let Ok(content) = fs::read_to_string(path) {
            connections.extend(parse_net_sockets(&content, protocol));
        }
    }
    connections.truncate(limit);
    connections
}

// ---------------------------------------------------------------------------
// Sensors and power
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SensorGroup {
    pub name: String,
    pub readings: Vec<(String, f64)>,
}

/// Temperatures from /sys/class/hwmon, in degrees Celsius
pub fn read_temperatures() -> Vec<SensorGroup> {
    let Ok(entries) = fs::read_dir("/sys/class/hwmon") else {
        return Vec::new();
    };

    let mut groups = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        let name = read_trimmed(dir.join("name")).unwrap_or_else(|| {
            entry.file_name().to_string_lossy().into_owned()
        });

        let mut readings = Vec::new();
        let Ok(files) = fs::read_dir(&dir) else { continue };
        let mut inputs: Vec<String> = files
            .flatten()
            .map(|f| f.file_name().to_string_lossy().into_owned())
            .filter(|f| f.starts_with("temp") && f.ends_with("_input"))
            .collect();
        inputs.sort();

        for input in inputs {
            let Some(millidegrees) = read_trimmed(dir.join(&input)).and_then(|v| v.parse::<i64>().ok())
            else {
                continue;
            };
            let stem = input.trim_end_matches("_input");
            let label = read_trimmed(dir.join(format!("{stem}_label")))
                .unwrap_or_else(|| "Sensor".to_string());
            readings.push((label, millidegrees as f64 / 1000.0));
        }

        if !readings.is_empty() {
            groups.push(SensorGroup { name, readings });
        }
    }
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    pub name: String,
    pub capacity: Option<u8>,
    pub status: String,
}

pub fn read_batteries() -> Vec<Battery> {
    let Ok(entries) = fs::read_dir("/sys/class/power_supply") else {
        return Vec::new();
    };
    let mut batteries: Vec<Battery> = entries
        .flatten()
        .filter(|e| read_trimmed(e.path().join("type")).as_deref() == Some("Battery"))
        .map(|e| {
            let dir = e.path();
            Battery {
                name: e.file_name().to_string_lossy().into_owned(),
                capacity: read_trimmed(dir.join("capacity")).and_then(|c| c.parse().ok()),
                status: read_trimmed(dir.join("status")).unwrap_or_else(|| "Unknown".into()),
            }
        })
        .collect();
    batteries.sort_by(|a, b| a.name.cmp(&b.name));
    batteries
}

/// Read a small sysfs/procfs attribute, trimmed. Missing or unreadable is `None`.
pub fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:       16303852 kB
MemFree:         1218132 kB
MemAvailable:    8151926 kB
Buffers:          402340 kB
Cached:          6120044 kB
SwapCached:            0 kB
SwapTotal:       2097148 kB
SwapFree:        1048574 kB
";

    #[test]
    fn test_parse_meminfo() {
        let info = parse_meminfo(MEMINFO);
        assert_eq!(info.total_kb, 16303852);
        assert_eq!(info.available_kb, 8151926);
        assert_eq!(info.used_kb(), 16303852 - 8151926);
        assert_eq!(info.swap_used_kb(), 1048574);
        assert!((info.percent() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_meminfo_without_available() {
        let info = parse_meminfo("MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\n");
        assert_eq!(info.available_kb, 400);
        assert!((info.percent() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_proc_stat_and_usage() {
        let first = "cpu  100 0 100 800 0 0 0 0 0 0\ncpu0 50 0 50 400 0 0 0 0 0 0\ncpu1 50 0 50 400 0 0 0 0 0 0\nintr 1 2 3\n";
        let second = "cpu  200 0 200 900 0 0 0 0 0 0\ncpu0 150 0 50 400 0 0 0 0 0 0\ncpu1 50 0 150 500 0 0 0 0 0 0\n";
        let (a, a_cores) = parse_proc_stat(first);
        let (b, b_cores) = parse_proc_stat(second);
        assert_eq!(a.total, 1000);
        assert_eq!(a_cores.len(), 2);
        assert!((cpu_usage_between(a, b) - 200.0 / 3.0).abs() < 0.01);
        assert!((cpu_usage_between(a_cores[0], b_cores[0]) - 100.0).abs() < 1e-9);
        assert!((cpu_usage_between(a_cores[1], b_cores[1]) - 50.0).abs() < 1e-9);
        assert_eq!(cpu_usage_between(a, a), 0.0);
    }

    #[test]
    fn test_parse_cpuinfo() {
        let content = "\
processor\t: 0
model name\t: Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz
cpu MHz\t\t: 2112.000
physical id\t: 0
core id\t\t: 0

processor\t: 1
model name\t: Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz
cpu MHz\t\t: 1900.000
physical id\t: 0
core id\t\t: 0

processor\t: 2
physical id\t: 0
core id\t\t: 1
";
        let info = parse_cpuinfo(content);
        assert_eq!(info.logical_cores, 3);
        assert_eq!(info.physical_cores, Some(2));
        assert_eq!(info.model.as_deref(), Some("Intel(R) Core(TM) i7-8650U CPU @ 1.90GHz"));
        assert_eq!(info.mhz, Some(2112.0));
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 12345\n"), [0.52, 0.58, 0.59]);
        assert_eq!(parse_loadavg(""), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_uptime() {
        assert_eq!(parse_uptime("93784.12 350000.00\n"), Some(93784.12));
        assert_eq!(format_uptime(93784.0), "1d 2h 3m");
        assert_eq!(format_uptime(59.0), "0m");
        assert_eq!(format_uptime(7260.0), "2h 1m");
    }

    #[test]
    fn test_parse_mounts() {
        let content = "\
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
/dev/sdb1 /media/usb\\040stick vfat ro,nosuid 0 0
";
        let mounts = parse_mounts(content);
        assert_eq!(mounts.len(), 3);
        assert!(!mounts[0].is_pseudo());
        assert!(mounts[1].is_pseudo());
        assert_eq!(mounts[2].mountpoint, "/media/usb stick");
        assert!(mounts[2].is_readonly());
        assert!(!mounts[0].is_readonly());
    }

    #[test]
    fn test_parse_df() {
        let output = "\
Filesystem     1024-blocks      Used Available Capacity Mounted on
/dev/nvme0n1p2   490691512 401234567  64440000      87% /
/dev/sdb1          7811072   7500000    311072      97% /media/usb stick
garbage line
";
        let entries = parse_df(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].total_kb, 490691512);
        assert_eq!(entries[0].percent, 87.0);
        assert_eq!(entries[1].mountpoint, "/media/usb stick");
    }

    #[test]
    fn test_parse_diskstats() {
        let content = "   8       0 sda 12345 100 987654 3000 5432 200 876543 4000 0 5000 7000\n   7       0 loop0 1 0 2 0 0 0 0 0 0 0 0\n";
        let stats = parse_diskstats(content);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "sda");
        assert_eq!(stats[0].reads, 12345);
        assert_eq!(stats[0].read_sectors, 987654);
        assert_eq!(stats[0].writes, 5432);
        assert_eq!(stats[0].write_ms, 4000);
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
  eth0: 9876543    5000    2    1    0     0          0        10  1234567    4000    3    4    0     0       0          0
";
        let devs = parse_net_dev(content);
        assert_eq!(devs.len(), 2);
        assert_eq!(devs[1].name, "eth0");
        assert_eq!(devs[1].rx_bytes, 9876543);
        assert_eq!(devs[1].rx_errs, 2);
        assert_eq!(devs[1].tx_bytes, 1234567);
        assert_eq!(devs[1].tx_drop, 4);
    }

    #[test]
    fn test_parse_net_sockets() {
        let content = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1234
   1: 0F02000A:D2F0 2E1A3BC0:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 5678
";
        let conns = parse_net_sockets(content, "tcp");
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].local, "127.0.0.1:8080");
        assert_eq!(conns[0].state, "LISTEN");
        assert_eq!(conns[1].local, "10.0.2.15:54000");
        assert_eq!(conns[1].remote, "192.59.26.46:443");
        assert_eq!(conns[1].state, "ESTABLISHED");
    }

    #[test]
    fn test_decode_ipv6_loopback() {
        let addr = decode_socket_addr("00000000000000000000000001000000:0035").unwrap();
        assert_eq!(addr, "[::1]:53");
    }
}
