//! network_diagnostics — interfaces, counters, DNS, connectivity, sockets

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::net::{SocketAddrV4, SocketAddrV6, ToSocketAddrs};
use std::process::Command;

use super::procfs::{self, read_trimmed};
use super::{group_digits, ProbeContext};

const DNS_TEST_HOSTS: &[&str] = &["google.com", "github.com"];
const CONNECTIVITY_TARGET: &str = "8.8.8.8";
const CONNECTION_SAMPLE: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct Interface {
    pub name: String,
    pub up: Option<bool>,
    pub speed_mbps: Option<i64>,
    pub ipv4: Vec<(String, Option<String>)>,
    pub ipv6: Vec<String>,
    pub mac: Option<String>,
}

/// All interfaces with their addresses, sorted by name
pub fn interfaces() -> Result<Vec<Interface>> {
    let mut by_name: BTreeMap<String, Interface> = BTreeMap::new();

    for ifaddr in nix::ifaddrs::getifaddrs().context("getifaddrs failed")? {
        let entry = by_name
            .entry(ifaddr.interface_name.clone())
            .or_insert_with(|| Interface {
                name: ifaddr.interface_name.clone(),
                ..Default::default()
            });

        let Some(address) = ifaddr.address else { continue };
        if let Some(v4) = address.as_sockaddr_in() {
            let netmask = ifaddr
                .netmask
                .as_ref()
                .and_then(|m| m.as_sockaddr_in())
                .map(|m| SocketAddrV4::from(*m).ip().to_string());
            entry.ipv4.push((SocketAddrV4::from(*v4).ip().to_string(), netmask));
        } else if let Some(v6) = address.as_sockaddr_in6() {
            entry.ipv6.push(SocketAddrV6::from(*v6).ip().to_string());
        } else if let Some(mac) = address.as_link_addr().and_then(|l| l.addr()) {
            if mac != [0u8; 6] {
                entry.mac = Some(format_mac(&mac));
            }
        }
    }

    for iface in by_name.values_mut() {
        let sys = format!("/sys/class/net/{}", iface.name);
        iface.up = read_trimmed(format!("{sys}/operstate")).map(|s| operstate_is_up(&s));
        // Virtual links report -1 or fail the read
        iface.speed_mbps = read_trimmed(format!("{sys}/speed"))
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|s| *s > 0);
    }

    Ok(by_name.into_values().collect())
}

fn operstate_is_up(state: &str) -> bool {
    // Loopback reports "unknown" while carrying traffic
    matches!(state, "up" | "unknown")
}

fn format_mac(octets: &[u8; 6]) -> String {
    octets
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn run(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("NETWORK DIAGNOSTICS");

    ctx.section("Network Interfaces");
    match interfaces() {
        Ok(list) if list.is_empty() => ctx.line("No interfaces detected"),
        Ok(list) => {
            for iface in list {
                ctx.blank();
                ctx.line(format!("{}:", iface.name));
                if let Some(up) = iface.up {
                    ctx.line(format!("  Status: {}", if up { "UP" } else { "DOWN" }));
                }
                if let Some(speed) = iface.speed_mbps {
                    ctx.line(format!("  Speed: {speed} Mbps"));
                }
                for (addr, netmask) in &iface.ipv4 {
                    ctx.line(format!("  IPv4: {addr}"));
                    if let Some(mask) = netmask {
                        ctx.line(format!("  Netmask: {mask}"));
                    }
                }
                for addr in &iface.ipv6 {
                    ctx.line(format!("  IPv6: {addr}"));
                }
                if let Some(mac) = &iface.mac {
                    ctx.line(format!("  MAC: {mac}"));
                }
            }
        }
        Err(e) => ctx.line(format!("Error: {e:#}")),
    }

    if ctx.is_cancelled() {
        return Ok(());
    }

    ctx.blank();
    ctx.blank();
    ctx.section("Network I/O Statistics");
    match procfs::read_net_dev() {
        Ok(devs) => {
            let total = devs
                .iter()
                .fold(procfs::NetDev::default(), |mut acc, d| {
                    acc.rx_bytes += d.rx_bytes;
                    acc.tx_bytes += d.tx_bytes;
                    acc.rx_packets += d.rx_packets;
                    acc.tx_packets += d.tx_packets;
                    acc.rx_errs += d.rx_errs;
                    acc.tx_errs += d.tx_errs;
                    acc.rx_drop += d.rx_drop;
                    acc.tx_drop += d.tx_drop;
                    acc
                });
            ctx.line(format!("Bytes Sent: {}", group_digits(total.tx_bytes)));
            ctx.line(format!("Bytes Received: {}", group_digits(total.rx_bytes)));
            ctx.line(format!("Packets Sent: {}", group_digits(total.tx_packets)));
            ctx.line(format!("Packets Received: {}", group_digits(total.rx_packets)));
            ctx.line(format!("Errors In: {}", total.rx_errs));
            ctx.line(format!("Errors Out: {}", total.tx_errs));
            ctx.line(format!("Drops In: {}", total.rx_drop));
            ctx.line(format!("Drops Out: {}", total.tx_drop));
        }
        Err(e) => ctx.line(format!("Error: {e:#}")),
    }

    if ctx.is_cancelled() {
        return Ok(());
    }

    ctx.blank();
    ctx.blank();
    ctx.section("DNS Resolution Test");
    for host in DNS_TEST_HOSTS {
        let resolved = (*host, 80)
            .to_socket_addrs()
            .ok()
            .and_then(|addrs| addrs.min_by_key(|a| !a.is_ipv4()));
        match resolved {
            Some(addr) => ctx.line(format!("{host}: {} - OK", addr.ip())),
            None => ctx.line(format!("{host}: FAILED")),
        }
    }

    if ctx.is_cancelled() {
        return Ok(());
    }

    ctx.blank();
    ctx.blank();
    ctx.section("Connectivity Test");
    let ping = Command::new("ping")
        .args(["-c", "2", "-W", "2", CONNECTIVITY_TARGET])
        .output();
    match ping {
        Ok(out) if out.status.success() => ctx.line(format!(
            "Internet connectivity: OK ({CONNECTIVITY_TARGET} reachable)"
        )),
        Ok(_) => ctx.line("Internet connectivity: FAILED"),
        Err(e) => ctx.line(format!("Connectivity test error: {e}")),
    }

    ctx.blank();
    ctx.blank();
    ctx.section(&format!("Active Connections (sample, first {CONNECTION_SAMPLE})"));
    let connections = procfs::read_connections(CONNECTION_SAMPLE);
    if connections.is_empty() {
        ctx.line("No active connections visible");
    }
    for conn in connections {
        ctx.line(format!(
            "{} {} -> {} ({})",
            conn.protocol.to_uppercase(),
            conn.local,
            conn.remote,
            conn.state
        ));
    }

    ctx.footer();
    Ok(())
}
