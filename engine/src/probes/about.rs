//! about_diagnostix — version and runtime details

use anyhow::Result;

use super::ProbeContext;

pub fn run(ctx: &ProbeContext) -> Result<()> {
    ctx.banner("DiagnOStiX - System Diagnostics Platform");

    ctx.line(format!("Version: {}", env!("CARGO_PKG_VERSION")));
    ctx.blank();

    list(
        ctx,
        "Description:",
        &[
            "A lightweight diagnostics service for PC repair,",
            "system triage, and developer tooling.",
        ],
    );
    list(
        ctx,
        "Diagnostic Categories:",
        &[
            "• System Overview & Hardware Health",
            "• Disk Diagnostics & S.M.A.R.T. Data",
            "• Network Diagnostics & Speed Tests",
            "• CPU & Memory Stress Tests",
            "• GPU Detection & Monitoring",
            "• Boot Diagnostics, Repair & Support Bundles",
        ],
    );

    ctx.line("Runtime Environment:");
    ctx.line(format!("  OS: {} {}", std::env::consts::OS, kernel_release()));
    ctx.line(format!("  Architecture: {}", std::env::consts::ARCH));
    ctx.line(format!("  Hostname: {}", hostname()));
    ctx.line(format!(
        "  Timestamp: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    ctx.blank();

    ctx.line("Built for technicians, sysadmins, and developers");
    ctx.line("who want clean answers fast.");
    ctx.footer();
    Ok(())
}

fn list(ctx: &ProbeContext, header: &str, items: &[&str]) {
    ctx.line(header);
    for item in items {
        ctx.line(format!("  {item}"));
    }
    ctx.blank();
}

pub(crate) fn kernel_release() -> String {
    nix::sys::utsname::uname()
        .map(|u| u.release().to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into())
}

pub(crate) fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into())
}
