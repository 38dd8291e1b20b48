//! Build script for eventlink
//!
//! Embeds git, timestamp, target and compiler information for `eventlink version`.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_dirty = git_dirty();
    let values = [
        ("EVENTLINK_GIT_HASH", git(&["rev-parse", "--short=8", "HEAD"])),
        ("EVENTLINK_GIT_BRANCH", git(&["rev-parse", "--abbrev-ref", "HEAD"])),
        ("EVENTLINK_GIT_DIRTY", git_dirty.to_string()),
        (
            "EVENTLINK_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("EVENTLINK_TARGET", env_or_unknown("TARGET")),
        ("EVENTLINK_PROFILE", env_or_unknown("PROFILE")),
        ("EVENTLINK_RUSTC_VERSION", command_output("rustc", &["--version"])),
    ];

    for (name, value) in values {
        println!("cargo:rustc-env={}={}", name, value);
    }
}

fn env_or_unknown(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| "unknown".to_string())
}

/// Trimmed stdout of a successful command, "unknown" otherwise
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn git(args: &[&str]) -> String {
    command_output("git", args)
}

fn git_dirty() -> &'static str {
    Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .map(|output| {
            if output.status.success() && !output.stdout.is_empty() {
                "true"
            } else {
                "false"
            }
        })
        .unwrap_or("unknown")
}
