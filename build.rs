// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=CAPTURE_PREVIEW_VERSION");

    // Packagers can pin the version string explicitly
    let version = std::env::var("CAPTURE_PREVIEW_VERSION").unwrap_or_else(|_| {
        let crate_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
        match short_commit_hash() {
            Some(hash) => format!("{}-{}", crate_version, hash),
            None => crate_version,
        }
    });

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn short_commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if hash.is_empty() { None } else { Some(hash) }
}
