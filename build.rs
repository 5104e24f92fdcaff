//! Embeds the short commit id as `GIT_HASH` for the startup log line

use std::process::Command;

fn commit_id() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short=10", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!id.is_empty()).then_some(id)
}

fn main() {
    let id = commit_id().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_HASH={id}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
