// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CODESHELF_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = std::env::var("CODESHELF_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(git_version)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` mapped to "1.2.0-abc1234" at a tag and
/// "1.2.0-dirty-abc1234" for commits after it
fn git_version() -> Option<String> {
    let describe = run_git(&["describe", "--tags", "--always", "--match", "v*"])?;
    let describe = describe.strip_prefix('v').unwrap_or(&describe);

    // No tag reachable: describe printed a bare hash
    if !describe.contains('.') {
        return Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), describe));
    }

    let parts: Vec<&str> = describe.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        let hash = parts[0].strip_prefix('g').unwrap_or(parts[0]);
        return Some(format!("{}-dirty-{}", parts[2], hash));
    }

    let hash = run_git(&["rev-parse", "--short", "HEAD"])?;
    Some(format!("{}-{}", describe, hash))
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
