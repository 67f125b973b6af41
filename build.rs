use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

/// The subset of `Cargo.lock` the build metadata needs
#[derive(Deserialize)]
struct Lockfile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Deserialize)]
struct LockedPackage {
    name: String,
    version: String,
}

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let lock_path = Path::new(&manifest_dir).join("Cargo.lock");

    let commit = git(&["rev-parse", "--short", "HEAD"]);
    let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]);
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = command_output(&rustc, &["--version"]);

    println!("cargo:rustc-env=HEARTH_GIT_COMMIT={}", commit.unwrap_or_else(unknown));
    println!("cargo:rustc-env=HEARTH_GIT_BRANCH={}", branch.unwrap_or_else(unknown));
    println!("cargo:rustc-env=HEARTH_RUSTC_VERSION={}", rustc_version.unwrap_or_else(unknown));
    println!("cargo:rustc-env=HEARTH_BUILD_DATE={}", build_date().format("%Y-%m-%d"));
    println!(
        "cargo:rustc-env=HEARTH_TWILIGHT_VERSION={}",
        locked_version(&lock_path, "twilight-gateway").unwrap_or_else(unknown)
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed={}", lock_path.display());
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
}

fn unknown() -> String {
    "unknown".to_string()
}

fn git(args: &[&str]) -> Option<String> {
    command_output("git", args)
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Resolved version of `name` in the lock file
fn locked_version(lock_path: &Path, name: &str) -> Option<String> {
    let content = std::fs::read_to_string(lock_path).ok()?;
    let lock: Lockfile = match toml::from_str(&content) {
        Ok(lock) => lock,
        Err(e) => {
            println!("cargo:warning=could not parse {}: {e}", lock_path.display());
            return None;
        }
    };
    lock.package
        .into_iter()
        .find(|package| package.name == name)
        .map(|package| package.version)
}

/// Honors SOURCE_DATE_EPOCH for reproducible builds
fn build_date() -> DateTime<Utc> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}
