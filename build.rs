use std::process::Command;

const SHA_OVERRIDE: &str = "FUELWATCH_GIT_SHA";

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    // CI images build without a checkout, so the override wins
    let sha = std::env::var(SHA_OVERRIDE)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(git_short_sha);

    let version = match sha {
        Some(sha) => format!("{}+{}", env!("CARGO_PKG_VERSION"), sha.trim()),
        None => env!("CARGO_PKG_VERSION").to_string(),
    };
    println!("cargo:rustc-env=APP_VERSION={version}");

    println!("cargo:rerun-if-env-changed={SHA_OVERRIDE}");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
