use std::process::Command;

fn main() {
    // Release pipelines can pin the version explicitly
    let version = std::env::var("GIT_VERSION").unwrap_or_else(|_| {
        // Same describe shape the tool itself resolves; crate version when git has nothing to say
        Command::new("git")
            .args(["describe", "--long", "--tags"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    });

    println!("cargo:rustc-env=GIT_VERSION={version}");

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");
    println!("cargo:rerun-if-env-changed=GIT_VERSION");
}
