use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::resolver::resolve_version;
use crate::types::{BuildInfo, ResolvedVersion};

const NAMESPACE: &str = "librenormalize::version";

/// Where to read the version from and where to emit the header.
#[derive(Debug, Clone)]
pub struct HeaderConfig {
    pub repository: PathBuf,
    pub output: PathBuf,
    pub fallback_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    Written,
    Unchanged,
}

/// Resolve the version, refresh the header and print the safe version.
///
/// Standard output carries nothing but that one line.
pub fn emit_header(config: &HeaderConfig) -> Result<String> {
    let (resolved, status) = generate(config)?;

    match status {
        HeaderStatus::Written => info!(
            "{} Wrote {} ({})",
            "✓".bright_green(),
            config.output.display(),
            resolved.full.bright_white()
        ),
        HeaderStatus::Unchanged => {
            debug!("{} is up to date", config.output.display());
        }
    }

    println!("{}", resolved.safe);
    Ok(resolved.safe)
}

/// The fallback file is only rewritten once the header is in place.
fn generate(config: &HeaderConfig) -> Result<(ResolvedVersion, HeaderStatus)> {
    let build = BuildInfo::collect(&config.repository);
    let resolution = resolve_version(&config.repository, &config.fallback_file)?;
    let text = render_header(&resolution.version, &build);
    let status = write_if_changed(&config.output, &text)?;
    resolution.persist()?;
    Ok((resolution.version, status))
}

#[must_use]
pub fn render_header(version: &ResolvedVersion, build: &BuildInfo) -> String {
    let constants = [
        (
            "`project` git repository revision information at build time",
            "git_revision",
            build.revision.as_str(),
        ),
        (
            "`project` git repository branch at build time",
            "git_branch",
            build.branch.as_str(),
        ),
        (
            "build date in YYYY-MM-DD format",
            "build_date",
            build.date.as_str(),
        ),
        ("`project` version", "version_number", version.safe.as_str()),
        (
            "hostname of the build machine",
            "build_hostname",
            build.hostname.as_str(),
        ),
        (
            "version with metadata included",
            "meta_version",
            version.full.as_str(),
        ),
    ];

    let body: String = constants
        .iter()
        .map(|(doc, name, value)| {
            format!(
                "    //! {doc}\n    auto constexpr {name} = \"{}\";\n",
                escape_literal(value)
            )
        })
        .collect();

    format!("#pragma once\n//! \\file\nnamespace {NAMESPACE}{{\n{body}}}\n")
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Write `text` to `path` unless the file already holds exactly that content.
///
/// Missing parent directories are created first.
pub fn write_if_changed(path: &Path, text: &str) -> Result<HeaderStatus> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    match fs::read(path) {
        Ok(existing) if existing == text.as_bytes() => return Ok(HeaderStatus::Unchanged),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    }

    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(HeaderStatus::Written)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_build() -> BuildInfo {
        BuildInfo {
            revision: "0123456789abcdef0123456789abcdef01234567".to_string(),
            branch: "main".to_string(),
            date: "2024-03-01".to_string(),
            hostname: "builder".to_string(),
        }
    }

    fn sample_version() -> ResolvedVersion {
        ResolvedVersion {
            full: "2.0.0-5-gabc1234".to_string(),
            safe: "2.0.0".to_string(),
        }
    }

    fn config_in(dir: &TempDir, fallback: &str) -> HeaderConfig {
        let repository = dir.path().join("repo");
        fs::create_dir(&repository).unwrap();
        let fallback_file = repository.join("VERSION");
        fs::write(&fallback_file, fallback).unwrap();

        HeaderConfig {
            repository,
            output: dir.path().join("build").join("include").join("version.hpp"),
            fallback_file,
        }
    }

    #[test]
    fn test_render_header() {
        let text = render_header(&sample_version(), &sample_build());

        let expected = r#"#pragma once
//! \file
namespace librenormalize::version{
    //! `project` git repository revision information at build time
    auto constexpr git_revision = "0123456789abcdef0123456789abcdef01234567";
    //! `project` git repository branch at build time
    auto constexpr git_branch = "main";
    //! build date in YYYY-MM-DD format
    auto constexpr build_date = "2024-03-01";
    //! `project` version
    auto constexpr version_number = "2.0.0";
    //! hostname of the build machine
    auto constexpr build_hostname = "builder";
    //! version with metadata included
    auto constexpr meta_version = "2.0.0-5-gabc1234";
}
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_header_escapes_literals() {
        let mut build = sample_build();
        build.branch = r#"feature/"quoted"\name"#.to_string();

        let text = render_header(&sample_version(), &build);
        assert!(text.contains(r#"git_branch = "feature/\"quoted\"\\name";"#));
    }

    #[test]
    fn test_write_if_changed_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c").join("version.hpp");

        let status = write_if_changed(&path, "content\n").unwrap();

        assert_eq!(status, HeaderStatus::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "content\n");
    }

    #[test]
    fn test_write_if_changed_skips_identical_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("version.hpp");

        assert_eq!(write_if_changed(&path, "one\n").unwrap(), HeaderStatus::Written);
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        assert_eq!(write_if_changed(&path, "one\n").unwrap(), HeaderStatus::Unchanged);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);

        assert_eq!(write_if_changed(&path, "two\n").unwrap(), HeaderStatus::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");
    }

    #[test]
    fn test_write_if_changed_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        assert!(write_if_changed(&blocker.join("version.hpp"), "x").is_err());
    }

    #[test]
    fn test_generate_twice_does_not_rewrite() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "1.2.3");

        let (first, status) = generate(&config).unwrap();
        assert_eq!(status, HeaderStatus::Written);
        let content = fs::read_to_string(&config.output).unwrap();

        let (second, status) = generate(&config).unwrap();
        assert_eq!(status, HeaderStatus::Unchanged);
        assert_eq!(second, first);
        assert_eq!(fs::read_to_string(&config.output).unwrap(), content);

        assert!(content.contains("auto constexpr version_number = \"1.2.3\";"));
        assert!(content.contains("auto constexpr meta_version = \"1.2.3\";"));
        assert!(content.contains("auto constexpr git_revision = \"0\";"));
        assert!(content.contains("auto constexpr git_branch = \"UNKNOWN\";"));
    }

    #[test]
    fn test_emit_header_returns_safe_version_each_run() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "0.9.0-rc.1+meta");

        assert_eq!(emit_header(&config).unwrap(), "0.9.0");
        assert_eq!(emit_header(&config).unwrap(), "0.9.0");

        let content = fs::read_to_string(&config.output).unwrap();
        assert!(content.contains("auto constexpr version_number = \"0.9.0\";"));
        assert_eq!(fs::read_to_string(&config.fallback_file).unwrap(), "0.9.0");
    }

    #[test]
    fn test_emit_header_fails_on_unusable_versions() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "unversioned");

        let err = emit_header(&config).unwrap_err();
        assert!(err.to_string().contains("unversioned"));
        assert!(!config.output.exists());
    }

    #[test]
    fn test_failed_header_write_keeps_fallback() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "1.3.0-beta.1");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        config.output = blocker.join("version.hpp");

        assert!(emit_header(&config).is_err());
        assert_eq!(
            fs::read_to_string(&config.fallback_file).unwrap(),
            "1.3.0-beta.1"
        );

        config.output = dir.path().join("include").join("version.hpp");
        assert_eq!(emit_header(&config).unwrap(), "1.3.0");
        assert_eq!(fs::read_to_string(&config.fallback_file).unwrap(), "1.3.0");
    }
}
