use colored::Colorize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git;
use crate::types::{ResolvedVersion, SemanticVersion};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read fallback version file {}: {source}", .path.display())]
    ReadFallback { path: PathBuf, source: io::Error },

    #[error("failed to write fallback version file {}: {source}", .path.display())]
    WriteFallback { path: PathBuf, source: io::Error },

    #[error(
        "no usable semantic version: git describe gave '{describe}' and the fallback file holds '{fallback}'"
    )]
    InvalidVersions { describe: String, fallback: String },
}

/// A resolved version together with the fallback file it was reconciled with.
///
/// The fallback file is only touched by [`Resolution::persist`], so callers can
/// defer the rewrite until everything else has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: ResolvedVersion,
    fallback: String,
    fallback_file: PathBuf,
}

impl Resolution {
    /// Whether the persisted fallback differs from the resolved safe version.
    #[must_use]
    pub fn is_fallback_stale(&self) -> bool {
        self.version.safe != self.fallback
    }

    /// Store the safe version as the new fallback if it moved. Returns whether
    /// the file was rewritten.
    pub fn persist(&self) -> Result<bool, ResolveError> {
        if !self.is_fallback_stale() {
            return Ok(false);
        }

        fs::write(&self.fallback_file, &self.version.safe).map_err(|source| {
            ResolveError::WriteFallback {
                path: self.fallback_file.clone(),
                source,
            }
        })?;
        info!(
            "{} Fallback version {} -> {}",
            "↻".bright_blue(),
            self.fallback,
            self.version.safe.bright_white()
        );
        Ok(true)
    }
}

/// Resolve the project version for `repo` against `fallback_file`.
///
/// Without a repository the fallback file's content is the describe output, so
/// the persisted version is used as is.
pub fn resolve_version(repo: &Path, fallback_file: &Path) -> Result<Resolution, ResolveError> {
    let fallback = read_fallback(fallback_file)?;
    let describe = git::run_git_command(&["describe", "--long"], &fallback, repo);
    debug!("describe output: {}", describe);

    Ok(Resolution {
        version: reconcile(&describe, &fallback)?,
        fallback,
        fallback_file: fallback_file.to_path_buf(),
    })
}

fn read_fallback(path: &Path) -> Result<String, ResolveError> {
    fs::read_to_string(path)
        .map(|text| text.trim().to_string())
        .map_err(|source| ResolveError::ReadFallback {
            path: path.to_path_buf(),
            source,
        })
}

/// Pick the version to report from a describe string and the fallback text.
pub fn reconcile(describe: &str, fallback: &str) -> Result<ResolvedVersion, ResolveError> {
    let candidate = strip_tag_prefix(describe);

    if let Some(version) = SemanticVersion::parse(candidate) {
        return Ok(ResolvedVersion {
            full: candidate.to_string(),
            safe: version.safe(),
        });
    }

    warn!(
        "'{}' is not a semantic version, using fallback '{}'",
        candidate, fallback
    );

    SemanticVersion::parse(fallback)
        .map(|version| ResolvedVersion {
            full: fallback.to_string(),
            safe: version.safe(),
        })
        .ok_or_else(|| ResolveError::InvalidVersions {
            describe: describe.to_string(),
            fallback: fallback.to_string(),
        })
}

/// Everything after the first `v`, or the whole string if there is none.
fn strip_tag_prefix(describe: &str) -> &str {
    describe.split_once('v').map_or(describe, |(_, rest)| rest)
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
    use crate::git::testing::{git, git_available, init_repo};
    use tempfile::TempDir;

    fn fallback_in(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("VERSION");
        fs::write(&path, content).unwrap();
        path
    }

    fn resolution(describe: &str, fallback: &str, fallback_file: &Path) -> Resolution {
        Resolution {
            version: reconcile(describe, fallback).unwrap(),
            fallback: fallback.to_string(),
            fallback_file: fallback_file.to_path_buf(),
        }
    }

    #[test]
    fn test_strip_tag_prefix() {
        assert_eq!(strip_tag_prefix("v2.0.0-5-gabc1234"), "2.0.0-5-gabc1234");
        assert_eq!(strip_tag_prefix("release-v1.0.0-0-g1"), "1.0.0-0-g1");
        assert_eq!(strip_tag_prefix("1.2.3"), "1.2.3");
        assert_eq!(strip_tag_prefix("v-invalid-format"), "-invalid-format");
    }

    #[test]
    fn test_reconcile_describe_output() {
        let resolved = reconcile("v2.0.0-5-gabc1234", "1.9.9").unwrap();
        assert_eq!(resolved.full, "2.0.0-5-gabc1234");
        assert_eq!(resolved.safe, "2.0.0");
    }

    #[test]
    fn test_reconcile_invalid_describe_uses_fallback() {
        let resolved = reconcile("v-invalid-format", "0.1.0").unwrap();
        assert_eq!(resolved.full, "0.1.0");
        assert_eq!(resolved.safe, "0.1.0");
    }

    #[test]
    fn test_reconcile_untagged_hash_uses_fallback() {
        // A bare abbreviated hash must not be mistaken for a version
        let resolved = reconcile("abc1234", "3.4.5-rc.1").unwrap();
        assert_eq!(resolved.full, "3.4.5-rc.1");
        assert_eq!(resolved.safe, "3.4.5");
    }

    #[test]
    fn test_reconcile_both_invalid_names_both_strings() {
        let err = reconcile("v-invalid-format", "not-a-version").unwrap_err();

        match &err {
            ResolveError::InvalidVersions { describe, fallback } => {
                assert_eq!(describe, "v-invalid-format");
                assert_eq!(fallback, "not-a-version");
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("v-invalid-format"));
        assert!(message.contains("not-a-version"));
    }

    #[test]
    fn test_resolve_without_repository_keeps_fallback() {
        let repo = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "1.2.3");
        let before = fs::metadata(&fallback).unwrap().modified().unwrap();

        let resolution = resolve_version(repo.path(), &fallback).unwrap();

        assert_eq!(resolution.version.full, "1.2.3");
        assert_eq!(resolution.version.safe, "1.2.3");
        assert!(!resolution.is_fallback_stale());
        assert!(!resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "1.2.3");
        assert_eq!(fs::metadata(&fallback).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_resolve_tolerates_trailing_newline_in_fallback() {
        let repo = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "1.2.3\n");

        let resolution = resolve_version(repo.path(), &fallback).unwrap();

        assert_eq!(resolution.version.safe, "1.2.3");
        assert!(!resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "1.2.3\n");
    }

    #[test]
    fn test_resolve_normalizes_prerelease_fallback() {
        let repo = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "1.3.0-beta.2");

        let resolution = resolve_version(repo.path(), &fallback).unwrap();

        assert_eq!(resolution.version.full, "1.3.0-beta.2");
        assert_eq!(resolution.version.safe, "1.3.0");
        // Nothing is written until the caller persists
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "1.3.0-beta.2");

        assert!(resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "1.3.0");
    }

    #[test]
    fn test_persist_rewrites_stale_fallback() {
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "1.9.9");

        let resolution = resolution("v2.0.0-5-gabc1234", "1.9.9", &fallback);

        assert_eq!(resolution.version.full, "2.0.0-5-gabc1234");
        assert_eq!(resolution.version.safe, "2.0.0");
        assert!(resolution.is_fallback_stale());
        assert!(resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "2.0.0");
    }

    #[test]
    fn test_persist_leaves_fallback_when_invalid_describe() {
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "0.1.0");

        let resolution = resolution("v-invalid-format", "0.1.0", &fallback);

        assert_eq!(resolution.version.full, "0.1.0");
        assert_eq!(resolution.version.safe, "0.1.0");
        assert!(!resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "0.1.0");
    }

    #[test]
    fn test_persist_reports_unwritable_fallback() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone").join("VERSION");

        let resolution = resolution("v2.0.0-0-gabc1234", "1.0.0", &missing);

        let err = resolution.persist().unwrap_err();
        assert!(matches!(err, ResolveError::WriteFallback { .. }));
    }

    #[test]
    fn test_resolve_missing_fallback_file_is_fatal() {
        let repo = TempDir::new().unwrap();
        let missing = repo.path().join("VERSION");

        let err = resolve_version(repo.path(), &missing).unwrap_err();
        assert!(matches!(err, ResolveError::ReadFallback { .. }));
    }

    #[test]
    fn test_resolve_both_invalid_is_fatal() {
        let repo = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "garbage");

        let err = resolve_version(repo.path(), &fallback).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidVersions { .. }));
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "garbage");
    }

    #[test]
    fn test_repeated_resolution_is_stable() {
        let repo = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let fallback = fallback_in(&dir, "4.5.6+build.7");

        let first = resolve_version(repo.path(), &fallback).unwrap();
        first.persist().unwrap();
        let second = resolve_version(repo.path(), &fallback).unwrap();
        second.persist().unwrap();
        let third = resolve_version(repo.path(), &fallback).unwrap();

        assert_eq!(first.version.safe, "4.5.6");
        assert_eq!(second.version.safe, first.version.safe);
        assert_eq!(third, second);
        assert!(!third.is_fallback_stale());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "4.5.6");
    }

    #[test]
    fn test_resolve_from_tagged_repository() {
        if !git_available() {
            return;
        }
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        git(repo.path(), &["tag", "-a", "v2.0.0", "-m", "release 2.0.0"]);
        git(repo.path(), &["commit", "--quiet", "--allow-empty", "-m", "after release"]);
        let fallback = fallback_in(&repo, "1.9.9");

        let resolution = resolve_version(repo.path(), &fallback).unwrap();

        assert!(
            resolution.version.full.starts_with("2.0.0-1-g"),
            "unexpected full version {}",
            resolution.version.full
        );
        assert_eq!(resolution.version.safe, "2.0.0");
        assert!(resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "2.0.0");
    }

    #[test]
    fn test_resolve_from_untagged_repository_uses_fallback() {
        if !git_available() {
            return;
        }
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let fallback = fallback_in(&repo, "0.1.0");

        let resolution = resolve_version(repo.path(), &fallback).unwrap();

        assert_eq!(resolution.version.full, "0.1.0");
        assert_eq!(resolution.version.safe, "0.1.0");
        assert!(!resolution.persist().unwrap());
        assert_eq!(fs::read_to_string(&fallback).unwrap(), "0.1.0");
    }
}
