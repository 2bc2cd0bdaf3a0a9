use regex::Regex;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use crate::git;

static SEMVER_REGEX: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn semver_regex() -> &'static Regex {
    SEMVER_REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<major>0|[1-9][0-9]*)\.(?P<minor>0|[1-9][0-9]*)\.(?P<patch>0|[1-9][0-9]*)",
            r"(?:-(?P<prerelease>(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*)",
            r"(?:\.(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*))*))?",
            r"(?:\+(?P<buildmetadata>[0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
        ))
        .expect("Semver regex is valid")
    })
}

/// A version string that fully matched the semantic-versioning grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub buildmetadata: Option<String>,
}

impl SemanticVersion {
    /// Parse `s`, or `None` unless the whole string is a semantic version.
    ///
    /// Numeric components too large for `u64` are treated as no match.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = semver_regex().captures(s)?;
        let number = |name: &str| caps.name(name)?.as_str().parse::<u64>().ok();
        let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        Some(Self {
            major: number("major")?,
            minor: number("minor")?,
            patch: number("patch")?,
            prerelease: text("prerelease"),
            buildmetadata: text("buildmetadata"),
        })
    }

    /// The `major.minor.patch` projection, dropping prerelease and build metadata.
    #[must_use]
    pub fn safe(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.buildmetadata {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

/// Outcome of version resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Version as resolved, metadata included (`2.0.0-5-gabc1234`).
    pub full: String,
    /// `major.minor.patch` only.
    pub safe: String,
}

/// Provenance of the current build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub revision: String,
    pub branch: String,
    pub date: String,
    pub hostname: String,
}

impl BuildInfo {
    pub fn collect(repo: &Path) -> Self {
        Self {
            revision: git::revision(repo),
            branch: git::branch(repo),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            hostname: hostname_or_empty(hostname::get()),
        }
    }
}

/// Host name as text; empty when the platform cannot report one.
fn hostname_or_empty(name: io::Result<OsString>) -> String {
    name.map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
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

    #[test]
    fn test_parse_plain_version() {
        let v = SemanticVersion::parse("1.2.3").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert_eq!(v.prerelease, None);
        assert_eq!(v.buildmetadata, None);
        assert_eq!(v.safe(), "1.2.3");
    }

    #[test]
    fn test_parse_describe_output() {
        let v = SemanticVersion::parse("2.0.0-5-gabc1234").unwrap();
        assert_eq!(v.safe(), "2.0.0");
        assert_eq!(v.prerelease.as_deref(), Some("5-gabc1234"));
        assert_eq!(v.to_string(), "2.0.0-5-gabc1234");
    }

    #[test]
    fn test_parse_prerelease_and_build_metadata() {
        let v = SemanticVersion::parse("1.0.0-alpha.1+build.20240101").unwrap();
        assert_eq!(v.prerelease.as_deref(), Some("alpha.1"));
        assert_eq!(v.buildmetadata.as_deref(), Some("build.20240101"));
        assert_eq!(v.to_string(), "1.0.0-alpha.1+build.20240101");

        let v = SemanticVersion::parse("0.0.0+001").unwrap();
        assert_eq!(v.prerelease, None);
        assert_eq!(v.buildmetadata.as_deref(), Some("001"));
    }

    #[test]
    fn test_parse_rejects_partial_matches() {
        for input in [
            "",
            "1",
            "1.2",
            "1.2.3.4",
            "01.2.3",
            "1.02.3",
            "1.2.03",
            "1.2.3-",
            "1.2.3-01",
            "1.2.3+",
            "1.2.3-alpha..1",
            "-invalid-format",
            " 1.2.3",
            "1.2.3\n",
            "v1.2.3",
            "1.2.x",
        ] {
            assert!(
                SemanticVersion::parse(input).is_none(),
                "accepted invalid version {input:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_non_ascii_digits() {
        assert!(SemanticVersion::parse("١.2.3").is_none());
    }

    #[test]
    fn test_parse_rejects_overflowing_component() {
        assert!(SemanticVersion::parse("99999999999999999999.0.0").is_none());
        assert!(SemanticVersion::parse("18446744073709551615.0.0").is_some());
    }

    #[test]
    fn test_safe_projection_is_idempotent() {
        for input in [
            "0.0.0",
            "1.2.3",
            "10.20.30",
            "1.0.0-rc.1",
            "2.0.0-5-gabc1234",
            "1.0.0-x.7.z.92+exp.sha.5114f85",
        ] {
            let safe = SemanticVersion::parse(input).unwrap().safe();
            let again = SemanticVersion::parse(&safe).unwrap();
            assert_eq!(again.safe(), safe, "safe form of {input} is not stable");
            assert_eq!(again.to_string(), safe);
        }
    }

    #[test]
    fn test_build_info_defaults_without_repository() {
        let dir = TempDir::new().unwrap();
        let info = BuildInfo::collect(dir.path());

        assert_eq!(info.revision, "0");
        assert_eq!(info.branch, "UNKNOWN");
        assert_eq!(info.date.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&info.date, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn test_unavailable_hostname_is_empty() {
        let failed = Err(io::Error::other("no uname"));
        assert_eq!(hostname_or_empty(failed), "");
        assert_eq!(hostname_or_empty(Ok(OsString::from("builder"))), "builder");
    }
}
