use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::string::FromUtf8Error;
use thiserror::Error;
use tracing::debug;

/// Why a git query produced no usable output.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no .git directory in {0}")]
    NoRepository(String),

    #[error("failed to run git: {0}")]
    Spawn(#[from] io::Error),

    #[error("git exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("git output is not valid UTF-8: {0}")]
    NotUtf8(#[from] FromUtf8Error),
}

/// Run `git <args>` inside `repo` and return its trimmed standard output.
///
/// Only the presence of a `.git` directory is checked before spawning; whether
/// it is a healthy repository is left for git to decide.
pub fn query(args: &[&str], repo: &Path) -> Result<String, QueryError> {
    if !repo.join(".git").is_dir() {
        return Err(QueryError::NoRepository(repo.display().to_string()));
    }

    let output = Command::new("git").args(args).current_dir(repo).output()?;

    if !output.status.success() {
        return Err(QueryError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Like [`query`], but any failure yields `default`.
pub fn run_git_command(args: &[&str], default: &str, repo: &Path) -> String {
    query(args, repo).unwrap_or_else(|e| {
        debug!("git {} -> default '{}': {}", args.join(" "), default, e);
        default.to_string()
    })
}

/// Commit SHA of `HEAD`, or `"0"`.
pub fn revision(repo: &Path) -> String {
    run_git_command(&["rev-parse", "HEAD"], "0", repo)
}

/// Current branch name, or `"UNKNOWN"`.
pub fn branch(repo: &Path) -> String {
    run_git_command(&["rev-parse", "--abbrev-ref", "HEAD"], "UNKNOWN", repo)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
pub(crate) mod testing {
    use std::path::Path;
    use std::process::Command;

    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    /// Run a mutating git command with a fixed identity, independent of host config.
    pub fn git(repo: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
            .args(["-c", "init.defaultBranch=main"])
            .args(args)
            .current_dir(repo)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env("GIT_AUTHOR_NAME", "Build Bot")
            .env("GIT_AUTHOR_EMAIL", "build@example.com")
            .env("GIT_COMMITTER_NAME", "Build Bot")
            .env("GIT_COMMITTER_EMAIL", "build@example.com")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// A repository on `main` with one empty commit.
    pub fn init_repo(repo: &Path) {
        git(repo, &["init", "--quiet"]);
        git(repo, &["commit", "--quiet", "--allow-empty", "-m", "initial"]);
    }
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
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_query_without_git_dir_is_no_repository() {
        let dir = TempDir::new().unwrap();

        let err = query(&["rev-parse", "HEAD"], dir.path()).unwrap_err();
        assert!(matches!(err, QueryError::NoRepository(_)));
    }

    #[test]
    fn test_git_file_is_not_a_repository() {
        // Worktrees and submodules use a `.git` file; only directories count
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".git"), "gitdir: /nowhere\n").unwrap();

        let err = query(&["rev-parse", "HEAD"], dir.path()).unwrap_err();
        assert!(matches!(err, QueryError::NoRepository(_)));
    }

    #[test]
    fn test_run_git_command_returns_default_without_repository() {
        let dir = TempDir::new().unwrap();

        assert_eq!(
            run_git_command(&["describe", "--long"], "1.2.3", dir.path()),
            "1.2.3"
        );
        assert_eq!(revision(dir.path()), "0");
        assert_eq!(branch(dir.path()), "UNKNOWN");
    }

    #[test]
    fn test_broken_repository_degrades_to_default() {
        // An empty .git directory passes the existence check but git rejects
        // it (or git is missing entirely); both must fall back
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();

        let err = query(&["rev-parse", "HEAD"], dir.path()).unwrap_err();
        assert!(
            matches!(err, QueryError::Failed { .. } | QueryError::Spawn(_)),
            "unexpected error: {err}"
        );
        assert_eq!(revision(dir.path()), "0");
        assert_eq!(branch(dir.path()), "UNKNOWN");
    }

    #[test]
    fn test_query_trims_output_from_real_repository() {
        if !testing::git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        testing::init_repo(dir.path());

        let sha = query(&["rev-parse", "HEAD"], dir.path()).unwrap();
        assert_eq!(sha.len(), 40, "unexpected revision {sha:?}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(revision(dir.path()), sha);
        assert_eq!(branch(dir.path()), "main");
    }
}
