use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod git;
mod header;
mod resolver;
mod types;

use header::{emit_header, HeaderConfig};

const HEADER_NAME: &str = "version.hpp";

#[derive(Parser, Debug)]
#[command(author, version = env!("GIT_VERSION"), about = "Version Header - Derive the project version from git and write a C++ version header", long_about = None)]
struct Args {
    /// Repository to inspect (git metadata is read from <REPOSITORY>/.git)
    repository: PathBuf,

    /// Directory the header (version.hpp) is written to
    directory: PathBuf,

    /// File holding the last known version [default: <REPOSITORY>/VERSION]
    #[arg(short = 'f', long, env = "VERSION_FALLBACK_FILE")]
    fallback_file: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> HeaderConfig {
        let fallback_file = self
            .fallback_file
            .unwrap_or_else(|| self.repository.join("VERSION"));

        HeaderConfig {
            output: self.directory.join(HEADER_NAME),
            repository: self.repository,
            fallback_file,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is reserved for the version line
    let default_filter = if args.verbose {
        "version_header=debug"
    } else {
        "version_header=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();

    emit_header(&args.into_config())?;

    Ok(())
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
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_positional_arguments_only() {
        let args = Args::try_parse_from(["version-header", "/src/project", "/build/include"]).unwrap();
        let config = args.into_config();

        assert_eq!(config.repository, PathBuf::from("/src/project"));
        assert_eq!(config.output, PathBuf::from("/build/include/version.hpp"));
        assert_eq!(config.fallback_file, PathBuf::from("/src/project/VERSION"));
    }

    #[test]
    fn test_fallback_file_option_overrides_default() {
        let args = Args::try_parse_from([
            "version-header",
            "repo",
            "out",
            "--fallback-file",
            "cmake/VERSION",
        ])
        .unwrap();
        let config = args.into_config();

        assert_eq!(config.fallback_file, PathBuf::from("cmake/VERSION"));
        assert_eq!(config.output, PathBuf::from("out/version.hpp"));
    }

    #[test]
    fn test_output_format_options_are_rejected() {
        assert!(Args::try_parse_from(["version-header", "repo", "out", "--namespace", "x"]).is_err());
        assert!(
            Args::try_parse_from(["version-header", "repo", "out", "--header-name", "v.h"]).is_err()
        );
    }

    #[test]
    fn test_missing_directory_is_rejected() {
        assert!(Args::try_parse_from(["version-header", "repo"]).is_err());
    }
}
