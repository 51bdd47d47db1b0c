//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Resolve file-hosting links and download what they point to.
///
/// Short links, embed pages and share links are followed to their canonical
/// form before a site adapter takes over. Folders and lists are downloaded
/// file by file with bounded concurrency.
#[derive(Parser, Debug)]
#[command(name = "netdrive")]
#[command(author, version, about)]
pub struct Args {
    /// Link to resolve and download
    pub url: String,

    /// Directory to download into [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100) [default: 12]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum retry attempts for transient failures (0-10) [default: 5]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Print the canonical URLs and exit
    #[arg(long, conflicts_with = "list")]
    pub resolve_only: bool,

    /// Print the identity of every file-level session and exit
    #[arg(long)]
    pub list: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    const URL: &str = "https://pixeldrain.com/u/abc";

    #[test]
    fn test_cli_minimal_args() {
        let args = Args::try_parse_from(["netdrive", URL]).unwrap();
        assert_eq!(args.url, URL);
        assert_eq!(args.output, None);
        assert_eq!(args.concurrency, None);
        assert_eq!(args.max_retries, None);
        assert!(!args.resolve_only);
        assert!(!args.list);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_url_is_required() {
        let err = Args::try_parse_from(["netdrive"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_all_options() {
        let args = Args::try_parse_from([
            "netdrive", "-o", "out", "-c", "4", "-r", "0", "--list", "-vv", URL,
        ])
        .unwrap();
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.max_retries, Some(0));
        assert!(args.list);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_concurrency_range() {
        for bad in ["0", "101"] {
            let err = Args::try_parse_from(["netdrive", "-c", bad, URL]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
        let args = Args::try_parse_from(["netdrive", "--concurrency", "100", URL]).unwrap();
        assert_eq!(args.concurrency, Some(100));
    }

    #[test]
    fn test_cli_max_retries_range() {
        let err = Args::try_parse_from(["netdrive", "-r", "11", URL]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_resolve_only_conflicts_with_list() {
        let err = Args::try_parse_from(["netdrive", "--resolve-only", "--list", URL]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_help_and_version() {
        let err = Args::try_parse_from(["netdrive", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = Args::try_parse_from(["netdrive", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_unknown_flag_rejected() {
        let err = Args::try_parse_from(["netdrive", "--rate-limit", "5", URL]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }
}
