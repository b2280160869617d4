use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::rank::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Rank workspace files by fuzzy match, recency, frequency and proximity"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root to enumerate and rank"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format on stderr: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Rank workspace files against a query and print the results
    Rank(RankArgs),
    /// Record that a file was opened
    Open(OpenArgs),
    /// Remove usage records past their retention window
    Prune(PruneArgs),
    /// List usage records, most recent first
    Usage(UsageArgs),
    /// Write the usage mapping as JSON
    Export(ExportArgs),
    /// Load a usage mapping from JSON
    Import(ImportArgs),
    /// Answer queries from stdin while watching the workspace
    Serve(ServeArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RankArgs {
    #[arg(help = "Query text; omit to rank by usage alone")]
    pub query: Option<String>,

    #[arg(long, help = "Currently focused file, for proximity scoring")]
    pub active: Option<String>,

    #[arg(long, help = "Maximum number of results")]
    pub limit: Option<usize>,

    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    pub output: OutputFormat,

    #[arg(long, help = "Override the current time (epoch milliseconds)")]
    pub now_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct OpenArgs {
    #[arg(help = "File to record, absolute or workspace-relative")]
    pub path: String,

    #[arg(long, help = "Override the current time (epoch milliseconds)")]
    pub now_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct PruneArgs {
    #[arg(long, help = "List expired records without removing them")]
    pub dry_run: bool,

    #[arg(long, help = "Override the current time (epoch milliseconds)")]
    pub now_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UsageArgs {
    #[arg(long, default_value_t = 20, help = "Maximum number of records")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ExportArgs {
    #[arg(long, help = "Write to this file instead of stdout")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ImportArgs {
    #[arg(help = "JSON file produced by export")]
    pub file: PathBuf,

    #[arg(long, help = "Merge with existing records instead of replacing them")]
    pub merge: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ServeArgs {
    #[arg(long, help = "Initially focused file")]
    pub active: Option<String>,

    #[arg(long, help = "Do not watch the workspace for created or removed files")]
    pub no_watch: bool,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{Cli, Commands, LogFormat};

    #[test]
    fn rank_subcommand_parses_query_and_flags() {
        let cli = Cli::try_parse_from([
            "smartopen",
            "--workspace",
            "/tmp/project",
            "rank",
            "foo",
            "--active",
            "src/main.rs",
            "--limit",
            "5",
            "--output",
            "json",
            "--now-ms",
            "1700000000000",
        ])
        .expect("rank should parse");

        assert_eq!(cli.workspace, PathBuf::from("/tmp/project"));
        match cli.command {
            Commands::Rank(args) => {
                assert_eq!(args.query.as_deref(), Some("foo"));
                assert_eq!(args.active.as_deref(), Some("src/main.rs"));
                assert_eq!(args.limit, Some(5));
                assert_eq!(args.output.as_str(), "json");
                assert_eq!(args.now_ms, Some(1_700_000_000_000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rank_query_is_optional_with_table_output() {
        let cli = Cli::try_parse_from(["smartopen", "rank"]).expect("rank should parse");

        assert_eq!(cli.workspace, PathBuf::from("."));
        assert_eq!(cli.log_format, LogFormat::Human);
        match cli.command {
            Commands::Rank(args) => {
                assert_eq!(args.query, None);
                assert_eq!(args.output.as_str(), "table");
                assert_eq!(args.limit, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "smartopen",
            "usage",
            "--limit",
            "3",
            "--log-format",
            "json",
            "--workspace",
            "ws",
        ])
        .expect("usage should parse");

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.workspace, PathBuf::from("ws"));
        assert_eq!(cli.command, Commands::Usage(super::UsageArgs { limit: 3 }));
    }

    #[test]
    fn maintenance_subcommands_parse() {
        let prune = Cli::try_parse_from(["smartopen", "prune", "--dry-run"]).expect("prune");
        assert!(matches!(prune.command, Commands::Prune(ref args) if args.dry_run));

        let import = Cli::try_parse_from(["smartopen", "import", "usage.json", "--merge"])
            .expect("import");
        match import.command {
            Commands::Import(args) => {
                assert_eq!(args.file, PathBuf::from("usage.json"));
                assert!(args.merge);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let export = Cli::try_parse_from(["smartopen", "export"]).expect("export");
        assert!(matches!(export.command, Commands::Export(ref args) if args.out.is_none()));

        let serve = Cli::try_parse_from(["smartopen", "serve", "--no-watch"]).expect("serve");
        assert!(matches!(serve.command, Commands::Serve(ref args) if args.no_watch));
    }

    #[test]
    fn invalid_formats_are_rejected() {
        let err = Cli::try_parse_from(["smartopen", "rank", "foo", "--output", "xml"])
            .expect_err("expected invalid output");
        assert!(err.to_string().contains("invalid output format"));

        let err = Cli::try_parse_from(["smartopen", "--log-format", "yaml", "usage"])
            .expect_err("expected invalid log format");
        assert!(err.to_string().contains("invalid log format"));
    }

    #[test]
    fn open_requires_a_path() {
        assert!(Cli::try_parse_from(["smartopen", "open"]).is_err());
    }
}
