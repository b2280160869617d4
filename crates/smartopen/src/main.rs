use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use smartopen::cli::{Cli, Commands, LogFormat, parse_cli};
use smartopen::rank::run_rank_once;
use smartopen::serve::run_serve;
use smartopen::usage::{run_export, run_import, run_open, run_prune, run_usage};
use smartopen_config::{
    SmartOpenConfig, config_path, ensure_workspace_config, normalize_config, validate_config,
};
use smartopen_core::current_unix_timestamp_millis;
use smartopen_rank::SmartOpenService;
use smartopen_store::SqliteUsageStore;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "smartopen=info,smartopen_rank=info,smartopen_store=info";

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format);
    run(cli)
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Human => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = load_config(&workspace)?;
    let store = SqliteUsageStore::open(&workspace).context("failed to open usage store")?;
    let mut service = SmartOpenService::from_config(store, &config);
    let now_ms = current_unix_timestamp_millis();

    if config.retention.prune_on_startup && !matches!(cli.command, Commands::Prune(_)) {
        service
            .prune_stale(now_ms)
            .context("startup prune failed")?;
    }

    let mut out = std::io::stdout();
    match &cli.command {
        Commands::Rank(args) => {
            run_rank_once(&workspace, &config, &mut service, args, now_ms, &mut out)
        }
        Commands::Open(args) => run_open(&workspace, &service, args, now_ms, &mut out),
        Commands::Prune(args) => run_prune(&service, args, now_ms, &mut out),
        Commands::Usage(args) => run_usage(service.store(), args, now_ms, &mut out),
        Commands::Export(args) => run_export(service.store(), args, &mut out),
        Commands::Import(args) => {
            let imported = run_import(service.store(), args)?;
            writeln!(out, "imported {imported} usage records")?;
            Ok(())
        }
        Commands::Serve(args) => run_serve(&workspace, &config, &service, args),
    }
}

fn load_config(workspace: &Path) -> Result<SmartOpenConfig> {
    let config = ensure_workspace_config(workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            config_path(workspace).display()
        )
    })?;

    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "config warning: {}", warning.message);
    }
    Ok(normalize_config(config))
}
