use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use smartopen_config::SmartOpenConfig;
use smartopen_rank::{RankedResult, SmartOpenService};
use smartopen_store::UsageStore;

use crate::cli::RankArgs;
use crate::enumerate::{candidate_id_for, enumerate_candidates};

const TABLE_HEADER: &str = "rank\tfinal\traw\trecency\tfrequency\tclose\tpath";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: table, json"
            )),
        }
    }
}

pub fn run_rank_once<S: UsageStore>(
    workspace: &Path,
    config: &SmartOpenConfig,
    service: &mut SmartOpenService<S>,
    args: &RankArgs,
    now_ms: i64,
    out: &mut dyn Write,
) -> Result<()> {
    let candidates = enumerate_candidates(workspace, &config.candidates)
        .context("failed to enumerate workspace files")?;
    let active = args
        .active
        .as_deref()
        .map(|path| candidate_id_for(workspace, path));

    service.options_mut().limit = args.limit;
    let results = service
        .rank(
            args.query.as_deref().unwrap_or_default(),
            &candidates,
            active.as_deref(),
            args.now_ms.unwrap_or(now_ms),
        )
        .context("failed to rank candidates")?;

    write_rank_results(&results, args.output, out).context("failed to write rank results")
}

pub fn write_rank_results(
    results: &[RankedResult],
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Table => write_table(results, out)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, results)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn write_table(results: &[RankedResult], out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{TABLE_HEADER}")?;

    for result in results {
        if result.is_hint() {
            writeln!(out, "-\t\t\t\t\t\t{}", normalize_field(&result.label))?;
            continue;
        }

        let scores = &result.scores;
        writeln!(
            out,
            "{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{}",
            result.rank,
            scores.final_score,
            scores.raw,
            scores.recency,
            scores.frequency,
            scores.close,
            normalize_field(&result.relative_path)
        )?;
    }

    Ok(())
}

fn normalize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}
