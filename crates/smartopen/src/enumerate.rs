use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::overrides::{Override, OverrideBuilder};
use smartopen_config::{CandidatesConfig, SMARTOPEN_DIR_NAME};
use smartopen_core::{Candidate, normalize_path};

const ALWAYS_SKIPPED: [&str; 3] = [".git", SMARTOPEN_DIR_NAME, "target"];

/// Every file under `workspace` that the candidate config admits, as
/// workspace-relative candidates sorted by label.
pub fn enumerate_candidates(workspace: &Path, config: &CandidatesConfig) -> Result<Vec<Candidate>> {
    let overrides = build_overrides(workspace, &config.exclude)?;
    let walker = WalkBuilder::new(workspace)
        .hidden(!config.include_hidden)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .ignore(config.respect_gitignore)
        .parents(config.respect_gitignore)
        .require_git(false)
        .overrides(overrides)
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_name(entry.file_name()))
        .build();

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable workspace entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        let relative = relative_workspace_path(workspace, entry.path());
        candidates.push(Candidate::from_relative(relative.to_string_lossy()));
    }

    candidates.sort_by(|left, right| left.label.cmp(&right.label));
    tracing::debug!(
        workspace = %workspace.display(),
        candidates = candidates.len(),
        "enumerated candidates"
    );
    Ok(candidates)
}

/// Applies the enumeration rules to single paths reported by the watcher.
/// Only the root `.gitignore` is consulted.
pub struct CandidateFilter {
    overrides: Override,
    gitignore: Option<Gitignore>,
    include_hidden: bool,
}

impl CandidateFilter {
    pub fn new(workspace: &Path, config: &CandidatesConfig) -> Result<Self> {
        let gitignore = if config.respect_gitignore {
            let mut builder = GitignoreBuilder::new(workspace);
            if let Some(err) = builder.add(workspace.join(".gitignore")) {
                tracing::debug!(error = %err, "root .gitignore not loaded");
            }
            Some(builder.build().context("failed to build .gitignore matcher")?)
        } else {
            None
        };

        Ok(Self {
            overrides: build_overrides(workspace, &config.exclude)?,
            gitignore,
            include_hidden: config.include_hidden,
        })
    }

    pub fn admits(&self, relative: &Path, is_dir: bool) -> bool {
        if relative.is_absolute() || is_ignored_path(relative) {
            return false;
        }
        if !self.include_hidden
            && relative
                .components()
                .any(|component| component.as_os_str().to_string_lossy().starts_with('.'))
        {
            return false;
        }
        if self.overrides.matched(relative, is_dir).is_ignore() {
            return false;
        }
        if let Some(gitignore) = &self.gitignore
            && gitignore
                .matched_path_or_any_parents(relative, is_dir)
                .is_ignore()
        {
            return false;
        }
        true
    }
}

pub fn relative_workspace_path(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute()
        && let Ok(relative) = path.strip_prefix(workspace)
    {
        return relative.to_path_buf();
    }
    path.to_path_buf()
}

/// Usage-record id for a user-supplied path: workspace-relative and
/// `/`-separated when the path lies inside the workspace.
pub fn candidate_id_for(workspace: &Path, path: &str) -> String {
    let relative = relative_workspace_path(workspace, Path::new(path));
    let id = normalize_path(&relative.to_string_lossy());
    id.strip_prefix("./").map(str::to_owned).unwrap_or(id)
}

pub fn is_ignored_path(path: &Path) -> bool {
    path.components()
        .any(|component| is_skipped_name(component.as_os_str()))
}

fn is_skipped_name(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    ALWAYS_SKIPPED.contains(&name.as_ref())
}

fn build_overrides(workspace: &Path, exclude: &[String]) -> Result<Override> {
    let mut builder = OverrideBuilder::new(workspace);
    for pattern in exclude {
        builder
            .add(&format!("!{pattern}"))
            .with_context(|| format!("invalid exclude glob '{pattern}'"))?;
    }
    builder.build().context("failed to build exclude globs")
}
