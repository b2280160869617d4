use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smartopen_core::{DEFAULT_DECAY_RATE, RetentionPolicy, ScoreWeights};
use thiserror::Error;

pub const SMARTOPEN_DIR_NAME: &str = ".smartopen";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_ACTIVE_FILE_PENALTY: f64 = 0.9;
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActiveFilePolicy {
    #[default]
    Penalize,
    Keep,
}

impl ActiveFilePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Penalize => "penalize",
            Self::Keep => "keep",
        }
    }
}

impl std::str::FromStr for ActiveFilePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "penalize" => Ok(Self::Penalize),
            "keep" => Ok(Self::Keep),
            other => Err(format!(
                "invalid active file policy '{other}', expected one of: penalize, keep"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SmartOpenConfig {
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub candidates: CandidatesConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default)]
    pub active_file: ActiveFilePolicy,
    #[serde(default = "default_active_file_penalty")]
    pub active_file_penalty: f64,
    #[serde(default)]
    pub weights: ScoreWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            active_file: ActiveFilePolicy::default(),
            active_file_penalty: default_active_file_penalty(),
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_base_days")]
    pub base_days: f64,
    #[serde(default = "default_retention_days_per_access")]
    pub days_per_access: f64,
    #[serde(default = "default_true")]
    pub prune_on_startup: bool,
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            base_days: self.base_days,
            days_per_access: self.days_per_access,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            base_days: default_retention_base_days(),
            days_per_access: default_retention_days_per_access(),
            prune_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatesConfig {
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for CandidatesConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_watch_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn smartopen_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(SMARTOPEN_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    smartopen_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<SmartOpenConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(SmartOpenConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: SmartOpenConfig = toml::from_str(&raw)?;
    Ok(parsed)
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<SmartOpenConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(smartopen_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = SmartOpenConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &SmartOpenConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let weights = &config.ranking.weights;

    for (name, value) in [
        ("match_quality", weights.match_quality),
        ("recency", weights.recency),
        ("frequency", weights.frequency),
        ("close", weights.close),
    ] {
        if !value.is_finite() || value < 0.0 {
            warnings.push(ConfigWarning {
                code: "negative_weight",
                message: format!(
                    "ranking.weights.{name} = {value} is not a non-negative number; using default"
                ),
            });
        }
    }

    if weights.as_array().iter().all(|value| *value == 0.0) {
        warnings.push(ConfigWarning {
            code: "zero_weights",
            message: "all ranking weights are zero; using default weights".to_owned(),
        });
    }

    if !config.ranking.decay_rate.is_finite() || config.ranking.decay_rate <= 0.0 {
        warnings.push(ConfigWarning {
            code: "invalid_decay_rate",
            message: format!(
                "ranking.decay_rate = {} must be positive; using {DEFAULT_DECAY_RATE}",
                config.ranking.decay_rate
            ),
        });
    }

    let penalty = config.ranking.active_file_penalty;
    if !penalty.is_finite() || penalty <= 0.0 || penalty > 1.0 {
        warnings.push(ConfigWarning {
            code: "invalid_active_file_penalty",
            message: format!(
                "ranking.active_file_penalty = {penalty} must be in (0, 1]; using {DEFAULT_ACTIVE_FILE_PENALTY}"
            ),
        });
    }

    if !config.retention.base_days.is_finite() || config.retention.base_days <= 0.0 {
        warnings.push(ConfigWarning {
            code: "invalid_retention_base_days",
            message: format!(
                "retention.base_days = {} must be positive; using default",
                config.retention.base_days
            ),
        });
    }

    if !config.retention.days_per_access.is_finite() || config.retention.days_per_access <= 0.0
    {
        warnings.push(ConfigWarning {
            code: "invalid_retention_days_per_access",
            message: format!(
                "retention.days_per_access = {} must be positive; using default",
                config.retention.days_per_access
            ),
        });
    }

    warnings
}

/// Replaces every value `validate_config` would warn about with its default.
pub fn normalize_config(mut config: SmartOpenConfig) -> SmartOpenConfig {
    let defaults = ScoreWeights::default();
    let weights = &mut config.ranking.weights;
    for (value, default) in [
        (&mut weights.match_quality, defaults.match_quality),
        (&mut weights.recency, defaults.recency),
        (&mut weights.frequency, defaults.frequency),
        (&mut weights.close, defaults.close),
    ] {
        if !value.is_finite() || *value < 0.0 {
            *value = default;
        }
    }
    if weights.as_array().iter().all(|value| *value == 0.0) {
        *weights = defaults;
    }

    if !config.ranking.decay_rate.is_finite() || config.ranking.decay_rate <= 0.0 {
        config.ranking.decay_rate = default_decay_rate();
    }

    let penalty = config.ranking.active_file_penalty;
    if !penalty.is_finite() || penalty <= 0.0 || penalty > 1.0 {
        config.ranking.active_file_penalty = default_active_file_penalty();
    }

    if !config.retention.base_days.is_finite() || config.retention.base_days <= 0.0 {
        config.retention.base_days = default_retention_base_days();
    }
    if !config.retention.days_per_access.is_finite() || config.retention.days_per_access <= 0.0
    {
        config.retention.days_per_access = default_retention_days_per_access();
    }

    config.candidates.exclude = config
        .candidates
        .exclude
        .into_iter()
        .map(|pattern| pattern.trim().to_owned())
        .filter(|pattern| !pattern.is_empty())
        .collect();

    config
}

fn default_decay_rate() -> f64 {
    DEFAULT_DECAY_RATE
}

fn default_active_file_penalty() -> f64 {
    DEFAULT_ACTIVE_FILE_PENALTY
}

fn default_retention_base_days() -> f64 {
    RetentionPolicy::default().base_days
}

fn default_retention_days_per_access() -> f64 {
    RetentionPolicy::default().days_per_access
}

fn default_watch_debounce_ms() -> u64 {
    DEFAULT_WATCH_DEBOUNCE_MS
}

fn default_true() -> bool {
    true
}
