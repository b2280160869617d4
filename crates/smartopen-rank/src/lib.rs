pub mod fzy;
pub mod ranking;
pub mod service;
pub mod session;
pub mod snapshot;

use smartopen_store::StoreError;
use thiserror::Error;

pub use ranking::{
    NormalizationTargets, ScoreRange, apply_penalty, close_score, compare_ranked,
    composite_score, map_range,
};
pub use service::SmartOpenService;
pub use session::{
    HINT_LABEL, RankedKind, RankedResult, RankingOptions, RankingSession, ScoreBreakdown,
};
pub use snapshot::{CandidateEvent, CandidateSnapshot};

#[derive(Debug, Error)]
pub enum RankError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("usage store error: {0}")]
    Store(#[from] StoreError),
}
