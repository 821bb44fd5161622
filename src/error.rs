use thiserror::Error;

use crate::types::RecommendationType;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recommendation '{id}' was never issued by this engine")]
    UnknownRecommendation { id: String },

    #[error("No bandit arm for {kind} in project '{project}'")]
    UnknownArm {
        project: String,
        kind: RecommendationType,
    },

    #[error("Recommendation '{id}' already has a decision")]
    DecisionAlreadyRecorded { id: String },

    #[error("Recommendation '{id}' already has an outcome")]
    OutcomeAlreadyRecorded { id: String },

    #[error("Recommendation '{id}' was not accepted; outcomes apply to accepted recommendations only")]
    OutcomeWithoutAcceptance { id: String },

    #[error("Concurrent updates to {kind} arm in project '{project}' after {attempts} attempts; retry the decision")]
    UpdateConflict {
        project: String,
        kind: RecommendationType,
        attempts: u32,
    },

    #[error("A planning cycle is already running for project '{project}'")]
    CycleInProgress { project: String },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AdvisorError {
    /// Errors the caller may clear by retrying the same call
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdvisorError::UpdateConflict { .. } | AdvisorError::CycleInProgress { .. }
        )
    }
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;
