use crate::types::{InstitutionId, Year};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Branch '{branch}' ({year}) has no usable coordinates or address")]
    UnlocatableBranch { year: Year, branch: String },

    #[error("No snapshot available for {year}")]
    DataGap { year: Year },

    #[error("Institution '{institution_id}' not found")]
    InstitutionNotFound { institution_id: InstitutionId },

    #[error("Cannot diff snapshots of different institutions: '{left}' vs '{right}'")]
    InstitutionMismatch {
        left:  InstitutionId,
        right: InstitutionId,
    },

    #[error("No years requested")]
    NoYearsRequested,

    #[error("Analysis cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type NetResult<T> = Result<T, NetworkError>;
