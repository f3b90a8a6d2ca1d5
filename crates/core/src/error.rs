//! Error taxonomy shared by every layer.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = PortfolioError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PortfolioError {
    /// An artifact path is unusable for the tool (wrong extension, missing file,
    /// or a path that would break the canonical instance key).
    #[error("invalid instance artifact {}: {reason}", path.display())]
    InvalidInstance { path: PathBuf, reason: String },

    #[error(
        "resource exhausted: requested {requested_cpu} cpu / {requested_gpu} gpu \
         but only {remaining_cpu} cpu / {remaining_gpu} gpu remain"
    )]
    ResourceExhausted {
        requested_cpu: usize,
        requested_gpu: usize,
        remaining_cpu: usize,
        remaining_gpu: usize,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("optimizer failed while {stage}: {message}")]
    OptimizerFailure { stage: String, message: String },

    #[error("unknown verifier tool `{0}`")]
    UnknownTool(String),

    #[error("run interrupted by shutdown signal")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PortfolioError {
    pub fn exhausted(
        requested: (usize, usize),
        remaining: (usize, usize),
    ) -> Self {
        PortfolioError::ResourceExhausted {
            requested_cpu: requested.0,
            requested_gpu: requested.1,
            remaining_cpu: remaining.0,
            remaining_gpu: remaining.1,
        }
    }

    pub fn invalid_instance(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PortfolioError::InvalidInstance {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
