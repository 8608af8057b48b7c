//! Error taxonomy for template training.
//!
//! Data errors are scoped to a single galaxy (or a single primitive being
//! built) and numerical errors to a single template's perturbation step; the
//! training loop catches both, logs them, and carries on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    /// Malformed or insufficient observation / filter data.
    #[error("data error: {0}")]
    Data(String),
    /// Singular or ill-conditioned normal equations.
    #[error("numerical error: {0}")]
    Numerical(String),
    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl TrainError {
    pub(crate) fn data(msg: impl Into<String>) -> Self {
        TrainError::Data(msg.into())
    }

    pub(crate) fn numerical(msg: impl Into<String>) -> Self {
        TrainError::Numerical(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
