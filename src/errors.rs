//! Error types shared across the crate.

use thiserror::Error;

/// The error type a user log-density implementation may return.
pub type EvalError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for sampler, pipeline and backend operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An array did not have the shape the sampler was configured with.
    #[error("incompatible dimensions: expected {expected:?}, got {got:?}")]
    Shape {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A walker coordinate was infinite or NaN before evaluation.
    #[error("at least one parameter value was {0}")]
    NonFiniteParameters(&'static str),

    /// The log-probability function returned NaN for at least one walker.
    #[error("log-probability function returned NaN")]
    NaNLogProb,

    /// A thinning factor must be a positive integer.
    #[error("invalid thinning argument: {0}")]
    InvalidThinning(usize),

    /// Resuming with no initial state and no prior run recorded.
    #[error("cannot resume: no initial state given and no previous run recorded")]
    MissingState,

    /// The user's log-density computation itself failed.
    #[error("log-probability function failed")]
    Evaluator(#[source] EvalError),

    /// Some walkers in one batch returned blobs and others did not.
    #[error("log-probability function returned blobs for only part of the ensemble")]
    InconsistentBlobs,

    /// The chain is too short for a reliable autocorrelation-time estimate.
    #[error(
        "chain too short for autocorrelation estimate: need > {needed} steps, have {n_steps}"
    )]
    ChainTooShort { needed: usize, n_steps: usize },

    /// Invalid sampler configuration (walker count, move weights, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading or writing a checkpoint file failed.
    #[error("checkpoint failure: {0}")]
    Checkpoint(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
