//! The log-probability evaluation pipeline.
//!
//! Three pieces live here:
//!
//! - [`LogProb`], the trait a target density implements. The associated
//!   `Blob` type carries any per-walker metadata the density wants to return
//!   alongside the log-probability (derived quantities, likelihood terms,
//!   ...); use `()` for none.
//! - [`WalkerPool`], the parallel-map abstraction used to spread per-walker
//!   evaluations over a rayon worker pool. Each unit of work receives only a
//!   coordinate view, with no randomness and no shared mutable state, so
//!   results are identical whichever pool runs them.
//! - [`Model`], the bundle of the above handed to each
//!   [`Move`](crate::moves::Move) so proposals can be scored.
//!
//! # Example
//!
//! ```rust
//! use ensemble_mcmc::{LogProb, WalkerEval};
//! use ndarray::ArrayView1;
//!
//! struct Himmelblau;
//!
//! impl LogProb for Himmelblau {
//!     type Blob = ();
//!
//!     fn log_prob(&self, theta: ArrayView1<f64>) -> Result<WalkerEval<()>, ensemble_mcmc::EvalError> {
//!         let (x, y) = (theta[0], theta[1]);
//!         let v = (x * x + y - 11.0).powi(2) + (x + y * y - 7.0).powi(2);
//!         Ok(WalkerEval::LogProb(-v))
//!     }
//! }
//! ```

use crate::errors::{Error, EvalError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// One walker's evaluation result.
///
/// The variant is decided by the density implementation at the type level
/// rather than re-detected per call, so a log-probability that happens to
/// look like a sequence can never be misread as blob data.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkerEval<B> {
    /// A bare log-probability.
    LogProb(f64),
    /// A log-probability plus auxiliary per-walker metadata.
    WithBlob(f64, B),
}

impl<B> WalkerEval<B> {
    fn split(self) -> (f64, Option<B>) {
        match self {
            WalkerEval::LogProb(lp) => (lp, None),
            WalkerEval::WithBlob(lp, blob) => (lp, Some(blob)),
        }
    }
}

/// An unnormalized target log-density.
///
/// Implementations must be `Send + Sync` so per-walker evaluations can be
/// dispatched to a worker pool. Any fixed data the density needs (observed
/// points, hyperparameters) lives on the implementing struct; see
/// [`FnWrapper`] for the closure-plus-arguments shorthand.
pub trait LogProb: Send + Sync {
    /// Per-walker metadata type, `()` when none is produced.
    type Blob: Clone + Send + Sync;

    /// Evaluates the log-density at one walker position.
    ///
    /// Returning `Err` aborts the current sampling call; the sampler logs
    /// the offending parameters and propagates the error unchanged.
    fn log_prob(&self, theta: ArrayView1<f64>) -> std::result::Result<WalkerEval<Self::Blob>, EvalError>;

    /// Evaluates the log-density for a whole batch of walker positions,
    /// shape `(nwalkers, ndim)`, returning one result per row.
    ///
    /// The default delegates to [`log_prob`](Self::log_prob) row by row.
    /// Override it (and construct the sampler with `vectorize(true)`) when
    /// the density can exploit batched evaluation.
    fn log_prob_batch(
        &self,
        coords: ArrayView2<f64>,
    ) -> std::result::Result<Vec<WalkerEval<Self::Blob>>, EvalError> {
        coords.rows().into_iter().map(|row| self.log_prob(row)).collect()
    }
}

/// Bare closures over a coordinate view are blob-less log-densities.
impl<F> LogProb for F
where
    F: Fn(ArrayView1<f64>) -> f64 + Send + Sync,
{
    type Blob = ();

    fn log_prob(&self, theta: ArrayView1<f64>) -> std::result::Result<WalkerEval<()>, EvalError> {
        Ok(WalkerEval::LogProb(self(theta)))
    }
}

/// A log-density function bundled with its fixed extra arguments.
///
/// This is an explicit value object rather than a capturing closure so the
/// unit of work stays plain data: the function pointer/closure and the bound
/// arguments travel together to whatever execution context evaluates them.
///
/// ```rust
/// use ensemble_mcmc::FnWrapper;
/// use ndarray::ArrayView1;
///
/// // Precision bound once, at sampler construction.
/// let target = FnWrapper::new(
///     |theta: ArrayView1<f64>, tau: &f64| -0.5 * tau * theta.dot(&theta),
///     4.0,
/// );
/// ```
#[derive(Debug, Clone)]
pub struct FnWrapper<F, A> {
    f: F,
    args: A,
}

impl<F, A> FnWrapper<F, A> {
    /// Binds `args` to `f`.
    pub fn new(f: F, args: A) -> Self {
        Self { f, args }
    }
}

impl<F, A> LogProb for FnWrapper<F, A>
where
    F: Fn(ArrayView1<f64>, &A) -> f64 + Send + Sync,
    A: Send + Sync,
{
    type Blob = ();

    fn log_prob(&self, theta: ArrayView1<f64>) -> std::result::Result<WalkerEval<()>, EvalError> {
        Ok(WalkerEval::LogProb((self.f)(theta, &self.args)))
    }
}

/// How per-walker evaluations are mapped over the ensemble.
///
/// The outer sampling loop is strictly sequential; this is the one place
/// parallelism exists, across walkers within a round. Results always come
/// back in walker order regardless of completion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WalkerPool {
    /// Plain sequential mapping (the default).
    #[default]
    Serial,
    /// Dispatch walker evaluations across the rayon thread pool.
    Rayon,
}

impl WalkerPool {
    fn map<R, G>(&self, n: usize, f: G) -> Vec<R>
    where
        R: Send,
        G: Fn(usize) -> R + Sync + Send,
    {
        match self {
            WalkerPool::Serial => (0..n).map(f).collect(),
            WalkerPool::Rayon => (0..n).into_par_iter().map(f).collect(),
        }
    }
}

/// The evaluation interface handed to each move's `propose`.
///
/// Stateless with respect to chain progress; the sampler rebuilds one per
/// `sample()` call from its own configuration.
pub struct Model<'a, L: LogProb> {
    log_prob_fn: &'a L,
    pool: &'a WalkerPool,
    vectorize: bool,
}

impl<'a, L: LogProb> Model<'a, L> {
    pub(crate) fn new(log_prob_fn: &'a L, pool: &'a WalkerPool, vectorize: bool) -> Self {
        Self {
            log_prob_fn,
            pool,
            vectorize,
        }
    }

    /// Computes log-probabilities (and blobs) for a batch of walker
    /// positions, shape `(nwalkers, ndim)`.
    ///
    /// # Errors
    ///
    /// * [`Error::NonFiniteParameters`] if any coordinate is infinite or NaN.
    /// * [`Error::Evaluator`] if the user function fails; the offending
    ///   parameters are logged first.
    /// * [`Error::NaNLogProb`] if any returned log-probability is NaN.
    ///   Infinities (including `-inf`) pass through.
    /// * [`Error::InconsistentBlobs`] if only part of the batch carries
    ///   blob data.
    pub fn compute_log_prob(
        &self,
        coords: ArrayView2<f64>,
    ) -> Result<(Array1<f64>, Option<Vec<L::Blob>>)> {
        if coords.iter().any(|v| v.is_infinite()) {
            return Err(Error::NonFiniteParameters("infinite"));
        }
        if coords.iter().any(|v| v.is_nan()) {
            return Err(Error::NonFiniteParameters("NaN"));
        }

        let n = coords.nrows();
        let results: Vec<std::result::Result<WalkerEval<L::Blob>, EvalError>> =
            if self.vectorize {
                match self.log_prob_fn.log_prob_batch(coords) {
                    Ok(evals) => evals.into_iter().map(Ok).collect(),
                    Err(e) => {
                        log::error!(
                            "log-probability function failed on batch of {n} walkers: {e}"
                        );
                        return Err(Error::Evaluator(e));
                    }
                }
            } else {
                self.pool.map(n, |i| self.log_prob_fn.log_prob(coords.row(i)))
            };

        let mut log_prob = Array1::zeros(n);
        let mut blobs: Vec<L::Blob> = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            let eval = match result {
                Ok(eval) => eval,
                Err(e) => {
                    log::error!(
                        "log-probability function failed for walker {i}: params {:?}: {e}",
                        coords.row(i)
                    );
                    return Err(Error::Evaluator(e));
                }
            };
            let (lp, blob) = eval.split();
            log_prob[i] = lp;
            match blob {
                Some(b) => {
                    if blobs.len() != i {
                        return Err(Error::InconsistentBlobs);
                    }
                    blobs.push(b);
                }
                None => {
                    if !blobs.is_empty() {
                        return Err(Error::InconsistentBlobs);
                    }
                }
            }
        }

        if log_prob.iter().any(|v| v.is_nan()) {
            return Err(Error::NaNLogProb);
        }

        let blobs = if blobs.is_empty() { None } else { Some(blobs) };
        Ok((log_prob, blobs))
    }
}
