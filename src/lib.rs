//! # Ensemble MCMC
//!
//! A Rust library for **affine-invariant ensemble Markov Chain Monte Carlo
//! (MCMC)** sampling, built around the stretch move of Goodman & Weare
//! (2010). An ensemble of walkers explores the target density together;
//! each walker is updated by stretching along the line through a randomly
//! chosen walker from the complementary half of the ensemble, which makes
//! the sampler invariant under affine transformations of parameter space
//! and free of per-dimension tuning parameters.
//!
//! ## Getting Started
//!
//! To use this library, add it to your project:
//! ```bash
//! cargo add ensemble-mcmc
//! ```
//!
//! You need to provide:
//! - A target log-density, either a plain closure over an
//!   `ndarray::ArrayView1<f64>` or a type implementing the [`LogProb`]
//!   trait (required when returning per-walker [blobs](WalkerEval)).
//! - An initial position for every walker, shape `(nwalkers, ndim)`.
//!
//! ## Example 1: A 5-dimensional Gaussian
//!
//! ```rust
//! use ensemble_mcmc::{EnsembleSampler, Query, SampleOptions};
//! use ndarray::{Array2, ArrayView1};
//!
//! // Unnormalized log-density of an isotropic Gaussian.
//! let log_prob = |theta: ArrayView1<f64>| -0.5 * theta.dot(&theta);
//!
//! // 32 walkers in 5 dimensions, started in a small ball around zero.
//! let mut sampler = EnsembleSampler::new(32, 5, log_prob)
//!     .unwrap()
//!     .seed(42);
//! let initial = Array2::from_shape_fn((32, 5), |(i, j)| {
//!     1e-3 * ((i * 5 + j) as f64).sin()
//! });
//!
//! sampler
//!     .run_mcmc(Some(initial.into()), 500, &SampleOptions::default())
//!     .unwrap();
//!
//! // Burn in 100 steps and flatten walkers into one sample set.
//! let query = Query { discard: 100, thin: 1 };
//! let flat = sampler.get_flat_chain(&query).unwrap();
//! assert_eq!(flat.dim(), (400 * 32, 5));
//! ```
//!
//! ## Example 2: Iterating over ensemble states
//!
//! The [`sample`](EnsembleSampler::sample) method returns a lazy iterator,
//! so you can watch convergence while the sampler runs:
//!
//! ```rust
//! use ensemble_mcmc::{EnsembleSampler, SampleOptions};
//! use ndarray::{Array2, ArrayView1};
//!
//! let log_prob = |theta: ArrayView1<f64>| -theta[0].powi(2) - theta[1].powi(4);
//! let mut sampler = EnsembleSampler::new(16, 2, log_prob).unwrap().seed(7);
//! let initial = Array2::from_shape_fn((16, 2), |(i, j)| 0.01 * (i + 3 * j) as f64);
//!
//! for state in sampler.sample(initial.into(), 50, &SampleOptions::default()).unwrap() {
//!     let state = state.unwrap();
//!     let best = state.log_prob.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
//!     assert!(best.is_finite());
//! }
//! ```
//!
//! ## Features
//! - **Lazy iteration** over ensemble states with optional thinning
//! - **Parallel walker evaluation** via rayon
//! - **Per-walker metadata (blobs)** carried alongside the chain
//! - **Resumable runs**: checkpoint an [`EnsembleState`] to disk and
//!   continue later, generator state included
//! - **Integrated autocorrelation time** estimation with Sokal windowing
//! - **Progress Indicators** (iteration counts, mean acceptance)

pub mod autocorr;
pub mod backend;
pub mod errors;
pub mod model;
pub mod moves;
pub mod rng;
pub mod sampler;
pub mod state;

pub use backend::{Backend, InMemoryBackend, Query};
pub use errors::{Error, EvalError, Result};
pub use model::{FnWrapper, LogProb, WalkerEval, WalkerPool};
pub use moves::{Move, MoveSet, StretchMove};
pub use rng::{RngSnapshot, RunRng};
pub use sampler::{EnsembleSampler, SampleIter, SampleOptions};
pub use state::{EnsembleState, InitialState};
