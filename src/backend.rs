//! Chain storage.
//!
//! A [`Backend`] records the ensemble's position, log-probabilities, blobs
//! and acceptance counts once per saved step, and serves them back with
//! optional burn-in discard and thinning. [`InMemoryBackend`] is the default
//! implementation; the trait exists so alternative stores (a memory-mapped
//! file, a database) can be dropped in without touching the sampler.

use crate::errors::{Error, Result};
use crate::rng::RngSnapshot;
use crate::state::EnsembleState;
use ndarray::{s, Array1, Array2, Array3, ArrayView1};

/// Selection applied when reading stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    /// Number of leading saved steps to drop as burn-in.
    pub discard: usize,
    /// Keep every `thin`-th step of the remainder. Must be at least one.
    pub thin: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self { discard: 0, thin: 1 }
    }
}

impl Query {
    fn validate(&self) -> Result<()> {
        if self.thin == 0 {
            return Err(Error::InvalidThinning(self.thin));
        }
        Ok(())
    }

    /// Saved-step indices selected by this query, matching
    /// `v[discard + thin - 1 .. n : thin]`.
    fn indices(&self, n: usize) -> impl Iterator<Item = usize> {
        let first = self.discard + self.thin - 1;
        let thin = self.thin;
        (first..n).step_by(thin)
    }
}

/// Storage for one sampling run.
pub trait Backend<B> {
    /// Clears all stored samples and fixes the ensemble shape.
    fn reset(&mut self, nwalkers: usize, ndim: usize);

    /// The `(nwalkers, ndim)` shape, or `None` before the first reset.
    fn shape(&self) -> Option<(usize, usize)>;

    /// Number of saved steps.
    fn iteration(&self) -> usize;

    /// Per-walker count of accepted proposals over all saved steps.
    fn accepted(&self) -> ArrayView1<usize>;

    /// The generator snapshot stored with the most recent saved step.
    fn random_state(&self) -> Option<&RngSnapshot>;

    /// Announces that roughly `additional` saved steps are coming, before
    /// the first of them is saved.
    ///
    /// Stores backed by preallocated files can extend their datasets here;
    /// the in-memory store reserves capacity. Growing is a hint, never a
    /// limit: `save_state` must accept steps beyond the announced count.
    fn grow(&mut self, _additional: usize) {}

    /// Appends one saved step.
    fn save_state(&mut self, state: &EnsembleState<B>, accepted: &Array1<bool>) -> Result<()>;

    /// Stored positions, shape `(nsteps, nwalkers, ndim)`.
    fn get_chain(&self, query: &Query) -> Result<Array3<f64>>;

    /// Stored log-probabilities, shape `(nsteps, nwalkers)`.
    fn get_log_prob(&self, query: &Query) -> Result<Array2<f64>>;

    /// Stored blobs, one `Vec<B>` per saved step, or `None` when the run
    /// produced no blobs.
    fn get_blobs(&self, query: &Query) -> Result<Option<Vec<Vec<B>>>>;

    /// Stored positions flattened across walkers, shape
    /// `(nsteps * nwalkers, ndim)`. Step-major: all walkers of the first
    /// kept step come before any walker of the second.
    fn get_flat_chain(&self, query: &Query) -> Result<Array2<f64>> {
        let chain = self.get_chain(query)?;
        let (nsteps, nwalkers, ndim) = chain.dim();
        chain
            .into_shape_with_order((nsteps * nwalkers, ndim))
            .map_err(|_| Error::Shape {
                expected: (nsteps * nwalkers, ndim),
                got: (nsteps, nwalkers),
            })
    }

    /// Stored log-probabilities flattened across walkers, length
    /// `nsteps * nwalkers`, in the same order as
    /// [`get_flat_chain`](Self::get_flat_chain).
    fn get_flat_log_prob(&self, query: &Query) -> Result<Array1<f64>> {
        let lp = self.get_log_prob(query)?;
        let (nsteps, nwalkers) = lp.dim();
        lp.into_shape_with_order(nsteps * nwalkers)
            .map_err(|_| Error::Shape {
                expected: (nsteps * nwalkers, 1),
                got: (nsteps, nwalkers),
            })
    }

    /// Stored blobs flattened across walkers, in the same order as
    /// [`get_flat_chain`](Self::get_flat_chain), or `None` when the run
    /// produced no blobs.
    fn get_flat_blobs(&self, query: &Query) -> Result<Option<Vec<B>>> {
        Ok(self
            .get_blobs(query)?
            .map(|steps| steps.into_iter().flatten().collect()))
    }

    /// The most recently saved ensemble state.
    ///
    /// # Errors
    ///
    /// [`Error::MissingState`] if nothing has been saved yet.
    fn last_sample(&self) -> Result<EnsembleState<B>>;
}

/// Growable in-memory storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend<B = ()> {
    shape: Option<(usize, usize)>,
    chain: Vec<Array2<f64>>,
    log_prob: Vec<Array1<f64>>,
    blobs: Vec<Vec<B>>,
    accepted: Array1<usize>,
    random_state: Option<RngSnapshot>,
}

impl<B> InMemoryBackend<B> {
    pub fn new() -> Self {
        Self {
            shape: None,
            chain: Vec::new(),
            log_prob: Vec::new(),
            blobs: Vec::new(),
            accepted: Array1::zeros(0),
            random_state: None,
        }
    }
}

impl<B: Clone> Backend<B> for InMemoryBackend<B> {
    fn reset(&mut self, nwalkers: usize, ndim: usize) {
        self.shape = Some((nwalkers, ndim));
        self.chain.clear();
        self.log_prob.clear();
        self.blobs.clear();
        self.accepted = Array1::zeros(nwalkers);
        self.random_state = None;
    }

    fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    fn iteration(&self) -> usize {
        self.chain.len()
    }

    fn accepted(&self) -> ArrayView1<usize> {
        self.accepted.view()
    }

    fn random_state(&self) -> Option<&RngSnapshot> {
        self.random_state.as_ref()
    }

    fn grow(&mut self, additional: usize) {
        self.chain.reserve(additional);
        self.log_prob.reserve(additional);
        if !self.blobs.is_empty() {
            self.blobs.reserve(additional);
        }
    }

    fn save_state(&mut self, state: &EnsembleState<B>, accepted: &Array1<bool>) -> Result<()> {
        let expected = match self.shape {
            Some(shape) => shape,
            None => {
                let shape = state.shape();
                self.reset(shape.0, shape.1);
                shape
            }
        };
        if state.shape() != expected || accepted.len() != expected.0 {
            return Err(Error::Shape {
                expected,
                got: state.shape(),
            });
        }
        match (&state.blobs, self.chain.is_empty()) {
            (Some(blobs), _) if !self.blobs.is_empty() || self.chain.is_empty() => {
                self.blobs.push(blobs.clone());
            }
            (None, _) if self.blobs.is_empty() => {}
            _ => return Err(Error::InconsistentBlobs),
        }

        self.chain.push(state.coords.clone());
        self.log_prob.push(state.log_prob.clone());
        for (count, &flag) in self.accepted.iter_mut().zip(accepted.iter()) {
            *count += flag as usize;
        }
        self.random_state = state.random_state.clone();
        Ok(())
    }

    fn get_chain(&self, query: &Query) -> Result<Array3<f64>> {
        query.validate()?;
        let (nwalkers, ndim) = self.shape.ok_or(Error::MissingState)?;
        let kept: Vec<usize> = query.indices(self.chain.len()).collect();
        let mut out = Array3::zeros((kept.len(), nwalkers, ndim));
        for (row, &step) in kept.iter().enumerate() {
            out.slice_mut(s![row, .., ..]).assign(&self.chain[step]);
        }
        Ok(out)
    }

    fn get_log_prob(&self, query: &Query) -> Result<Array2<f64>> {
        query.validate()?;
        let (nwalkers, _) = self.shape.ok_or(Error::MissingState)?;
        let kept: Vec<usize> = query.indices(self.log_prob.len()).collect();
        let mut out = Array2::zeros((kept.len(), nwalkers));
        for (row, &step) in kept.iter().enumerate() {
            out.row_mut(row).assign(&self.log_prob[step]);
        }
        Ok(out)
    }

    fn get_blobs(&self, query: &Query) -> Result<Option<Vec<Vec<B>>>> {
        query.validate()?;
        if self.blobs.is_empty() {
            return Ok(None);
        }
        let kept = query
            .indices(self.blobs.len())
            .map(|step| self.blobs[step].clone())
            .collect();
        Ok(Some(kept))
    }

    fn last_sample(&self) -> Result<EnsembleState<B>> {
        let coords = self.chain.last().ok_or(Error::MissingState)?.clone();
        let log_prob = self
            .log_prob
            .last()
            .ok_or(Error::MissingState)?
            .clone();
        let mut state = EnsembleState::new(coords, log_prob);
        state.blobs = self.blobs.last().cloned();
        state.random_state = self.random_state.clone();
        Ok(state)
    }
}
