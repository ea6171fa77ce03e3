//! The affine-invariant ensemble sampler.
//!
//! [`EnsembleSampler`] drives a whole ensemble of walkers through repeated
//! proposal rounds, storing every saved step in a [`Backend`]. Iteration
//! happens through [`sample`](EnsembleSampler::sample), which returns a
//! lazy [`SampleIter`] yielding one [`EnsembleState`] per saved step, or
//! through the [`run_mcmc`](EnsembleSampler::run_mcmc) convenience wrapper
//! that drains the iterator and returns the final state.

use crate::autocorr;
use crate::backend::{Backend, InMemoryBackend, Query};
use crate::errors::{Error, Result};
use crate::model::{LogProb, Model, WalkerPool};
use crate::moves::{MoveSet, StretchMove};
use crate::rng::RunRng;
use crate::state::{EnsembleState, InitialState};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, Array3, ArrayView2};
use ndarray_stats::CorrelationExt;

/// Condition number of the walker covariance above which the initial
/// ensemble is considered degenerate.
const DEGENERATE_CONDITION: f64 = 1e8;

/// Per-call sampling options.
#[derive(Debug, Clone, Copy)]
pub struct SampleOptions {
    /// Call each move's `tune` hook after every round.
    pub tune: bool,
    /// Advance `thin_by` rounds per saved step; only every `thin_by`-th
    /// round is stored and yielded. Must be at least one.
    pub thin_by: usize,
    /// Record saved steps in the backend.
    pub store: bool,
    /// Skip the degenerate-ensemble check on the initial state.
    pub skip_initial_state_check: bool,
    /// Display an indicatif progress bar over proposal rounds.
    pub progress: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            tune: false,
            thin_by: 1,
            store: true,
            skip_initial_state_check: false,
            progress: false,
        }
    }
}

/**
The affine-invariant ensemble MCMC sampler.

# Examples

```rust
use ensemble_mcmc::{Backend, EnsembleSampler, SampleOptions};
use ndarray::{Array2, ArrayView1};

let log_prob = |theta: ArrayView1<f64>| -0.5 * theta.dot(&theta);
let mut sampler = EnsembleSampler::new(16, 2, log_prob)
    .unwrap()
    .seed(42);

let initial = Array2::from_shape_fn((16, 2), |(i, j)| 0.01 * (i + 2 * j) as f64);
sampler
    .run_mcmc(Some(initial.into()), 100, &SampleOptions::default())
    .unwrap();
assert_eq!(sampler.backend().iteration(), 100);
```
*/
pub struct EnsembleSampler<L: LogProb, BK = InMemoryBackend<<L as LogProb>::Blob>> {
    nwalkers: usize,
    ndim: usize,
    log_prob_fn: L,
    backend: BK,
    moves: MoveSet<L>,
    pool: WalkerPool,
    vectorize: bool,
    rng: RunRng,
    previous_state: Option<EnsembleState<L::Blob>>,
}

impl<L> EnsembleSampler<L, InMemoryBackend<L::Blob>>
where
    L: LogProb + 'static,
    L::Blob: 'static,
{
    /// Creates a sampler with in-memory storage and the default stretch
    /// move.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when `ndim` is zero, `nwalkers` is odd, or the
    /// ensemble is smaller than twice the dimension (the stretch move needs
    /// a full-rank complementary half).
    pub fn new(nwalkers: usize, ndim: usize, log_prob_fn: L) -> Result<Self> {
        Self::with_backend(nwalkers, ndim, log_prob_fn, InMemoryBackend::new())
    }
}

impl<L, BK> EnsembleSampler<L, BK>
where
    L: LogProb + 'static,
    L::Blob: 'static,
    BK: Backend<L::Blob>,
{
    /// Creates a sampler on top of an existing backend, e.g. to continue a
    /// run whose chain was stored elsewhere.
    pub fn with_backend(nwalkers: usize, ndim: usize, log_prob_fn: L, mut backend: BK) -> Result<Self> {
        if ndim == 0 {
            return Err(Error::Config("ndim must be at least one".into()));
        }
        if nwalkers % 2 != 0 {
            return Err(Error::Config(format!(
                "the number of walkers must be even, got {nwalkers}"
            )));
        }
        if nwalkers < 2 * ndim {
            return Err(Error::Config(format!(
                "need at least 2 * ndim = {} walkers, got {nwalkers}",
                2 * ndim
            )));
        }
        if backend.shape().is_none() {
            backend.reset(nwalkers, ndim);
        } else if backend.shape() != Some((nwalkers, ndim)) {
            return Err(Error::Shape {
                expected: (nwalkers, ndim),
                got: backend.shape().unwrap_or((0, 0)),
            });
        }
        Ok(Self {
            nwalkers,
            ndim,
            log_prob_fn,
            backend,
            moves: MoveSet::single(Box::new(StretchMove::default())),
            pool: WalkerPool::Serial,
            vectorize: false,
            rng: RunRng::from_entropy(),
            previous_state: None,
        })
    }

    /// Seeds the sampler's generator for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = RunRng::seed_from_u64(seed);
        self
    }

    /// Replaces the default stretch-only schedule.
    pub fn moves(mut self, moves: MoveSet<L>) -> Self {
        self.moves = moves;
        self
    }

    /// Dispatches per-walker evaluations to the rayon thread pool.
    pub fn parallel(mut self) -> Self {
        self.pool = WalkerPool::Rayon;
        self
    }

    /// Scores each round through `log_prob_batch` in one call instead of
    /// one call per walker.
    pub fn vectorize(mut self) -> Self {
        self.vectorize = true;
        self
    }

    /// Number of walkers.
    pub fn nwalkers(&self) -> usize {
        self.nwalkers
    }

    /// Dimensionality of the parameter space.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// The chain storage.
    pub fn backend(&self) -> &BK {
        &self.backend
    }

    /// Clears all stored samples, keeping the sampler configuration.
    pub fn reset(&mut self) {
        self.backend.reset(self.nwalkers, self.ndim);
        self.previous_state = None;
    }

    /// Fraction of proposals accepted per walker since the last reset.
    ///
    /// All zeros before the first saved step.
    pub fn acceptance_fraction(&self) -> Array1<f64> {
        let iteration = self.backend.iteration();
        if iteration == 0 {
            return Array1::zeros(self.nwalkers);
        }
        self.backend
            .accepted()
            .map(|&count| count as f64 / iteration as f64)
    }

    /// Stored positions, shape `(nsteps, nwalkers, ndim)`.
    pub fn get_chain(&self, query: &Query) -> Result<Array3<f64>> {
        self.backend.get_chain(query)
    }

    /// Stored log-probabilities, shape `(nsteps, nwalkers)`.
    pub fn get_log_prob(&self, query: &Query) -> Result<Array2<f64>> {
        self.backend.get_log_prob(query)
    }

    /// Stored positions flattened across walkers, shape
    /// `(nsteps * nwalkers, ndim)`.
    pub fn get_flat_chain(&self, query: &Query) -> Result<Array2<f64>> {
        self.backend.get_flat_chain(query)
    }

    /// Stored log-probabilities flattened across walkers, length
    /// `nsteps * nwalkers`.
    pub fn get_flat_log_prob(&self, query: &Query) -> Result<Array1<f64>> {
        self.backend.get_flat_log_prob(query)
    }

    /// Stored blobs flattened across walkers, or `None` when the run
    /// produced no blobs.
    pub fn get_flat_blobs(&self, query: &Query) -> Result<Option<Vec<L::Blob>>> {
        self.backend.get_flat_blobs(query)
    }

    /// Stored blobs, one vector per saved step, or `None` when the run
    /// produced no blobs.
    pub fn get_blobs(&self, query: &Query) -> Result<Option<Vec<Vec<L::Blob>>>> {
        self.backend.get_blobs(query)
    }

    /// The most recently saved ensemble state.
    pub fn get_last_sample(&self) -> Result<EnsembleState<L::Blob>> {
        self.backend.last_sample()
    }

    /// Integrated autocorrelation time per dimension, estimated from the
    /// stored chain after applying `query`. The estimate is rescaled by
    /// `query.thin` so it is expressed in un-thinned steps.
    ///
    /// Pass `quiet = true` to receive an unreliable estimate from a short
    /// chain instead of [`Error::ChainTooShort`].
    pub fn get_autocorr_time(&self, query: &Query, quiet: bool) -> Result<Array1<f64>> {
        let chain = self.backend.get_chain(query)?;
        let mut tau = autocorr::integrated_time(chain.view(), 5.0, 50.0, quiet)?;
        tau *= query.thin as f64;
        Ok(tau)
    }

    /// Starts a sampling run, returning a lazy iterator that yields one
    /// state per saved step.
    ///
    /// With `thin_by > 1` the sampler advances `thin_by` proposal rounds
    /// between consecutive yields, so `iterations` saved steps cost
    /// `iterations * thin_by` rounds in total.
    ///
    /// The initial state's log-probabilities are computed here when only
    /// coordinates are given; a full [`EnsembleState`] (e.g. from a
    /// previous run) is resumed as-is, including its generator snapshot.
    pub fn sample(
        &mut self,
        initial: InitialState<L::Blob>,
        iterations: usize,
        options: &SampleOptions,
    ) -> Result<SampleIter<'_, L, BK>> {
        if options.thin_by == 0 {
            return Err(Error::InvalidThinning(options.thin_by));
        }

        let mut state = match initial {
            InitialState::Coords(coords) => {
                self.check_shape(&coords)?;
                let model = Model::new(&self.log_prob_fn, &self.pool, self.vectorize);
                let (log_prob, blobs) = model.compute_log_prob(coords.view())?;
                let mut state = EnsembleState::new(coords, log_prob);
                state.blobs = blobs;
                state
            }
            InitialState::State(state) => {
                self.check_shape(&state.coords)?;
                if state.log_prob.iter().any(|v| v.is_nan()) {
                    return Err(Error::NaNLogProb);
                }
                state
            }
        };

        // A resumed state replays the generator it was produced with. A
        // snapshot that fails to decode is ignored and the current stream
        // continues.
        if let Some(snapshot) = &state.random_state {
            self.rng.restore(snapshot);
        }

        if !options.skip_initial_state_check {
            check_walker_spread(state.coords.view());
        }

        state.random_state = Some(self.rng.snapshot());

        if options.store {
            self.backend.grow(iterations);
        }

        let total_rounds = iterations.saturating_mul(options.thin_by);
        let bar = options.progress.then(|| {
            let bar = ProgressBar::new(total_rounds as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:8} {bar:40.cyan/blue} {pos}/{len} ({eta}) | {msg}")
                    .expect("Expected valid progress bar template"),
            );
            bar.set_prefix("sample");
            bar
        });

        Ok(SampleIter {
            sampler: self,
            state,
            options: *options,
            rounds_done: 0,
            total_rounds,
            accepted_total: 0,
            failed: false,
            bar,
        })
    }

    /// Runs the sampler for `nsteps` saved steps and returns the final
    /// state.
    ///
    /// Pass `None` as the initial state to continue from where the previous
    /// `run_mcmc` call (or the backend's last saved step) left off.
    ///
    /// # Errors
    ///
    /// [`Error::MissingState`] when `initial` is `None` and no previous run
    /// is recorded.
    pub fn run_mcmc(
        &mut self,
        initial: Option<InitialState<L::Blob>>,
        nsteps: usize,
        options: &SampleOptions,
    ) -> Result<EnsembleState<L::Blob>> {
        let initial = match initial {
            Some(initial) => initial,
            None => match self.previous_state.take() {
                Some(state) => InitialState::State(state),
                None => InitialState::State(self.backend.last_sample()?),
            },
        };

        let mut iter = self.sample(initial, nsteps, options)?;
        while let Some(step) = iter.next() {
            step?;
        }
        let last = iter.state().clone();
        drop(iter);
        self.previous_state = Some(last.clone());
        Ok(last)
    }

    fn check_shape(&self, coords: &Array2<f64>) -> Result<()> {
        if coords.dim() != (self.nwalkers, self.ndim) {
            return Err(Error::Shape {
                expected: (self.nwalkers, self.ndim),
                got: coords.dim(),
            });
        }
        Ok(())
    }
}

/// Warns when the initial walker positions are linearly dependent.
///
/// The stretch move only ever proposes within the affine span of the current
/// ensemble, so a degenerate start can never be escaped.
fn check_walker_spread(coords: ArrayView2<f64>) {
    if walkers_are_degenerate(coords) {
        log::warn!(
            "initial state covariance has a large condition number; \
             walkers may be linearly dependent and the ensemble unable to \
             explore all of parameter space"
        );
    }
}

/// True when the condition number of the walker covariance exceeds
/// [`DEGENERATE_CONDITION`], or the covariance cannot be computed at all.
fn walkers_are_degenerate(coords: ArrayView2<f64>) -> bool {
    let cov = match coords.t().cov(1.0) {
        Ok(cov) => cov,
        Err(_) => return true,
    };
    let ndim = cov.nrows();
    let sym = nalgebra::DMatrix::from_fn(ndim, ndim, |r, c| cov[[r, c]]);
    let eigenvalues = sym.symmetric_eigen().eigenvalues;
    let max = eigenvalues.iter().fold(0.0f64, |m, &v| m.max(v.abs()));
    let min = eigenvalues.iter().fold(f64::INFINITY, |m, &v| m.min(v.abs()));
    !(min > 0.0) || max / min > DEGENERATE_CONDITION
}

/// Lazy iterator over saved steps of one sampling run.
///
/// Each `next()` advances `thin_by` proposal rounds and yields a clone of
/// the resulting state. A failed round yields one `Err` and ends the
/// iteration.
pub struct SampleIter<'a, L: LogProb, BK> {
    sampler: &'a mut EnsembleSampler<L, BK>,
    state: EnsembleState<L::Blob>,
    options: SampleOptions,
    rounds_done: usize,
    total_rounds: usize,
    accepted_total: usize,
    failed: bool,
    bar: Option<ProgressBar>,
}

impl<'a, L, BK> SampleIter<'a, L, BK>
where
    L: LogProb + 'static,
    BK: Backend<L::Blob>,
{
    /// The working ensemble state, i.e. the final state once the iterator
    /// is exhausted.
    pub fn state(&self) -> &EnsembleState<L::Blob> {
        &self.state
    }

    fn advance_round(&mut self) -> Result<Array1<bool>> {
        let EnsembleSampler {
            ref log_prob_fn,
            ref mut moves,
            ref mut rng,
            ref pool,
            vectorize,
            ..
        } = *self.sampler;
        let model = Model::new(log_prob_fn, pool, vectorize);

        let mv = moves.draw(rng);
        let accepted = mv.propose(&model, &mut self.state, rng)?;
        if self.options.tune {
            mv.tune(&self.state, &accepted);
        }
        self.state.random_state = Some(rng.snapshot());
        Ok(accepted)
    }
}

impl<'a, L, BK> Iterator for SampleIter<'a, L, BK>
where
    L: LogProb + 'static,
    BK: Backend<L::Blob>,
{
    type Item = Result<EnsembleState<L::Blob>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rounds_done >= self.total_rounds {
            if let Some(bar) = self.bar.take() {
                bar.finish();
            }
            return None;
        }

        for _ in 0..self.options.thin_by {
            let accepted = match self.advance_round() {
                Ok(accepted) => accepted,
                Err(e) => {
                    self.failed = true;
                    if let Some(bar) = self.bar.take() {
                        bar.abandon();
                    }
                    return Some(Err(e));
                }
            };
            self.rounds_done += 1;
            self.accepted_total += accepted.iter().filter(|&&a| a).count();

            if let Some(bar) = &self.bar {
                bar.inc(1);
                let mean = self.accepted_total as f64
                    / (self.rounds_done * self.state.nwalkers()) as f64;
                bar.set_message(format!("mean acceptance: {mean:.3}"));
            }

            // Only the final round of each saved step reaches the backend;
            // the rounds in between are thinned away.
            if self.rounds_done % self.options.thin_by == 0 && self.options.store {
                if let Err(e) = self.sampler.backend.save_state(&self.state, &accepted) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        Some(Ok(self.state.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total_rounds - self.rounds_done) / self.options.thin_by;
        if self.failed {
            (0, Some(0))
        } else {
            (remaining, Some(remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::Move;
    use crate::rng::RngSnapshot;
    use ndarray::ArrayView1;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn std_normal(theta: ArrayView1<f64>) -> f64 {
        -0.5 * theta.dot(&theta)
    }

    fn spread_coords(nwalkers: usize, ndim: usize) -> Array2<f64> {
        Array2::from_shape_fn((nwalkers, ndim), |(i, j)| {
            0.05 * ((i * ndim + j) as f64).sin() + 0.01 * i as f64
        })
    }

    #[test]
    fn odd_walker_counts_are_rejected() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        assert!(matches!(
            EnsembleSampler::new(9, 2, f),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn too_few_walkers_are_rejected() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        assert!(matches!(
            EnsembleSampler::new(4, 3, f),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn wrong_initial_shape_is_rejected() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(1);
        let bad = Array2::zeros((8, 3));
        assert!(matches!(
            sampler.run_mcmc(Some(bad.into()), 5, &SampleOptions::default()),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn acceptance_fraction_is_zero_before_sampling() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let sampler = EnsembleSampler::new(8, 2, f).unwrap();
        let frac = sampler.acceptance_fraction();
        assert_eq!(frac.len(), 8);
        assert!(frac.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sample_yields_one_state_per_saved_step() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(3);
        let initial = spread_coords(8, 2);

        let iter = sampler
            .sample(initial.into(), 7, &SampleOptions::default())
            .unwrap();
        let states: Vec<_> = iter.collect::<Result<_>>().unwrap();
        assert_eq!(states.len(), 7);
        assert_eq!(sampler.backend().iteration(), 7);
    }

    #[test]
    fn thin_by_runs_extra_rounds_per_yield() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(5);
        let initial = spread_coords(8, 2);

        let opts = SampleOptions {
            thin_by: 3,
            ..SampleOptions::default()
        };
        let iter = sampler.sample(initial.into(), 4, &opts).unwrap();
        assert_eq!(iter.count(), 4);
        // 12 rounds run, 4 saved.
        assert_eq!(sampler.backend().iteration(), 4);
    }

    #[test]
    fn zero_thin_by_is_rejected() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(5);
        let opts = SampleOptions {
            thin_by: 0,
            ..SampleOptions::default()
        };
        assert!(matches!(
            sampler.sample(spread_coords(8, 2).into(), 1, &opts),
            Err(Error::InvalidThinning(0))
        ));
    }

    #[test]
    fn store_false_leaves_backend_empty() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(9);
        let opts = SampleOptions {
            store: false,
            ..SampleOptions::default()
        };
        sampler
            .run_mcmc(Some(spread_coords(8, 2).into()), 10, &opts)
            .unwrap();
        assert_eq!(sampler.backend().iteration(), 0);
        // The final state is still remembered for resuming.
        sampler.run_mcmc(None, 5, &opts).unwrap();
    }

    #[test]
    fn resume_without_history_is_an_error() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(2);
        assert!(matches!(
            sampler.run_mcmc(None, 5, &SampleOptions::default()),
            Err(Error::MissingState)
        ));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let initial = spread_coords(10, 2);

        let mut a = EnsembleSampler::new(10, 2, f).unwrap().seed(77);
        let mut b = EnsembleSampler::new(10, 2, f).unwrap().seed(77);
        let last_a = a
            .run_mcmc(Some(initial.clone().into()), 25, &SampleOptions::default())
            .unwrap();
        let last_b = b
            .run_mcmc(Some(initial.into()), 25, &SampleOptions::default())
            .unwrap();

        assert_eq!(last_a.coords, last_b.coords);
        assert_eq!(last_a.log_prob, last_b.log_prob);
    }

    #[test]
    fn split_runs_match_one_long_run() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let initial = spread_coords(10, 2);
        let opts = SampleOptions::default();

        let mut whole = EnsembleSampler::new(10, 2, f).unwrap().seed(123);
        let last_whole = whole
            .run_mcmc(Some(initial.clone().into()), 30, &opts)
            .unwrap();

        let mut split = EnsembleSampler::new(10, 2, f).unwrap().seed(123);
        split.run_mcmc(Some(initial.into()), 10, &opts).unwrap();
        split.run_mcmc(None, 20, &opts).unwrap();
        let last_split = split.get_last_sample().unwrap();

        assert_eq!(last_whole.coords, last_split.coords);
    }

    #[test]
    fn evaluator_failure_ends_iteration_with_one_error() {
        struct FailAfter(std::sync::atomic::AtomicUsize);
        impl LogProb for FailAfter {
            type Blob = ();
            fn log_prob(
                &self,
                theta: ArrayView1<f64>,
            ) -> std::result::Result<crate::model::WalkerEval<()>, crate::errors::EvalError>
            {
                let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n > 200 {
                    return Err("synthetic failure".into());
                }
                Ok(crate::model::WalkerEval::LogProb(-theta.dot(&theta)))
            }
        }

        let mut sampler = EnsembleSampler::new(8, 2, FailAfter(Default::default()))
            .unwrap()
            .seed(4);
        let mut iter = sampler
            .sample(spread_coords(8, 2).into(), 1000, &SampleOptions::default())
            .unwrap();
        let mut saw_error = false;
        for step in &mut iter {
            if step.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        assert!(iter.next().is_none());
    }

    /// Delegates to an in-memory store while counting `grow` announcements.
    struct RecordingBackend {
        inner: InMemoryBackend<()>,
        grown: Arc<AtomicUsize>,
    }

    impl Backend<()> for RecordingBackend {
        fn reset(&mut self, nwalkers: usize, ndim: usize) {
            self.inner.reset(nwalkers, ndim)
        }
        fn shape(&self) -> Option<(usize, usize)> {
            self.inner.shape()
        }
        fn iteration(&self) -> usize {
            self.inner.iteration()
        }
        fn accepted(&self) -> ndarray::ArrayView1<usize> {
            self.inner.accepted()
        }
        fn random_state(&self) -> Option<&RngSnapshot> {
            self.inner.random_state()
        }
        fn grow(&mut self, additional: usize) {
            self.grown.fetch_add(additional, Ordering::SeqCst);
            self.inner.grow(additional)
        }
        fn save_state(&mut self, state: &EnsembleState<()>, accepted: &Array1<bool>) -> Result<()> {
            self.inner.save_state(state, accepted)
        }
        fn get_chain(&self, query: &Query) -> Result<Array3<f64>> {
            self.inner.get_chain(query)
        }
        fn get_log_prob(&self, query: &Query) -> Result<Array2<f64>> {
            self.inner.get_log_prob(query)
        }
        fn get_blobs(&self, query: &Query) -> Result<Option<Vec<Vec<()>>>> {
            self.inner.get_blobs(query)
        }
        fn last_sample(&self) -> Result<EnsembleState<()>> {
            self.inner.last_sample()
        }
    }

    #[test]
    fn sampling_announces_growth_before_saving() {
        let grown = Arc::new(AtomicUsize::new(0));
        let backend = RecordingBackend {
            inner: InMemoryBackend::new(),
            grown: grown.clone(),
        };
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::with_backend(8, 2, f, backend)
            .unwrap()
            .seed(31);

        sampler
            .run_mcmc(
                Some(spread_coords(8, 2).into()),
                12,
                &SampleOptions::default(),
            )
            .unwrap();
        assert_eq!(grown.load(Ordering::SeqCst), 12);

        // Nothing is announced when nothing will be stored.
        let opts = SampleOptions {
            store: false,
            ..SampleOptions::default()
        };
        sampler.run_mcmc(None, 5, &opts).unwrap();
        assert_eq!(grown.load(Ordering::SeqCst), 12);
    }

    /// A do-nothing move that counts its `tune` invocations.
    struct TuneTracker {
        calls: Arc<AtomicUsize>,
    }

    impl<L: LogProb> Move<L> for TuneTracker {
        fn propose(
            &self,
            _model: &Model<'_, L>,
            state: &mut EnsembleState<L::Blob>,
            _rng: &mut RunRng,
        ) -> Result<Array1<bool>> {
            Ok(Array1::from_elem(state.nwalkers(), false))
        }

        fn tune(&mut self, _state: &EnsembleState<L::Blob>, _accepted: &Array1<bool>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn tune_hook_fires_once_per_round_only_when_enabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f)
            .unwrap()
            .seed(19)
            .moves(MoveSet::single(Box::new(TuneTracker {
                calls: calls.clone(),
            })));

        // 6 saved steps at thin_by = 2 is 12 proposal rounds.
        let opts = SampleOptions {
            tune: true,
            thin_by: 2,
            ..SampleOptions::default()
        };
        sampler
            .run_mcmc(Some(spread_coords(8, 2).into()), 6, &opts)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 12);

        let opts = SampleOptions {
            tune: false,
            ..SampleOptions::default()
        };
        sampler.run_mcmc(None, 4, &opts).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn degenerate_ensembles_are_detected() {
        // All walkers on the x axis: zero variance in the second dimension.
        let flat_line = Array2::from_shape_fn((8, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                0.0
            }
        });
        assert!(walkers_are_degenerate(flat_line.view()));

        // Identical walkers.
        let collapsed = Array2::ones((8, 2));
        assert!(walkers_are_degenerate(collapsed.view()));

        // A well-spread ensemble.
        assert!(!walkers_are_degenerate(spread_coords(8, 2).view()));
    }

    #[test]
    fn acceptance_fraction_matches_backend_counters() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(13);
        sampler
            .run_mcmc(
                Some(spread_coords(8, 2).into()),
                40,
                &SampleOptions::default(),
            )
            .unwrap();

        let frac = sampler.acceptance_fraction();
        let accepted = sampler.backend().accepted();
        for (f, &count) in frac.iter().zip(accepted.iter()) {
            assert_eq!(*f, count as f64 / 40.0);
        }
    }

    #[test]
    fn reset_clears_the_backend() {
        let f: fn(ArrayView1<f64>) -> f64 = std_normal;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(6);
        sampler
            .run_mcmc(Some(spread_coords(8, 2).into()), 5, &SampleOptions::default())
            .unwrap();
        assert_eq!(sampler.backend().iteration(), 5);
        sampler.reset();
        assert_eq!(sampler.backend().iteration(), 0);
        assert!(matches!(
            sampler.run_mcmc(None, 1, &SampleOptions::default()),
            Err(Error::MissingState)
        ));
    }
}
