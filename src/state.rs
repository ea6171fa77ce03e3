//! The per-step snapshot of the walker ensemble.

use crate::errors::{Error, Result};
use crate::rng::RngSnapshot;
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// The state of the walker ensemble after some number of rounds.
///
/// A state is a value: every proposal round produces a new one, with rejected
/// walkers carrying their previous row forward. The sampler never mutates a
/// state it has yielded.
///
/// `B` is the blob type produced by the log-probability function; use `()`
/// when the function returns bare log-probabilities.
///
/// # Invariants
///
/// * `coords` has shape `(nwalkers, ndim)`, fixed for the life of a sampler.
/// * `log_prob` has shape `(nwalkers,)` and contains no NaN. Negative
///   infinity is a legal value marking a zero-probability region.
/// * `blobs`, when present, holds one entry per walker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleState<B = ()> {
    /// Walker positions, shape `(nwalkers, ndim)`.
    pub coords: Array2<f64>,

    /// Log-probability of each walker, shape `(nwalkers,)`.
    pub log_prob: Array1<f64>,

    /// Per-walker auxiliary metadata, if the log-probability function
    /// produces any.
    pub blobs: Option<Vec<B>>,

    /// Snapshot of the sampler's RNG stream at the moment this state was
    /// produced. `None` only for states the sampler has not seen yet.
    pub random_state: Option<RngSnapshot>,
}

impl<B> EnsembleState<B> {
    /// Builds a state from positions and their log-probabilities.
    pub fn new(coords: Array2<f64>, log_prob: Array1<f64>) -> Self {
        Self {
            coords,
            log_prob,
            blobs: None,
            random_state: None,
        }
    }

    /// Number of walkers in the ensemble.
    pub fn nwalkers(&self) -> usize {
        self.coords.nrows()
    }

    /// Dimensionality of the parameter space.
    pub fn ndim(&self) -> usize {
        self.coords.ncols()
    }

    /// Shape as `(nwalkers, ndim)`.
    pub fn shape(&self) -> (usize, usize) {
        self.coords.dim()
    }
}

impl<B: Serialize> EnsembleState<B> {
    /// Writes this state to a checkpoint file.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::Checkpoint(format!("failed to create checkpoint file: {e}")))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .map_err(|e| Error::Checkpoint(format!("failed to serialize checkpoint: {e}")))?;
        writer
            .flush()
            .map_err(|e| Error::Checkpoint(format!("failed to flush checkpoint file: {e}")))?;
        Ok(())
    }
}

impl<B: DeserializeOwned> EnsembleState<B> {
    /// Reads a state back from a checkpoint file.
    pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Checkpoint(format!("failed to open checkpoint file: {e}")))?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader)
            .map_err(|e| Error::Checkpoint(format!("failed to deserialize checkpoint: {e}")))
    }
}

/// What a sampling run may start from: raw walker positions, or a full state
/// from a previous run.
///
/// Raw coordinates get their log-probabilities computed (and blobs collected)
/// before the first round. A full state resumes exactly, including the RNG
/// stream if its snapshot is present.
#[derive(Debug, Clone)]
pub enum InitialState<B = ()> {
    /// Walker positions only, shape `(nwalkers, ndim)`.
    Coords(Array2<f64>),
    /// A complete prior state.
    State(EnsembleState<B>),
}

impl<B> From<Array2<f64>> for InitialState<B> {
    fn from(coords: Array2<f64>) -> Self {
        InitialState::Coords(coords)
    }
}

impl<B> From<EnsembleState<B>> for InitialState<B> {
    fn from(state: EnsembleState<B>) -> Self {
        InitialState::State(state)
    }
}
