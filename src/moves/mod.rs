//! Proposal moves for the ensemble.
//!
//! A [`Move`] advances the whole ensemble by one round: it proposes new
//! positions, scores them through the [`Model`], and applies the
//! Metropolis-Hastings accept/reject decision in place, returning the
//! per-walker acceptance mask. [`MoveSet`] holds a weighted collection of
//! moves and draws one per round.

mod stretch;

pub use stretch::StretchMove;

use crate::errors::{Error, Result};
use crate::model::{LogProb, Model};
use crate::rng::RunRng;
use ndarray::Array1;
use rand::Rng;

/// An ensemble update rule.
pub trait Move<L: LogProb>: Send {
    /// Advances `state` by one round, mutating it in place.
    ///
    /// Returns the per-walker acceptance mask for this round.
    fn propose(
        &self,
        model: &Model<'_, L>,
        state: &mut crate::state::EnsembleState<L::Blob>,
        rng: &mut RunRng,
    ) -> Result<Array1<bool>>;

    /// Hook for adapting internal scale parameters from the latest round.
    ///
    /// Called once per round when tuning is enabled; the default is a no-op.
    fn tune(&mut self, _state: &crate::state::EnsembleState<L::Blob>, _accepted: &Array1<bool>) {}
}

/// A weighted collection of moves, one of which is drawn each round.
pub struct MoveSet<L: LogProb> {
    moves: Vec<Box<dyn Move<L>>>,
    weights: Vec<f64>,
}

impl<L: LogProb> MoveSet<L> {
    /// Builds a schedule from `(move, weight)` pairs.
    ///
    /// Weights need not sum to one; they are normalized internally.
    pub fn new(moves: Vec<(Box<dyn Move<L>>, f64)>) -> Result<Self> {
        if moves.is_empty() {
            return Err(Error::Config("move set must not be empty".into()));
        }
        if moves.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(
                "move weights must be finite and non-negative".into(),
            ));
        }
        let total: f64 = moves.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(Error::Config("move weights must not all be zero".into()));
        }
        let (moves, weights): (Vec<_>, Vec<f64>) = moves.into_iter().unzip();
        let weights = weights.into_iter().map(|w| w / total).collect();
        Ok(Self { moves, weights })
    }

    /// A schedule holding a single move, drawn every round.
    pub fn single(mv: Box<dyn Move<L>>) -> Self {
        Self {
            moves: vec![mv],
            weights: vec![1.0],
        }
    }

    /// Draws one move according to the weights.
    ///
    /// One uniform variate is consumed per call, including for a
    /// single-move schedule, so a run's random stream does not depend on
    /// how many moves are registered.
    pub fn draw(&mut self, rng: &mut RunRng) -> &mut Box<dyn Move<L>> {
        let u: f64 = rng.random();
        let mut acc = 0.0;
        let mut chosen = self.moves.len() - 1;
        for (i, w) in self.weights.iter().enumerate() {
            acc += w;
            if u < acc {
                chosen = i;
                break;
            }
        }
        &mut self.moves[chosen]
    }
}

impl<L: LogProb> Default for MoveSet<L>
where
    L::Blob: Clone + Send + Sync + 'static,
    L: 'static,
{
    fn default() -> Self {
        Self::single(Box::new(StretchMove::default()))
    }
}
