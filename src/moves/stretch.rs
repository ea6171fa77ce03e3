//! The affine-invariant stretch move of Goodman & Weare (2010).

use crate::errors::{Error, Result};
use crate::model::{LogProb, Model};
use crate::moves::Move;
use crate::rng::RunRng;
use crate::state::EnsembleState;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;

/// The stretch move.
///
/// Each walker is updated by stretching along the line through its current
/// position and a randomly chosen walker from the complementary half of the
/// ensemble. The stretch factor `z` is drawn from the distribution
/// `g(z) ∝ 1/sqrt(z)` on `[1/a, a]`, which makes the move invariant under
/// affine transformations of the parameter space.
///
/// The ensemble is split into two halves each round, with the assignment
/// reshuffled every time. Walkers in one half only ever use walkers from
/// the other half as stretch partners, so the whole half can be updated at
/// once without breaking detailed balance.
#[derive(Debug, Clone, Copy)]
pub struct StretchMove {
    a: f64,
}

impl StretchMove {
    /// Creates a stretch move with scale parameter `a`.
    ///
    /// `a` controls how far proposals reach; larger values give bolder
    /// proposals and lower acceptance. Must be greater than one.
    pub fn new(a: f64) -> Result<Self> {
        if !a.is_finite() || a <= 1.0 {
            return Err(Error::Config(format!(
                "stretch scale must be a finite number > 1, got {a}"
            )));
        }
        Ok(Self { a })
    }

    /// The scale parameter.
    pub fn a(&self) -> f64 {
        self.a
    }
}

impl Default for StretchMove {
    /// The canonical scale `a = 2`.
    fn default() -> Self {
        Self { a: 2.0 }
    }
}

impl<L: LogProb> Move<L> for StretchMove {
    fn propose(
        &self,
        model: &Model<'_, L>,
        state: &mut EnsembleState<L::Blob>,
        rng: &mut RunRng,
    ) -> Result<Array1<bool>> {
        let nwalkers = state.nwalkers();
        let ndim = state.ndim();
        if nwalkers < 4 || nwalkers % 2 != 0 {
            return Err(Error::Shape {
                expected: (4, ndim),
                got: (nwalkers, ndim),
            });
        }

        let mut accepted = Array1::from_elem(nwalkers, false);

        // Randomized half assignment, reshuffled every round.
        let mut halves: Vec<usize> = (0..nwalkers).map(|i| i % 2).collect();
        halves.shuffle(rng);

        for split in 0..2 {
            let active: Vec<usize> = (0..nwalkers).filter(|&i| halves[i] == split).collect();
            let others: Vec<usize> = (0..nwalkers).filter(|&i| halves[i] != split).collect();
            let ns = active.len();

            let mut zz = Array1::zeros(ns);
            let mut proposals = Array2::zeros((ns, ndim));
            for m in 0..ns {
                let u: f64 = rng.random();
                let z = ((self.a - 1.0) * u + 1.0).powi(2) / self.a;
                zz[m] = z;
                let partner = others[rng.random_range(0..others.len())];
                for d in 0..ndim {
                    let c = state.coords[[partner, d]];
                    let x = state.coords[[active[m], d]];
                    proposals[[m, d]] = c - (c - x) * z;
                }
            }

            let (new_log_prob, new_blobs) = model.compute_log_prob(proposals.view())?;

            for m in 0..ns {
                let k = active[m];
                let factor = (ndim as f64 - 1.0) * zz[m].ln();
                let lnpdiff = factor + new_log_prob[m] - state.log_prob[k];
                if lnpdiff > rng.random::<f64>().ln() {
                    accepted[k] = true;
                    state.coords.row_mut(k).assign(&proposals.row(m));
                    state.log_prob[k] = new_log_prob[m];
                    if let Some(ref fresh) = new_blobs {
                        match state.blobs {
                            Some(ref mut blobs) => blobs[k] = fresh[m].clone(),
                            None => return Err(Error::InconsistentBlobs),
                        }
                    }
                }
            }
        }

        Ok(accepted)
    }
}
