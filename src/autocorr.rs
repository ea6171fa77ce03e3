//! Integrated autocorrelation time estimation.
//!
//! The integrated autocorrelation time `tau` measures how many chain steps
//! separate effectively independent samples; a run of `N` steps carries
//! roughly `N / tau` independent draws. The estimator here averages the
//! normalized autocorrelation function over walkers, accumulates
//! `tau(f) = 2 * cumsum(rho) - 1`, and truncates the sum at the automated
//! window of Sokal: the smallest `M` with `M >= c * tau(M)`.

use crate::errors::{Error, Result};
use ndarray::{s, Array1, ArrayView1, ArrayView3};
use rustfft::{num_complex::Complex, FftPlanner};

/// Estimates the integrated autocorrelation time of a stored chain, one
/// estimate per parameter dimension.
///
/// `chain` has shape `(n_steps, n_walkers, n_dim)`, the layout produced by
/// [`Backend::get_chain`](crate::backend::Backend::get_chain). `c` is the
/// Sokal window constant (5 is the standard choice) and `tol` the minimum
/// number of autocorrelation times the chain must span for the estimate to
/// be trusted (50 is the standard choice).
///
/// # Errors
///
/// [`Error::ChainTooShort`] when the chain spans fewer than `tol`
/// autocorrelation times. Pass `quiet = true` to downgrade that failure to
/// a warning and receive the (unreliable) estimate anyway.
pub fn integrated_time(
    chain: ArrayView3<f64>,
    c: f64,
    tol: f64,
    quiet: bool,
) -> Result<Array1<f64>> {
    let (n_steps, n_walkers, n_dim) = chain.dim();
    if n_steps < 2 || n_walkers == 0 {
        return Err(Error::ChainTooShort {
            needed: 2,
            n_steps,
        });
    }

    let mut planner = FftPlanner::new();
    let mut tau_est = Array1::zeros(n_dim);
    for d in 0..n_dim {
        // Average the normalized ACF over walkers before windowing.
        let mut rho = Array1::<f64>::zeros(n_steps);
        for w in 0..n_walkers {
            rho += &normalized_acf(chain.slice(s![.., w, d]), &mut planner);
        }
        rho /= n_walkers as f64;

        let mut taus = Array1::zeros(n_steps);
        let mut acc = 0.0;
        for (i, &r) in rho.iter().enumerate() {
            acc += r;
            taus[i] = 2.0 * acc - 1.0;
        }
        tau_est[d] = taus[auto_window(taus.view(), c)];
    }

    let converged = tau_est.iter().all(|&tau| tol * tau <= n_steps as f64);
    if !converged {
        let longest = tau_est.iter().cloned().fold(0.0f64, f64::max);
        let needed = (tol * longest).ceil() as usize;
        if quiet {
            log::warn!(
                "chain spans fewer than tol={tol} autocorrelation times \
                 (tau up to {longest:.1}, {n_steps} steps); estimate is unreliable"
            );
        } else {
            return Err(Error::ChainTooShort { needed, n_steps });
        }
    }
    Ok(tau_est)
}

/// Normalized autocorrelation function of a single walker trajectory,
/// computed by FFT with zero-padding to avoid circular wrap-around.
fn normalized_acf(traj: ArrayView1<f64>, planner: &mut FftPlanner<f64>) -> Array1<f64> {
    let n = traj.len();
    let mut n_padded = 1;
    while n_padded < 2 * n {
        n_padded <<= 1;
    }
    let fft = planner.plan_fft_forward(n_padded);
    let ffti = planner.plan_fft_inverse(n_padded);

    let mean = traj.sum() / n as f64;
    let mut x: Vec<Complex<f64>> = traj
        .iter()
        .map(|&v| Complex { re: v - mean, im: 0.0 })
        .chain(std::iter::repeat(Complex { re: 0.0, im: 0.0 }).take(n_padded - n))
        .collect();
    fft.process(x.as_mut_slice());
    x.iter_mut().for_each(|xi| {
        *xi *= xi.conj();
    });
    ffti.process(x.as_mut_slice());

    // rustfft doesn't normalize for us.
    let mut acf: Array1<f64> = x
        .iter()
        .take(n)
        .map(|xi| xi.re / n_padded as f64)
        .collect();
    let lag0 = acf[0];
    if lag0 > 0.0 {
        acf /= lag0;
    }
    acf
}

/// Sokal's automated windowing: the first index `m` with `m >= c * tau[m]`,
/// or the last index if none qualifies.
fn auto_window(taus: ArrayView1<f64>, c: f64) -> usize {
    for (m, &tau) in taus.iter().enumerate() {
        if (m as f64) >= c * tau {
            return m;
        }
    }
    taus.len() - 1
}
