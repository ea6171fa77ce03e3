use ensemble_mcmc::{EnsembleSampler, Query, SampleOptions};
use ndarray::{Array2, ArrayView1, Axis};

fn main() {
    // A correlated 2D Gaussian target.
    let log_prob = |theta: ArrayView1<f64>| {
        let (x, y) = (theta[0], theta[1]);
        -0.5 * (x * x - 1.6 * x * y + y * y) / 0.36
    };

    // 32 walkers started in a small ball around the origin.
    let mut sampler = EnsembleSampler::new(32, 2, log_prob).unwrap().seed(42);
    let initial = Array2::from_shape_fn((32, 2), |(i, j)| 1e-2 * ((1 + i * 2 + j) as f64).sin());

    // Run for 5,000 steps with a progress bar.
    let opts = SampleOptions {
        progress: true,
        ..SampleOptions::default()
    };
    sampler
        .run_mcmc(Some(initial.into()), 5000, &opts)
        .unwrap();

    let mean_acceptance = sampler.acceptance_fraction().mean().unwrap();
    println!("Mean acceptance fraction: {mean_acceptance:.3}");

    let tau = sampler
        .get_autocorr_time(&Query::default(), true)
        .unwrap();
    println!("Integrated autocorrelation time: {tau}");

    // Discard 5 autocorrelation times of burn-in and report the moments.
    let discard = (5.0 * tau[0].max(tau[1])).ceil() as usize;
    let flat = sampler
        .get_flat_chain(&Query { discard, thin: 1 })
        .unwrap();
    let mean = flat.mean_axis(Axis(0)).unwrap();
    println!("Posterior mean: {mean} ({} samples)", flat.nrows());
}
