use ensemble_mcmc::{
    EnsembleSampler, EvalError, LogProb, Query, RunRng, SampleOptions, WalkerEval,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand_distr::{Distribution, StandardNormal};

/// Straight-line fit y = m*x + b with known Gaussian noise. The blob
/// carries each walker's log-likelihood so the prior and likelihood
/// contributions can be separated after the run.
struct LineFit {
    x: Array1<f64>,
    y: Array1<f64>,
    sigma: f64,
}

impl LogProb for LineFit {
    type Blob = f64;

    fn log_prob(&self, theta: ArrayView1<f64>) -> Result<WalkerEval<f64>, EvalError> {
        let (m, b) = (theta[0], theta[1]);

        // Flat priors on a broad box.
        if !(-5.0..5.0).contains(&m) || !(-10.0..10.0).contains(&b) {
            return Ok(WalkerEval::WithBlob(f64::NEG_INFINITY, f64::NEG_INFINITY));
        }

        let mut log_like = 0.0;
        for (&x, &y) in self.x.iter().zip(self.y.iter()) {
            let r = (y - (m * x + b)) / self.sigma;
            log_like += -0.5 * r * r;
        }
        Ok(WalkerEval::WithBlob(log_like, log_like))
    }
}

fn main() {
    // Synthetic data from m = 1.2, b = -0.4.
    let mut rng = RunRng::seed_from_u64(1);
    let truth = (1.2, -0.4);
    let sigma = 0.3;
    let x = Array1::linspace(0.0, 4.0, 40);
    let y = x.mapv(|xi| {
        let eps: f64 = StandardNormal.sample(&mut rng);
        truth.0 * xi + truth.1 + sigma * eps
    });

    let target = LineFit { x, y, sigma };
    let mut sampler = EnsembleSampler::new(24, 2, target).unwrap().seed(17);

    // Start near a rough least-squares guess.
    let initial = Array2::from_shape_fn((24, 2), |(i, j)| {
        let center = if j == 0 { 1.0 } else { 0.0 };
        center + 1e-2 * ((1 + i * 2 + j) as f64).sin()
    });

    let opts = SampleOptions {
        progress: true,
        ..SampleOptions::default()
    };
    sampler.run_mcmc(Some(initial.into()), 3000, &opts).unwrap();

    let query = Query { discard: 500, thin: 1 };
    let flat = sampler.get_flat_chain(&query).unwrap();
    let mean = flat.mean_axis(Axis(0)).unwrap();
    let std = flat.var_axis(Axis(0), 1.0).mapv(f64::sqrt);
    println!("m = {:.3} +/- {:.3} (truth {})", mean[0], std[0], truth.0);
    println!("b = {:.3} +/- {:.3} (truth {})", mean[1], std[1], truth.1);

    // The blobs hold the per-walker log-likelihood at every saved step.
    let blobs = sampler.get_blobs(&query).unwrap().unwrap();
    let best = blobs
        .iter()
        .flatten()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    println!("Best log-likelihood seen: {best:.2}");
}
