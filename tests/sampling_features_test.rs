//! Tests for the sampler's bookkeeping features: blobs, thinning and
//! checkpoint-based resumption.

#[cfg(test)]
mod tests {
    use ensemble_mcmc::{
        Backend, EnsembleSampler, EnsembleState, Error, EvalError, InitialState, LogProb, Query,
        SampleOptions, WalkerEval,
    };
    use ndarray::{Array2, ArrayView1};

    const SEED: u64 = 99;

    fn neg_sum_sq(theta: ArrayView1<f64>) -> f64 {
        -theta.dot(&theta)
    }

    fn initial_ball(nwalkers: usize, ndim: usize) -> Array2<f64> {
        Array2::from_shape_fn((nwalkers, ndim), |(i, j)| {
            0.1 * ((1 + i * ndim + j) as f64).sin()
        })
    }

    /// A Gaussian target that also reports the coordinate sum of each
    /// walker as a blob.
    struct SummingGaussian;

    impl LogProb for SummingGaussian {
        type Blob = f64;

        fn log_prob(
            &self,
            theta: ArrayView1<f64>,
        ) -> Result<WalkerEval<f64>, EvalError> {
            Ok(WalkerEval::WithBlob(-theta.dot(&theta), theta.sum()))
        }
    }

    #[test]
    fn test_blobs_track_the_stored_chain() {
        let mut sampler = EnsembleSampler::new(8, 2, SummingGaussian).unwrap().seed(SEED);
        sampler
            .run_mcmc(
                Some(initial_ball(8, 2).into()),
                50,
                &SampleOptions::default(),
            )
            .unwrap();

        let chain = sampler.get_chain(&Query::default()).unwrap();
        let blobs = sampler.get_blobs(&Query::default()).unwrap().unwrap();
        assert_eq!(blobs.len(), 50);

        // A walker's blob must always describe its stored position,
        // whether the round's proposal was accepted or not.
        for (step, step_blobs) in blobs.iter().enumerate() {
            assert_eq!(step_blobs.len(), 8);
            for (w, &blob) in step_blobs.iter().enumerate() {
                let coord_sum = chain[[step, w, 0]] + chain[[step, w, 1]];
                assert!(
                    (blob - coord_sum).abs() < 1e-12,
                    "Blob out of sync at step {} walker {}",
                    step,
                    w
                );
            }
        }

        // The flattened view lines up with the flattened chain row by row.
        let flat = sampler.get_flat_chain(&Query::default()).unwrap();
        let flat_blobs = sampler.get_flat_blobs(&Query::default()).unwrap().unwrap();
        assert_eq!(flat_blobs.len(), 50 * 8);
        for (row, &blob) in flat.rows().into_iter().zip(flat_blobs.iter()) {
            assert!(
                (row.sum() - blob).abs() < 1e-12,
                "Flattened blob out of sync"
            );
        }
    }

    #[test]
    fn test_blobless_targets_store_no_blobs() {
        let f: fn(ArrayView1<f64>) -> f64 = neg_sum_sq;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(SEED);
        sampler
            .run_mcmc(
                Some(initial_ball(8, 2).into()),
                10,
                &SampleOptions::default(),
            )
            .unwrap();
        assert!(sampler.get_blobs(&Query::default()).unwrap().is_none());
        assert!(sampler.get_flat_blobs(&Query::default()).unwrap().is_none());
    }

    #[test]
    fn test_thin_by_stores_every_nth_round() {
        let f: fn(ArrayView1<f64>) -> f64 = neg_sum_sq;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(SEED);
        let opts = SampleOptions {
            thin_by: 5,
            ..SampleOptions::default()
        };
        sampler
            .run_mcmc(Some(initial_ball(8, 2).into()), 20, &opts)
            .unwrap();

        assert_eq!(sampler.backend().iteration(), 20);
        let chain = sampler.get_chain(&Query::default()).unwrap();
        assert_eq!(chain.dim(), (20, 8, 2));
    }

    #[test]
    fn test_checkpoint_resume_matches_continuous_run() {
        let f: fn(ArrayView1<f64>) -> f64 = neg_sum_sq;
        let initial = initial_ball(10, 2);
        let opts = SampleOptions::default();

        // One continuous 20-step run.
        let mut whole = EnsembleSampler::new(10, 2, f).unwrap().seed(SEED);
        let last_whole = whole
            .run_mcmc(Some(initial.clone().into()), 20, &opts)
            .unwrap();

        // Ten steps, a checkpoint to disk, then ten more in a fresh
        // sampler with a different seed. The stored generator snapshot
        // must make the continuation identical.
        let mut first = EnsembleSampler::new(10, 2, f).unwrap().seed(SEED);
        let mid = first.run_mcmc(Some(initial.into()), 10, &opts).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.ckpt");
        mid.save_checkpoint(&path).unwrap();

        let restored: EnsembleState = EnsembleState::load_checkpoint(&path).unwrap();
        let mut second = EnsembleSampler::new(10, 2, f).unwrap().seed(12345);
        let last_resumed = second
            .run_mcmc(Some(InitialState::State(restored)), 10, &opts)
            .unwrap();

        assert_eq!(last_whole.coords, last_resumed.coords);
        assert_eq!(last_whole.log_prob, last_resumed.log_prob);
    }

    #[test]
    fn test_nan_target_is_reported() {
        fn bad(_theta: ArrayView1<f64>) -> f64 {
            f64::NAN
        }
        let f: fn(ArrayView1<f64>) -> f64 = bad;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(SEED);
        assert!(matches!(
            sampler.run_mcmc(
                Some(initial_ball(8, 2).into()),
                5,
                &SampleOptions::default()
            ),
            Err(Error::NaNLogProb)
        ));
    }

    #[test]
    fn test_infinite_initial_coords_are_reported() {
        let f: fn(ArrayView1<f64>) -> f64 = neg_sum_sq;
        let mut sampler = EnsembleSampler::new(8, 2, f).unwrap().seed(SEED);
        let mut initial = initial_ball(8, 2);
        initial[[3, 1]] = f64::INFINITY;
        assert!(matches!(
            sampler.run_mcmc(Some(initial.into()), 5, &SampleOptions::default()),
            Err(Error::NonFiniteParameters(_))
        ));
    }

    #[test]
    fn test_parallel_and_serial_pools_agree() {
        let f: fn(ArrayView1<f64>) -> f64 = neg_sum_sq;
        let initial = initial_ball(12, 3);

        let mut serial = EnsembleSampler::new(12, 3, f).unwrap().seed(21);
        let mut parallel = EnsembleSampler::new(12, 3, f).unwrap().seed(21).parallel();
        let last_serial = serial
            .run_mcmc(Some(initial.clone().into()), 50, &SampleOptions::default())
            .unwrap();
        let last_parallel = parallel
            .run_mcmc(Some(initial.into()), 50, &SampleOptions::default())
            .unwrap();

        assert_eq!(last_serial.coords, last_parallel.coords);
    }
}
