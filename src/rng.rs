//! Reproducible random number generation.
//!
//! Every draw the sampler makes (move selection, stretch factors, partner
//! indices, acceptance tests) flows through a single [`RunRng`] stream owned
//! by the sampler. Nothing touches a thread-local or process-global
//! generator, so concurrent sampler instances never interfere with each
//! other's reproducibility.
//!
//! The stream's state is exposed as an opaque [`RngSnapshot`] that is written
//! into every [`EnsembleState`](crate::state::EnsembleState) and persisted by
//! the backend. Restoring a snapshot replays the stream exactly, which is
//! what makes a checkpointed chain resume bit-for-bit.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

/// An opaque, copyable snapshot of a [`RunRng`] stream.
///
/// The payload is a serialized generator state. Treat it as a black box:
/// store it, move it between processes, hand it back to
/// [`RunRng::restore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngSnapshot(Vec<u8>);

/// The sampler's private pseudo-random stream.
///
/// Wraps a [`Pcg64Mcg`] generator. Implements [`RngCore`], so the usual
/// [`rand::Rng`] extension methods are available on it.
#[derive(Debug, Clone)]
pub struct RunRng {
    inner: Pcg64Mcg,
}

impl RunRng {
    /// Creates a stream with the given seed.
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Creates a stream seeded from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self {
            inner: Pcg64Mcg::from_rng(&mut rand::rng()),
        }
    }

    /// Captures the current state of the stream.
    pub fn snapshot(&self) -> RngSnapshot {
        // Pcg64Mcg state is a single u128; serialization cannot fail.
        let bytes = bincode::serialize(&self.inner)
            .expect("serializing a Pcg64Mcg state cannot fail");
        RngSnapshot(bytes)
    }

    /// Tries to restore the stream from a snapshot.
    ///
    /// A snapshot that does not decode as a generator state is ignored and
    /// the stream keeps its current state. Resuming from a foreign or
    /// corrupted checkpoint loses exact-replay but must not crash the run.
    pub fn restore(&mut self, snapshot: &RngSnapshot) {
        if let Ok(inner) = bincode::deserialize::<Pcg64Mcg>(&snapshot.0) {
            self.inner = inner;
        }
    }
}

impl RngCore for RunRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }
}
