//! Pseudo-random test data

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::io::{self, Read};

/// Endless stream of pseudo-random bytes; bound it with [`Read::take`].
///
/// Random content defeats compression and deduplication on the way to the
/// backend, and the stream never holds more than the caller's buffer.
pub struct RandomStream {
    rng: StdRng,
}

impl RandomStream {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible stream for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for RandomStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rng.fill_bytes(buf);
        Ok(buf.len())
    }
}
