//! Seeded deterministic byte streams
//!
//! The tree is a pure function of the secret key, so every random draw in
//! the pipeline comes from a stream that is fully determined by its seed.
//! The trait lets tests swap in a fixed stream.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::crypto::sha256;
use crate::error::Result;

/// A deterministic byte stream keyed by arbitrary seed bytes
pub trait SeededStream: Send + Sized {
    /// Create a stream from seed material of any length
    fn from_seed_bytes(seed: &[u8]) -> Self;

    /// Fill `dest` with the next bytes of the stream
    fn fill(&mut self, dest: &mut [u8]) -> Result<()>;
}

/// ChaCha20 keystream keyed by SHA256 of the seed bytes
pub struct ChaChaStream {
    rng: ChaCha20Rng,
}

impl ChaChaStream {
    /// Create a stream directly from a 32-byte ChaCha20 key
    pub fn from_key(key: [u8; 32]) -> Self {
        Self {
            rng: ChaCha20Rng::from_seed(key),
        }
    }
}

impl SeededStream for ChaChaStream {
    fn from_seed_bytes(seed: &[u8]) -> Self {
        Self::from_key(sha256(seed))
    }

    fn fill(&mut self, dest: &mut [u8]) -> Result<()> {
        self.rng.try_fill_bytes(dest)?;
        Ok(())
    }
}
