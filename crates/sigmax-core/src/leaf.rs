//! One-time Lamport key generation
//!
//! Private keys are cheap to regenerate and large, so they are never
//! stored: a leaf seed is enough to rebuild the whole key when a signature
//! is needed. Only the leaf hash goes into the tree.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;
use crate::rng::{ChaChaStream, SeededStream};
use crate::types::{LeafSeed, NodeHash};
use crate::{PRIVATE_PART_COUNT, PRIVATE_PART_SIZE};

/// One Lamport private key part
pub type PrivatePart = [u8; PRIVATE_PART_SIZE];

/// The private half of a one-time Lamport key: two parts per signed bit
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OneTimePrivateKey {
    parts: Vec<PrivatePart>,
}

impl OneTimePrivateKey {
    /// All parts in draw order
    pub fn parts(&self) -> &[PrivatePart] {
        &self.parts
    }

    /// The pair of parts for message bit `bit` (0 and 1 variants)
    pub fn pair(&self, bit: usize) -> Option<(&PrivatePart, &PrivatePart)> {
        let zero = self.parts.get(2 * bit)?;
        let one = self.parts.get(2 * bit + 1)?;
        Some((zero, one))
    }

    /// Digest of the concatenated parts
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for part in &self.parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    /// The leaf this key occupies in the tree
    pub fn leaf_hash(&self) -> NodeHash {
        NodeHash::from_digest(&self.digest())
    }
}

/// Stateless generator of one-time keys and leaf hashes
pub struct LeafKeyGenerator;

impl LeafKeyGenerator {
    /// Rebuild the private key for `seed`
    pub fn private_key(seed: &LeafSeed) -> Result<OneTimePrivateKey> {
        Self::private_key_with::<ChaChaStream>(seed)
    }

    /// Compute the leaf hash for `seed`
    pub fn leaf_hash(seed: &LeafSeed) -> Result<NodeHash> {
        Self::leaf_hash_with::<ChaChaStream>(seed)
    }

    /// Rebuild the private key using stream type `S`
    pub fn private_key_with<S: SeededStream>(seed: &LeafSeed) -> Result<OneTimePrivateKey> {
        let mut stream = S::from_seed_bytes(seed.as_bytes());
        let mut parts = vec![[0u8; PRIVATE_PART_SIZE]; PRIVATE_PART_COUNT];
        for part in parts.iter_mut() {
            stream.fill(part)?;
        }
        Ok(OneTimePrivateKey { parts })
    }

    /// Compute the leaf hash using stream type `S`
    pub fn leaf_hash_with<S: SeededStream>(seed: &LeafSeed) -> Result<NodeHash> {
        Ok(Self::private_key_with::<S>(seed)?.leaf_hash())
    }
}
