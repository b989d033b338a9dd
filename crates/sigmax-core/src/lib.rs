//! SigmaX Core - Merkle tree construction and address derivation
//!
//! A SigmaX address names a Merkle tree whose leaves are hashes of one-time
//! Lamport public keys. This crate derives the whole tree deterministically
//! from a secret key:
//! - Per-leaf seeds drawn from a generator seeded by the secret key
//! - Leaf hashes computed in parallel waves on a fixed worker pool
//! - Layers folded pairwise up to a single root
//! - The root encoded as a versioned, checksummed address
//! - The finished tree persisted under its address, at most once
//!
//! A tree with `n` layers can sign `2^(n-1)` transactions.

pub mod address;
pub mod builder;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fold;
pub mod generator;
pub mod leaf;
pub mod rng;
pub mod seed;
pub mod store;
pub mod types;

pub use address::{encode_address, AddressEncoder, AddressVersion};
pub use builder::{build_leaf_layer, BuildReport, LayerSink, ParallelLeafBuilder};
pub use config::GeneratorConfig;
pub use error::{Error, Result};
pub use fold::{fold_layers, TreeFolder};
pub use generator::{finalize, GenerationFailed, Generator, Stage};
pub use leaf::{LeafKeyGenerator, OneTimePrivateKey};
pub use rng::{ChaChaStream, SeededStream};
pub use seed::SeedDeriver;
pub use store::{FinalizeOutcome, FsTreeStore, MemoryTreeStore, TreeMetadata, TreeStore};
pub use types::{Address, Layer, LeafSeed, NodeHash, Root, SecretKey};

/// Version string recorded in every stored tree's metadata
pub const GENERATOR_VERSION: &str = "2.0.0a";

/// Number of message bits a one-time key can sign; each key holds twice
/// this many private parts
pub const SIGNATURE_BITS: usize = 100;

/// Number of private parts in one Lamport private key
pub const PRIVATE_PART_COUNT: usize = 2 * SIGNATURE_BITS;

/// Size of each Lamport private part in bytes
pub const PRIVATE_PART_SIZE: usize = 20;

/// Size of each per-leaf seed in bytes
pub const LEAF_SEED_SIZE: usize = 100;

/// Smallest tree that still has a fold between leaves and root
pub const MIN_LAYERS: u32 = 2;

/// Largest tree the generator will attempt to build
pub const MAX_LAYERS: u32 = 30;

/// Number of leaves (and one-time signatures) in a tree of `num_layers`
pub fn leaf_count(num_layers: u32) -> usize {
    1usize << num_layers.saturating_sub(1)
}

/// Expected number of entries in layer `index` of a tree of `num_layers`
pub fn layer_len(num_layers: u32, index: u32) -> usize {
    1usize << num_layers.saturating_sub(1).saturating_sub(index)
}
