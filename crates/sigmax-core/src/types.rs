//! Core newtypes for keys, tree nodes and addresses

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{encode_node, sha256};
use crate::LEAF_SEED_SIZE;

/// Caller-supplied secret key material. Never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Create a secret key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for SecretKey {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Seed of one leaf's one-time key (100 bytes)
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LeafSeed(pub [u8; LEAF_SEED_SIZE]);

impl LeafSeed {
    pub fn new(bytes: [u8; LEAF_SEED_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; LEAF_SEED_SIZE] {
        &self.0
    }
}

impl fmt::Debug for LeafSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LeafSeed(..)")
    }
}

/// A printable-encoded SHA256 node of the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHash(String);

impl NodeHash {
    /// Encode a raw digest
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(encode_node(digest))
    }

    /// Wrap an already-encoded hash (e.g. a line read from a layer file)
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest of the parent of `left` and `right`: SHA256 over the
    /// concatenated encoded forms, left first
    pub fn parent_digest(left: &NodeHash, right: &NodeHash) -> [u8; 32] {
        let mut joined = String::with_capacity(left.0.len() + right.0.len());
        joined.push_str(&left.0);
        joined.push_str(&right.0);
        sha256(joined.as_bytes())
    }

    /// Parent node of `left` and `right`
    pub fn parent(left: &NodeHash, right: &NodeHash) -> NodeHash {
        NodeHash::from_digest(&Self::parent_digest(left, right))
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered sequence of node hashes
pub type Layer = Vec<NodeHash>;

/// Root of a finished tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Root {
    digest: [u8; 32],
}

impl Root {
    pub fn new(digest: [u8; 32]) -> Self {
        Self { digest }
    }

    /// Raw digest produced by the final fold
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// The root as it is stored in the top layer file
    pub fn node(&self) -> NodeHash {
        NodeHash::from_digest(&self.digest)
    }
}

/// A SigmaX address string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub(crate) fn from_parts(prefix: &str, pre_address: &str, checksum: &str) -> Self {
        Self(format!("{prefix}{pre_address}{checksum}"))
    }

    /// Wrap an address string without validating it
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
