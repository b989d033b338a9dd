//! Error types for SigmaX tree generation

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for tree generation
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while deriving or storing a tree
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend failure (directory creation, write, relocation)
    #[error("Storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    /// Invalid generator configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Tree depth outside the buildable range
    #[error("Unsupported tree depth {0} (expected {}..={})", crate::MIN_LAYERS, crate::MAX_LAYERS)]
    InvalidDepth(u32),

    /// A layer does not have the size a perfect binary tree requires
    #[error("Layer {index} has {actual} entries, expected {expected}")]
    LayerShape {
        index: u32,
        expected: usize,
        actual: usize,
    },

    /// Seeded generator could not produce output
    #[error("Random generation failed: {0}")]
    Random(String),

    /// A leaf worker failed; the whole wave is discarded
    #[error("Leaf worker failed in wave {wave}: {reason}")]
    Worker { wave: usize, reason: String },

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    Pool(String),

    /// Malformed stored metadata
    #[error("Invalid metadata: {0}")]
    Metadata(String),

    /// No stored tree for the address
    #[error("No tree stored for address {0}")]
    NotFound(String),

    /// Malformed address string
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Built-in known-answer test failed
    #[error("Self-test failed: {0}")]
    SelfTest(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rand::Error> for Error {
    fn from(e: rand::Error) -> Self {
        Error::Random(e.to_string())
    }
}

impl Error {
    /// Wrap an IO error with the path it occurred on
    pub(crate) fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Storage {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
