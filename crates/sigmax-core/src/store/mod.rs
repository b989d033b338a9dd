//! Tree persistence
//!
//! Trees are written into a private staging area while they are built and
//! become visible under their address in a single commit step. A tree that
//! already exists for an address is never replaced: committing the same
//! address again discards the new copy and reports it as already present.

mod file;
mod fs;
mod memory;

pub use file::{move_file, read_layer_file, write_layer_file, ScratchFile};
pub use fs::{FsStaging, FsTreeStore};
pub use memory::{MemoryStaging, MemoryTreeStore};

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Address, Layer};

/// Metadata stored next to the layers of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMetadata {
    pub address: Address,
    pub num_layers: u32,
    pub generator_version: String,
}

impl TreeMetadata {
    /// Metadata for a tree produced by this build of the generator
    pub fn new(address: Address, num_layers: u32) -> Self {
        Self {
            address,
            num_layers,
            generator_version: crate::GENERATOR_VERSION.to_string(),
        }
    }

    /// Render as `key: value` lines
    pub fn to_text(&self) -> String {
        format!(
            "address: {}\nlayers: {}\nsoftware_version: {}\n",
            self.address, self.num_layers, self.generator_version
        )
    }

    /// Parse `key: value` lines; unknown keys are ignored
    pub fn parse(text: &str) -> Result<Self> {
        let mut address = None;
        let mut num_layers = None;
        let mut generator_version = None;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Metadata(format!("malformed line {line:?}")))?;
            let value = value.trim();
            match key.trim() {
                "address" => address = Some(Address::new_unchecked(value)),
                "layers" => {
                    num_layers = Some(value.parse::<u32>().map_err(|e| {
                        Error::Metadata(format!("invalid layer count {value:?}: {e}"))
                    })?)
                }
                "software_version" => generator_version = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            address: address.ok_or_else(|| Error::Metadata("missing address".to_string()))?,
            num_layers: num_layers.ok_or_else(|| Error::Metadata("missing layers".to_string()))?,
            generator_version: generator_version
                .ok_or_else(|| Error::Metadata("missing software_version".to_string()))?,
        })
    }
}

/// Result of committing a staged tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The tree is now stored under its address
    Stored,
    /// A tree was already stored for the address; the staged copy was dropped
    AlreadyPresent,
}

/// Address-keyed storage of finished trees
pub trait TreeStore {
    /// Handle to a private area holding one tree under construction
    type Staging;

    /// Start a new staging area
    fn open_staging(&self) -> Result<Self::Staging>;

    /// Relocate a scratch leaf file into staging as layer 0 and return it
    fn import_scratch(&self, staging: &Self::Staging, scratch: &Path) -> Result<Layer>;

    /// Write layer `index` into staging
    fn write_layer(&self, staging: &Self::Staging, index: u32, layer: &Layer) -> Result<()>;

    /// Atomically publish the staged tree under `metadata.address`, unless a
    /// tree is already stored there
    fn commit(&self, staging: Self::Staging, metadata: &TreeMetadata) -> Result<FinalizeOutcome>;

    /// Drop a staging area without publishing it
    fn discard(&self, staging: Self::Staging) -> Result<()>;

    /// Whether a tree is stored for `address`
    fn contains(&self, address: &Address) -> Result<bool>;

    /// Read layer `index` of the tree stored for `address`
    fn read_layer(&self, address: &Address, index: u32) -> Result<Layer>;

    /// Read the metadata of the tree stored for `address`
    fn read_metadata(&self, address: &Address) -> Result<TreeMetadata>;
}
