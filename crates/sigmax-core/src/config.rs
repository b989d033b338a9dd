//! Generator configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::{LEAF_SEED_SIZE, MAX_LAYERS, MIN_LAYERS, PRIVATE_PART_COUNT, PRIVATE_PART_SIZE};

/// Bytes held per leaf while its wave is in flight (seed plus private key)
pub const BYTES_PER_LEAF_IN_FLIGHT: u64 =
    (LEAF_SEED_SIZE + PRIVATE_PART_COUNT * PRIVATE_PART_SIZE) as u64;

/// Generator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of tree layers, leaves included
    #[serde(default = "default_num_layers")]
    pub num_layers: u32,

    /// Worker threads used for leaf generation
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Leaves handed to each worker per wave
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on key material in flight during one wave
    #[serde(default = "default_max_in_flight_bytes")]
    pub max_in_flight_bytes: u64,

    /// Directory holding one subdirectory per address
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// File name prefix of the per-request scratch leaf files inside
    /// `store_root`
    #[serde(default = "default_scratch_name")]
    pub scratch_name: String,
}

fn default_num_layers() -> u32 {
    14
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_batch_size() -> usize {
    512
}

fn default_max_in_flight_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_store_root() -> PathBuf {
    PathBuf::from("addresses")
}

fn default_scratch_name() -> String {
    "scratch".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_layers: default_num_layers(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            max_in_flight_bytes: default_max_in_flight_bytes(),
            store_root: default_store_root(),
            scratch_name: default_scratch_name(),
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Key material held in memory by one full wave
    pub fn wave_footprint(&self) -> u64 {
        (self.workers as u64)
            .saturating_mul(self.batch_size as u64)
            .saturating_mul(BYTES_PER_LEAF_IN_FLIGHT)
    }

    /// A fresh scratch leaf file path, `<scratch_name>-<uuid>`, so that
    /// concurrent requests never share one
    pub fn scratch_path(&self) -> PathBuf {
        let name = format!("{}-{}", self.scratch_name, Uuid::new_v4().simple());
        self.store_root.join(name)
    }

    /// Check the configuration before any work starts
    pub fn validate(&self) -> Result<()> {
        ensure_buildable_depth(self.num_layers)?;

        if self.workers == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }
        if self.wave_footprint() > self.max_in_flight_bytes {
            return Err(Error::Config(format!(
                "{} workers x {} leaves needs {} bytes per wave, limit is {}",
                self.workers,
                self.batch_size,
                self.wave_footprint(),
                self.max_in_flight_bytes
            )));
        }
        if self.scratch_name.is_empty() || self.scratch_name.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "scratch name {:?} must be a plain file name",
                self.scratch_name
            )));
        }

        Ok(())
    }
}

/// Trees must have at least one fold and a leaf count that fits in memory
pub(crate) fn ensure_buildable_depth(num_layers: u32) -> Result<()> {
    if (MIN_LAYERS..=MAX_LAYERS).contains(&num_layers) {
        Ok(())
    } else {
        Err(Error::InvalidDepth(num_layers))
    }
}
