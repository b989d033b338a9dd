//! End-to-end tree generation
//!
//! A request walks through the stages of [`Stage`] in order. Any failure
//! ends the request; nothing is resumed. Because the tree is a pure
//! function of the secret key, the recovery for a failed request is simply
//! to run it again. Scratch files and staging areas of failed requests are
//! left where they are for inspection.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::address::encode_address;
use crate::builder::{BuildReport, ParallelLeafBuilder};
use crate::config::GeneratorConfig;
use crate::error::{Error as TreeError, Result};
use crate::fold::TreeFolder;
use crate::rng::{ChaChaStream, SeededStream};
use crate::store::{FinalizeOutcome, FsTreeStore, ScratchFile, TreeMetadata, TreeStore};
use crate::types::{Address, SecretKey};

/// Stages of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Seeding,
    LeafGeneration,
    Folding,
    RootComputed,
    AddressDerived,
    Finalize,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Seeding => "seeding",
            Stage::LeafGeneration => "leaf generation",
            Stage::Folding => "folding",
            Stage::RootComputed => "root computed",
            Stage::AddressDerived => "address derived",
            Stage::Finalize => "finalize",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// The single failure a generation request reports to its caller.
/// Details are logged, not returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Tree generation failed during {stage}")]
pub struct GenerationFailed {
    /// Stage the request was in when it failed
    pub stage: Stage,
}

/// Publish a folded tree under its address.
///
/// Returns [`FinalizeOutcome::AlreadyPresent`] without touching the stored
/// tree when the address already has one.
pub fn finalize<T: TreeStore>(
    store: &T,
    staging: T::Staging,
    address: &Address,
    num_layers: u32,
) -> Result<FinalizeOutcome> {
    store.commit(staging, &TreeMetadata::new(address.clone(), num_layers))
}

/// Runs generation requests against one store
pub struct Generator<T: TreeStore> {
    config: GeneratorConfig,
    store: T,
    builder: ParallelLeafBuilder,
    folder: TreeFolder,
}

impl Generator<FsTreeStore> {
    /// Generator over a filesystem store at `config.store_root`
    pub fn open(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let store = FsTreeStore::new(&config.store_root)?;

        let leftovers = store.leftover_staging()?;
        if !leftovers.is_empty() {
            warn!(
                count = leftovers.len(),
                root = %store.root().display(),
                "Staging directories from earlier failed runs are still present"
            );
        }

        Self::new(config, store)
    }
}

impl<T: TreeStore> Generator<T> {
    /// Generator over any store
    pub fn new(config: GeneratorConfig, store: T) -> Result<Self> {
        config.validate()?;
        let builder = ParallelLeafBuilder::from_config(&config)?;
        Ok(Self {
            config,
            store,
            builder,
            folder: TreeFolder::new(),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    /// Derive the tree for `secret`, store it and return its address
    pub fn generate(&self, secret: &SecretKey) -> std::result::Result<Address, GenerationFailed> {
        self.generate_with::<ChaChaStream>(secret)
    }

    /// [`Generator::generate`] drawing every seed and key from stream type `S`
    pub fn generate_with<S: SeededStream>(
        &self,
        secret: &SecretKey,
    ) -> std::result::Result<Address, GenerationFailed> {
        let mut stage = Stage::Init;
        let started = Instant::now();
        let result = self.run_full::<S>(secret, &mut stage);
        self.report(result, stage, started)
    }

    /// Only produce the scratch leaf file at `scratch`
    pub fn generate_scratch(&self, secret: &SecretKey, scratch: &Path) -> Result<BuildReport> {
        let mut stage = Stage::Init;
        self.write_scratch::<ChaChaStream>(secret, scratch, &mut stage)
    }

    /// Fold an existing scratch leaf file, store the tree and return its
    /// address. The scratch file is moved into the store.
    pub fn generate_from_scratch(
        &self,
        scratch: &Path,
    ) -> std::result::Result<Address, GenerationFailed> {
        let mut stage = Stage::LeafGeneration;
        let started = Instant::now();
        let result = self.fold_and_finalize(scratch, &mut stage);
        self.report(result, stage, started)
    }

    fn report(
        &self,
        result: Result<Address>,
        stage: Stage,
        started: Instant,
    ) -> std::result::Result<Address, GenerationFailed> {
        match result {
            Ok(address) => {
                info!(
                    %address,
                    layers = self.config.num_layers,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tree generation complete"
                );
                Ok(address)
            }
            Err(e) => {
                error!(%stage, error = %e, "Tree generation failed");
                Err(GenerationFailed { stage })
            }
        }
    }

    fn run_full<S: SeededStream>(&self, secret: &SecretKey, stage: &mut Stage) -> Result<Address> {
        // Private to this request; concurrent requests never share a scratch file
        let scratch = self.config.scratch_path();
        self.write_scratch::<S>(secret, &scratch, stage)?;
        self.fold_and_finalize(&scratch, stage)
    }

    fn write_scratch<S: SeededStream>(
        &self,
        secret: &SecretKey,
        scratch: &Path,
        stage: &mut Stage,
    ) -> Result<BuildReport> {
        advance(stage, Stage::Seeding);
        if let Some(parent) = scratch.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TreeError::storage(parent, e))?;
        }
        let mut sink = ScratchFile::create(scratch)?;

        advance(stage, Stage::LeafGeneration);
        let report = self
            .builder
            .build_with::<S, _>(secret, self.config.num_layers, &mut sink)?;
        sink.finish()?;

        info!(
            leaves = report.leaves,
            waves = report.waves,
            keys_per_second = report.keys_per_second(),
            "Leaf layer written"
        );
        Ok(report)
    }

    fn fold_and_finalize(&self, scratch: &Path, stage: &mut Stage) -> Result<Address> {
        let num_layers = self.config.num_layers;

        advance(stage, Stage::Folding);
        let staging = self.store.open_staging()?;
        let leaves = self.store.import_scratch(&staging, scratch)?;
        let root = self.folder.fold_layers(leaves, num_layers, |index, layer| {
            self.store.write_layer(&staging, index, layer)
        })?;

        advance(stage, Stage::RootComputed);
        let address = encode_address(&root, num_layers);

        advance(stage, Stage::AddressDerived);
        debug!(%address, "Derived address");

        advance(stage, Stage::Finalize);
        match finalize(&self.store, staging, &address, num_layers)? {
            FinalizeOutcome::Stored => {}
            FinalizeOutcome::AlreadyPresent => {
                info!(%address, "Address already stored, kept existing tree")
            }
        }

        advance(stage, Stage::Done);
        Ok(address)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "Stage transition");
    *stage = next;
}
