//! In-process tree store

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::file::read_layer_file;
use super::{FinalizeOutcome, TreeMetadata, TreeStore};
use crate::error::{Error, Result};
use crate::types::{Address, Layer};

#[derive(Debug, Clone)]
struct StoredTree {
    metadata: TreeMetadata,
    layers: BTreeMap<u32, Layer>,
}

#[derive(Default)]
struct Inner {
    staging: HashMap<u64, BTreeMap<u32, Layer>>,
    trees: HashMap<Address, StoredTree>,
}

/// Tree store kept entirely in memory
#[derive(Default)]
pub struct MemoryTreeStore {
    next_staging: AtomicU64,
    inner: Mutex<Inner>,
}

/// Handle to a staged tree in a [`MemoryTreeStore`]
#[derive(Debug)]
pub struct MemoryStaging {
    id: u64,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trees
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.trees.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of staging areas neither committed nor discarded
    pub fn open_staging_count(&self) -> usize {
        self.lock().map(|inner| inner.staging.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Storage {
                path: "<memory>".into(),
                reason: "store lock poisoned".to_string(),
            })
    }

    fn staged_layers<'a>(
        inner: &'a mut Inner,
        staging: &MemoryStaging,
    ) -> Result<&'a mut BTreeMap<u32, Layer>> {
        inner.staging.get_mut(&staging.id).ok_or_else(|| Error::Storage {
            path: "<memory>".into(),
            reason: format!("unknown staging area {}", staging.id),
        })
    }
}

impl TreeStore for MemoryTreeStore {
    type Staging = MemoryStaging;

    fn open_staging(&self) -> Result<MemoryStaging> {
        let id = self.next_staging.fetch_add(1, Ordering::Relaxed);
        self.lock()?.staging.insert(id, BTreeMap::new());
        Ok(MemoryStaging { id })
    }

    fn import_scratch(&self, staging: &MemoryStaging, scratch: &Path) -> Result<Layer> {
        let layer = read_layer_file(scratch)?;
        std::fs::remove_file(scratch).map_err(|e| Error::storage(scratch, e))?;
        self.write_layer(staging, 0, &layer)?;
        Ok(layer)
    }

    fn write_layer(&self, staging: &MemoryStaging, index: u32, layer: &Layer) -> Result<()> {
        let mut inner = self.lock()?;
        Self::staged_layers(&mut inner, staging)?.insert(index, layer.clone());
        Ok(())
    }

    fn commit(&self, staging: MemoryStaging, metadata: &TreeMetadata) -> Result<FinalizeOutcome> {
        let mut inner = self.lock()?;

        if inner.trees.contains_key(&metadata.address) {
            inner.staging.remove(&staging.id);
            return Ok(FinalizeOutcome::AlreadyPresent);
        }

        let layers = Self::staged_layers(&mut inner, &staging)?;
        if let Some(missing) = (0..metadata.num_layers).find(|i| !layers.contains_key(i)) {
            return Err(Error::Storage {
                path: "<memory>".into(),
                reason: format!("staged layer {missing} is missing"),
            });
        }

        let layers = inner.staging.remove(&staging.id).unwrap_or_default();
        inner.trees.insert(
            metadata.address.clone(),
            StoredTree {
                metadata: metadata.clone(),
                layers,
            },
        );
        Ok(FinalizeOutcome::Stored)
    }

    fn discard(&self, staging: MemoryStaging) -> Result<()> {
        self.lock()?.staging.remove(&staging.id);
        Ok(())
    }

    fn contains(&self, address: &Address) -> Result<bool> {
        Ok(self.lock()?.trees.contains_key(address))
    }

    fn read_layer(&self, address: &Address, index: u32) -> Result<Layer> {
        self.lock()?
            .trees
            .get(address)
            .and_then(|tree| tree.layers.get(&index).cloned())
            .ok_or_else(|| Error::NotFound(format!("{address} layer {index}")))
    }

    fn read_metadata(&self, address: &Address) -> Result<TreeMetadata> {
        self.lock()?
            .trees
            .get(address)
            .map(|tree| tree.metadata.clone())
            .ok_or_else(|| Error::NotFound(address.to_string()))
    }
}
