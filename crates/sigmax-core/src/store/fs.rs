//! Filesystem tree store
//!
//! Layout under the root directory:
//! - `<address>/layer<i>.lyr` for every layer, leaves first
//! - `<address>/info.dta` with the tree metadata
//! - `.staging-<uuid>/` for trees still being built
//!
//! A staging directory is published by renaming it to the address, so a
//! reader sees either no tree or a complete one.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::file::{move_file, read_layer_file, write_layer_file};
use super::{FinalizeOutcome, TreeMetadata, TreeStore};
use crate::error::{Error, Result};
use crate::types::{Address, Layer};

const STAGING_PREFIX: &str = ".staging-";
const METADATA_FILE: &str = "info.dta";

/// Name of the file holding layer `index`
pub fn layer_file_name(index: u32) -> String {
    format!("layer{index}.lyr")
}

/// Directory-per-address store
pub struct FsTreeStore {
    root: PathBuf,
}

/// A staging directory owned by one generation request
#[derive(Debug)]
pub struct FsStaging {
    dir: PathBuf,
}

impl FsStaging {
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl FsTreeStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::storage(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the tree for `address`
    pub fn address_dir(&self, address: &Address) -> PathBuf {
        self.root.join(address.as_str())
    }

    /// Staging directories left behind by failed runs
    pub fn leftover_staging(&self) -> Result<Vec<PathBuf>> {
        let mut leftovers = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| Error::storage(&self.root, e))? {
            let entry = entry.map_err(|e| Error::storage(&self.root, e))?;
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                leftovers.push(entry.path());
            }
        }
        leftovers.sort();
        Ok(leftovers)
    }

    /// Addresses of every stored tree
    pub fn addresses(&self) -> Result<Vec<Address>> {
        let mut addresses = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| Error::storage(&self.root, e))? {
            let entry = entry.map_err(|e| Error::storage(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(STAGING_PREFIX) && entry.path().join(METADATA_FILE).is_file() {
                addresses.push(Address::new_unchecked(name));
            }
        }
        addresses.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(addresses)
    }

    fn check_staged_layers(staging: &FsStaging, num_layers: u32) -> Result<()> {
        for index in 0..num_layers {
            let path = staging.dir.join(layer_file_name(index));
            if !path.is_file() {
                return Err(Error::storage(path, "staged layer is missing"));
            }
        }
        Ok(())
    }
}

impl TreeStore for FsTreeStore {
    type Staging = FsStaging;

    fn open_staging(&self) -> Result<FsStaging> {
        let dir = self
            .root
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()));
        fs::create_dir(&dir).map_err(|e| Error::storage(&dir, e))?;
        debug!(path = %dir.display(), "Opened staging directory");
        Ok(FsStaging { dir })
    }

    fn import_scratch(&self, staging: &FsStaging, scratch: &Path) -> Result<Layer> {
        let target = staging.dir.join(layer_file_name(0));
        move_file(scratch, &target)?;
        read_layer_file(&target)
    }

    fn write_layer(&self, staging: &FsStaging, index: u32, layer: &Layer) -> Result<()> {
        write_layer_file(&staging.dir.join(layer_file_name(index)), layer)
    }

    fn commit(&self, staging: FsStaging, metadata: &TreeMetadata) -> Result<FinalizeOutcome> {
        let target = self.address_dir(&metadata.address);

        if self.contains(&metadata.address)? {
            info!(address = %metadata.address, "Tree already stored, discarding new copy");
            self.discard(staging)?;
            return Ok(FinalizeOutcome::AlreadyPresent);
        }
        if target.exists() {
            return Err(Error::storage(&target, "address directory has no tree metadata"));
        }

        Self::check_staged_layers(&staging, metadata.num_layers)?;

        let metadata_path = staging.dir.join(METADATA_FILE);
        fs::write(&metadata_path, metadata.to_text())
            .map_err(|e| Error::storage(&metadata_path, e))?;

        match fs::rename(&staging.dir, &target) {
            Ok(()) => {
                info!(address = %metadata.address, path = %target.display(), "Stored tree");
                Ok(FinalizeOutcome::Stored)
            }
            // Another run published the same address between our check and
            // the rename; its copy is identical, keep it.
            Err(_) if self.contains(&metadata.address)? => {
                warn!(address = %metadata.address, "Lost publish race, discarding new copy");
                self.discard(staging)?;
                Ok(FinalizeOutcome::AlreadyPresent)
            }
            Err(e) => Err(Error::storage(&target, e)),
        }
    }

    fn discard(&self, staging: FsStaging) -> Result<()> {
        match fs::remove_dir_all(&staging.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(&staging.dir, e)),
        }
    }

    fn contains(&self, address: &Address) -> Result<bool> {
        Ok(self.address_dir(address).join(METADATA_FILE).is_file())
    }

    fn read_layer(&self, address: &Address, index: u32) -> Result<Layer> {
        let path = self.address_dir(address).join(layer_file_name(index));
        if !path.is_file() {
            return Err(Error::NotFound(format!("{address} layer {index}")));
        }
        read_layer_file(&path)
    }

    fn read_metadata(&self, address: &Address) -> Result<TreeMetadata> {
        let path = self.address_dir(address).join(METADATA_FILE);
        if !path.is_file() {
            return Err(Error::NotFound(address.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|e| Error::storage(&path, e))?;
        TreeMetadata::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LayerSink;
    use crate::store::ScratchFile;
    use crate::types::NodeHash;

    fn layer(prefix: &str, count: usize) -> Layer {
        (0..count)
            .map(|i| NodeHash::from_encoded(format!("{prefix}{i}")))
            .collect()
    }

    fn stage_tree(store: &FsTreeStore, tag: &str) -> FsStaging {
        let staging = store.open_staging().unwrap();
        store.write_layer(&staging, 0, &layer(tag, 2)).unwrap();
        store.write_layer(&staging, 1, &layer(tag, 1)).unwrap();
        staging
    }

    #[test]
    fn test_commit_publishes_layers_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTreeStore::new(dir.path().join("addresses")).unwrap();
        let address = Address::new_unchecked("F1TEST");

        let staging = stage_tree(&store, "a");
        let staging_path = staging.path().to_path_buf();
        let outcome = store
            .commit(staging, &TreeMetadata::new(address.clone(), 2))
            .unwrap();

        assert_eq!(outcome, FinalizeOutcome::Stored);
        assert!(!staging_path.exists());
        assert!(store.contains(&address).unwrap());
        assert_eq!(store.read_layer(&address, 0).unwrap(), layer("a", 2));
        assert_eq!(store.read_metadata(&address).unwrap().num_layers, 2);
        assert_eq!(store.addresses().unwrap(), vec![address]);
    }

    #[test]
    fn test_second_commit_keeps_first_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTreeStore::new(dir.path()).unwrap();
        let address = Address::new_unchecked("F1TEST");
        let metadata = TreeMetadata::new(address.clone(), 2);

        store.commit(stage_tree(&store, "first"), &metadata).unwrap();
        let outcome = store.commit(stage_tree(&store, "second"), &metadata).unwrap();

        assert_eq!(outcome, FinalizeOutcome::AlreadyPresent);
        assert_eq!(store.read_layer(&address, 0).unwrap(), layer("first", 2));
        assert!(store.leftover_staging().unwrap().is_empty());
    }

    #[test]
    fn test_commit_rejects_directory_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTreeStore::new(dir.path()).unwrap();
        let address = Address::new_unchecked("F1HALF");
        fs::create_dir(store.address_dir(&address)).unwrap();

        let result = store.commit(stage_tree(&store, "a"), &TreeMetadata::new(address.clone(), 2));

        assert!(matches!(result, Err(Error::Storage { .. })));
        assert!(!store.contains(&address).unwrap());
        assert!(store.addresses().unwrap().is_empty());
        assert_eq!(store.leftover_staging().unwrap().len(), 1);
    }

    #[test]
    fn test_commit_requires_every_layer() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTreeStore::new(dir.path()).unwrap();
        let staging = stage_tree(&store, "a");

        let result = store.commit(staging, &TreeMetadata::new(Address::new_unchecked("F1X"), 3));
        assert!(matches!(result, Err(Error::Storage { .. })));
        assert!(!store.contains(&Address::new_unchecked("F1X")).unwrap());
        // Failed staging stays on disk for inspection
        assert_eq!(store.leftover_staging().unwrap().len(), 1);
    }

    #[test]
    fn test_import_scratch_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTreeStore::new(dir.path().join("store")).unwrap();
        let scratch_path = dir.path().join("scratch");

        let mut scratch = ScratchFile::create(&scratch_path).unwrap();
        scratch.append(&layer("leaf", 4)).unwrap();
        scratch.finish().unwrap();

        let staging = store.open_staging().unwrap();
        let imported = store.import_scratch(&staging, &scratch_path).unwrap();

        assert_eq!(imported, layer("leaf", 4));
        assert!(!scratch_path.exists());
        assert!(staging.path().join("layer0.lyr").is_file());
    }

    #[test]
    fn test_missing_tree_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTreeStore::new(dir.path()).unwrap();
        let address = Address::new_unchecked("S1NOPE");
        assert!(!store.contains(&address).unwrap());
        assert!(matches!(store.read_metadata(&address), Err(Error::NotFound(_))));
        assert!(matches!(store.read_layer(&address, 0), Err(Error::NotFound(_))));
    }
}
