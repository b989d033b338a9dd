//! Integration tests for end-to-end tree generation

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use sigmax_core::{
    address::AddressEncoder, build_leaf_layer, encode_address, finalize, fold_layers, Error,
    FinalizeOutcome, FsTreeStore, GenerationFailed, Generator, GeneratorConfig, MemoryTreeStore,
    NodeHash, SecretKey, SeededStream, Stage, TreeStore, LEAF_SEED_SIZE,
};

const PASSPHRASE: &str = "correct horse battery staple";

// Golden values for PASSPHRASE
const LEAF_0: &str = "qgss+a6n4yW1Oa7+5BZOoPkkmcs3N7LVuCAuRHx7aos=";
const LEAF_1: &str = "21ojRmMblNcFwbArHjGXRbP5L/tOjlN1/3rClMItPcg=";
const ROOT_14: &str = "QkmQ4oEZtCH37vLwi2MJ5Yb7wNRuV4Kz8Xos2rOhAsg=";
const ADDRESS_14: &str = "S1IJEZBYUBDG2CD57O6LYIWYYJ4WDPXQGU2CZU";
const ROOT_3: &str = "3/zG7JqvfXzgd8JpmUI64+HzeHcopJHO6FsTJZJmqb0=";
const ADDRESS_3: &str = "F1376MN3E2V56XZYDXYJUZSQR24PQ7G6DXDHXD";

fn config(root: &Path, num_layers: u32, workers: usize, batch_size: usize) -> GeneratorConfig {
    GeneratorConfig {
        num_layers,
        workers,
        batch_size,
        store_root: root.to_path_buf(),
        ..Default::default()
    }
}

/// Scratch files left in `dir`
fn scratch_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("scratch-"))
        .collect()
}

/// Stream whose leaf keys can never be drawn
struct FailingLeafStream;

impl SeededStream for FailingLeafStream {
    fn from_seed_bytes(_seed: &[u8]) -> Self {
        Self
    }

    fn fill(&mut self, dest: &mut [u8]) -> sigmax_core::Result<()> {
        if dest.len() == LEAF_SEED_SIZE {
            dest.fill(0x5a);
            Ok(())
        } else {
            Err(Error::Random("leaf stream unavailable".to_string()))
        }
    }
}

#[test]
fn test_depth_14_golden_address() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::open(config(dir.path(), 14, 4, 512)).unwrap();

    let address = generator.generate(&SecretKey::from(PASSPHRASE)).unwrap();
    assert_eq!(address.as_str(), ADDRESS_14);
    assert!(address.as_str().starts_with("S1"));

    let store = generator.store();
    let leaves = store.read_layer(&address, 0).unwrap();
    assert_eq!(leaves.len(), 8192);
    assert_eq!(leaves[0].as_str(), LEAF_0);
    assert_eq!(leaves[1].as_str(), LEAF_1);

    // 13 folds above the leaves, each halving the layer
    for index in 1..14 {
        let layer = store.read_layer(&address, index).unwrap();
        assert_eq!(layer.len(), 8192 >> index);
    }
    assert_eq!(
        store.read_layer(&address, 13).unwrap(),
        vec![NodeHash::from_encoded(ROOT_14)]
    );

    AddressEncoder::verify(address.as_str()).unwrap();
}

#[test]
fn test_small_tree_golden_values() {
    let leaves = build_leaf_layer(&SecretKey::from(PASSPHRASE), 3, 1, 1).unwrap();
    assert_eq!(leaves.len(), 4);
    assert_eq!(leaves[0].as_str(), LEAF_0);
    assert_eq!(leaves[1].as_str(), LEAF_1);

    let (root, layers) = fold_layers(leaves, 3).unwrap();
    assert_eq!(layers.len(), 3);
    assert_eq!(root.node().as_str(), ROOT_3);
    assert_eq!(encode_address(&root, 3).as_str(), ADDRESS_3);
}

#[test]
fn test_determinism_across_worker_and_batch_counts() {
    let secret = SecretKey::from("determinism");
    let reference = build_leaf_layer(&secret, 7, 1, 64).unwrap();

    for (workers, batch_size) in [(2, 1), (3, 5), (4, 16), (8, 7), (1, 1000)] {
        let layer = build_leaf_layer(&secret, 7, workers, batch_size).unwrap();
        assert_eq!(layer, reference, "workers={workers} batch_size={batch_size}");
    }
}

#[test]
fn test_same_address_from_different_pools() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let secret = SecretKey::from("pools");

    let a = Generator::open(config(dir_a.path(), 6, 1, 3))
        .unwrap()
        .generate(&secret)
        .unwrap();
    let b = Generator::open(config(dir_b.path(), 6, 5, 2))
        .unwrap()
        .generate(&secret)
        .unwrap();

    assert_eq!(a, b);
}

#[test]
fn test_persisted_layout() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::open(config(dir.path(), 4, 2, 2)).unwrap();
    let address = generator.generate(&SecretKey::from("layout")).unwrap();

    let tree_dir = dir.path().join(address.as_str());
    let mut names: Vec<String> = fs::read_dir(&tree_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["info.dta", "layer0.lyr", "layer1.lyr", "layer2.lyr", "layer3.lyr"]
    );

    let info = fs::read_to_string(tree_dir.join("info.dta")).unwrap();
    assert_eq!(
        info,
        format!("address: {address}\nlayers: 4\nsoftware_version: 2.0.0a\n")
    );

    let layer1 = fs::read_to_string(tree_dir.join("layer1.lyr")).unwrap();
    assert_eq!(layer1.lines().count(), 4);
    assert!(layer1.ends_with('\n'));

    // Scratch was relocated and no staging was left behind
    assert!(scratch_files(dir.path()).is_empty());
    assert!(generator.store().leftover_staging().unwrap().is_empty());
}

#[test]
fn test_regenerating_keeps_single_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::open(config(dir.path(), 4, 2, 2)).unwrap();
    let secret = SecretKey::from("twice");

    let first = generator.generate(&secret).unwrap();
    let info_path = dir.path().join(first.as_str()).join("info.dta");
    let before = fs::read_to_string(&info_path).unwrap();

    let second = generator.generate(&secret).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&info_path).unwrap(), before);
    assert_eq!(generator.store().addresses().unwrap(), vec![first]);
    assert!(generator.store().leftover_staging().unwrap().is_empty());
}

#[test]
fn test_scratch_then_fold_matches_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::open(config(dir.path(), 5, 3, 2)).unwrap();
    let secret = SecretKey::from("two-step");

    let scratch = dir.path().join("manual-scratch");
    let report = generator.generate_scratch(&secret, &scratch).unwrap();
    assert_eq!(report.leaves, 16);
    assert_eq!(fs::read_to_string(&scratch).unwrap().lines().count(), 16);

    let from_scratch = generator.generate_from_scratch(&scratch).unwrap();
    assert!(!scratch.exists());

    let other = tempfile::tempdir().unwrap();
    let full = Generator::new(config(other.path(), 5, 1, 8), MemoryTreeStore::new())
        .unwrap()
        .generate(&secret)
        .unwrap();
    assert_eq!(from_scratch, full);
}

#[test]
fn test_finalize_is_idempotent_across_stores() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsTreeStore::new(dir.path()).unwrap();
    let secret = SecretKey::from("finalize");

    let mut outcomes = Vec::new();
    let mut address = None;
    for _ in 0..2 {
        let leaves = build_leaf_layer(&secret, 3, 2, 1).unwrap();
        let (root, layers) = fold_layers(leaves, 3).unwrap();
        let derived = encode_address(&root, 3);

        let staging = store.open_staging().unwrap();
        for (index, layer) in layers.iter().enumerate() {
            store.write_layer(&staging, index as u32, layer).unwrap();
        }
        outcomes.push(finalize(&store, staging, &derived, 3).unwrap());
        address = Some(derived);
    }

    assert_eq!(
        outcomes,
        vec![FinalizeOutcome::Stored, FinalizeOutcome::AlreadyPresent]
    );
    assert_eq!(store.addresses().unwrap(), vec![address.unwrap()]);
}

#[test]
fn test_failed_fold_leaves_staging_for_inspection() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::open(config(dir.path(), 4, 1, 4)).unwrap();

    // A scratch file with the wrong number of leaves for a depth 4 tree
    let scratch = dir.path().join("short-scratch");
    fs::write(&scratch, "a\nb\nc\n").unwrap();

    assert!(generator.generate_from_scratch(&scratch).is_err());
    assert_eq!(generator.store().leftover_staging().unwrap().len(), 1);
    assert!(generator.store().addresses().unwrap().is_empty());
}

#[test]
fn test_concurrent_requests_return_their_own_address() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::new(config(dir.path(), 6, 2, 4), MemoryTreeStore::new()).unwrap();
    let secrets: Vec<String> = (0..4).map(|t| format!("concurrent-{t}")).collect();

    thread::scope(|scope| {
        for secret in &secrets {
            let generator = &generator;
            scope.spawn(move || {
                let secret = SecretKey::from(secret.as_str());
                let leaves = build_leaf_layer(&secret, 6, 1, 8).unwrap();
                let (root, _) = fold_layers(leaves, 6).unwrap();
                let expected = encode_address(&root, 6);

                for _ in 0..5 {
                    assert_eq!(generator.generate(&secret).unwrap(), expected);
                }
            });
        }
    });

    assert_eq!(generator.store().len(), secrets.len());
    assert!(scratch_files(dir.path()).is_empty());
}

#[test]
fn test_scratch_on_other_filesystem_is_imported() {
    let shm = Path::new("/dev/shm");
    if !shm.is_dir() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir_in(shm).unwrap();
    let generator = Generator::open(config(dir.path(), 4, 2, 2)).unwrap();
    let secret = SecretKey::from("elsewhere");

    let scratch = scratch_dir.path().join("leaves");
    generator.generate_scratch(&secret, &scratch).unwrap();
    let address = generator.generate_from_scratch(&scratch).unwrap();

    assert!(!scratch.exists());
    let (root, _) = fold_layers(build_leaf_layer(&secret, 4, 1, 1).unwrap(), 4).unwrap();
    assert_eq!(address, encode_address(&root, 4));
    assert_eq!(generator.store().read_layer(&address, 0).unwrap().len(), 8);
}

#[test]
fn test_unwritable_scratch_dir_fails_before_leaves() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the scratch directory should be
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();

    let generator =
        Generator::new(config(&blocker.join("store"), 3, 1, 1), MemoryTreeStore::new()).unwrap();
    let result = generator.generate(&SecretKey::from("blocked"));

    assert_eq!(
        result,
        Err(GenerationFailed {
            stage: Stage::Seeding
        })
    );
    assert!(generator.store().is_empty());
}

#[test]
fn test_worker_failure_keeps_scratch_and_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::open(config(dir.path(), 4, 2, 2)).unwrap();

    let result = generator.generate_with::<FailingLeafStream>(&SecretKey::from("failing"));

    assert_eq!(
        result,
        Err(GenerationFailed {
            stage: Stage::LeafGeneration
        })
    );
    assert_eq!(scratch_files(dir.path()).len(), 1);
    assert!(generator.store().addresses().unwrap().is_empty());
    assert!(generator.store().leftover_staging().unwrap().is_empty());
}
