//! Folding layers into a root
//!
//! Layers are folded strictly one after another; only the layer being read
//! and the layer being produced are held in memory. Pairs within a layer
//! are independent and are hashed in parallel once the layer is large
//! enough to make it worthwhile.

use rayon::prelude::*;
use tracing::debug;

use crate::config::ensure_buildable_depth;
use crate::error::{Error, Result};
use crate::layer_len;
use crate::types::{Layer, NodeHash, Root};

/// Layers smaller than this are folded on the calling thread
const PARALLEL_FOLD_THRESHOLD: usize = 4096;

/// Collapses a leaf layer into the root of a perfect binary tree
#[derive(Debug, Clone, Copy)]
pub struct TreeFolder {
    parallel: bool,
}

impl Default for TreeFolder {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl TreeFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A folder that never leaves the calling thread
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    /// Hash each adjacent pair of `layer` into the next layer up
    pub fn fold_layer(&self, layer: &[NodeHash]) -> Result<Layer> {
        if layer.len() < 2 || !layer.len().is_power_of_two() {
            return Err(Error::Config(format!(
                "cannot fold a layer of {} entries",
                layer.len()
            )));
        }

        let parent = |pair: &[NodeHash]| NodeHash::parent(&pair[0], &pair[1]);
        let folded: Layer = if self.parallel && layer.len() >= PARALLEL_FOLD_THRESHOLD {
            layer.par_chunks_exact(2).map(parent).collect()
        } else {
            layer.chunks_exact(2).map(parent).collect()
        };
        Ok(folded)
    }

    /// Fold `leaves` up to the root of a `num_layers` tree.
    ///
    /// `on_layer` receives every produced layer (index 1 through
    /// `num_layers - 1`) before the next one is started; an error from it
    /// aborts the fold.
    pub fn fold_layers<F>(&self, leaves: Layer, num_layers: u32, mut on_layer: F) -> Result<Root>
    where
        F: FnMut(u32, &Layer) -> Result<()>,
    {
        ensure_buildable_depth(num_layers)?;
        check_shape(0, num_layers, &leaves)?;

        let top = num_layers - 1;
        let mut current = leaves;
        for index in 1..top {
            let next = self.fold_layer(&current)?;
            check_shape(index, num_layers, &next)?;
            debug!(index, entries = next.len(), "Folded layer");
            on_layer(index, &next)?;
            current = next;
        }

        // `current` is now the two children of the root
        let root = Root::new(NodeHash::parent_digest(&current[0], &current[1]));
        on_layer(top, &vec![root.node()])?;
        debug!(index = top, "Computed root");

        Ok(root)
    }
}

fn check_shape(index: u32, num_layers: u32, layer: &Layer) -> Result<()> {
    let expected = layer_len(num_layers, index);
    if layer.len() == expected {
        Ok(())
    } else {
        Err(Error::LayerShape {
            index,
            expected,
            actual: layer.len(),
        })
    }
}

/// Fold `leaves` to a root, collecting every layer (leaves first)
pub fn fold_layers(leaves: Layer, num_layers: u32) -> Result<(Root, Vec<Layer>)> {
    let mut layers = vec![leaves.clone()];
    let root = TreeFolder::new().fold_layers(leaves, num_layers, |_, layer| {
        layers.push(layer.clone());
        Ok(())
    })?;
    Ok((root, layers))
}
