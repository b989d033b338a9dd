//! Parallel construction of the leaf layer
//!
//! Leaves are produced in waves. Each wave hands one private batch of seeds
//! to every worker of a fixed pool, waits for all of them, and only then
//! appends the wave's hashes to the sink in index order. Waves never
//! overlap, so the sink always sees leaves in strict index order.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::config::{ensure_buildable_depth, GeneratorConfig};
use crate::error::{Error, Result};
use crate::leaf::LeafKeyGenerator;
use crate::leaf_count;
use crate::rng::{ChaChaStream, SeededStream};
use crate::seed::SeedDeriver;
use crate::types::{Layer, LeafSeed, NodeHash, SecretKey};

/// Destination for leaf hashes as waves complete
pub trait LayerSink {
    /// Append hashes that directly follow everything appended so far
    fn append(&mut self, hashes: &[NodeHash]) -> Result<()>;

    /// Make everything appended so far durable
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl LayerSink for Vec<NodeHash> {
    fn append(&mut self, hashes: &[NodeHash]) -> Result<()> {
        self.extend_from_slice(hashes);
        Ok(())
    }
}

/// Summary of a finished leaf build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Number of leaves written to the sink
    pub leaves: usize,
    /// Number of waves dispatched
    pub waves: usize,
    /// Wall time of the whole build
    pub elapsed: Duration,
}

impl BuildReport {
    /// Average throughput over the whole build
    pub fn keys_per_second(&self) -> f64 {
        rate(self.leaves, self.elapsed)
    }
}

/// Fans leaf generation out over a fixed-size worker pool
pub struct ParallelLeafBuilder {
    workers: usize,
    batch_size: usize,
    pool: ThreadPool,
}

impl ParallelLeafBuilder {
    /// Create a builder with `workers` threads, each handling `batch_size`
    /// leaves per wave
    pub fn new(workers: usize, batch_size: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        if batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sigmax-leaf-{i}"))
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;

        Ok(Self {
            workers,
            batch_size,
            pool,
        })
    }

    /// Create a builder from a validated configuration
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        Self::new(config.workers, config.batch_size)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Leaves produced by one full wave
    pub fn wave_size(&self) -> usize {
        self.workers * self.batch_size
    }

    /// Build the leaf layer of a `num_layers` tree into `sink`
    pub fn build<W: LayerSink>(
        &self,
        secret: &SecretKey,
        num_layers: u32,
        sink: &mut W,
    ) -> Result<BuildReport> {
        self.build_with::<ChaChaStream, W>(secret, num_layers, sink)
    }

    /// Build the leaf layer using stream type `S` for every draw
    pub fn build_with<S: SeededStream, W: LayerSink>(
        &self,
        secret: &SecretKey,
        num_layers: u32,
        sink: &mut W,
    ) -> Result<BuildReport> {
        ensure_buildable_depth(num_layers)?;

        let total = leaf_count(num_layers);
        let started = Instant::now();
        let mut seeds = SeedDeriver::<S>::with_stream(secret);
        let mut done = 0;
        let mut wave = 0;

        debug!(
            total,
            workers = self.workers,
            batch_size = self.batch_size,
            "Starting leaf generation"
        );

        while done < total {
            let wave_started = Instant::now();
            let wave_len = self.wave_size().min(total - done);

            let mut batches: Vec<Vec<LeafSeed>> = Vec::with_capacity(self.workers);
            let mut remaining = wave_len;
            while remaining > 0 {
                let len = self.batch_size.min(remaining);
                batches.push(seeds.next_batch(len)?);
                remaining -= len;
            }

            let hashes = self.run_wave::<S>(wave, &batches)?;
            sink.append(&hashes)?;
            sink.flush()?;

            done += wave_len;
            info!(
                wave,
                done,
                total,
                keys_per_second = rate(wave_len, wave_started.elapsed()),
                "Leaf wave complete"
            );
            wave += 1;
        }

        Ok(BuildReport {
            leaves: done,
            waves: wave,
            elapsed: started.elapsed(),
        })
    }

    /// Hash every batch on the pool and return the results in batch order.
    /// Returns only once every worker of the wave has finished.
    fn run_wave<S: SeededStream>(&self, wave: usize, batches: &[Vec<LeafSeed>]) -> Result<Layer> {
        let results: Vec<Result<Layer>> = self.pool.install(|| {
            batches
                .par_iter()
                .map(|batch| {
                    panic::catch_unwind(AssertUnwindSafe(|| hash_batch::<S>(batch)))
                        .unwrap_or_else(|_| {
                            Err(Error::Worker {
                                wave,
                                reason: "worker panicked".to_string(),
                            })
                        })
                })
                .collect()
        });

        let mut hashes = Layer::with_capacity(batches.iter().map(Vec::len).sum());
        for result in results {
            match result {
                Ok(batch) => hashes.extend(batch),
                Err(e @ Error::Worker { .. }) => return Err(e),
                Err(e) => {
                    return Err(Error::Worker {
                        wave,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(hashes)
    }
}

fn hash_batch<S: SeededStream>(batch: &[LeafSeed]) -> Result<Layer> {
    batch
        .iter()
        .map(LeafKeyGenerator::leaf_hash_with::<S>)
        .collect()
}

fn rate(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Build the complete leaf layer in memory
pub fn build_leaf_layer(
    secret: &SecretKey,
    num_layers: u32,
    workers: usize,
    batch_size: usize,
) -> Result<Layer> {
    let builder = ParallelLeafBuilder::new(workers, batch_size)?;
    let mut layer = Layer::with_capacity(leaf_count(num_layers));
    builder.build(secret, num_layers, &mut layer)?;
    Ok(layer)
}
