//! SigmaX - Merkle tree address generator
//!
//! Derives the Lamport/Merkle tree for a private key, stores it under its
//! address and prints the address.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sigmax_core::address::AddressEncoder;
use sigmax_core::crypto::self_test;
use sigmax_core::{Address, FsTreeStore, Generator, GeneratorConfig, SecretKey, TreeStore};

/// SigmaX - Lamport/Merkle address generator
#[derive(Parser)]
#[command(name = "sigmax")]
#[command(about = "Generate SigmaX addresses from private keys")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per address
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Args)]
struct TreeArgs {
    /// Number of tree layers (14-18 for network addresses)
    #[arg(long)]
    layers: Option<u32>,

    /// Worker threads for leaf generation
    #[arg(long)]
    workers: Option<usize>,

    /// Leaves per worker per wave
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and store the tree for a private key
    Generate {
        #[command(flatten)]
        tree: TreeArgs,

        /// Private key (read from stdin when omitted)
        #[arg(long)]
        secret_key: Option<String>,
    },

    /// Only write the leaf layer to a scratch file
    Scratch {
        #[command(flatten)]
        tree: TreeArgs,

        /// Private key (read from stdin when omitted)
        #[arg(long)]
        secret_key: Option<String>,

        /// Scratch file to write
        #[arg(long)]
        output: PathBuf,
    },

    /// Build and store the tree from an existing scratch file
    FromScratch {
        #[command(flatten)]
        tree: TreeArgs,

        /// Scratch file to consume
        #[arg(long)]
        scratch: PathBuf,
    },

    /// Show a stored tree
    Info {
        /// Address of the tree
        address: String,
    },

    /// List stored addresses
    List,

    /// Validate the checksum of an address
    Check {
        /// Address to check
        address: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sigmax=info,sigmax_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    self_test().context("cryptographic self-test failed, refusing to run")?;

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GeneratorConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.store_root = dir.clone();
    }

    match cli.command {
        Commands::Generate { tree, secret_key } => {
            apply(&mut config, &tree);
            let secret = read_secret(secret_key)?;
            let generator = Generator::open(config)?;

            let started = Instant::now();
            let address = generator.generate(&secret)?;
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "Done");
            println!("{address}");
        }

        Commands::Scratch {
            tree,
            secret_key,
            output,
        } => {
            apply(&mut config, &tree);
            let secret = read_secret(secret_key)?;
            let generator = Generator::open(config)?;

            let report = generator.generate_scratch(&secret, &output)?;
            println!(
                "Wrote {} leaves to {} ({:.0} keys/s)",
                report.leaves,
                output.display(),
                report.keys_per_second()
            );
        }

        Commands::FromScratch { tree, scratch } => {
            apply(&mut config, &tree);
            let generator = Generator::open(config)?;
            let address = generator.generate_from_scratch(&scratch)?;
            println!("{address}");
        }

        Commands::Info { address } => {
            let store = FsTreeStore::new(&config.store_root)?;
            let address = Address::new_unchecked(address);
            let metadata = store.read_metadata(&address)?;

            println!("Address:          {}", metadata.address);
            println!("Layers:           {}", metadata.num_layers);
            println!("Signatures:       {}", sigmax_core::leaf_count(metadata.num_layers));
            println!("Software version: {}", metadata.generator_version);
            println!("Path:             {}", store.address_dir(&address).display());
        }

        Commands::List => {
            let store = FsTreeStore::new(&config.store_root)?;
            for address in store.addresses()? {
                println!("{address}");
            }
            let leftovers = store.leftover_staging()?;
            if !leftovers.is_empty() {
                eprintln!("{} staging directories from failed runs:", leftovers.len());
                for path in leftovers {
                    eprintln!("  {}", path.display());
                }
            }
        }

        Commands::Check { address } => {
            let version = AddressEncoder::verify(&address)?;
            match version.depth() {
                Some(depth) => println!(
                    "Valid {} address ({} layers, {} signatures)",
                    version.prefix(),
                    depth,
                    sigmax_core::leaf_count(depth)
                ),
                None => println!("Valid checksum, non-standard {} address", version.prefix()),
            }
        }
    }

    Ok(())
}

fn apply(config: &mut GeneratorConfig, tree: &TreeArgs) {
    if let Some(layers) = tree.layers {
        config.num_layers = layers;
    }
    if let Some(workers) = tree.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = tree.batch_size {
        config.batch_size = batch_size;
    }
}

fn read_secret(arg: Option<String>) -> Result<SecretKey> {
    if let Some(secret) = arg {
        return Ok(SecretKey::from(secret.as_str()));
    }

    eprintln!("Enter the private key:");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read private key from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        bail!("private key must not be empty");
    }
    Ok(SecretKey::from(secret))
}
