//! Dataset walker binary
//!
//! Prepares the Oxford-IIIT Pet archives and streams one split, reporting
//! per-species counts and pipeline metrics.

use petpipe_core::dataset::{image_decoder, OxfordPet, PetConfig, Split, Species};
use petpipe_core::metrics::gather_pipeline_metrics;
use petpipe_core::resource::{LoaderConfig, ResourceLoader};
use std::collections::HashMap;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn env_u32(name: &str) -> Result<Option<u32>, Box<dyn std::error::Error>> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value.parse()?)),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration from environment
    let root = std::env::var("PETS_ROOT").unwrap_or_else(|_| "data/oxford-iiit-pet".into());
    let split: Split = std::env::var("PETS_SPLIT")
        .unwrap_or_else(|_| "trainval".into())
        .parse()?;
    let decode = std::env::var("PETS_DECODE").map(|v| v == "1").unwrap_or(false);
    let limit = env_u32("PETS_LIMIT")?;

    let mut config = PetConfig::new(split);
    if let (Some(worker_id), Some(num_workers)) =
        (env_u32("PETS_WORKER_ID")?, env_u32("PETS_NUM_WORKERS")?)
    {
        config = config.with_shard(worker_id, num_workers)?;
    }

    let mut dataset = OxfordPet::new(config);
    if decode {
        dataset = dataset.with_decoder(image_decoder());
    }

    info!("Preparing resources under {}", root);
    let loader = ResourceLoader::new(LoaderConfig::new(&root))?;
    let mut samples = match dataset.load(&loader).await {
        Ok(samples) => samples,
        Err(e) => {
            error!("Failed to prepare dataset: {}", e);
            return Err(e.into());
        }
    };

    let mut per_species: HashMap<Species, u64> = HashMap::new();
    let mut total = 0u64;
    while let Some(sample) = samples.next() {
        let sample = sample?;
        *per_species.entry(sample.species).or_default() += 1;
        total += 1;
        if limit.is_some_and(|limit| total >= limit as u64) {
            break;
        }
    }

    info!(
        "Split {}: {} samples ({} cats, {} dogs)",
        split,
        total,
        per_species.get(&Species::Cat).copied().unwrap_or(0),
        per_species.get(&Species::Dog).copied().unwrap_or(0),
    );
    print!("{}", gather_pipeline_metrics());
    print!("{}", samples.stats().to_prometheus(split.as_str()));

    Ok(())
}
