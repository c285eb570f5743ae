use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};
use crate::features::{Label, LabeledFeatures};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub identities: usize,
    pub samples_per_identity: usize,
    pub dim: usize,
    pub train_identities: usize,
    /// Half-width of the per-sample noise around each identity center.
    pub spread: f64,
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            identities: 20,
            samples_per_identity: 4,
            dim: 32,
            train_identities: 12,
            spread: 0.5,
            seed: Some(42),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub data: LabeledFeatures,
    pub train_idx: Vec<usize>,
}

/// Non-negative features clustered around one random center per identity,
/// emitted round-robin so same-label rows are never contiguous.
pub fn generate(config: &SyntheticConfig) -> MetricResult<SyntheticDataset> {
    if config.identities == 0 || config.samples_per_identity == 0 || config.dim == 0 {
        return Err(MetricError::EmptyInput);
    }
    if config.train_identities == 0 || config.train_identities > config.identities {
        return Err(MetricError::Dimension {
            requested: config.train_identities,
            available: config.identities,
        });
    }
    if !(config.spread.is_finite() && config.spread >= 0.0) {
        return Err(MetricError::InvalidHyperparameter {
            name: "spread",
            value: config.spread,
        });
    }

    let seed = config.seed.unwrap_or_else(random_seed);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let centers: Vec<Vec<f64>> = (0..config.identities)
        .map(|_| (0..config.dim).map(|_| rng.gen_range(0.0..10.0)).collect())
        .collect();

    let rows = config.identities * config.samples_per_identity;
    let mut features = DMatrix::zeros(rows, config.dim);
    let mut labels: Vec<Label> = Vec::with_capacity(rows);
    let mut train_idx = Vec::new();
    for row in 0..rows {
        let identity = row % config.identities;
        for (col, center) in centers[identity].iter().enumerate() {
            let noise = if config.spread > 0.0 {
                rng.gen_range(-config.spread..config.spread)
            } else {
                0.0
            };
            features[(row, col)] = (center + noise).max(0.0);
        }
        labels.push(identity as Label);
        if identity < config.train_identities {
            train_idx.push(row);
        }
    }

    Ok(SyntheticDataset {
        data: LabeledFeatures::new(features, labels)?,
        train_idx,
    })
}

fn random_seed() -> u64 {
    rand::thread_rng().gen()
}
