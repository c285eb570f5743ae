use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};
use crate::synthetic::SyntheticConfig;

pub use crate::optimizer::OptimizerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub enabled: bool,
    /// Target subspace rank; `None` keeps 60% of the input dimension.
    pub m_pca: Option<usize>,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            m_pca: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Apply `ln(x + 1)` to every feature before fitting.
    pub log_transform: bool,
    pub pca: PcaConfig,
    pub optimizer: OptimizerConfig,
    pub synthetic: SyntheticConfig,
}

impl MetricConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open config file {:?}", path))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("deserialize config file {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("validate config file {:?}", path))?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("deserialize config json")?;
        config.validate().context("validate config json")?;
        Ok(config)
    }

    pub fn validate(&self) -> MetricResult<()> {
        if self.pca.m_pca == Some(0) {
            return Err(MetricError::InvalidHyperparameter {
                name: "m_pca",
                value: 0.0,
            });
        }
        self.optimizer.validate()
    }
}
