use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;

use crate::config::MetricConfig;
use crate::features::LabeledFeatures;
use crate::optimizer::{MetricOptimizer, OptimizationOutcome};
use crate::subspace::{DenseEigenOrderer, EigenOrderer, SubspaceBasis, SubspaceEstimator};

/// Log transform, PCA fit on the training rows, projection of every row, and
/// metric optimization on the projected training rows.
pub struct MetricPipeline<E = DenseEigenOrderer> {
    config: MetricConfig,
    estimator: SubspaceEstimator<E>,
}

impl MetricPipeline<DenseEigenOrderer> {
    pub fn new(config: MetricConfig) -> Self {
        Self::with_orderer(config, DenseEigenOrderer)
    }
}

pub struct PipelineSummary {
    pub subspace: Option<SubspaceBasis>,
    pub features: LabeledFeatures,
    pub outcome: OptimizationOutcome,
    pub subspace_duration: Duration,
    pub optimize_duration: Duration,
    pub total_duration: Duration,
}

impl<E: EigenOrderer> MetricPipeline<E> {
    pub fn with_orderer(config: MetricConfig, orderer: E) -> Self {
        Self {
            config,
            estimator: SubspaceEstimator::new(orderer),
        }
    }

    pub fn run(&self, data: &LabeledFeatures, train_idx: &[usize]) -> Result<PipelineSummary> {
        let total_start = Instant::now();
        self.config.validate().context("validate pipeline config")?;

        let transformed = if self.config.log_transform {
            data.log1p().context("apply log transform")?
        } else {
            data.clone()
        };

        let subspace_start = Instant::now();
        let (subspace, features) = if self.config.pca.enabled {
            let train = transformed
                .select(train_idx)
                .context("select training rows for subspace fit")?;
            let basis = self
                .estimator
                .fit(train.features(), self.config.pca.m_pca)
                .context("fit subspace basis")?;
            let projected = basis
                .project(transformed.features())
                .context("project features into subspace")?;
            info!(
                "Subspace fit on {} training rows: {} -> {} dimensions",
                train.len(),
                basis.input_dim(),
                basis.rank()
            );
            let features = transformed.with_features(projected)?;
            (Some(basis), features)
        } else {
            (None, transformed)
        };
        let subspace_duration = subspace_start.elapsed();

        let optimize_start = Instant::now();
        let train = features
            .select(train_idx)
            .context("select training rows for metric optimization")?;
        info!(
            "Optimizing metric over {} training rows of dimension {}",
            train.len(),
            train.dim()
        );
        let outcome = MetricOptimizer::new(self.config.optimizer.clone())
            .optimize(&train)
            .context("optimize diagonal metric")?;
        let optimize_duration = optimize_start.elapsed();

        Ok(PipelineSummary {
            subspace,
            features,
            outcome,
            subspace_duration,
            optimize_duration,
            total_duration: total_start.elapsed(),
        })
    }
}
