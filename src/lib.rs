pub mod config;
pub mod error;
pub mod features;
pub mod metric;
pub mod optimizer;
pub mod pairs;
pub mod pipeline;
pub mod projection;
pub mod subspace;
pub mod synthetic;

pub use config::{MetricConfig, PcaConfig};
pub use error::{MetricError, MetricResult};
pub use features::{Label, LabeledFeatures};
pub use metric::DiagonalMetric;
pub use optimizer::{MetricOptimizer, OptimizationOutcome, OptimizerConfig, Termination};
pub use pairs::{CrossLabelGradient, LabelBuckets, PairAggregator};
pub use pipeline::{MetricPipeline, PipelineSummary};
pub use projection::FeasibilityProjector;
pub use subspace::{
    DenseEigenOrderer, EigenBasis, EigenOrderer, PowerIterationOrderer, SubspaceBasis,
    SubspaceEstimator,
};
pub use synthetic::{SyntheticConfig, SyntheticDataset};
