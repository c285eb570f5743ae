pub mod eigen;
pub mod estimator;

pub use eigen::{DenseEigenOrderer, EigenBasis, EigenOrderer, PowerIterationOrderer};
pub use estimator::{SubspaceBasis, SubspaceEstimator};
