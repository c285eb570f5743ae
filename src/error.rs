use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("requested dimension {requested} is outside 1..={available}")]
    Dimension { requested: usize, available: usize },
    #[error("scatter matrix has rank {rank}, cannot extract {requested} independent directions")]
    DegenerateInput { requested: usize, rank: usize },
    #[error("target vector is zero: no same-label pairs to build the feasibility constraint")]
    DegenerateTarget,
    #[error("no feasible point after {attempts} projections (residual {residual:e})")]
    NonConvergence { attempts: usize, residual: f64 },
    #[error("hyperparameter `{name}` has invalid value {value}")]
    InvalidHyperparameter { name: &'static str, value: f64 },
    #[error("feature matrix is empty")]
    EmptyInput,
    #[error("feature matrix has {rows} rows but {labels} labels were given")]
    LabelMismatch { rows: usize, labels: usize },
    #[error("expected length {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("metric weight {index} is {value}, expected a finite non-negative value")]
    NegativeWeight { index: usize, value: f64 },
    #[error("feature[{row}, {col}] = {value} is outside the accepted domain")]
    InvalidFeature { row: usize, col: usize, value: f64 },
}

pub type MetricResult<T> = std::result::Result<T, MetricError>;
