use log::debug;
use nalgebra::{DMatrix, DVector, RowDVector};
use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};
use crate::features::check_entries;
use crate::subspace::eigen::{DenseEigenOrderer, EigenOrderer};

pub const DEFAULT_RANK_FRACTION: f64 = 0.6;

/// Truncated PCA basis: D×M orthonormal columns plus the training mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubspaceBasis {
    basis: DMatrix<f64>,
    mean: RowDVector<f64>,
    eigenvalues: DVector<f64>,
}

impl SubspaceBasis {
    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    pub fn mean(&self) -> &RowDVector<f64> {
        &self.mean
    }

    pub fn eigenvalues(&self) -> &DVector<f64> {
        &self.eigenvalues
    }

    pub fn input_dim(&self) -> usize {
        self.basis.nrows()
    }

    pub fn rank(&self) -> usize {
        self.basis.ncols()
    }

    /// `(x - mean) · U` for a single row.
    pub fn project_row(&self, row: &[f64]) -> MetricResult<RowDVector<f64>> {
        if row.len() != self.input_dim() {
            return Err(MetricError::ShapeMismatch {
                expected: self.input_dim(),
                found: row.len(),
            });
        }
        let centered = RowDVector::from_row_slice(row) - &self.mean;
        Ok(centered * &self.basis)
    }

    pub fn project(&self, features: &DMatrix<f64>) -> MetricResult<DMatrix<f64>> {
        if features.ncols() != self.input_dim() {
            return Err(MetricError::ShapeMismatch {
                expected: self.input_dim(),
                found: features.ncols(),
            });
        }
        let mut centered = features.clone();
        for mut row in centered.row_iter_mut() {
            row -= &self.mean;
        }
        Ok(centered * &self.basis)
    }
}

/// Fits a [`SubspaceBasis`] from the scatter matrix of a training matrix.
pub struct SubspaceEstimator<E = DenseEigenOrderer> {
    orderer: E,
}

impl SubspaceEstimator<DenseEigenOrderer> {
    pub fn dense() -> Self {
        Self::new(DenseEigenOrderer)
    }
}

impl Default for SubspaceEstimator<DenseEigenOrderer> {
    fn default() -> Self {
        Self::dense()
    }
}

impl<E: EigenOrderer> SubspaceEstimator<E> {
    pub fn new(orderer: E) -> Self {
        Self { orderer }
    }

    pub fn fit(&self, features: &DMatrix<f64>, m: Option<usize>) -> MetricResult<SubspaceBasis> {
        let (rows, cols) = features.shape();
        if rows == 0 || cols == 0 {
            return Err(MetricError::EmptyInput);
        }
        check_entries(features, f64::is_finite)?;
        let m = m.unwrap_or_else(|| default_rank(cols));
        if m == 0 || m > cols {
            return Err(MetricError::Dimension {
                requested: m,
                available: cols,
            });
        }

        let mean = features.row_mean();
        let scatter = scatter_matrix(features, &mean);
        debug!(
            "scatter matrix {}x{} from {} samples, extracting {} directions",
            cols, cols, rows, m
        );

        let eigen = self.orderer.eigen_order(&scatter, m)?;
        Ok(SubspaceBasis {
            basis: eigen.vectors,
            mean,
            eigenvalues: eigen.values,
        })
    }
}

pub fn default_rank(dim: usize) -> usize {
    (dim as f64 * DEFAULT_RANK_FRACTION).floor() as usize
}

pub fn scatter_matrix(features: &DMatrix<f64>, mean: &RowDVector<f64>) -> DMatrix<f64> {
    let mut centered = features.clone();
    for mut row in centered.row_iter_mut() {
        row -= mean;
    }
    centered.tr_mul(&centered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subspace::eigen::PowerIterationOrderer;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn random_features(rows: usize, cols: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        // Decreasing column scales keep the spectrum well separated.
        DMatrix::from_fn(rows, cols, |_, c| rng.gen_range(-1.0..1.0) * (cols - c) as f64)
    }

    #[test]
    fn basis_is_orthonormal_and_ordered() {
        let features = random_features(40, 6, 17);
        let fitted = SubspaceEstimator::dense().fit(&features, Some(4)).expect("fit");
        let gram = fitted.basis().transpose() * fitted.basis();
        assert_abs_diff_eq!(gram, DMatrix::<f64>::identity(4, 4), epsilon = 1e-8);
        for pair in fitted.eigenvalues().as_slice().windows(2) {
            assert!(pair[0].abs() + 1e-9 >= pair[1].abs());
        }
    }

    #[test]
    fn default_rank_is_sixty_percent() {
        let features = random_features(30, 10, 2);
        let fitted = SubspaceEstimator::dense().fit(&features, None).expect("fit");
        assert_eq!(fitted.rank(), 6);
        assert_eq!(default_rank(4), 2);
    }

    #[test]
    fn rejects_invalid_rank() {
        let features = random_features(10, 3, 1);
        let estimator = SubspaceEstimator::dense();
        assert_eq!(
            estimator.fit(&features, Some(4)).unwrap_err(),
            MetricError::Dimension { requested: 4, available: 3 }
        );
        assert!(matches!(
            estimator.fit(&features, Some(0)),
            Err(MetricError::Dimension { requested: 0, .. })
        ));
        // floor(0.6 * 1) == 0
        assert!(matches!(
            estimator.fit(&DMatrix::from_element(3, 1, 1.0), None),
            Err(MetricError::Dimension { requested: 0, .. })
        ));
    }

    #[test]
    fn too_few_samples_is_degenerate() {
        // Three samples span at most two centered directions.
        let features = random_features(3, 5, 9);
        assert!(matches!(
            SubspaceEstimator::dense().fit(&features, Some(3)),
            Err(MetricError::DegenerateInput { requested: 3, rank: 2 })
        ));
    }

    #[test]
    fn non_finite_features_are_rejected() {
        let mut features = random_features(10, 3, 6);
        features[(4, 1)] = f64::NAN;
        assert!(matches!(
            SubspaceEstimator::dense().fit(&features, Some(2)),
            Err(MetricError::InvalidFeature { row: 4, col: 1, .. })
        ));
        features[(4, 1)] = f64::NEG_INFINITY;
        assert!(matches!(
            SubspaceEstimator::new(PowerIterationOrderer::default()).fit(&features, Some(2)),
            Err(MetricError::InvalidFeature { row: 4, col: 1, .. })
        ));
    }

    #[test]
    fn projection_centers_training_mean() {
        let features = random_features(25, 5, 4);
        let fitted = SubspaceEstimator::dense().fit(&features, Some(3)).expect("fit");
        let projected = fitted.project(&features).expect("project");
        assert_eq!(projected.shape(), (25, 3));
        let column_means = projected.row_mean();
        assert_abs_diff_eq!(column_means.norm(), 0.0, epsilon = 1e-9);

        let row: Vec<f64> = features.row(7).iter().copied().collect();
        let single = fitted.project_row(&row).expect("project row");
        assert_abs_diff_eq!(single, projected.row(7).into_owned(), epsilon = 1e-12);
    }

    #[test]
    fn projection_checks_width() {
        let fitted = SubspaceEstimator::dense()
            .fit(&random_features(20, 4, 8), Some(2))
            .expect("fit");
        assert!(matches!(
            fitted.project_row(&[1.0, 2.0]),
            Err(MetricError::ShapeMismatch { expected: 4, found: 2 })
        ));
    }

    #[test]
    fn injected_solver_agrees_with_default() {
        let features = random_features(50, 5, 21);
        let dense = SubspaceEstimator::dense().fit(&features, Some(2)).expect("dense");
        let power = SubspaceEstimator::new(PowerIterationOrderer::default())
            .fit(&features, Some(2))
            .expect("power");
        assert_abs_diff_eq!(dense.basis(), power.basis(), epsilon = 1e-5);
        assert_abs_diff_eq!(dense.mean(), power.mean(), epsilon = 1e-12);
    }
}
