use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{MetricError, MetricResult};

/// Eigenvalues at or below this fraction of the dominant one count as null directions.
pub const RANK_TOLERANCE: f64 = 1e-10;

const POWER_ITERATIONS: usize = 10_000;
const POWER_TOLERANCE: f64 = 1e-10;
// Iterates shorter than this fraction of the matrix norm have left the
// non-null subspace.
const POWER_RESIDUAL: f64 = 1e-12;

/// Leading eigenpairs of a symmetric matrix, ordered by decreasing eigenvalue magnitude.
#[derive(Debug, Clone)]
pub struct EigenBasis {
    pub vectors: DMatrix<f64>,
    pub values: DVector<f64>,
}

impl EigenBasis {
    pub fn rank(&self) -> usize {
        self.vectors.ncols()
    }
}

/// Solver returning the top-`m` eigenvectors of a symmetric matrix.
///
/// Implementations must return exactly `m` orthonormal columns sorted by
/// decreasing `|λ|`, or fail with [`MetricError::DegenerateInput`] when the
/// matrix has fewer than `m` directions with non-negligible eigenvalue.
pub trait EigenOrderer: Send + Sync {
    fn eigen_order(&self, matrix: &DMatrix<f64>, m: usize) -> MetricResult<EigenBasis>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenseEigenOrderer;

impl EigenOrderer for DenseEigenOrderer {
    fn eigen_order(&self, matrix: &DMatrix<f64>, m: usize) -> MetricResult<EigenBasis> {
        check_request(matrix, m)?;

        let symmetric = 0.5 * (matrix + matrix.transpose());
        let eigen = SymmetricEigen::new(symmetric);

        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| {
            eigen.eigenvalues[b]
                .abs()
                .partial_cmp(&eigen.eigenvalues[a].abs())
                .unwrap_or(Ordering::Equal)
        });

        let dominant = eigen.eigenvalues[order[0]].abs();
        let rank = order
            .iter()
            .take_while(|&&idx| !is_null(eigen.eigenvalues[idx], dominant))
            .count();
        if rank < m {
            return Err(MetricError::DegenerateInput { requested: m, rank });
        }

        let mut vectors = DMatrix::zeros(matrix.nrows(), m);
        let mut values = DVector::zeros(m);
        for (col, &idx) in order.iter().take(m).enumerate() {
            let mut column = eigen.eigenvectors.column(idx).into_owned();
            align_sign(&mut column);
            vectors.set_column(col, &column);
            values[col] = eigen.eigenvalues[idx];
        }
        Ok(EigenBasis { vectors, values })
    }
}

/// Deflated power iteration: each new direction is kept orthogonal to the ones
/// already found. Cheaper than a full decomposition when `m` is much smaller than D.
#[derive(Debug, Clone, Copy)]
pub struct PowerIterationOrderer {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for PowerIterationOrderer {
    fn default() -> Self {
        Self {
            max_iterations: POWER_ITERATIONS,
            tolerance: POWER_TOLERANCE,
            seed: 1,
        }
    }
}

impl EigenOrderer for PowerIterationOrderer {
    fn eigen_order(&self, matrix: &DMatrix<f64>, m: usize) -> MetricResult<EigenBasis> {
        check_request(matrix, m)?;

        let symmetric = 0.5 * (matrix + matrix.transpose());
        let n = symmetric.nrows();
        let scale = symmetric.norm();
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(MetricError::DegenerateInput { requested: m, rank: 0 });
        }
        let mut basis: Vec<DVector<f64>> = Vec::with_capacity(m);
        let mut values: Vec<f64> = Vec::with_capacity(m);

        for k in 0..m {
            let seed = self.seed.wrapping_mul(48271).wrapping_add(k as u64);
            let Some((lambda, vector)) = self.power_iteration(&symmetric, scale, &basis, seed)
            else {
                return Err(MetricError::DegenerateInput { requested: m, rank: k });
            };
            if is_null(lambda, values.first().copied().unwrap_or(lambda).abs()) {
                return Err(MetricError::DegenerateInput { requested: m, rank: k });
            }
            values.push(lambda);
            basis.push(vector);
        }

        let mut vectors = DMatrix::zeros(n, m);
        for (col, vector) in basis.iter().enumerate() {
            vectors.set_column(col, vector);
        }
        Ok(EigenBasis {
            vectors,
            values: DVector::from_vec(values),
        })
    }
}

impl PowerIterationOrderer {
    fn power_iteration(
        &self,
        matrix: &DMatrix<f64>,
        scale: f64,
        basis: &[DVector<f64>],
        seed: u64,
    ) -> Option<(f64, DVector<f64>)> {
        let n = matrix.nrows();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut vector = DVector::from_iterator(n, (0..n).map(|_| rng.gen_range(-1.0f64..1.0f64)));
        orthogonalize(&mut vector, basis);
        normalize(&mut vector, POWER_RESIDUAL)?;

        for _ in 0..self.max_iterations {
            let mut next = matrix * &vector;
            orthogonalize(&mut next, basis);
            normalize(&mut next, POWER_RESIDUAL * scale)?;
            // Negative eigenvalues flip the iterate every step.
            let sign = if next.dot(&vector) < 0.0 { -1.0 } else { 1.0 };
            let delta = (&next - sign * &vector).norm();
            vector = next;
            if delta <= self.tolerance {
                break;
            }
        }

        let lambda = vector.dot(&(matrix * &vector));
        align_sign(&mut vector);
        Some((lambda, vector))
    }
}

fn check_request(matrix: &DMatrix<f64>, m: usize) -> MetricResult<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(MetricError::ShapeMismatch {
            expected: matrix.nrows(),
            found: matrix.ncols(),
        });
    }
    if m == 0 || m > matrix.nrows() {
        return Err(MetricError::Dimension {
            requested: m,
            available: matrix.nrows(),
        });
    }
    Ok(())
}

fn is_null(value: f64, dominant: f64) -> bool {
    dominant <= 0.0 || value.abs() <= RANK_TOLERANCE * dominant
}

fn orthogonalize(vector: &mut DVector<f64>, basis: &[DVector<f64>]) {
    for other in basis {
        let projection = vector.dot(other);
        vector.axpy(-projection, other, 1.0);
    }
}

fn normalize(vector: &mut DVector<f64>, floor: f64) -> Option<f64> {
    let norm = vector.norm();
    if norm.is_nan() || norm <= floor {
        return None;
    }
    *vector /= norm;
    Some(norm)
}

/// Flips the vector so its largest-magnitude entry is positive.
fn align_sign(vector: &mut DVector<f64>) {
    let pivot = vector.iter().copied().fold(0.0f64, |best, v| {
        if v.abs() > best.abs() {
            v
        } else {
            best
        }
    });
    if pivot < 0.0 {
        vector.neg_mut();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn known_spectrum(values: &[f64], seed: u64) -> DMatrix<f64> {
        let n = values.len();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let random = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
        let q = random.qr().q();
        &q * DMatrix::from_diagonal(&DVector::from_column_slice(values)) * q.transpose()
    }

    fn assert_orthonormal(vectors: &DMatrix<f64>) {
        let gram = vectors.transpose() * vectors;
        let identity = DMatrix::<f64>::identity(vectors.ncols(), vectors.ncols());
        assert_abs_diff_eq!(gram, identity, epsilon = 1e-8);
    }

    #[test]
    fn dense_orders_by_magnitude() {
        let matrix = known_spectrum(&[1.0, -7.0, 3.0, 0.5], 3);
        let basis = DenseEigenOrderer.eigen_order(&matrix, 3).expect("eigen basis");
        assert_eq!(basis.rank(), 3);
        assert_abs_diff_eq!(basis.values[0], -7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(basis.values[1], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(basis.values[2], 1.0, epsilon = 1e-9);
        assert_orthonormal(&basis.vectors);
    }

    #[test]
    fn rejects_out_of_range_rank() {
        let matrix = DMatrix::<f64>::identity(3, 3);
        assert_eq!(
            DenseEigenOrderer.eigen_order(&matrix, 4).unwrap_err(),
            MetricError::Dimension { requested: 4, available: 3 }
        );
        assert!(matches!(
            PowerIterationOrderer::default().eigen_order(&matrix, 0),
            Err(MetricError::Dimension { requested: 0, .. })
        ));
    }

    #[test]
    fn rank_deficient_matrix_is_degenerate() {
        let matrix = known_spectrum(&[4.0, 2.0, 0.0, 0.0], 11);
        assert_eq!(
            DenseEigenOrderer.eigen_order(&matrix, 3).unwrap_err(),
            MetricError::DegenerateInput { requested: 3, rank: 2 }
        );
        assert!(matches!(
            PowerIterationOrderer::default().eigen_order(&matrix, 3),
            Err(MetricError::DegenerateInput { requested: 3, rank: 2 })
        ));
    }

    #[test]
    fn power_iteration_matches_dense_solver() {
        let matrix = known_spectrum(&[10.0, 5.0, 2.0, 1.0, 0.5], 5);
        let dense = DenseEigenOrderer.eigen_order(&matrix, 3).expect("dense");
        let power = PowerIterationOrderer::default()
            .eigen_order(&matrix, 3)
            .expect("power");
        assert_orthonormal(&power.vectors);
        assert_abs_diff_eq!(dense.values, power.values, epsilon = 1e-6);
        assert_abs_diff_eq!(dense.vectors, power.vectors, epsilon = 1e-6);
    }

    #[test]
    fn tiny_scale_spectrum_is_not_degenerate() {
        let values = [10.0, 5.0, 2.0, 1.0, 0.5].map(|v| v * 1e-14);
        let matrix = known_spectrum(&values, 5);
        let dense = DenseEigenOrderer.eigen_order(&matrix, 3).expect("dense");
        let power = PowerIterationOrderer::default()
            .eigen_order(&matrix, 3)
            .expect("power");
        assert_orthonormal(&power.vectors);
        assert_abs_diff_eq!(dense.vectors, power.vectors, epsilon = 1e-6);
        assert_abs_diff_eq!(power.values[0], 1e-13, epsilon = 1e-20);

        let diagonal = DMatrix::from_diagonal(&DVector::from_vec(vec![3e-14, 2e-14, 1e-14]));
        let power = PowerIterationOrderer::default()
            .eigen_order(&diagonal, 2)
            .expect("power on diagonal");
        assert_abs_diff_eq!(power.values[0], 3e-14, epsilon = 1e-20);
        assert_abs_diff_eq!(power.values[1], 2e-14, epsilon = 1e-20);
    }

    #[test]
    fn zero_matrix_has_rank_zero() {
        let zero = DMatrix::<f64>::zeros(3, 3);
        assert_eq!(
            DenseEigenOrderer.eigen_order(&zero, 1).unwrap_err(),
            MetricError::DegenerateInput { requested: 1, rank: 0 }
        );
        assert_eq!(
            PowerIterationOrderer::default().eigen_order(&zero, 1).unwrap_err(),
            MetricError::DegenerateInput { requested: 1, rank: 0 }
        );
    }
}
